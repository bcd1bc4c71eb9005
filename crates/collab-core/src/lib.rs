//! # collab-core
//!
//! Foundation types shared by every other crate in the workspace: replica
//! identity, name-paths addressing collabs in the tree, the wire codec for
//! transaction/message frames, a small typed event emitter, and the unified
//! [`CollabError`] taxonomy.
//!
//! This crate has no dependency on any other `collab-*` crate.

#![forbid(unsafe_code)]

pub mod collab;
pub mod error;
pub mod events;
pub mod replica;
pub mod wire;

pub use collab::{Collab, MessageMeta, SaveBytes};
pub use error::{CollabError, Result};
pub use events::EventEmitter;
pub use replica::ReplicaId;
pub use wire::{CollabId, NamePath};
