//! # collab-causal
//!
//! The vector clock and causal metadata service that decorates every
//! transaction with causal metadata and buffers inbound transactions until
//! their dependencies arrive.

#![forbid(unsafe_code)]

pub mod config;
pub mod lamport;
pub mod metadata;
pub mod service;
pub mod vector_clock;

pub use config::CausalConfig;
pub use lamport::LamportClock;
pub use metadata::{MetadataRequest, VcRequest};
pub use service::CausalMetadataService;
pub use vector_clock::VectorClock;
