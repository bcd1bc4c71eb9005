//! # collab-runtime
//!
//! The collab tree runtime: registers top-level collabs, routes inbound
//! messages to them by name-path, batches local mutations into causally
//! stamped transactions, drives local echo, and frames save/load.

#![forbid(unsafe_code)]

pub mod config;
pub mod handle;
pub mod phase;
pub mod primitive;
pub mod run_locally;
pub mod runtime;
pub mod transaction;
pub mod transport;

pub use config::RuntimeConfig;
pub use handle::CollabHandle;
pub use phase::RuntimePhase;
pub use primitive::PrimitiveCollab;
pub use run_locally::RunLocallyCtx;
pub use runtime::Runtime;
pub use transaction::TxnBuilder;
pub use transport::{SaveStore, Transport};
