//! Ambient configuration for the causal metadata service.
//!
//! A small, `Default`-able, TOML-loadable config struct so operators can
//! tune queueing limits without code changes.

use serde::{Deserialize, Serialize};

/// Tunables for [`crate::service::CausalMetadataService`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalConfig {
    /// Emit a `tracing::warn!` once a single sender's pending queue grows
    /// past this many buffered transactions, a signal that its causal
    /// dependencies may never arrive.
    pub pending_queue_warn_threshold: usize,
    /// Whether `lamport_timestamp` defaults to `true` for
    /// [`crate::metadata::MetadataRequest::none`]-style helper requests
    /// that don't explicitly opt in or out.
    pub lamport_enabled_by_default: bool,
}

impl Default for CausalConfig {
    fn default() -> Self {
        Self {
            pending_queue_warn_threshold: 256,
            lamport_enabled_by_default: true,
        }
    }
}

impl CausalConfig {
    /// Parse from a TOML document, falling back to defaults for any
    /// missing field.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}
