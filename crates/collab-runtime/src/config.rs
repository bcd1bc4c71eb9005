//! Ambient configuration for the runtime.

use serde::{Deserialize, Serialize};

/// Tunables for [`crate::runtime::Runtime`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Emit a `tracing::warn!` when a single `transact` call batches more
    /// than this many messages, a signal a caller may be looping instead of
    /// batching intentionally.
    pub transaction_size_warn_threshold: usize,
    /// Whether newly registered collabs default to requesting a Lamport
    /// timestamp on every send, absent an explicit per-op override.
    pub lamport_timestamp_by_default: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            transaction_size_warn_threshold: 128,
            lamport_timestamp_by_default: true,
        }
    }
}

impl RuntimeConfig {
    /// Parse from a TOML document, falling back to defaults for any missing
    /// field.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}
