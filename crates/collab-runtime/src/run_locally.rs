//! The "run locally" layer: deliver messages straight into the local tree
//! under externally supplied metadata, bypassing causal stamping and the
//! outbound queue entirely.
//!
//! Used when a composite already holds a fully-formed [`MessageMeta`] for a
//! message — most often while replaying a message to a child it just
//! materialized during its own `receive` — and needs that exact metadata
//! preserved rather than re-stamped as a new local transaction. Nesting is
//! forbidden: a run-locally delivery must never itself trigger another one.

use crate::runtime::Runtime;
use collab_core::wire::NamePath;
use collab_core::{CollabError, MessageMeta, Result};

/// A scope that routes sends directly into the tree instead of onto the
/// wire. Obtained only through [`crate::runtime::Runtime::run_locally`].
pub struct RunLocallyCtx<'a> {
    pub(crate) runtime: &'a mut Runtime,
    pub(crate) meta: MessageMeta,
}

impl<'a> RunLocallyCtx<'a> {
    /// Deliver `payload` to the collab at `name_path` using this scope's
    /// metadata, routed the same way inbound wire messages are.
    pub fn deliver(&mut self, name_path: &NamePath, payload: &[u8]) -> Result<()> {
        let meta = self.meta.clone();
        self.runtime.deliver_message(name_path, payload, &meta)
    }
}

/// Guards against nested `run_locally` scopes. Held by
/// [`crate::runtime::Runtime`]; `false` when no scope is open.
#[derive(Debug, Default)]
pub(crate) struct RunLocallyGuard {
    active: bool,
}

impl RunLocallyGuard {
    pub(crate) fn enter(&mut self) -> Result<()> {
        if self.active {
            return Err(CollabError::invalid_state("run_locally scopes cannot nest"));
        }
        self.active = true;
        Ok(())
    }

    pub(crate) fn exit(&mut self) {
        debug_assert!(self.active, "exit called without a matching enter");
        self.active = false;
    }
}
