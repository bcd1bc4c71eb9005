//! The runtime's lifecycle state machine.

/// A collab tree instance moves through these states exactly once, in
/// order. `Fresh` and `Loaded` both allow registering new top-level
/// collabs; `Live` does not, since a newly registered collab would have no
/// chance to receive the messages that arrived before it existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimePhase {
    /// Just constructed, nothing registered yet.
    Fresh,
    /// `load` has restored state from a save; registration is still open so
    /// the caller can re-register the same collabs it saved before going
    /// live.
    Loaded,
    /// Open for business: `transact`, `apply`, and inbound `receive` all
    /// work. Registration is closed.
    Live,
    /// Permanently shut down. No further operations are accepted.
    Closed,
}

impl RuntimePhase {
    /// Whether `register` is still allowed in this phase.
    pub fn accepts_registration(self) -> bool {
        matches!(self, RuntimePhase::Fresh | RuntimePhase::Loaded)
    }

    /// Whether `transact`/`apply`/inbound delivery are allowed in this
    /// phase.
    pub fn is_live(self) -> bool {
        matches!(self, RuntimePhase::Live)
    }
}
