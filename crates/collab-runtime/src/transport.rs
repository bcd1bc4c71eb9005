//! Narrow trait seams for the outer world. The runtime only describes the
//! shape of transport and persistence; it ships no implementation of
//! either — wiring a websocket, a message broker, or a filesystem/database
//! save store is left to the embedding application.

use collab_core::Result;

/// Hands encoded transactions to whatever broadcasts them to other
/// replicas, and delivers inbound bytes back into the runtime.
///
/// The runtime never assumes anything about delivery order, retries, or
/// framing beyond "each `send` call is one opaque blob that some call to
/// [`crate::runtime::Runtime::receive_wire_transaction`] eventually passes
/// back on every other replica, at least once."
pub trait Transport {
    /// Broadcast one encoded transaction to the rest of the session.
    fn send(&mut self, encoded_transaction: &[u8]) -> Result<()>;
}

/// Persists and restores a runtime's framed save bytes. The runtime treats
/// the blob as opaque; only [`crate::runtime::Runtime::save`] and
/// [`crate::runtime::Runtime::load`] know its structure.
pub trait SaveStore {
    /// Persist `bytes` so a future `load` call can restore it.
    fn store(&mut self, bytes: &[u8]) -> Result<()>;

    /// Load the most recently stored bytes, if any.
    fn load(&self) -> Result<Option<Vec<u8>>>;
}
