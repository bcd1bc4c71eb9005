//! Replica identity and per-replica monotonic counters.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of bytes in a [`ReplicaId`].
pub const REPLICA_ID_LEN: usize = 11;

/// Alphabet the replica id is drawn from: printable ASCII, 64 symbols so a
/// uniform byte can be folded into an index with `& 0x3f` without bias.
const ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// An 11-byte printable-ASCII replica identifier drawn from a cryptographic
/// RNG. Globally unique within a session with overwhelming probability
/// (64^11 ≈ 2^66 possible values).
///
/// Ordering is lexicographic byte comparison, which is the arbitration
/// order used to break ties between concurrent writes: lexicographic by
/// sender.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaId([u8; REPLICA_ID_LEN]);

impl ReplicaId {
    /// Generate a fresh id from the OS cryptographic RNG.
    pub fn generate() -> Self {
        Self::generate_from(&mut rand::rngs::OsRng)
    }

    /// Generate a fresh id from a caller-supplied RNG (used by tests to get
    /// deterministic replica ids from a seeded `rand_chacha::ChaCha8Rng`).
    pub fn generate_from<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; REPLICA_ID_LEN];
        for b in bytes.iter_mut() {
            let idx = (rng.next_u32() as usize) & 0x3f;
            *b = ALPHABET[idx];
        }
        Self(bytes)
    }

    /// Construct from raw bytes, e.g. when decoding the wire format's
    /// replica-id dictionary. Does not validate the alphabet — callers that
    /// need strict validation should use [`ReplicaId::from_printable_ascii`].
    pub fn from_bytes(bytes: [u8; REPLICA_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Construct from a string slice, validating it is exactly
    /// [`REPLICA_ID_LEN`] printable ASCII bytes.
    pub fn from_printable_ascii(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != REPLICA_ID_LEN || !bytes.iter().all(|b| b.is_ascii_graphic()) {
            return None;
        }
        let mut arr = [0u8; REPLICA_ID_LEN];
        arr.copy_from_slice(bytes);
        Some(Self(arr))
    }

    /// Raw bytes, e.g. for the wire format's replica-id dictionary.
    pub fn as_bytes(&self) -> &[u8; REPLICA_ID_LEN] {
        &self.0
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReplicaId({})", self)
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Safe: every byte comes from `ALPHABET`, which is ASCII.
        write!(f, "{}", std::str::from_utf8(&self.0).unwrap_or("?"))
    }
}

/// Allocates monotonically increasing, per-replica-unique counters.
///
/// One instance backs a replica's outgoing `senderCounter` sequence; the
/// runtime increments it once per transaction, never once per message
///.
#[derive(Debug, Default)]
pub struct CounterAllocator {
    next: u64,
}

impl CounterAllocator {
    /// A fresh allocator starting at counter 1 (0 is reserved to mean "no
    /// messages sent yet" in the causal metadata service's dependency
    /// checks).
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Allocate and return the next counter value.
    pub fn next(&mut self) -> u64 {
        self.next += 1;
        self.next
    }

    /// The most recently allocated counter, or 0 if none has been allocated.
    pub fn current(&self) -> u64 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    #[test]
    fn generated_ids_are_printable_ascii_and_right_length() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let id = ReplicaId::generate_from(&mut rng);
        assert_eq!(id.as_bytes().len(), REPLICA_ID_LEN);
        assert!(id.as_bytes().iter().all(|b| b.is_ascii_graphic()));
    }

    #[test]
    fn distinct_seeds_yield_distinct_ids_with_overwhelming_probability() {
        let mut rng_a = ChaCha8Rng::seed_from_u64(1);
        let mut rng_b = ChaCha8Rng::seed_from_u64(2);
        let a = ReplicaId::generate_from(&mut rng_a);
        let b = ReplicaId::generate_from(&mut rng_b);
        assert_ne!(a, b);
    }

    #[test]
    fn ordering_is_lexicographic_byte_comparison() {
        let a = ReplicaId::from_printable_ascii("AAAAAAAAAAA").unwrap();
        let b = ReplicaId::from_printable_ascii("BBBBBBBBBBB").unwrap();
        assert!(a < b);
    }

    #[test]
    fn counter_allocator_is_monotonic_and_starts_above_zero() {
        let mut alloc = CounterAllocator::new();
        assert_eq!(alloc.current(), 0);
        assert_eq!(alloc.next(), 1);
        assert_eq!(alloc.next(), 2);
        assert_eq!(alloc.current(), 2);
    }
}
