//! The primitive-collab base: send/receive plumbing shared by every
//! leaf CRDT type (registers, counters, sets of values).

use collab_causal::MetadataRequest;
use collab_core::Collab;

/// A collab whose every local mutation reduces to exactly one outbound
/// message. `encode_op` must be pure: it reads `self` and `op` and returns
/// the bytes to broadcast plus the metadata the receiving side will need,
/// but must not mutate `self` — the only state change a primitive ever
/// makes is inside [`collab_core::Collab::receive`], so that local and
/// remote delivery run the identical update logic (local echo
/// equivalence).
pub trait PrimitiveCollab: Collab {
    /// The local operation vocabulary (e.g. `Set(V)`, `Add(i64)`).
    type Op;

    /// Turn a local operation into the payload `receive` will later decode,
    /// plus the metadata this primitive needs stamped onto the message (for
    /// example an LWW register requests a Lamport timestamp).
    fn encode_op(&self, op: &Self::Op) -> (Vec<u8>, MetadataRequest);
}
