//! Grow-only-per-sender counter: every replica's own running sum only ever
//! accumulates, so summing across replicas converges regardless of
//! delivery order.

use collab_causal::MetadataRequest;
use collab_core::wire::NamePath;
use collab_core::{impl_collab_any, Collab, CollabError, MessageMeta, ReplicaId, Result, SaveBytes};
use collab_runtime::PrimitiveCollab;
use std::collections::BTreeMap;

/// A counter whose value is the sum of every replica's own running total.
/// `add` accepts negative deltas (a replica's own total can still go to
/// zero), but no replica's partial sum is ever rewritten, only added to.
#[derive(Debug, Clone, Default)]
pub struct GCounter {
    by_sender: BTreeMap<ReplicaId, i64>,
}

impl GCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> i64 {
        self.by_sender.values().sum()
    }
}

impl Collab for GCounter {
    fn receive(&mut self, _name_path: &NamePath, payload: &[u8], meta: &MessageMeta) -> Result<()> {
        if payload.len() != 8 {
            return Err(CollabError::malformed("counter delta must be an 8-byte i64"));
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(payload);
        let delta = i64::from_be_bytes(bytes);
        let sender = meta
            .sender
            .ok_or_else(|| CollabError::malformed("counter message missing sender"))?;
        *self.by_sender.entry(sender).or_insert(0) += delta;
        Ok(())
    }

    fn save(&self) -> SaveBytes {
        bincode::serialize(&self.by_sender).expect("in-memory CRDT payloads always serialize")
    }

    fn load(&mut self, bytes: &SaveBytes) -> Result<()> {
        self.by_sender = if bytes.is_empty() {
            BTreeMap::new()
        } else {
            bincode::deserialize(bytes).map_err(|e| CollabError::malformed(e.to_string()))?
        };
        Ok(())
    }

    fn can_gc(&self) -> bool {
        self.by_sender.values().all(|v| *v == 0)
    }

    impl_collab_any!();
}

impl PrimitiveCollab for GCounter {
    type Op = i64;

    fn encode_op(&self, op: &i64) -> (Vec<u8>, MetadataRequest) {
        (op.to_be_bytes().to_vec(), MetadataRequest::none())
    }
}
