//! # collab
//!
//! Umbrella crate for the collab tree runtime: a local-first collaborative
//! document model built from causally-ordered CRDT primitives. An
//! application depends on this crate alone and reaches everything through
//! [`prelude`], or depends on an individual `collab-*` crate directly when
//! it only needs one layer — the wire codec, the causal metadata service,
//! or the waypoint position engine on their own.

#![forbid(unsafe_code)]

pub use collab_core::{Collab, CollabError, EventEmitter, MessageMeta, NamePath, ReplicaId, Result, SaveBytes};

pub use collab_causal::{CausalConfig, LamportClock, MetadataRequest, VcRequest, VectorClock};

pub use collab_runtime::{
    CollabHandle, PrimitiveCollab, RunLocallyCtx, Runtime, RuntimeConfig, RuntimePhase, SaveStore, Transport,
    TxnBuilder,
};

pub use collab_position::{AllocOutcome, Position, PositionList, Side, WaypointId, WaypointTree};

pub use collab_crdt::{
    AddWinsSet, AddWinsSetEvent, Cursor, CursorBinding, DynamicSet, DynamicSetEvent, DynamicSetOp, GCounter,
    LazyMap, ListOp, LwwRegister, MultiValueRegister, OptionalOp, OptionalRegister, SetEvent, SetOp, ValueHandle,
    ValueList, ValueMap, ValueMapEvent,
};

/// Common imports for an application embedding a collab document. A typical
/// call site needs `use collab::prelude::*;` plus whichever CRDT primitive
/// types it registers.
pub mod prelude {
    pub use crate::{
        Collab, CollabError, CollabHandle, MessageMeta, PrimitiveCollab, ReplicaId, Result, Runtime, TxnBuilder,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use crate::LwwRegister;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn replica(seed: u64) -> ReplicaId {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        ReplicaId::generate_from(&mut rng)
    }

    #[test]
    fn a_runtime_round_trips_a_register_through_save_and_load() {
        let mut rt = Runtime::new(replica(1));
        let handle = rt.register("title", LwwRegister::<String>::new()).unwrap();
        rt.go_live();
        rt.transact(|txn| txn.apply(&handle, "hello".to_string())).unwrap();
        assert_eq!(rt.get(&handle).unwrap().value().unwrap().as_str(), "hello");

        let saved = rt.save();
        let mut restored = Runtime::new(replica(1));
        let restored_handle = restored.register("title", LwwRegister::<String>::new()).unwrap();
        restored.load(&saved).unwrap();
        assert_eq!(restored.get(&restored_handle).unwrap().value().unwrap().as_str(), "hello");
    }
}
