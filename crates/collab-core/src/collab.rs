//! The polymorphic collab abstraction.
//!
//! Primitives and composites alike implement [`Collab`], and the runtime
//! holds `Box<dyn Collab>` per registered subtree. Built-in primitives
//! (registers, counters, sets, maps, lists) are concrete types that also
//! implement this trait — there is no separate closed tagged-variant enum,
//! since trait objects already give the runtime a single uniform handle
//! while still letting user code implement `Collab` for its own primitives.

use crate::error::Result;
use crate::wire::NamePath;
use std::any::Any;

/// Raw bytes a collab's `save` produced or `load` consumes. Opaque to the
/// runtime, which only frames it inside the tree-walk save envelope.
pub type SaveBytes = Vec<u8>;

/// Causal metadata delivered alongside a received payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageMeta {
    /// The replica that originated the transaction this message belongs to.
    pub sender: Option<crate::replica::ReplicaId>,
    /// That replica's senderCounter for the transaction.
    pub sender_counter: u64,
    /// Lamport timestamp, present iff the emitting primitive requested it.
    pub lamport: Option<u64>,
    /// Wall-clock milliseconds since epoch, present iff requested.
    pub wall_clock: Option<u64>,
    /// Vector-clock entries the emitting primitive requested, keyed by
    /// replica id. Reading an entry not present here after requesting only
    /// a subset is a [`crate::error::CollabError::RequestUnavailable`].
    pub vc_entries: std::collections::BTreeMap<crate::replica::ReplicaId, u64>,
}

/// Cross-cutting operations every collab in the tree supports, whether a
/// built-in primitive or a user-defined one.
///
/// `Collab: Any` so the runtime can hold a heterogeneous registry of
/// `Box<dyn Collab>` and still recover a concrete type through
/// [`Collab::as_any_mut`] when a caller holds a typed handle.
pub trait Collab: Any {
    /// Deliver one payload, already in causal order, addressed to this
    /// collab by `name_path` (empty once the runtime has routed down to a
    /// leaf; non-empty when delivered to a composite that must route
    /// further down to a child).
    fn receive(&mut self, name_path: &NamePath, payload: &[u8], meta: &MessageMeta) -> Result<()>;

    /// Produce this collab's own save bytes (not including framed children
    /// — the runtime's tree walk handles that).
    fn save(&self) -> SaveBytes;

    /// Restore this collab's own state from bytes produced by `save`.
    /// Older saves with missing fields must load with defaults.
    fn load(&mut self, bytes: &SaveBytes) -> Result<()>;

    /// True iff this collab's state is indistinguishable from its initial
    /// state on every replica that has received the same messages, and so
    /// may be garbage-collected.
    fn can_gc(&self) -> bool;

    /// Look up an immediate child by its single name-path segment. Only
    /// composites (maps, sets) override this; primitives have no children.
    fn child(&self, _name: &str) -> Option<&dyn Collab> {
        None
    }

    /// As [`Collab::child`], mutably.
    fn child_mut(&mut self, _name: &str) -> Option<&mut dyn Collab> {
        None
    }

    /// Erase to `&dyn Any` so the runtime can downcast a registered
    /// `Box<dyn Collab>` back to its concrete type.
    fn as_any(&self) -> &dyn Any;

    /// As [`Collab::as_any`], mutably.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Implements [`Collab::as_any`] and [`Collab::as_any_mut`] for the
/// enclosing type. Invoke inside an `impl Collab for ...` block; every
/// concrete collab needs this one-line boilerplate since a default method
/// body can't downcast without already knowing `Self` is sized.
#[macro_export]
macro_rules! impl_collab_any {
    () => {
        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
            self
        }
    };
}
