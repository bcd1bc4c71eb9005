//! A value map (a.k.a. LWW map): a [`LazyMap`] whose value at each key is
//! an [`OptionalRegister`], giving `set`/`delete`/`get` with last-write
//! semantics per key and `Set`/`Delete` events surfaced at the map level.

use crate::lazy_map::{key_of, LazyMap};
use crate::register::{OptionalOp, OptionalRegister};
use collab_core::wire::NamePath;
use collab_core::{impl_collab_any, Collab, EventEmitter, MessageMeta, Result, SaveBytes};
use collab_runtime::{CollabHandle, PrimitiveCollab, Runtime, TxnBuilder};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueMapEvent {
    Set(String),
    Deleted(String),
}

/// Keyed map of last-write-wins values. Wraps [`LazyMap`] of
/// [`OptionalRegister`]; `set`/`delete` are provided as free functions over
/// a [`TxnBuilder`] and a [`CollabHandle`] rather than methods, since a
/// local mutation here is really a mutation of a *child's* register,
/// reached through the ordinary [`CollabHandle::child`] addressing the
/// runtime already provides for nested collabs.
pub struct ValueMap<K, V> {
    inner: LazyMap<OptionalRegister<V>>,
    on_change: EventEmitter<ValueMapEvent>,
    _key: PhantomData<fn() -> K>,
}

impl<K, V> ValueMap<K, V>
where
    V: Clone + Serialize + DeserializeOwned + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: LazyMap::new(OptionalRegister::new),
            on_change: EventEmitter::new(),
            _key: PhantomData,
        }
    }

    pub fn on_change(&mut self, handler: impl FnMut(&ValueMapEvent) + 'static) {
        self.on_change.on(handler);
    }

    pub fn present_keys(&self) -> Vec<&str> {
        self.inner.present_keys()
    }
}

impl<K, V> Default for ValueMap<K, V>
where
    V: Clone + Serialize + DeserializeOwned + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Collab for ValueMap<K, V>
where
    K: 'static,
    V: Clone + Serialize + DeserializeOwned + 'static,
{
    fn receive(&mut self, name_path: &NamePath, payload: &[u8], meta: &MessageMeta) -> Result<()> {
        let key = name_path.split_first().map(|(head, _)| head.to_string());
        let was_present = key
            .as_deref()
            .and_then(|k| self.inner.get(k))
            .is_some_and(|register| register.value().is_some());
        self.inner.receive(name_path, payload, meta)?;
        if let Some(key) = key {
            let is_present = self
                .inner
                .get(&key)
                .is_some_and(|register| register.value().is_some());
            match (was_present, is_present) {
                (false, true) => self.on_change.emit(&ValueMapEvent::Set(key)),
                (true, false) => self.on_change.emit(&ValueMapEvent::Deleted(key)),
                _ => {}
            }
        }
        Ok(())
    }

    fn save(&self) -> SaveBytes {
        self.inner.save()
    }

    fn load(&mut self, bytes: &SaveBytes) -> Result<()> {
        self.inner.load(bytes)
    }

    fn can_gc(&self) -> bool {
        self.inner.can_gc()
    }

    fn child(&self, name: &str) -> Option<&dyn Collab> {
        self.inner.child(name)
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut dyn Collab> {
        self.inner.child_mut(name)
    }

    impl_collab_any!();
}

/// Handle to one key's register within a registered [`ValueMap`], obtained
/// with [`value_handle`].
pub type ValueHandle<V> = CollabHandle<OptionalRegister<V>>;

/// Address the register backing `key` in a registered value map.
pub fn value_handle<K, V>(map: &CollabHandle<ValueMap<K, V>>, key: &K) -> Result<ValueHandle<V>>
where
    K: Serialize,
{
    Ok(map.child(key_of(key)?))
}

/// Set `key` to `value` in one transaction.
pub fn set<K, V>(txn: &mut TxnBuilder, map: &CollabHandle<ValueMap<K, V>>, key: &K, value: V) -> Result<()>
where
    K: Serialize,
    V: Clone + Serialize + DeserializeOwned + 'static,
{
    let handle = value_handle(map, key)?;
    txn.apply(&handle, OptionalOp::Set(value))
}

/// Delete `key` by resetting its underlying register.
pub fn delete<K, V>(txn: &mut TxnBuilder, map: &CollabHandle<ValueMap<K, V>>, key: &K) -> Result<()>
where
    K: Serialize,
    V: Clone + Serialize + DeserializeOwned + 'static,
{
    let handle = value_handle(map, key)?;
    txn.apply(&handle, OptionalOp::Reset)
}

/// Read the current value at `key`, or `None` if absent.
pub fn get<'r, K, V>(runtime: &'r Runtime, map: &CollabHandle<ValueMap<K, V>>, key: &K) -> Option<&'r V>
where
    K: Serialize,
    V: Clone + Serialize + DeserializeOwned + 'static,
{
    let handle = value_handle(map, key).ok()?;
    runtime.get::<OptionalRegister<V>>(&handle).ok()?.value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use collab_core::ReplicaId;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn replica(seed: u64) -> ReplicaId {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        ReplicaId::generate_from(&mut rng)
    }

    #[test]
    fn set_then_get_round_trips_through_a_live_runtime() {
        let mut rt = Runtime::new(replica(1));
        let handle = rt.register("m", ValueMap::<String, i32>::new()).unwrap();
        rt.go_live();
        rt.transact(|txn| set(txn, &handle, &"a".to_string(), 7)).unwrap();
        assert_eq!(*get(&rt, &handle, &"a".to_string()).unwrap(), 7);
    }

    #[test]
    fn delete_then_get_returns_none() {
        let mut rt = Runtime::new(replica(1));
        let handle = rt.register("m", ValueMap::<String, i32>::new()).unwrap();
        rt.go_live();
        rt.transact(|txn| set(txn, &handle, &"a".to_string(), 7)).unwrap();
        rt.transact(|txn| delete(txn, &handle, &"a".to_string())).unwrap();
        assert!(get(&rt, &handle, &"a".to_string()).is_none());
    }

    #[test]
    fn on_change_fires_set_and_deleted_as_a_key_transitions() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut map = ValueMap::<String, i32>::new();
        let events = Rc::new(RefCell::new(Vec::new()));
        let events_handle = events.clone();
        map.on_change(move |event| events_handle.borrow_mut().push(event.clone()));

        let a = replica(1);
        let meta = MessageMeta {
            sender: Some(a),
            sender_counter: 1,
            lamport: Some(1),
            wall_clock: None,
            vc_entries: Default::default(),
        };
        let key = key_of(&"a".to_string()).unwrap();
        let set_payload = bincode::serialize(&OptionalOp::Set(7i32)).unwrap();
        map.receive(&NamePath::from_segments([key.clone()]), &set_payload, &meta).unwrap();

        let reset_payload = bincode::serialize(&OptionalOp::<i32>::Reset).unwrap();
        map.receive(&NamePath::from_segments([key.clone()]), &reset_payload, &meta).unwrap();

        assert_eq!(
            *events.borrow(),
            vec![ValueMapEvent::Set(key.clone()), ValueMapEvent::Deleted(key)]
        );
    }

    #[test]
    fn present_keys_reflects_only_non_deleted_entries() {
        let mut rt = Runtime::new(replica(1));
        let handle = rt.register("m", ValueMap::<String, i32>::new()).unwrap();
        rt.go_live();
        rt.transact(|txn| set(txn, &handle, &"a".to_string(), 1)).unwrap();
        rt.transact(|txn| set(txn, &handle, &"b".to_string(), 2)).unwrap();
        rt.transact(|txn| delete(txn, &handle, &"a".to_string())).unwrap();
        let map = rt.get(&handle).unwrap();
        assert_eq!(map.present_keys(), vec!["\"b\""]);
    }
}
