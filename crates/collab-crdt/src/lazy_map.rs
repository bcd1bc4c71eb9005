//! A keyed map whose value at each key is a child collab of a single
//! uniform type, created on first touch (local or remote) rather than on
//! an explicit `add`. Every replica ends up with the same lazy view since
//! creation is driven by the key's canonical serialization, not by who
//! asked first.

use collab_core::wire::NamePath;
use collab_core::{Collab, CollabError, MessageMeta, Result, SaveBytes};
use serde::Serialize;

/// Canonical, deterministic string form of a key, used both as the child's
/// name-path segment and for key equality across replicas.
pub fn key_of<K: Serialize>(key: &K) -> Result<String> {
    serde_json::to_string(key).map_err(|e| CollabError::malformed(e.to_string()))
}

/// A map from serialized key to a lazily-created child of type `C`. A key
/// is "present" iff its child exists and is not [`Collab::can_gc`].
pub struct LazyMap<C: Collab> {
    factory: Box<dyn Fn() -> C>,
    children: std::collections::BTreeMap<String, C>,
}

impl<C: Collab> std::fmt::Debug for LazyMap<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyMap").field("keys", &self.children.keys().collect::<Vec<_>>()).finish()
    }
}

impl<C: Collab> LazyMap<C> {
    pub fn new(factory: impl Fn() -> C + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            children: std::collections::BTreeMap::new(),
        }
    }

    /// Immutable access; does not create the child if it has never been
    /// touched before.
    pub fn get(&self, key: &str) -> Option<&C> {
        self.children.get(key)
    }

    /// Mutable access, creating the child lazily if this is its first
    /// touch on this replica.
    pub fn get_or_create_mut(&mut self, key: &str) -> &mut C {
        self.children.entry(key.to_string()).or_insert_with(|| (self.factory)())
    }

    /// Keys whose child is not garbage-collectable.
    pub fn present_keys(&self) -> Vec<&str> {
        self.children
            .iter()
            .filter(|(_, c)| !c.can_gc())
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

impl<C: Collab + 'static> Collab for LazyMap<C> {
    fn receive(&mut self, name_path: &NamePath, payload: &[u8], meta: &MessageMeta) -> Result<()> {
        let (head, rest) = name_path
            .split_first()
            .ok_or_else(|| CollabError::unknown_child("lazy map requires a key segment"))?;
        self.get_or_create_mut(head).receive(&rest, payload, meta)
    }

    fn save(&self) -> SaveBytes {
        let rows: Vec<(String, Vec<u8>)> = self
            .children
            .iter()
            .map(|(k, c)| (k.clone(), c.save()))
            .collect();
        bincode::serialize(&rows).expect("in-memory CRDT payloads always serialize")
    }

    fn load(&mut self, bytes: &SaveBytes) -> Result<()> {
        self.children.clear();
        if bytes.is_empty() {
            return Ok(());
        }
        let rows: Vec<(String, Vec<u8>)> =
            bincode::deserialize(bytes).map_err(|e| CollabError::malformed(e.to_string()))?;
        for (key, child_bytes) in rows {
            let mut child = (self.factory)();
            child.load(&child_bytes)?;
            self.children.insert(key, child);
        }
        Ok(())
    }

    fn can_gc(&self) -> bool {
        self.children.values().all(|c| c.can_gc())
    }

    fn child(&self, name: &str) -> Option<&dyn Collab> {
        self.children.get(name).map(|c| c as &dyn Collab)
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut dyn Collab> {
        Some(self.get_or_create_mut(name) as &mut dyn Collab)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::LwwRegister;
    use collab_core::ReplicaId;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn replica(seed: u64) -> ReplicaId {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        ReplicaId::generate_from(&mut rng)
    }

    fn meta(sender: ReplicaId) -> MessageMeta {
        MessageMeta {
            sender: Some(sender),
            sender_counter: 1,
            lamport: Some(1),
            wall_clock: None,
            vc_entries: Default::default(),
        }
    }

    #[test]
    fn routing_to_an_unseen_key_creates_its_child_lazily() {
        let mut map = LazyMap::<LwwRegister<i32>>::new(LwwRegister::new);
        assert!(map.get("a").is_none());
        let payload = bincode::serialize(&7i32).unwrap();
        map.receive(&NamePath::from_segments(["a".to_string()]), &payload, &meta(replica(1)))
            .unwrap();
        assert_eq!(*map.get("a").unwrap().value().unwrap(), 7);
    }

    #[test]
    fn present_keys_excludes_empty_registers() {
        let mut map = LazyMap::<LwwRegister<i32>>::new(LwwRegister::new);
        map.get_or_create_mut("untouched-but-empty");
        assert!(map.present_keys().is_empty());
    }
}
