//! A set of dynamically constructed child collabs: every `add` grows a
//! fresh subtree, `delete` permanently removes one and any operation still
//! addressed to it is discarded as an unknown child.

use collab_causal::MetadataRequest;
use collab_core::wire::NamePath;
use collab_core::{Collab, CollabError, EventEmitter, MessageMeta, ReplicaId, Result, SaveBytes};
use collab_runtime::PrimitiveCollab;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fmt;

fn child_name(sender: ReplicaId, counter: u64) -> String {
    format!("{sender}-{counter}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynamicSetEvent {
    Added(String),
    Removed(String),
}

/// The local operation vocabulary for [`DynamicSet`]: `Add` allocates a new
/// child built from `Args` by the set's factory, `Delete` removes one by
/// the name it was allocated under.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub enum DynamicSetOp<Args> {
    Add(Args),
    Delete(String),
}

/// A set of child collabs, each created on `add` by a user-supplied
/// factory and addressed at a name derived from the adding transaction's
/// `(sender, senderCounter)` — unique by construction, so two concurrent
/// adds never collide on a name.
pub struct DynamicSet<Args, C: Collab> {
    factory: Box<dyn Fn(&Args) -> C>,
    children: BTreeMap<String, C>,
    args_by_name: BTreeMap<String, Args>,
    order: Vec<String>,
    on_change: EventEmitter<DynamicSetEvent>,
}

impl<Args, C: Collab> fmt::Debug for DynamicSet<Args, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicSet").field("names", &self.order).finish()
    }
}

impl<Args, C: Collab> DynamicSet<Args, C> {
    pub fn new(factory: impl Fn(&Args) -> C + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            children: BTreeMap::new(),
            args_by_name: BTreeMap::new(),
            order: Vec::new(),
            on_change: EventEmitter::new(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&C> {
        self.children.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut C> {
        self.children.get_mut(name)
    }

    pub fn on_change(&mut self, handler: impl FnMut(&DynamicSetEvent) + 'static) {
        self.on_change.on(handler);
    }
}

impl<Args, C> Collab for DynamicSet<Args, C>
where
    Args: Clone + Serialize + DeserializeOwned + 'static,
    C: Collab + 'static,
{
    fn receive(&mut self, name_path: &NamePath, payload: &[u8], meta: &MessageMeta) -> Result<()> {
        if let Some((head, rest)) = name_path.split_first() {
            return match self.children.get_mut(head) {
                Some(child) => child.receive(&rest, payload, meta),
                None => {
                    tracing::debug!(
                        child = %head,
                        "discarding operation for a child that no longer exists"
                    );
                    Ok(())
                }
            };
        }

        let op: DynamicSetOp<Args> =
            bincode::deserialize(payload).map_err(|e| CollabError::malformed(e.to_string()))?;
        match op {
            DynamicSetOp::Add(args) => {
                let sender = meta
                    .sender
                    .ok_or_else(|| CollabError::malformed("dynamic set add missing sender"))?;
                let name = child_name(sender, meta.sender_counter);
                if !self.children.contains_key(&name) {
                    let child = (self.factory)(&args);
                    self.children.insert(name.clone(), child);
                    self.args_by_name.insert(name.clone(), args);
                    self.order.push(name.clone());
                    self.on_change.emit(&DynamicSetEvent::Added(name));
                }
            }
            DynamicSetOp::Delete(name) => {
                if self.children.remove(&name).is_some() {
                    self.args_by_name.remove(&name);
                    self.order.retain(|n| n != &name);
                    self.on_change.emit(&DynamicSetEvent::Removed(name));
                }
            }
        }
        Ok(())
    }

    fn save(&self) -> SaveBytes {
        let rows: Vec<(String, Args, Vec<u8>)> = self
            .order
            .iter()
            .map(|name| {
                let args = self.args_by_name.get(name).expect("every child has its creation args").clone();
                let bytes = self.children.get(name).expect("order tracks children").save();
                (name.clone(), args, bytes)
            })
            .collect();
        bincode::serialize(&rows).expect("in-memory CRDT payloads always serialize")
    }

    fn load(&mut self, bytes: &SaveBytes) -> Result<()> {
        self.children.clear();
        self.args_by_name.clear();
        self.order.clear();
        if bytes.is_empty() {
            return Ok(());
        }
        let rows: Vec<(String, Args, Vec<u8>)> =
            bincode::deserialize(bytes).map_err(|e| CollabError::malformed(e.to_string()))?;
        for (name, args, child_bytes) in rows {
            let mut child = (self.factory)(&args);
            child.load(&child_bytes)?;
            self.children.insert(name.clone(), child);
            self.args_by_name.insert(name.clone(), args);
            self.order.push(name);
        }
        Ok(())
    }

    fn can_gc(&self) -> bool {
        self.children.is_empty()
    }

    fn child(&self, name: &str) -> Option<&dyn Collab> {
        self.children.get(name).map(|c| c as &dyn Collab)
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut dyn Collab> {
        self.children.get_mut(name).map(|c| c as &mut dyn Collab)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl<Args, C> PrimitiveCollab for DynamicSet<Args, C>
where
    Args: Clone + Serialize + DeserializeOwned + 'static,
    C: Collab + 'static,
{
    type Op = DynamicSetOp<Args>;

    fn encode_op(&self, op: &DynamicSetOp<Args>) -> (Vec<u8>, MetadataRequest) {
        (
            bincode::serialize(op).expect("in-memory CRDT payloads always serialize"),
            MetadataRequest::none(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::LwwRegister;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn replica(seed: u64) -> ReplicaId {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        ReplicaId::generate_from(&mut rng)
    }

    fn meta(sender: ReplicaId, counter: u64) -> MessageMeta {
        MessageMeta {
            sender: Some(sender),
            sender_counter: counter,
            lamport: None,
            wall_clock: None,
            vc_entries: Default::default(),
        }
    }

    fn payload(op: &DynamicSetOp<()>) -> Vec<u8> {
        bincode::serialize(op).unwrap()
    }

    #[test]
    fn add_allocates_one_child_per_sender_counter_pair() {
        let mut set = DynamicSet::<(), LwwRegister<i32>>::new(|_| LwwRegister::new());
        let a = replica(1);
        set.receive(&NamePath::root(), &payload(&DynamicSetOp::Add(())), &meta(a, 1))
            .unwrap();
        set.receive(&NamePath::root(), &payload(&DynamicSetOp::Add(())), &meta(a, 2))
            .unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn delete_removes_the_child_and_future_routes_to_it_are_discarded() {
        let mut set = DynamicSet::<(), LwwRegister<i32>>::new(|_| LwwRegister::new());
        let a = replica(1);
        set.receive(&NamePath::root(), &payload(&DynamicSetOp::Add(())), &meta(a, 1))
            .unwrap();
        let name = set.names()[0].clone();
        set.receive(
            &NamePath::root(),
            &payload(&DynamicSetOp::Delete(name.clone())),
            &meta(a, 2),
        )
        .unwrap();
        assert!(set.is_empty());
        let routed = set.receive(
            &NamePath::from_segments([name]),
            &bincode::serialize(&7i32).unwrap(),
            &meta(a, 3),
        );
        assert!(routed.is_ok(), "a concurrent op racing a delete is swallowed, not fatal");
    }
}
