//! Add-wins set of serializable primitive values: concurrent add/delete of
//! the same value resolves in favor of the add.

use collab_causal::MetadataRequest;
use collab_core::wire::NamePath;
use collab_core::{impl_collab_any, Collab, CollabError, EventEmitter, MessageMeta, ReplicaId, Result, SaveBytes};
use collab_runtime::PrimitiveCollab;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The local operation vocabulary for [`AddWinsSet`].
#[derive(Debug, Clone)]
pub enum SetOp<V> {
    Add(V),
    Delete(V),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum WireOp<V> {
    Add(V),
    Remove(V, Vec<(ReplicaId, u64)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetEvent<V> {
    Added(V),
    Removed(V),
}

/// One add-mark per concurrent `add` a value has accumulated; present iff
/// at least one mark survives every `delete` that has raced it.
pub struct AddWinsSet<V: Ord> {
    marks: BTreeMap<V, BTreeSet<(ReplicaId, u64)>>,
    on_change: EventEmitter<SetEvent<V>>,
}

impl<V: Ord> Default for AddWinsSet<V> {
    fn default() -> Self {
        Self {
            marks: BTreeMap::new(),
            on_change: EventEmitter::new(),
        }
    }
}

impl<V: Ord + Clone> AddWinsSet<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, value: &V) -> bool {
        self.marks.contains_key(value)
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &V> {
        self.marks.keys()
    }

    pub fn on_change(&mut self, handler: impl FnMut(&SetEvent<V>) + 'static) {
        self.on_change.on(handler);
    }
}

impl<V> Collab for AddWinsSet<V>
where
    V: Ord + Clone + Serialize + DeserializeOwned + 'static,
{
    fn receive(&mut self, _name_path: &NamePath, payload: &[u8], meta: &MessageMeta) -> Result<()> {
        let op: WireOp<V> = bincode::deserialize(payload).map_err(|e| CollabError::malformed(e.to_string()))?;
        match op {
            WireOp::Add(value) => {
                let sender = meta
                    .sender
                    .ok_or_else(|| CollabError::malformed("add-wins set message missing sender"))?;
                let was_present = self.marks.contains_key(&value);
                self.marks
                    .entry(value.clone())
                    .or_default()
                    .insert((sender, meta.sender_counter));
                if !was_present {
                    self.on_change.emit(&SetEvent::Added(value));
                }
            }
            WireOp::Remove(value, marks_to_remove) => {
                if let Some(marks) = self.marks.get_mut(&value) {
                    for mark in &marks_to_remove {
                        marks.remove(mark);
                    }
                    if marks.is_empty() {
                        self.marks.remove(&value);
                        self.on_change.emit(&SetEvent::Removed(value));
                    }
                }
            }
        }
        Ok(())
    }

    fn save(&self) -> SaveBytes {
        bincode::serialize(&self.marks).expect("in-memory CRDT payloads always serialize")
    }

    fn load(&mut self, bytes: &SaveBytes) -> Result<()> {
        self.marks = if bytes.is_empty() {
            BTreeMap::new()
        } else {
            bincode::deserialize(bytes).map_err(|e| CollabError::malformed(e.to_string()))?
        };
        Ok(())
    }

    fn can_gc(&self) -> bool {
        self.marks.is_empty()
    }

    impl_collab_any!();
}

impl<V> PrimitiveCollab for AddWinsSet<V>
where
    V: Ord + Clone + Serialize + DeserializeOwned + 'static,
{
    type Op = SetOp<V>;

    fn encode_op(&self, op: &SetOp<V>) -> (Vec<u8>, MetadataRequest) {
        let wire = match op {
            SetOp::Add(v) => WireOp::Add(v.clone()),
            SetOp::Delete(v) => {
                let marks = self
                    .marks
                    .get(v)
                    .map(|m| m.iter().copied().collect())
                    .unwrap_or_default();
                WireOp::Remove(v.clone(), marks)
            }
        };
        (
            bincode::serialize(&wire).expect("in-memory CRDT payloads always serialize"),
            MetadataRequest::none(),
        )
    }
}
