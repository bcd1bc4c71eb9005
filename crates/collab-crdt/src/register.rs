//! LWW, multi-value, and optional registers: the three shapes of
//! single-slot CRDT state, all converging by comparing causal metadata
//! rather than by arbitrary merge callbacks.

use collab_causal::{MetadataRequest, VcRequest};
use collab_core::wire::NamePath;
use collab_core::{impl_collab_any, Collab, CollabError, EventEmitter, MessageMeta, ReplicaId, Result, SaveBytes};
use collab_runtime::PrimitiveCollab;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;

fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("in-memory CRDT payloads always serialize")
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| CollabError::malformed(e.to_string()))
}

/// Fired by [`LwwRegister::on_set`] and [`OptionalRegister::on_set`] whenever
/// a receive strictly advances the stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetEvent<V> {
    pub previous: Option<V>,
    pub current: V,
}

// --- LWW register ------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LwwState<V> {
    value: Option<V>,
    lamport: u64,
    sender: Option<ReplicaId>,
    wall_clock: Option<u64>,
}

/// Single-slot register resolved by `(lamport, sender)`: the strictly
/// greater pair wins, sender breaking lamport ties.
pub struct LwwRegister<V> {
    state: LwwState<V>,
    on_set: EventEmitter<SetEvent<V>>,
}

impl<V> Default for LwwRegister<V> {
    fn default() -> Self {
        Self {
            state: LwwState::default(),
            on_set: EventEmitter::new(),
        }
    }
}

impl<V: Clone> LwwRegister<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> Option<&V> {
        self.state.value.as_ref()
    }

    pub fn is_present(&self) -> bool {
        self.state.value.is_some()
    }

    pub fn on_set(&mut self, handler: impl FnMut(&SetEvent<V>) + 'static) {
        self.on_set.on(handler);
    }
}

impl<V: Clone + Serialize + DeserializeOwned + 'static> Collab for LwwRegister<V> {
    fn receive(&mut self, _name_path: &NamePath, payload: &[u8], meta: &MessageMeta) -> Result<()> {
        let incoming: V = decode(payload)?;
        let incoming_key = (meta.lamport.unwrap_or(0), meta.sender);
        let stored_key = (self.state.lamport, self.state.sender);
        if incoming_key > stored_key {
            let previous = self.state.value.take();
            self.state.value = Some(incoming.clone());
            self.state.lamport = incoming_key.0;
            self.state.sender = meta.sender;
            self.state.wall_clock = meta.wall_clock;
            self.on_set.emit(&SetEvent {
                previous,
                current: incoming,
            });
        }
        Ok(())
    }

    fn save(&self) -> SaveBytes {
        encode(&self.state)
    }

    fn load(&mut self, bytes: &SaveBytes) -> Result<()> {
        self.state = if bytes.is_empty() {
            LwwState::default()
        } else {
            decode(bytes)?
        };
        Ok(())
    }

    fn can_gc(&self) -> bool {
        self.state.value.is_none()
    }

    impl_collab_any!();
}

impl<V: Clone + Serialize + DeserializeOwned + 'static> PrimitiveCollab for LwwRegister<V> {
    type Op = V;

    fn encode_op(&self, op: &V) -> (Vec<u8>, MetadataRequest) {
        (encode(op), MetadataRequest::lww())
    }
}

// --- multi-value register -----------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct MvEntry<V> {
    sender: ReplicaId,
    sender_counter: u64,
    value: V,
}

fn full_vc_request() -> MetadataRequest {
    MetadataRequest {
        vc: VcRequest::All,
        wall_clock_time: false,
        lamport_timestamp: false,
    }
}

/// Keeps every causally-concurrent write rather than picking a single
/// winner; `set(v)` only drops entries the new write's vector clock shows
/// it already knew about.
#[derive(Default)]
pub struct MultiValueRegister<V> {
    entries: Vec<MvEntry<V>>,
}

impl<V: Clone> MultiValueRegister<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// All concurrent entries, in lex order by sender.
    pub fn conflicts(&self) -> Vec<&V> {
        let mut sorted: Vec<&MvEntry<V>> = self.entries.iter().collect();
        sorted.sort_by_key(|e| e.sender);
        sorted.into_iter().map(|e| &e.value).collect()
    }

    /// A deterministic scalar view: the lex-max sender's entry.
    pub fn value(&self) -> Option<&V> {
        self.entries.iter().max_by_key(|e| e.sender).map(|e| &e.value)
    }

    pub fn is_present(&self) -> bool {
        !self.entries.is_empty()
    }
}

fn retain_not_dominated<V>(entries: &mut Vec<MvEntry<V>>, vc_entries: &BTreeMap<ReplicaId, u64>) {
    entries.retain(|e| e.sender_counter > vc_entries.get(&e.sender).copied().unwrap_or(0));
}

impl<V: Clone + Serialize + DeserializeOwned + 'static> Collab for MultiValueRegister<V> {
    fn receive(&mut self, _name_path: &NamePath, payload: &[u8], meta: &MessageMeta) -> Result<()> {
        let incoming: V = decode(payload)?;
        retain_not_dominated(&mut self.entries, &meta.vc_entries);
        let sender = meta
            .sender
            .ok_or_else(|| CollabError::malformed("multi-value register message missing sender"))?;
        self.entries.push(MvEntry {
            sender,
            sender_counter: meta.sender_counter,
            value: incoming,
        });
        Ok(())
    }

    fn save(&self) -> SaveBytes {
        encode(&self.entries)
    }

    fn load(&mut self, bytes: &SaveBytes) -> Result<()> {
        self.entries = if bytes.is_empty() { Vec::new() } else { decode(bytes)? };
        Ok(())
    }

    fn can_gc(&self) -> bool {
        self.entries.is_empty()
    }

    impl_collab_any!();
}

impl<V: Clone + Serialize + DeserializeOwned + 'static> PrimitiveCollab for MultiValueRegister<V> {
    type Op = V;

    fn encode_op(&self, op: &V) -> (Vec<u8>, MetadataRequest) {
        (encode(op), full_vc_request())
    }
}

// --- optional register ---------------------------------------------------

/// The local operation vocabulary for [`OptionalRegister`].
#[derive(Debug, Clone)]
pub enum OptionalOp<V> {
    Set(V),
    Reset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum WireOptionalOp<V> {
    Set(V),
    Reset,
}

/// Like [`MultiValueRegister`], plus `reset()`: a clear message that drops
/// every entry the reset causally knew about, leaving only concurrent
/// writes the reset raced with.
#[derive(Default)]
pub struct OptionalRegister<V> {
    entries: Vec<MvEntry<V>>,
}

impl<V: Clone> OptionalRegister<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conflicts(&self) -> Vec<&V> {
        let mut sorted: Vec<&MvEntry<V>> = self.entries.iter().collect();
        sorted.sort_by_key(|e| e.sender);
        sorted.into_iter().map(|e| &e.value).collect()
    }

    pub fn value(&self) -> Option<&V> {
        self.entries.iter().max_by_key(|e| e.sender).map(|e| &e.value)
    }

    pub fn is_present(&self) -> bool {
        !self.entries.is_empty()
    }
}

impl<V: Clone + Serialize + DeserializeOwned + 'static> Collab for OptionalRegister<V> {
    fn receive(&mut self, _name_path: &NamePath, payload: &[u8], meta: &MessageMeta) -> Result<()> {
        let op: WireOptionalOp<V> = decode(payload)?;
        retain_not_dominated(&mut self.entries, &meta.vc_entries);
        match op {
            WireOptionalOp::Set(value) => {
                let sender = meta
                    .sender
                    .ok_or_else(|| CollabError::malformed("optional register message missing sender"))?;
                self.entries.push(MvEntry {
                    sender,
                    sender_counter: meta.sender_counter,
                    value,
                });
            }
            WireOptionalOp::Reset => {}
        }
        Ok(())
    }

    fn save(&self) -> SaveBytes {
        encode(&self.entries)
    }

    fn load(&mut self, bytes: &SaveBytes) -> Result<()> {
        self.entries = if bytes.is_empty() { Vec::new() } else { decode(bytes)? };
        Ok(())
    }

    fn can_gc(&self) -> bool {
        self.entries.is_empty()
    }

    impl_collab_any!();
}

impl<V: Clone + Serialize + DeserializeOwned + 'static> PrimitiveCollab for OptionalRegister<V> {
    type Op = OptionalOp<V>;

    fn encode_op(&self, op: &OptionalOp<V>) -> (Vec<u8>, MetadataRequest) {
        let wire = match op {
            OptionalOp::Set(v) => WireOptionalOp::Set(v.clone()),
            OptionalOp::Reset => WireOptionalOp::Reset,
        };
        (encode(&wire), full_vc_request())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn replica(seed: u64) -> ReplicaId {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        ReplicaId::generate_from(&mut rng)
    }

    fn meta(sender: ReplicaId, counter: u64, lamport: u64) -> MessageMeta {
        MessageMeta {
            sender: Some(sender),
            sender_counter: counter,
            lamport: Some(lamport),
            wall_clock: None,
            vc_entries: BTreeMap::new(),
        }
    }

    #[test]
    fn lww_register_keeps_the_higher_lamport() {
        let mut reg = LwwRegister::<String>::new();
        let a = replica(1);
        let b = replica(2);
        reg.receive(&NamePath::root(), &encode(&"first".to_string()), &meta(a, 1, 5))
            .unwrap();
        reg.receive(&NamePath::root(), &encode(&"stale".to_string()), &meta(b, 1, 3))
            .unwrap();
        assert_eq!(reg.value().unwrap(), "first");
        reg.receive(&NamePath::root(), &encode(&"second".to_string()), &meta(b, 2, 9))
            .unwrap();
        assert_eq!(reg.value().unwrap(), "second");
    }

    #[test]
    fn lww_register_breaks_lamport_ties_by_sender() {
        let mut reg = LwwRegister::<i32>::new();
        let low = replica(1);
        let high = replica(2);
        let (low, high) = if low < high { (low, high) } else { (high, low) };
        reg.receive(&NamePath::root(), &encode(&1), &meta(high, 1, 5)).unwrap();
        reg.receive(&NamePath::root(), &encode(&2), &meta(low, 1, 5)).unwrap();
        assert_eq!(*reg.value().unwrap(), 1, "equal lamport loses to the lower sender");
    }

    #[test]
    fn multi_value_register_keeps_concurrent_writes_and_drops_known_ones() {
        let mut reg = MultiValueRegister::<i32>::new();
        let a = replica(1);
        let b = replica(2);
        reg.receive(&NamePath::root(), &encode(&1), &meta(a, 1, 0)).unwrap();
        reg.receive(&NamePath::root(), &encode(&2), &meta(b, 1, 0)).unwrap();
        assert_eq!(reg.conflicts().len(), 2);

        let mut vc = BTreeMap::new();
        vc.insert(a, 1);
        vc.insert(b, 1);
        let m = MessageMeta {
            sender: Some(a),
            sender_counter: 2,
            lamport: None,
            wall_clock: None,
            vc_entries: vc,
        };
        reg.receive(&NamePath::root(), &encode(&3), &m).unwrap();
        assert_eq!(reg.conflicts().len(), 1);
        assert_eq!(*reg.value().unwrap(), 3);
    }

    #[test]
    fn optional_register_reset_clears_known_entries() {
        let mut reg = OptionalRegister::<i32>::new();
        let a = replica(1);
        reg.receive(
            &NamePath::root(),
            &encode(&WireOptionalOp::Set(7)),
            &meta(a, 1, 0),
        )
        .unwrap();
        assert!(reg.is_present());

        let mut vc = BTreeMap::new();
        vc.insert(a, 1);
        let reset_meta = MessageMeta {
            sender: Some(replica(2)),
            sender_counter: 1,
            lamport: None,
            wall_clock: None,
            vc_entries: vc,
        };
        reg.receive(&NamePath::root(), &encode(&WireOptionalOp::<i32>::Reset), &reset_meta)
            .unwrap();
        assert!(!reg.is_present());
    }
}
