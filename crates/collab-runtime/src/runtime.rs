//! The collab tree runtime itself: registration, message routing,
//! transaction commit, and save/load.

use crate::config::RuntimeConfig;
use crate::handle::CollabHandle;
use crate::phase::RuntimePhase;
use crate::primitive::PrimitiveCollab;
use crate::run_locally::{RunLocallyCtx, RunLocallyGuard};
use crate::transaction::TxnBuilder;
use collab_causal::{CausalMetadataService, MetadataRequest};
use collab_core::wire::{decode_framed_save, encode_framed_save, NamePath, WireMessage, WireTransaction};
use collab_core::{Collab, CollabError, MessageMeta, ReplicaId, Result, SaveBytes};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Owns the registered top-level collabs, the causal metadata service that
/// stamps and orders their transactions, and the queue of encoded
/// transactions awaiting a transport to pick them up.
pub struct Runtime {
    phase: RuntimePhase,
    causal: CausalMetadataService,
    top_level: HashMap<String, Box<dyn Collab>>,
    registration_order: Vec<String>,
    outbound: VecDeque<Vec<u8>>,
    run_locally: RunLocallyGuard,
    config: RuntimeConfig,
}

impl Runtime {
    /// A fresh runtime for `own_replica`, in the `Fresh` phase.
    pub fn new(own_replica: ReplicaId) -> Self {
        Self::with_config(own_replica, RuntimeConfig::default())
    }

    /// As [`Runtime::new`] but with explicit configuration.
    pub fn with_config(own_replica: ReplicaId, config: RuntimeConfig) -> Self {
        Self {
            phase: RuntimePhase::Fresh,
            causal: CausalMetadataService::new(own_replica),
            top_level: HashMap::new(),
            registration_order: Vec::new(),
            outbound: VecDeque::new(),
            run_locally: RunLocallyGuard::default(),
            config,
        }
    }

    /// This runtime's replica id.
    pub fn own_replica(&self) -> ReplicaId {
        self.causal.own_replica()
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> RuntimePhase {
        self.phase
    }

    /// Transactions buffered awaiting causal dependencies.
    pub fn pending_message_count(&self) -> usize {
        self.causal.pending_count()
    }

    /// Register a new top-level collab under `name`. Only permitted while
    /// the runtime is `Fresh` or `Loaded`; a collab registered after the
    /// runtime goes `Live` would have missed whatever already arrived.
    pub fn register<C>(&mut self, name: impl Into<String>, collab: C) -> Result<CollabHandle<C>>
    where
        C: Collab + 'static,
    {
        if !self.phase.accepts_registration() {
            return Err(CollabError::invalid_state(format!(
                "cannot register a collab while runtime is in phase {:?}",
                self.phase
            )));
        }
        let name = name.into();
        if self.top_level.contains_key(&name) {
            return Err(CollabError::invalid_state(format!(
                "a collab is already registered under {name:?}"
            )));
        }
        self.registration_order.push(name.clone());
        self.top_level.insert(name.clone(), Box::new(collab));
        Ok(CollabHandle::new(NamePath::from_segments([name])))
    }

    /// Move from `Fresh`/`Loaded` into `Live`. No further registration is
    /// accepted afterward.
    pub fn go_live(&mut self) {
        self.phase = RuntimePhase::Live;
    }

    /// Permanently shut the runtime down.
    pub fn close(&mut self) {
        self.phase = RuntimePhase::Closed;
    }

    /// Resolve a typed, mutable reference to the collab at `path`, walking
    /// through composite children one name-path segment at a time.
    pub fn get_mut_at<C: Collab + 'static>(&mut self, path: &NamePath) -> Result<&mut C> {
        let (head, mut rest) = path
            .split_first()
            .ok_or_else(|| CollabError::unknown_child(path.to_string()))?;
        let mut current: &mut dyn Collab = self
            .top_level
            .get_mut(head)
            .ok_or_else(|| CollabError::unknown_child(path.to_string()))?
            .as_mut();
        loop {
            match rest.split_first() {
                None => break,
                Some((seg, next_rest)) => {
                    current = current
                        .child_mut(seg)
                        .ok_or_else(|| CollabError::unknown_child(path.to_string()))?;
                    rest = next_rest;
                }
            }
        }
        current
            .as_any_mut()
            .downcast_mut::<C>()
            .ok_or_else(|| CollabError::invalid_state(format!("{path} is not the requested type")))
    }

    /// As [`Runtime::get_mut_at`], immutably.
    pub fn get_at<C: Collab + 'static>(&self, path: &NamePath) -> Result<&C> {
        let (head, mut rest) = path
            .split_first()
            .ok_or_else(|| CollabError::unknown_child(path.to_string()))?;
        let mut current: &dyn Collab = self
            .top_level
            .get(head)
            .ok_or_else(|| CollabError::unknown_child(path.to_string()))?
            .as_ref();
        loop {
            match rest.split_first() {
                None => break,
                Some((seg, next_rest)) => {
                    current = current
                        .child(seg)
                        .ok_or_else(|| CollabError::unknown_child(path.to_string()))?;
                    rest = next_rest;
                }
            }
        }
        current
            .as_any()
            .downcast_ref::<C>()
            .ok_or_else(|| CollabError::invalid_state(format!("{path} is not the requested type")))
    }

    /// Resolve a typed reference through a handle.
    pub fn get<C: Collab + 'static>(&self, handle: &CollabHandle<C>) -> Result<&C> {
        self.get_at(handle.path())
    }

    /// Apply a single local operation as its own one-message transaction.
    pub fn apply<C>(&mut self, handle: &CollabHandle<C>, op: C::Op) -> Result<()>
    where
        C: PrimitiveCollab + 'static,
    {
        self.transact(|txn| txn.apply(handle, op))
    }

    /// Batch several primitives' operations into one transaction sharing a
    /// single `senderCounter`. The closure builds the batch through the
    /// [`TxnBuilder`] it receives; the transaction commits (is stamped,
    /// locally echoed, and queued for transport) only once the closure
    /// returns successfully.
    pub fn transact(&mut self, f: impl FnOnce(&mut TxnBuilder) -> Result<()>) -> Result<()> {
        self.require_live()?;
        let mut builder = TxnBuilder::new(self);
        f(&mut builder)?;
        let TxnBuilder {
            messages, request, ..
        } = builder;
        if messages.is_empty() {
            return Ok(());
        }
        if messages.len() > self.config.transaction_size_warn_threshold {
            tracing::warn!(
                message_count = messages.len(),
                "transaction batches an unusually large number of messages"
            );
        }
        self.commit_transaction(messages, request)
    }

    fn commit_transaction(&mut self, messages: Vec<WireMessage>, request: MetadataRequest) -> Result<()> {
        self.causal.tick_lamport();
        let txn = self.causal.stamp_outbound(messages, &request);
        let encoded = txn.encode();
        let delivered = self.causal.receive_transaction(txn);
        for txn in delivered {
            self.deliver_transaction(txn);
        }
        self.outbound.push_back(encoded);
        Ok(())
    }

    /// Decode and admit one inbound encoded transaction. Delivers it (and
    /// any previously buffered transaction it unblocks) to the tree in
    /// causal order; duplicates and not-yet-deliverable transactions are
    /// absorbed silently. A transaction that fails to deliver (an unknown
    /// child or a malformed payload) is discarded and logged rather than
    /// aborting delivery of the other transactions drained by this call.
    pub fn receive_wire_transaction(&mut self, bytes: &[u8]) -> Result<()> {
        self.require_live()?;
        let txn = WireTransaction::decode(bytes)?;
        for delivered in self.causal.receive_transaction(txn) {
            self.deliver_transaction(delivered);
        }
        Ok(())
    }

    /// Deliver every message of `txn` to the tree in order. Stops and
    /// discards the rest of the transaction at the first undeliverable
    /// message, logging a warning, per the recovery rule for unknown-child
    /// and malformed deliveries; never propagates the error to the caller,
    /// since the causal metadata service has already advanced past this
    /// transaction and cannot re-deliver it.
    fn deliver_transaction(&mut self, txn: WireTransaction) {
        let vc_entries: BTreeMap<ReplicaId, u64> = txn.vc_prefix.iter().copied().collect();
        let meta = MessageMeta {
            sender: Some(txn.sender),
            sender_counter: txn.sender_counter,
            lamport: txn.lamport,
            wall_clock: txn.wall_clock,
            vc_entries,
        };
        let sender = txn.sender;
        let sender_counter = txn.sender_counter;
        for message in txn.messages {
            if let Err(err) = self.deliver_message(&message.name_path, &message.payload, &meta) {
                tracing::warn!(
                    error = %err,
                    name_path = %message.name_path,
                    sender = ?sender,
                    sender_counter,
                    "discarding transaction after an undeliverable message"
                );
                break;
            }
        }
    }

    pub(crate) fn deliver_message(
        &mut self,
        name_path: &NamePath,
        payload: &[u8],
        meta: &MessageMeta,
    ) -> Result<()> {
        let (head, rest) = name_path
            .split_first()
            .ok_or_else(|| CollabError::unknown_child(name_path.to_string()))?;
        let collab = self
            .top_level
            .get_mut(head)
            .ok_or_else(|| CollabError::unknown_child(name_path.to_string()))?;
        collab.receive(&rest, payload, meta)
    }

    /// Open a scope that delivers messages straight into the tree under
    /// `meta`, bypassing causal stamping and the outbound queue. Cannot
    /// nest: a second call while one is already open returns
    /// [`CollabError::InvalidState`].
    pub fn run_locally<R>(
        &mut self,
        meta: MessageMeta,
        f: impl FnOnce(&mut RunLocallyCtx) -> R,
    ) -> Result<R> {
        self.run_locally.enter()?;
        let mut ctx = RunLocallyCtx { runtime: self, meta };
        let result = f(&mut ctx);
        self.run_locally.exit();
        Ok(result)
    }

    /// Encode the whole tree's state: every registered top-level collab's
    /// own save bytes, framed with its registration name, in registration
    /// order.
    pub fn save(&self) -> SaveBytes {
        let children: Vec<(String, Vec<u8>)> = self
            .registration_order
            .iter()
            .map(|name| {
                let bytes = self
                    .top_level
                    .get(name)
                    .expect("registration_order tracks top_level keys")
                    .save();
                (name.clone(), bytes)
            })
            .collect();
        encode_framed_save(&[], &children)
    }

    /// Restore state saved by [`Runtime::save`]. Each framed child is
    /// loaded into the collab already registered under the same name;
    /// children the save mentions that haven't been registered yet are
    /// silently skipped; they simply start empty when/if registered later.
    pub fn load(&mut self, bytes: &SaveBytes) -> Result<()> {
        if !self.phase.accepts_registration() {
            return Err(CollabError::invalid_state(format!(
                "cannot load while runtime is in phase {:?}",
                self.phase
            )));
        }
        let (_, children) = decode_framed_save(bytes)?;
        for (name, child_bytes) in children {
            if let Some(collab) = self.top_level.get_mut(&name) {
                collab.load(&child_bytes)?;
            }
        }
        self.phase = RuntimePhase::Loaded;
        Ok(())
    }

    /// Drain and return every transaction encoded since the last drain, for
    /// a [`crate::transport::Transport`] to broadcast.
    pub fn drain_outbound(&mut self) -> Vec<Vec<u8>> {
        self.outbound.drain(..).collect()
    }

    fn require_live(&self) -> Result<()> {
        if !self.phase.is_live() {
            return Err(CollabError::invalid_state(format!(
                "runtime is not live (phase is {:?})",
                self.phase
            )));
        }
        Ok(())
    }
}
