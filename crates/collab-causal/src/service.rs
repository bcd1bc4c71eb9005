//! The causal metadata service: stamps outgoing transactions and buffers
//! inbound ones until their causal dependencies arrive.

use crate::config::CausalConfig;
use crate::lamport::LamportClock;
use crate::metadata::{resolve_static, MetadataRequest};
use crate::vector_clock::VectorClock;
use collab_core::wire::{WireMessage, WireTransaction};
use collab_core::ReplicaId;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

/// Stamps outbound transactions with causal metadata and releases inbound
/// ones in causal order, buffering the rest.
pub struct CausalMetadataService {
    own_replica: ReplicaId,
    clock: VectorClock,
    lamport: LamportClock,
    pending: HashMap<ReplicaId, VecDeque<WireTransaction>>,
    config: CausalConfig,
}

impl CausalMetadataService {
    /// A fresh service for `own_replica`, with an empty clock and queue.
    pub fn new(own_replica: ReplicaId) -> Self {
        Self::with_config(own_replica, CausalConfig::default())
    }

    /// As [`CausalMetadataService::new`] but with explicit configuration.
    pub fn with_config(own_replica: ReplicaId, config: CausalConfig) -> Self {
        Self {
            own_replica,
            clock: VectorClock::new(),
            lamport: LamportClock::new(),
            pending: HashMap::new(),
            config,
        }
    }

    /// This replica's id.
    pub fn own_replica(&self) -> ReplicaId {
        self.own_replica
    }

    /// The locally observed vector clock. Monotonic for the lifetime of the
    /// service.
    pub fn vector_clock(&self) -> &VectorClock {
        &self.clock
    }

    /// Total number of transactions buffered across all senders, awaiting
    /// causal dependencies.
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(|q| q.len()).sum()
    }

    /// Stamp a transaction this replica is about to commit. Does not touch
    /// local state: the sender_counter allocated here becomes durable only
    /// once the transaction is fed back through
    /// [`CausalMetadataService::receive_transaction`] as the local echo,
    /// which is what keeps local and remote delivery on the same code
    /// path. `VcRequest::Automatic` resolves the same as `All` here; see
    /// its doc comment.
    pub fn stamp_outbound(
        &self,
        messages: Vec<WireMessage>,
        request: &MetadataRequest,
    ) -> WireTransaction {
        let sender_counter = self.clock.get(&self.own_replica) + 1;

        let vc_entries = resolve_static(
            &request.vc,
            |r| self.clock.get(r),
            self.clock.iter(),
        );
        let vc_prefix: Vec<(ReplicaId, u64)> = vc_entries.into_iter().collect();

        WireTransaction {
            sender: self.own_replica,
            sender_counter,
            lamport: request.lamport_timestamp.then(|| self.lamport_peek()),
            wall_clock: request.wall_clock_time.then(current_wall_clock_ms),
            vc_prefix,
            messages,
        }
    }

    /// Advance the Lamport clock for an about-to-commit transaction and
    /// return the value to stamp it with. Separate from `stamp_outbound` so
    /// a single call advances the clock exactly once per transaction
    /// regardless of how many primitives' messages it batches.
    pub fn tick_lamport(&mut self) -> u64 {
        self.lamport.tick()
    }

    fn lamport_peek(&self) -> u64 {
        self.lamport.current()
    }

    /// Deliver one inbound transaction. Returns every transaction now
    /// deliverable in causal order, which may include `txn` itself,
    /// previously buffered transactions it unblocks, or neither if `txn`
    /// is a duplicate or still blocked.
    ///
    /// Duplicate transactions (already delivered) are dropped silently
    ///.
    pub fn receive_transaction(&mut self, txn: WireTransaction) -> Vec<WireTransaction> {
        if txn.sender_counter <= self.clock.get(&txn.sender) {
            tracing::debug!(
                sender = %txn.sender,
                sender_counter = txn.sender_counter,
                "dropping duplicate transaction"
            );
            return Vec::new();
        }

        let queue = self.pending.entry(txn.sender).or_default();
        queue.push_back(txn);
        if queue.len() >= self.config.pending_queue_warn_threshold {
            tracing::warn!(
                sender_queue_len = queue.len(),
                "pending queue for sender has grown large; causal dependencies may be missing"
            );
        }

        self.drain_deliverable()
    }

    fn drain_deliverable(&mut self) -> Vec<WireTransaction> {
        let mut delivered = Vec::new();
        loop {
            let mut progressed = false;
            let senders: Vec<ReplicaId> = self.pending.keys().copied().collect();
            for sender in senders {
                loop {
                    let ready = {
                        let queue = self.pending.get(&sender).expect("sender has a queue");
                        match queue.front() {
                            Some(front) => {
                                let expected = self.clock.get(&sender) + 1;
                                front.sender_counter == expected
                                    && self.dependencies_satisfied(front)
                            }
                            None => false,
                        }
                    };
                    if !ready {
                        break;
                    }
                    let txn = self
                        .pending
                        .get_mut(&sender)
                        .and_then(|q| q.pop_front())
                        .expect("checked ready above");
                    self.clock.observe(sender, txn.sender_counter);
                    if let Some(l) = txn.lamport {
                        self.lamport.witness(l);
                    }
                    delivered.push(txn);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        self.pending.retain(|_, q| !q.is_empty());
        delivered
    }

    fn dependencies_satisfied(&self, txn: &WireTransaction) -> bool {
        let mut dep_vc = VectorClock::new();
        for (replica, counter) in &txn.vc_prefix {
            dep_vc.observe(*replica, *counter);
        }
        self.clock.dominates(&dep_vc)
    }

    /// Lay a vc-prefix snapshot over `map` for test/introspection helpers.
    pub fn snapshot_vc_entries(&self, replicas: &[ReplicaId]) -> BTreeMap<ReplicaId, u64> {
        replicas.iter().map(|r| (*r, self.clock.get(r))).collect()
    }
}

fn current_wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
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

    #[test]
    fn own_local_echo_advances_clock_via_receive_path() {
        let a = replica(1);
        let mut svc = CausalMetadataService::new(a);
        let txn = svc.stamp_outbound(vec![], &MetadataRequest::none());
        assert_eq!(txn.sender_counter, 1);

        let delivered = svc.receive_transaction(txn);
        assert_eq!(delivered.len(), 1);
        assert_eq!(svc.vector_clock().get(&a), 1);
    }

    #[test]
    fn out_of_order_delivery_is_buffered_until_dependency_arrives() {
        let a = replica(1);
        let mut svc = CausalMetadataService::new(replica(99));

        let m1 = WireTransaction {
            sender: a,
            sender_counter: 1,
            lamport: None,
            wall_clock: None,
            vc_prefix: vec![],
            messages: vec![],
        };
        let m2 = WireTransaction {
            sender: a,
            sender_counter: 2,
            lamport: None,
            wall_clock: None,
            vc_prefix: vec![(a, 1)],
            messages: vec![],
        };

        let delivered = svc.receive_transaction(m2.clone());
        assert!(delivered.is_empty(), "m2 must wait for m1");
        assert_eq!(svc.pending_count(), 1);

        let delivered = svc.receive_transaction(m1.clone());
        assert_eq!(delivered, vec![m1, m2]);
        assert_eq!(svc.pending_count(), 0);
    }

    #[test]
    fn duplicate_transactions_are_dropped_silently() {
        let a = replica(1);
        let mut svc = CausalMetadataService::new(replica(99));
        let m1 = WireTransaction {
            sender: a,
            sender_counter: 1,
            lamport: None,
            wall_clock: None,
            vc_prefix: vec![],
            messages: vec![],
        };
        assert_eq!(svc.receive_transaction(m1.clone()).len(), 1);
        assert_eq!(svc.receive_transaction(m1).len(), 0);
    }
}
