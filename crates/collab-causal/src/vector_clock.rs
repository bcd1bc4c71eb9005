//! Vector clock: replica id → non-negative sender-counter.

use collab_core::ReplicaId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Mapping from replica id to the number of transactions that replica has
/// originated that this clock has observed. Absent entries read as 0.
///
/// Most vector clocks in a two- or three-replica session carry one or two
/// live entries, so a single-entry fast path avoids a `BTreeMap` allocation
/// in the common case while falling back to the general map once a second
/// replica is observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorClock {
    /// No entries observed yet.
    Empty,
    /// Exactly one replica observed so far.
    Single { replica: ReplicaId, counter: u64 },
    /// Two or more replicas observed.
    Multiple(BTreeMap<ReplicaId, u64>),
}

impl Default for VectorClock {
    fn default() -> Self {
        Self::Empty
    }
}

impl VectorClock {
    /// An empty clock (every entry reads as 0).
    pub fn new() -> Self {
        Self::Empty
    }

    /// The counter recorded for `replica`, or 0 if never observed.
    pub fn get(&self, replica: &ReplicaId) -> u64 {
        match self {
            VectorClock::Empty => 0,
            VectorClock::Single { replica: r, counter } => {
                if r == replica {
                    *counter
                } else {
                    0
                }
            }
            VectorClock::Multiple(map) => map.get(replica).copied().unwrap_or(0),
        }
    }

    /// Record that `counter` has been observed for `replica`. No-op if
    /// `counter` is not greater than what's already recorded (the vector
    /// clock is monotonic invariants).
    pub fn observe(&mut self, replica: ReplicaId, counter: u64) {
        if counter <= self.get(&replica) {
            return;
        }
        match self {
            VectorClock::Empty => {
                *self = VectorClock::Single { replica, counter };
            }
            VectorClock::Single { replica: r, counter: c } => {
                if *r == replica {
                    *c = counter;
                } else {
                    let mut map = BTreeMap::new();
                    map.insert(*r, *c);
                    map.insert(replica, counter);
                    *self = VectorClock::Multiple(map);
                }
            }
            VectorClock::Multiple(map) => {
                map.insert(replica, counter);
            }
        }
    }

    /// Increment `replica`'s own entry by one and return the new value.
    /// Used when a replica stamps a transaction it originates.
    pub fn increment(&mut self, replica: ReplicaId) -> u64 {
        let next = self.get(&replica) + 1;
        self.observe(replica, next);
        next
    }

    /// Iterate all replicas with a non-zero entry.
    pub fn iter(&self) -> Box<dyn Iterator<Item = (ReplicaId, u64)> + '_> {
        match self {
            VectorClock::Empty => Box::new(std::iter::empty()),
            VectorClock::Single { replica, counter } => {
                Box::new(std::iter::once((*replica, *counter)))
            }
            VectorClock::Multiple(map) => Box::new(map.iter().map(|(r, c)| (*r, *c))),
        }
    }

    /// `self` dominates `other` iff every entry in `other` is ≤ the
    /// corresponding entry in `self`.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        other.iter().all(|(replica, counter)| self.get(&replica) >= counter)
    }

    /// Causal-order comparison: `self < other` iff `self`'s entries are all
    /// ≤ `other`'s and strictly less at some replica. Returns `None` when the clocks are concurrent or equal.
    pub fn causal_cmp(&self, other: &VectorClock) -> Option<Ordering> {
        let mut replicas: std::collections::BTreeSet<ReplicaId> =
            self.iter().map(|(r, _)| r).collect();
        replicas.extend(other.iter().map(|(r, _)| r));

        let mut le = true;
        let mut ge = true;
        for replica in replicas {
            let a = self.get(&replica);
            let b = other.get(&replica);
            if a > b {
                le = false;
            }
            if a < b {
                ge = false;
            }
        }
        match (le, ge) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => None,
        }
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

    #[test]
    fn unseen_replica_reads_as_zero() {
        let vc = VectorClock::new();
        assert_eq!(vc.get(&replica(1)), 0);
    }

    #[test]
    fn increment_is_monotonic_and_idempotent_against_regression() {
        let r = replica(1);
        let mut vc = VectorClock::new();
        assert_eq!(vc.increment(r), 1);
        assert_eq!(vc.increment(r), 2);
        vc.observe(r, 1); // stale observation must not roll back
        assert_eq!(vc.get(&r), 2);
    }

    #[test]
    fn single_to_multiple_transition_preserves_all_entries() {
        let a = replica(1);
        let b = replica(2);
        let mut vc = VectorClock::new();
        vc.observe(a, 5);
        assert!(matches!(vc, VectorClock::Single { .. }));
        vc.observe(b, 3);
        assert!(matches!(vc, VectorClock::Multiple(_)));
        assert_eq!(vc.get(&a), 5);
        assert_eq!(vc.get(&b), 3);
    }

    #[test]
    fn dominates_requires_every_dependency_satisfied() {
        let a = replica(1);
        let b = replica(2);
        let mut local = VectorClock::new();
        local.observe(a, 2);

        let mut dep = VectorClock::new();
        dep.observe(a, 1);
        assert!(local.dominates(&dep));

        dep.observe(b, 1);
        assert!(!local.dominates(&dep));
    }

    #[test]
    fn causal_cmp_detects_concurrency() {
        let a = replica(1);
        let b = replica(2);

        let mut v1 = VectorClock::new();
        v1.observe(a, 1);
        let mut v2 = VectorClock::new();
        v2.observe(b, 1);

        assert_eq!(v1.causal_cmp(&v2), None);

        let mut v3 = v1.clone();
        v3.observe(a, 2);
        assert_eq!(v1.causal_cmp(&v3), Some(Ordering::Less));
        assert_eq!(v3.causal_cmp(&v1), Some(Ordering::Greater));
        assert_eq!(v1.causal_cmp(&v1), Some(Ordering::Equal));
    }
}
