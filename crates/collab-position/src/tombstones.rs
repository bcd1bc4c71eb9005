//! The tombstone set: which positions no longer have a present value.
//!
//! Positions are never reused and never "un-deleted" — once a slot is
//! logically cleared it stays cleared, there being no operation that would
//! reinsert a value at the same identifier rather than at a fresh one. So
//! unlike the value-level add-wins set, this is a plain grow-only set:
//! union is enough to converge, and delivering the same tombstone twice is
//! already idempotent.

use crate::ids::{Position, WaypointId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Positions are ordered here only to get a stable serialization; the
/// ordering has no bearing on the sequence's own total order.
fn sort_key(p: &Position) -> (WaypointId, usize) {
    (p.waypoint, p.value_index)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TombstoneSet {
    tombstoned: BTreeSet<(WaypointId, usize)>,
}

impl TombstoneSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `position` absent. Idempotent.
    pub fn mark(&mut self, position: Position) {
        self.tombstoned.insert(sort_key(&position));
    }

    pub fn is_tombstoned(&self, position: Position) -> bool {
        self.tombstoned.contains(&sort_key(&position))
    }

    pub fn len(&self) -> usize {
        self.tombstoned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tombstoned.is_empty()
    }

    /// Serialize as a flat row list for framing in a collab's save bytes.
    pub fn rows(&self) -> Vec<Position> {
        self.tombstoned
            .iter()
            .map(|(waypoint, value_index)| Position {
                waypoint: *waypoint,
                value_index: *value_index,
            })
            .collect()
    }

    pub fn from_rows(rows: impl IntoIterator<Item = Position>) -> Self {
        let mut set = Self::new();
        for r in rows {
            set.mark(r);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collab_core::ReplicaId;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn pos(seed: u64, value_index: usize) -> Position {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Position {
            waypoint: WaypointId {
                sender: ReplicaId::generate_from(&mut rng),
                counter: 1,
            },
            value_index,
        }
    }

    #[test]
    fn marking_twice_is_idempotent() {
        let mut set = TombstoneSet::new();
        let p = pos(1, 0);
        set.mark(p);
        set.mark(p);
        assert_eq!(set.len(), 1);
        assert!(set.is_tombstoned(p));
    }

    #[test]
    fn rows_round_trip() {
        let mut set = TombstoneSet::new();
        set.mark(pos(1, 0));
        set.mark(pos(2, 3));
        let restored = TombstoneSet::from_rows(set.rows());
        assert_eq!(set.rows(), restored.rows());
    }
}
