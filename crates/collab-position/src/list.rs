//! Maintains the present-position index: a sequence of positions ordered
//! by the waypoint tree's total order, with tombstones removed.

use crate::ids::{Position, Side};
use crate::tombstones::TombstoneSet;
use crate::tree::{AllocOutcome, WaypointRow, WaypointTree};
use collab_core::{CollabError, ReplicaId, Result};

/// Where a new run of positions attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Before the first present position (or into an empty list).
    Start,
    /// Immediately after `0`-indexed present position `index`.
    After(usize),
}

/// One allocation, ready to broadcast: what the waypoint tree did, plus
/// the side the anchor attached on. A remote replica (or this one on
/// local echo) replays it with [`PositionList::apply_insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InsertOp {
    pub anchor: Position,
    pub side: Side,
    pub outcome: AllocOutcome,
}

/// The present, tombstone-free, totally-ordered sequence of positions for
/// one sequence collab. Owns the waypoint tree and tombstone set, and
/// keeps a plain sorted `Vec<Position>` as the present-index: binary
/// search gives O(log N) `position_of`/`index_of_position`, and insertion
/// is O(N) for the `Vec::insert` shift, which is adequate at the scale a
/// single collaborative document targets.
#[derive(Debug, Clone)]
pub struct PositionList {
    tree: WaypointTree,
    tombstones: TombstoneSet,
    present: Vec<Position>,
}

impl PositionList {
    pub fn new(own_replica: ReplicaId) -> Self {
        Self {
            tree: WaypointTree::new(own_replica),
            tombstones: TombstoneSet::new(),
            present: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.present.len()
    }

    pub fn is_empty(&self) -> bool {
        self.present.is_empty()
    }

    pub fn tree(&self) -> &WaypointTree {
        &self.tree
    }

    /// The position currently at `index` in present-order.
    pub fn position_of(&self, index: usize) -> Result<Position> {
        self.present
            .get(index)
            .copied()
            .ok_or_else(|| CollabError::out_of_range(index, self.present.len()))
    }

    /// The present-order index of `position`, if it is present.
    pub fn index_of_position(&self, position: Position) -> Option<usize> {
        self.present
            .binary_search_by(|p| {
                self.tree
                    .compare(*p, position)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok()
    }

    /// Read-only: the `(anchor, side)` an insertion at present-order `index`
    /// would attach to, without allocating anything. Split out from
    /// [`PositionList::insert_at`] so a caller that must not mutate state
    /// yet (a `PrimitiveCollab::encode_op` impl, which only plans a message
    /// to send) can compute the same anchor the eventual
    /// [`PositionList::insert_via_anchor`] call will use once the message
    /// is actually delivered, locally or remotely.
    pub fn anchor_for_index(&self, index: usize) -> Result<(Position, Side)> {
        if index > self.present.len() {
            return Err(CollabError::out_of_range(index, self.present.len()));
        }
        Ok(if self.present.is_empty() {
            (
                Position {
                    waypoint: crate::ids::WaypointId::root(),
                    value_index: 0,
                },
                Side::Right,
            )
        } else if index == 0 {
            (self.present[0], Side::Left)
        } else {
            (self.present[index - 1], Side::Right)
        })
    }

    /// Allocate `n` new positions attached at `(anchor, side)` and make them
    /// present. This is the one place waypoint allocation actually happens;
    /// both a local insert's own delivery and a remote insert's delivery
    /// call this with the same `(anchor, side)`, so the extend-vs-branch
    /// decision is made exactly once per insertion, during delivery, never
    /// during message planning.
    pub fn insert_via_anchor(
        &mut self,
        anchor: Position,
        side: Side,
        n: usize,
    ) -> Result<(Vec<Position>, InsertOp)> {
        if n == 0 {
            return Err(CollabError::invalid_state("insert requires n > 0"));
        }
        let (positions, outcome) = self.tree.alloc_reporting(anchor, n, side)?;
        let index = self
            .present
            .binary_search_by(|p| {
                self.tree
                    .compare(*p, positions[0])
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or_else(|insert_at| insert_at);
        self.insert_present(index, &positions);
        Ok((positions, InsertOp { anchor, side, outcome }))
    }

    /// Convenience: plan and apply an insertion at present-order `index` in
    /// one call. Only safe to use where allocating immediately (rather than
    /// deferring to a later delivery) is correct — test and demo code, or a
    /// primitive with no separate plan/deliver split.
    pub fn insert_at(&mut self, index: usize, n: usize) -> Result<(Vec<Position>, InsertOp)> {
        let (anchor, side) = self.anchor_for_index(index)?;
        self.insert_via_anchor(anchor, side, n)
    }

    /// Replay an [`InsertOp`] produced by any replica (including this
    /// one's own local echo). Returns the positions it introduced.
    pub fn apply_insert(&mut self, op: &InsertOp) -> Result<Vec<Position>> {
        let positions = self.tree.apply_outcome(&op.outcome)?;
        let index = self
            .present
            .binary_search_by(|p| {
                self.tree
                    .compare(*p, positions[0])
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or_else(|insert_at| insert_at);
        self.insert_present(index, &positions);
        Ok(positions)
    }

    fn insert_present(&mut self, index: usize, positions: &[Position]) {
        self.present.splice(index..index, positions.iter().copied());
    }

    /// Delete the n present positions starting at `index`, returning the
    /// positions tombstoned (to broadcast).
    pub fn delete_at(&mut self, index: usize, n: usize) -> Result<Vec<Position>> {
        if index + n > self.present.len() {
            return Err(CollabError::out_of_range(index + n, self.present.len()));
        }
        let removed: Vec<Position> = self.present.drain(index..index + n).collect();
        for p in &removed {
            self.tombstones.mark(*p);
        }
        Ok(removed)
    }

    /// Apply tombstone marks received from any replica (idempotent).
    pub fn apply_tombstones(&mut self, positions: &[Position]) {
        for &p in positions {
            if self.tombstones.is_tombstoned(p) {
                continue;
            }
            self.tombstones.mark(p);
            if let Some(idx) = self.index_of_position(p) {
                self.present.remove(idx);
            }
        }
    }

    pub fn is_tombstoned(&self, position: Position) -> bool {
        self.tombstones.is_tombstoned(position)
    }

    pub fn tombstone_rows(&self) -> Vec<Position> {
        self.tombstones.rows()
    }

    pub fn present_positions(&self) -> &[Position] {
        &self.present
    }

    /// The waypoint topology and tombstone rows to persist. Present-order is
    /// not stored separately: it is the tree's total order minus the
    /// tombstoned positions, recomputed by [`PositionList::load_from_rows`].
    pub fn save_rows(&self) -> (Vec<WaypointRow>, Vec<Position>) {
        (self.tree.save_rows(), self.tombstones.rows())
    }

    /// Rebuild a list from rows produced by [`PositionList::save_rows`].
    pub fn load_from_rows(
        own_replica: ReplicaId,
        waypoint_rows: &[WaypointRow],
        tombstone_rows: Vec<Position>,
    ) -> Result<Self> {
        let mut tree = WaypointTree::new(own_replica);
        tree.load_rows(waypoint_rows)?;
        let tombstones = TombstoneSet::from_rows(tombstone_rows);

        let mut present = Vec::new();
        for row in waypoint_rows {
            for value_index in 0..row.length {
                let position = Position {
                    waypoint: row.id,
                    value_index,
                };
                if !tombstones.is_tombstoned(position) {
                    present.push(position);
                }
            }
        }
        present.sort_by(|a, b| tree.compare(*a, *b).unwrap_or(std::cmp::Ordering::Equal));

        Ok(Self {
            tree,
            tombstones,
            present,
        })
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
    fn insert_then_read_back_in_order() {
        let mut list = PositionList::new(replica(1));
        let (a, _) = list.insert_at(0, 3).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.position_of(0).unwrap(), a[0]);
        assert_eq!(list.position_of(2).unwrap(), a[2]);
    }

    #[test]
    fn insert_in_middle_preserves_order() {
        let mut list = PositionList::new(replica(1));
        list.insert_at(0, 2).unwrap();
        let (mid, _) = list.insert_at(1, 1).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.position_of(1).unwrap(), mid[0]);
    }

    #[test]
    fn save_and_load_rows_round_trips_present_order() {
        let mut list = PositionList::new(replica(1));
        list.insert_at(0, 3).unwrap();
        list.delete_at(1, 1).unwrap();
        let (waypoint_rows, tombstone_rows) = list.save_rows();
        let restored = PositionList::load_from_rows(replica(1), &waypoint_rows, tombstone_rows).unwrap();
        assert_eq!(restored.present_positions(), list.present_positions());
    }

    #[test]
    fn delete_then_reinsert_does_not_reuse_position() {
        let mut list = PositionList::new(replica(1));
        let (a, _) = list.insert_at(0, 1).unwrap();
        list.delete_at(0, 1).unwrap();
        assert!(list.is_tombstoned(a[0]));
        let (b, _) = list.insert_at(0, 1).unwrap();
        assert_ne!(a[0], b[0]);
    }

    #[test]
    fn remote_insert_op_replays_to_the_same_outcome() {
        let mut local = PositionList::new(replica(1));
        let (positions, op) = local.insert_at(0, 2).unwrap();

        let mut remote = PositionList::new(replica(2));
        let replayed = remote.apply_insert(&op).unwrap();
        assert_eq!(positions, replayed);
        assert_eq!(remote.present_positions(), local.present_positions());
    }

    #[test]
    fn concurrent_inserts_at_same_index_do_not_interleave() {
        let mut base = PositionList::new(replica(1));
        let (_, seed_op) = base.insert_at(0, 1).unwrap();

        let mut replica_a = PositionList::new(replica(10));
        replica_a.apply_insert(&seed_op).unwrap();
        let mut replica_b = PositionList::new(replica(20));
        replica_b.apply_insert(&seed_op).unwrap();

        let (_, op_a) = replica_a.insert_at(1, 2).unwrap();
        let (_, op_b) = replica_b.insert_at(1, 2).unwrap();

        // Deliver both ops, in different orders, to two fresh replicas;
        // both must converge to the same present-order sequence with each
        // replica's run kept contiguous.
        let mut observer1 = PositionList::new(replica(30));
        observer1.apply_insert(&seed_op).unwrap();
        observer1.apply_insert(&op_a).unwrap();
        observer1.apply_insert(&op_b).unwrap();

        let mut observer2 = PositionList::new(replica(31));
        observer2.apply_insert(&seed_op).unwrap();
        observer2.apply_insert(&op_b).unwrap();
        observer2.apply_insert(&op_a).unwrap();

        assert_eq!(observer1.present_positions(), observer2.present_positions());
        assert_eq!(observer1.len(), 5);
    }
}
