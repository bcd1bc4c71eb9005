//! A value list: present positions mapped to immutable values, built on
//! [`collab_position::PositionList`]. A cursor tracks a logical index
//! across concurrent insertions by re-resolving its bound position against
//! the position engine on every read, rather than by storing an index.

use collab_causal::MetadataRequest;
use collab_core::wire::NamePath;
use collab_core::{impl_collab_any, Collab, CollabError, MessageMeta, ReplicaId, Result, SaveBytes};
use collab_position::{Position, PositionList, Side};
use collab_runtime::PrimitiveCollab;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;

/// The local operation vocabulary for [`ValueList`].
#[derive(Debug, Clone)]
pub enum ListOp<V> {
    Insert { index: usize, values: Vec<V> },
    Delete { index: usize, count: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum WireOp<V> {
    Insert {
        anchor: Position,
        side: Side,
        values: Vec<V>,
    },
    Delete {
        positions: Vec<Position>,
    },
}

/// An ordered sequence of immutable values, addressable by index, that
/// never splits a replica's own consecutive insert under concurrent
/// insertions elsewhere.
pub struct ValueList<V> {
    positions: PositionList,
    values: HashMap<Position, V>,
}

impl<V: Clone> ValueList<V> {
    pub fn new(own_replica: ReplicaId) -> Self {
        Self {
            positions: PositionList::new(own_replica),
            values: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// The value at present-order `index`.
    pub fn get(&self, index: usize) -> Result<&V> {
        let position = self.positions.position_of(index)?;
        self.values
            .get(&position)
            .ok_or_else(|| CollabError::invalid_state("present position missing its value"))
    }

    /// Snapshot of every value, in present order.
    pub fn iter(&self) -> impl Iterator<Item = &V> {
        self.positions
            .present_positions()
            .iter()
            .filter_map(move |p| self.values.get(p))
    }

    pub fn cursor_at(&self, index: usize, binding: CursorBinding) -> Result<Cursor> {
        let position = if index < self.positions.len() {
            self.positions.position_of(index)?
        } else if index == self.positions.len() && index > 0 {
            self.positions.position_of(index - 1)?
        } else {
            return Ok(Cursor {
                bound: None,
                binding,
            });
        };
        Ok(Cursor {
            bound: Some(position),
            binding,
        })
    }

    /// The cursor's current logical index, resolved against the position
    /// engine's present state right now.
    pub fn index_of_cursor(&self, cursor: &Cursor) -> usize {
        let Some(bound) = cursor.bound else {
            return 0;
        };
        let present = self.positions.present_positions();
        let bound_is_present = self.positions.index_of_position(bound);
        let anchor_index = bound_is_present.unwrap_or_else(|| {
            present.partition_point(|p| self.positions.tree().compare(*p, bound) == Ok(std::cmp::Ordering::Less))
        });
        match cursor.binding {
            CursorBinding::Left => anchor_index,
            // When `bound` is still present, "first present position > bound" is one
            // past its own index. When `bound` has been tombstoned, `anchor_index`
            // already points at the first present position ahead of it.
            CursorBinding::Right if bound_is_present.is_some() => anchor_index + 1,
            CursorBinding::Right => anchor_index,
        }
    }
}

/// Which side of its bound position a [`Cursor`] resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorBinding {
    Left,
    Right,
}

/// A position plus a binding side; tracks insertions around it by
/// re-resolving on read, never mutated by remote events.
#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    bound: Option<Position>,
    binding: CursorBinding,
}

impl<V: Clone + Serialize + DeserializeOwned + 'static> Collab for ValueList<V> {
    fn receive(&mut self, _name_path: &NamePath, payload: &[u8], meta: &MessageMeta) -> Result<()> {
        let op: WireOp<V> = bincode::deserialize(payload).map_err(|e| CollabError::malformed(e.to_string()))?;
        match op {
            WireOp::Insert { anchor, side, values } => {
                let (new_positions, _) = self.positions.insert_via_anchor(anchor, side, values.len())?;
                for (position, value) in new_positions.into_iter().zip(values) {
                    self.values.insert(position, value);
                }
            }
            WireOp::Delete { positions } => {
                self.positions.apply_tombstones(&positions);
                for position in &positions {
                    self.values.remove(position);
                }
            }
        }
        let _ = meta;
        Ok(())
    }

    fn save(&self) -> SaveBytes {
        let (waypoint_rows, tombstone_rows) = self.positions.save_rows();
        let values: Vec<(Position, V)> = self
            .positions
            .present_positions()
            .iter()
            .filter_map(|p| self.values.get(p).map(|v| (*p, v.clone())))
            .collect();
        bincode::serialize(&(waypoint_rows, tombstone_rows, values)).expect("in-memory CRDT payloads always serialize")
    }

    fn load(&mut self, bytes: &SaveBytes) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let own_replica = self.positions.tree().own_replica();
        let (waypoint_rows, tombstone_rows, values): (
            Vec<collab_position::WaypointRow>,
            Vec<Position>,
            Vec<(Position, V)>,
        ) = bincode::deserialize(bytes).map_err(|e| CollabError::malformed(e.to_string()))?;
        self.positions = PositionList::load_from_rows(own_replica, &waypoint_rows, tombstone_rows)?;
        self.values = values.into_iter().collect();
        Ok(())
    }

    fn can_gc(&self) -> bool {
        self.positions.is_empty()
    }

    impl_collab_any!();
}

impl<V: Clone + Serialize + DeserializeOwned + 'static> PrimitiveCollab for ValueList<V> {
    type Op = ListOp<V>;

    fn encode_op(&self, op: &ListOp<V>) -> (Vec<u8>, MetadataRequest) {
        let wire = match op {
            ListOp::Insert { index, values } => {
                let (anchor, side) = self
                    .positions
                    .anchor_for_index(*index)
                    .expect("caller validates index before building the op");
                WireOp::Insert {
                    anchor,
                    side,
                    values: values.clone(),
                }
            }
            ListOp::Delete { index, count } => {
                let positions: Vec<Position> = (*index..*index + *count)
                    .map(|i| {
                        self.positions
                            .position_of(i)
                            .expect("caller validates the range before building the op")
                    })
                    .collect();
                WireOp::Delete { positions }
            }
        };
        (
            bincode::serialize(&wire).expect("in-memory CRDT payloads always serialize"),
            MetadataRequest::none(),
        )
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

    fn meta(sender: ReplicaId, counter: u64) -> MessageMeta {
        MessageMeta {
            sender: Some(sender),
            sender_counter: counter,
            lamport: None,
            wall_clock: None,
            vc_entries: Default::default(),
        }
    }

    fn deliver(list: &mut ValueList<char>, op: &ListOp<char>, sender: ReplicaId, counter: u64) {
        let (payload, _) = list.encode_op(op);
        list.receive(&NamePath::root(), &payload, &meta(sender, counter)).unwrap();
    }

    #[test]
    fn insert_then_iterate_in_order() {
        let a = replica(1);
        let mut list = ValueList::<char>::new(a);
        deliver(
            &mut list,
            &ListOp::Insert {
                index: 0,
                values: vec!['a', 'b', 'c'],
            },
            a,
            1,
        );
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![&'a', &'b', &'c']);
    }

    #[test]
    fn delete_removes_the_value_and_position() {
        let a = replica(1);
        let mut list = ValueList::<char>::new(a);
        deliver(
            &mut list,
            &ListOp::Insert {
                index: 0,
                values: vec!['a', 'b'],
            },
            a,
            1,
        );
        deliver(&mut list, &ListOp::Delete { index: 0, count: 1 }, a, 2);
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![&'b']);
    }

    #[test]
    fn cursor_tracks_insertions_ahead_of_its_bound() {
        let a = replica(1);
        let mut list = ValueList::<char>::new(a);
        deliver(
            &mut list,
            &ListOp::Insert {
                index: 0,
                values: vec!['a', 'b'],
            },
            a,
            1,
        );
        let cursor = list.cursor_at(1, CursorBinding::Left).unwrap();
        assert_eq!(list.index_of_cursor(&cursor), 1);
        deliver(
            &mut list,
            &ListOp::Insert {
                index: 0,
                values: vec!['z'],
            },
            a,
            2,
        );
        assert_eq!(list.index_of_cursor(&cursor), 2, "insertion before the bound shifts it forward");
    }

    #[test]
    fn right_bound_cursor_does_not_skip_a_present_element_when_its_bound_is_deleted() {
        let a = replica(1);
        let mut list = ValueList::<char>::new(a);
        deliver(
            &mut list,
            &ListOp::Insert {
                index: 0,
                values: vec!['a', 'b', 'c'],
            },
            a,
            1,
        );
        // Right-bound at 'a': first present position after it is 'b', at index 1.
        let cursor = list.cursor_at(0, CursorBinding::Right).unwrap();
        assert_eq!(list.index_of_cursor(&cursor), 1);

        deliver(&mut list, &ListOp::Delete { index: 0, count: 1 }, a, 2);
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![&'b', &'c']);
        // 'a' is tombstoned now; the first present position after it is still 'b',
        // now at index 0. Must not skip it just because the bound was deleted.
        assert_eq!(list.index_of_cursor(&cursor), 0);
    }

    #[test]
    fn save_and_load_round_trip_values_and_order() {
        let a = replica(1);
        let mut list = ValueList::<char>::new(a);
        deliver(
            &mut list,
            &ListOp::Insert {
                index: 0,
                values: vec!['a', 'b', 'c'],
            },
            a,
            1,
        );
        deliver(&mut list, &ListOp::Delete { index: 1, count: 1 }, a, 2);
        let saved = list.save();

        let mut restored = ValueList::<char>::new(a);
        restored.load(&saved).unwrap();
        assert_eq!(restored.iter().collect::<Vec<_>>(), list.iter().collect::<Vec<_>>());
    }
}
