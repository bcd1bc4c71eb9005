//! The waypoint tree: topology, allocation, and the total order over
//! positions.

use crate::ids::{Position, Side, WaypointId};
use collab_core::replica::CounterAllocator;
use collab_core::{CollabError, ReplicaId, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WaypointNode {
    parent: WaypointId,
    parent_value_index: usize,
    side: Side,
    length: usize,
}

/// A single element of a position's path key: `(slot, rank, tie_break)`.
/// `rank` is 0 for a left child, 1 for the position's own value, 2 for a
/// right child, which is exactly the in-order placement the engine
/// defines; comparing these element-wise is equivalent to walking the
/// recursive in-order definition without materializing it.
type PathElem = (usize, u8, Option<WaypointId>);

/// Owns the waypoint topology for one sequence collab and allocates new
/// waypoints for local inserts.
///
/// Positions compare in O(depth) by walking to the root and back rather
/// than the Fenwick/order-statistic augmentation a production engine would
/// use for O(log N) index conversions; [`crate::list::PositionList`] keeps
/// an explicitly sorted index instead, which is adequate at the scale this
/// library targets (single documents, not Git-scale histories).
#[derive(Debug, Clone)]
pub struct WaypointTree {
    own_replica: ReplicaId,
    nodes: HashMap<WaypointId, WaypointNode>,
    counter: CounterAllocator,
    local_tail: Option<WaypointId>,
}

impl WaypointTree {
    /// A tree with only the root waypoint, owned by `own_replica`.
    pub fn new(own_replica: ReplicaId) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            WaypointId::root(),
            WaypointNode {
                parent: WaypointId::root(),
                parent_value_index: 0,
                side: Side::Right,
                length: 0,
            },
        );
        Self {
            own_replica,
            nodes,
            counter: CounterAllocator::new(),
            local_tail: None,
        }
    }

    pub fn own_replica(&self) -> ReplicaId {
        self.own_replica
    }

    fn node(&self, id: WaypointId) -> Result<&WaypointNode> {
        self.nodes
            .get(&id)
            .ok_or_else(|| CollabError::unknown_child(format!("{id:?}")))
    }

    /// Length (number of value slots, present or tombstoned) of `waypoint`.
    pub fn waypoint_length(&self, waypoint: WaypointId) -> Result<usize> {
        Ok(self.node(waypoint)?.length)
    }

    /// Whether `waypoint` is known to this tree.
    pub fn contains_waypoint(&self, waypoint: WaypointId) -> bool {
        self.nodes.contains_key(&waypoint)
    }

    /// Total order between two positions. Positions from waypoints unknown
    /// to this tree cannot be compared; callers must ensure causal order
    /// delivers the waypoint-creating message first.
    pub fn compare(&self, a: Position, b: Position) -> Result<std::cmp::Ordering> {
        Ok(self.path_key(a)?.cmp(&self.path_key(b)?))
    }

    fn path_key(&self, position: Position) -> Result<Vec<PathElem>> {
        let mut hops = Vec::new();
        let mut current = position.waypoint;
        while !current.is_root() {
            let node = self.node(current)?;
            hops.push((node.parent_value_index, node.side.rank(), Some(current)));
            current = node.parent;
        }
        hops.reverse();
        hops.push((position.value_index, 1, None));
        Ok(hops)
    }

    /// Allocate `n` new positions immediately after `anchor`, extending the
    /// local replica's current waypoint in place when `anchor` is its last
    /// slot (the common "keep typing" case); otherwise branching a fresh
    /// waypoint with `side = Right`.
    pub fn alloc_after(&mut self, anchor: Position, n: usize) -> Result<Vec<Position>> {
        Ok(self.alloc(anchor, n, Side::Right)?.0)
    }

    /// As [`WaypointTree::alloc_after`] but branching `side = Left`, used
    /// to insert immediately before `anchor`. Never extends an existing
    /// waypoint (a left branch is never a tail).
    pub fn alloc_before(&mut self, anchor: Position, n: usize) -> Result<Vec<Position>> {
        Ok(self.alloc(anchor, n, Side::Left)?.0)
    }

    /// Allocate `n` positions as the very first children of the root, used
    /// when inserting into an empty sequence.
    pub fn alloc_at_root(&mut self, n: usize) -> Result<Vec<Position>> {
        self.alloc_after(
            Position {
                waypoint: WaypointId::root(),
                value_index: 0,
            },
            n,
        )
    }

    /// As [`WaypointTree::alloc_after`]/[`WaypointTree::alloc_before`], but
    /// also reports whether an existing waypoint was extended or a new one
    /// branched, which [`crate::list::PositionList`] needs to build the
    /// op it broadcasts to other replicas.
    pub fn alloc_reporting(
        &mut self,
        anchor: Position,
        n: usize,
        side: Side,
    ) -> Result<(Vec<Position>, AllocOutcome)> {
        self.alloc(anchor, n, side)
    }

    fn alloc(&mut self, anchor: Position, n: usize, side: Side) -> Result<(Vec<Position>, AllocOutcome)> {
        if matches!(side, Side::Right) {
            if let Some(tail) = self.local_tail {
                if tail == anchor.waypoint {
                    let length = self.node(tail)?.length;
                    if anchor.value_index + 1 == length || (length == 0 && anchor.value_index == 0)
                    {
                        let start = length;
                        self.nodes.get_mut(&tail).expect("tail exists").length += n;
                        let positions = (start..start + n)
                            .map(|i| Position {
                                waypoint: tail,
                                value_index: i,
                            })
                            .collect();
                        return Ok((
                            positions,
                            AllocOutcome::Extended {
                                waypoint: tail,
                                start,
                                length: n,
                            },
                        ));
                    }
                }
            }
        }
        let counter = self.next_counter();
        let wp = self.branch(anchor, side, self.own_replica, counter, n)?;
        if matches!(side, Side::Right) {
            self.local_tail = Some(wp);
        }
        let positions = (0..n)
            .map(|i| Position {
                waypoint: wp,
                value_index: i,
            })
            .collect();
        let outcome = AllocOutcome::Branched {
            waypoint: wp,
            parent: anchor.waypoint,
            parent_value_index: anchor.value_index,
            side,
            length: n,
        };
        Ok((positions, outcome))
    }

    fn next_counter(&mut self) -> u64 {
        self.counter.next()
    }

    fn branch(
        &mut self,
        anchor: Position,
        side: Side,
        sender: ReplicaId,
        counter: u64,
        length: usize,
    ) -> Result<WaypointId> {
        if !self.contains_waypoint(anchor.waypoint) {
            return Err(CollabError::unknown_child(format!("{:?}", anchor.waypoint)));
        }
        let id = WaypointId { sender, counter };
        self.register_waypoint(id, anchor.waypoint, anchor.value_index, side, length)?;
        Ok(id)
    }

    /// Register a waypoint created elsewhere (remote delivery) or locally.
    /// Idempotent: re-registering the same id with identical fields is a
    /// no-op; registering it with different fields is a
    /// [`CollabError::Malformed`] (the sender violated the invariant that a
    /// waypoint's topology is fixed at creation).
    pub fn register_waypoint(
        &mut self,
        id: WaypointId,
        parent: WaypointId,
        parent_value_index: usize,
        side: Side,
        length: usize,
    ) -> Result<()> {
        if let Some(existing) = self.nodes.get(&id) {
            if existing.parent == parent
                && existing.parent_value_index == parent_value_index
                && existing.side == side
            {
                return Ok(());
            }
            return Err(CollabError::malformed(format!(
                "waypoint {id:?} re-registered with different topology"
            )));
        }
        if !self.contains_waypoint(parent) {
            return Err(CollabError::unknown_child(format!("{parent:?}")));
        }
        self.nodes.insert(
            id,
            WaypointNode {
                parent,
                parent_value_index,
                side,
                length,
            },
        );
        Ok(())
    }

    /// Extend an already-registered waypoint's length, for remote delivery
    /// of a contiguous continuation the local tree already knows about.
    pub fn extend_waypoint(&mut self, id: WaypointId, extra: usize) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| CollabError::unknown_child(format!("{id:?}")))?;
        node.length += extra;
        Ok(())
    }

    /// Replay an [`AllocOutcome`] produced by (and originally applied on)
    /// another replica, returning the positions it allocated. Used for
    /// both remote delivery and local echo, so the two stay on the same
    /// code path.
    pub fn apply_outcome(&mut self, outcome: &AllocOutcome) -> Result<Vec<Position>> {
        match *outcome {
            AllocOutcome::Extended {
                waypoint,
                start,
                length,
            } => {
                let node = self
                    .nodes
                    .get_mut(&waypoint)
                    .ok_or_else(|| CollabError::unknown_child(format!("{waypoint:?}")))?;
                // Idempotent against replaying the same outcome twice: only
                // grow the node if this extension hasn't already landed.
                if node.length < start + length {
                    node.length = start + length;
                }
                Ok((start..start + length)
                    .map(|i| Position {
                        waypoint,
                        value_index: i,
                    })
                    .collect())
            }
            AllocOutcome::Branched {
                waypoint,
                parent,
                parent_value_index,
                side,
                length,
            } => {
                self.register_waypoint(waypoint, parent, parent_value_index, side, length)?;
                Ok((0..length)
                    .map(|i| Position {
                        waypoint,
                        value_index: i,
                    })
                    .collect())
            }
        }
    }

    /// Serialize the full topology: one row per waypoint (root excluded,
    /// it is implicit), in an order that lets [`WaypointTree::load_rows`]
    /// replay them with parents always preceding children.
    pub fn save_rows(&self) -> Vec<WaypointRow> {
        let mut rows: Vec<WaypointRow> = self
            .nodes
            .iter()
            .filter(|(id, _)| !id.is_root())
            .map(|(id, node)| WaypointRow {
                id: *id,
                parent: node.parent,
                parent_value_index: node.parent_value_index,
                side: node.side,
                length: node.length,
            })
            .collect();
        rows.sort_by_key(|r| (r.id.sender, r.id.counter));
        // Topologically stabilize: repeatedly move rows whose parent isn't
        // placed yet to the end. Waypoint trees in practice are shallow
        // enough that this converges in a handful of passes.
        let mut placed: BTreeSet<WaypointId> = BTreeSet::new();
        placed.insert(WaypointId::root());
        let mut ordered = Vec::with_capacity(rows.len());
        let mut remaining = rows;
        while !remaining.is_empty() {
            let mut progressed = false;
            let mut next_remaining = Vec::new();
            for row in remaining {
                if placed.contains(&row.parent) {
                    placed.insert(row.id);
                    ordered.push(row);
                    progressed = true;
                } else {
                    next_remaining.push(row);
                }
            }
            remaining = next_remaining;
            if !progressed && !remaining.is_empty() {
                // Defensive: should be unreachable given append-only
                // construction, but never silently drop rows.
                ordered.extend(remaining.drain(..));
                break;
            }
        }
        ordered
    }

    /// Replay rows produced by [`WaypointTree::save_rows`] into a fresh
    /// tree.
    pub fn load_rows(&mut self, rows: &[WaypointRow]) -> Result<()> {
        for row in rows {
            self.register_waypoint(row.id, row.parent, row.parent_value_index, row.side, row.length)?;
        }
        Ok(())
    }
}

/// What a call to [`WaypointTree::alloc_reporting`] actually did, enough
/// information for another replica (or this one, on local echo) to replay
/// the identical change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocOutcome {
    /// Grew an existing waypoint by `length` slots starting at `start`.
    Extended {
        waypoint: WaypointId,
        start: usize,
        length: usize,
    },
    /// Created a brand new waypoint.
    Branched {
        waypoint: WaypointId,
        parent: WaypointId,
        parent_value_index: usize,
        side: Side,
        length: usize,
    },
}

/// One waypoint's topology, as persisted by `save`/`load`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaypointRow {
    pub id: WaypointId,
    pub parent: WaypointId,
    pub parent_value_index: usize,
    pub side: Side,
    pub length: usize,
}
