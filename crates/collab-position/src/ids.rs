//! Waypoint and position identifiers.

use collab_core::ReplicaId;
use serde::{Deserialize, Serialize};

/// A block of positions created by one replica in one causal forward
/// extension. Field order matters: deriving `Ord` on `(sender, counter)`
/// gives exactly the sibling tie-break rule — lexicographic by sender,
/// then by that sender's own successive waypoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WaypointId {
    pub sender: ReplicaId,
    pub counter: u64,
}

impl WaypointId {
    /// The sentinel root waypoint every other waypoint eventually descends
    /// from. `[0u8; REPLICA_ID_LEN]` can never collide with a real id:
    /// generated ids are drawn only from a 64-symbol printable-ASCII
    /// alphabet that excludes the zero byte.
    pub fn root() -> Self {
        Self {
            sender: ReplicaId::from_bytes([0u8; collab_core::replica::REPLICA_ID_LEN]),
            counter: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        *self == Self::root()
    }
}

/// Which side of the parent slot a waypoint branches from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Sorts before the parent's `parentValueIndex`-th own value.
    Left,
    /// Sorts after it.
    Right,
}

impl Side {
    pub(crate) fn rank(self) -> u8 {
        match self {
            Side::Left => 0,
            Side::Right => 2,
        }
    }
}

/// One addressable slot in a sequence: the `valueIndex`-th value of
/// `waypoint`. Immutable and permanent once allocated; a position is never
/// reused even after the value at it is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub waypoint: WaypointId,
    pub value_index: usize,
}
