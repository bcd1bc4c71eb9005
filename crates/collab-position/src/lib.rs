//! Dense, totally ordered, non-interleaving positions for collaborative
//! sequences, independent of any particular value type.
//!
//! A [`tree::WaypointTree`] assigns every inserted run of values a
//! waypoint under the existing tree, either extending a waypoint this
//! replica already owns the tail of, or branching a fresh one off an
//! arbitrary anchor. Comparing two positions walks both up to the shared
//! root and compares the resulting root-to-leaf paths lexicographically,
//! which implements the tree's recursive in-order definition without an
//! order-statistic (Fenwick) augmentation. [`list::PositionList`] layers
//! the present/tombstoned bookkeeping a sequence CRDT needs on top.

#![forbid(unsafe_code)]

pub mod ids;
pub mod list;
pub mod tombstones;
pub mod tree;

pub use ids::{Position, Side, WaypointId};
pub use list::{Anchor, InsertOp, PositionList};
pub use tombstones::TombstoneSet;
pub use tree::{AllocOutcome, WaypointRow, WaypointTree};
