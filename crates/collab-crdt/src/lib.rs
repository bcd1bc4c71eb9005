//! CRDT primitives built on [`collab_runtime`]'s `Collab`/`PrimitiveCollab`
//! base and [`collab_position`]'s waypoint engine: last-write-wins and
//! multi-value registers, a grow-only counter, an add-wins set, a set of
//! dynamically constructed child collabs, a lazily populated map of child
//! collabs, a last-write-wins value map built on it, and a value list with
//! cursors.

#![forbid(unsafe_code)]

pub mod counter;
pub mod dynamic_set;
pub mod lazy_map;
pub mod list;
pub mod register;
pub mod set;
pub mod value_map;

pub use counter::GCounter;
pub use dynamic_set::{DynamicSet, DynamicSetEvent, DynamicSetOp};
pub use lazy_map::{key_of, LazyMap};
pub use list::{Cursor, CursorBinding, ListOp, ValueList};
pub use register::{LwwRegister, MultiValueRegister, OptionalOp, OptionalRegister, SetEvent};
pub use set::{AddWinsSet, SetEvent as AddWinsSetEvent, SetOp};
pub use value_map::{delete, get, set as set_value, value_handle, ValueHandle, ValueMap, ValueMapEvent};
