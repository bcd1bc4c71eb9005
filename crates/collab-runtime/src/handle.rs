//! Typed handles to registered collabs.

use collab_core::wire::NamePath;
use std::marker::PhantomData;

/// A typed reference to a collab registered in a [`crate::runtime::Runtime`]
/// tree, returned by `register` and accepted back by `apply`/`transact`/
/// `with`. Carries no borrow of the runtime itself, so callers can hold
/// several handles at once.
pub struct CollabHandle<C> {
    path: NamePath,
    _marker: PhantomData<fn() -> C>,
}

impl<C> CollabHandle<C> {
    pub(crate) fn new(path: NamePath) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    /// The name-path this handle addresses.
    pub fn path(&self) -> &NamePath {
        &self.path
    }

    /// A handle to a child of this collab, addressed by a single extra
    /// name-path segment. Does not check that the child exists; resolution
    /// happens lazily the next time the handle is used.
    pub fn child<D>(&self, name: impl Into<String>) -> CollabHandle<D> {
        CollabHandle::new(self.path.child(name))
    }
}

impl<C> Clone for CollabHandle<C> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _marker: PhantomData,
        }
    }
}

impl<C> std::fmt::Debug for CollabHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CollabHandle({})", self.path)
    }
}
