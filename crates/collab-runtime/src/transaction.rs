//! Batches several primitives' operations into one stamped transaction.

use crate::handle::CollabHandle;
use crate::primitive::PrimitiveCollab;
use crate::runtime::Runtime;
use collab_causal::MetadataRequest;
use collab_core::wire::WireMessage;
use collab_core::Result;

/// Accumulates messages for a single outbound transaction. A `transact`
/// call's closure receives one of these; every `apply` made through it
/// shares one `senderCounter` rather than allocating one per message.
pub struct TxnBuilder<'a> {
    pub(crate) runtime: &'a mut Runtime,
    pub(crate) messages: Vec<WireMessage>,
    pub(crate) request: MetadataRequest,
}

impl<'a> TxnBuilder<'a> {
    pub(crate) fn new(runtime: &'a mut Runtime) -> Self {
        Self {
            runtime,
            messages: Vec::new(),
            request: MetadataRequest::none(),
        }
    }

    /// Apply a local operation to `handle`'s collab, batching its message
    /// into this transaction. The op is not visible to other collabs in
    /// the same transaction until the whole transaction commits and is
    /// locally echoed.
    pub fn apply<C>(&mut self, handle: &CollabHandle<C>, op: C::Op) -> Result<()>
    where
        C: PrimitiveCollab + 'static,
    {
        let collab = self.runtime.get_mut_at::<C>(handle.path())?;
        let (payload, request) = collab.encode_op(&op);
        self.messages
            .push(WireMessage::new(handle.path().clone(), payload));
        self.request.merge(&request);
        Ok(())
    }

    /// Access the underlying runtime, for composite collabs that need to
    /// read other state while building a transaction.
    pub fn runtime(&self) -> &Runtime {
        self.runtime
    }
}
