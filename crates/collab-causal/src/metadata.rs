//! Per-message metadata request protocol.

use collab_core::ReplicaId;
use std::collections::BTreeMap;

/// What vector-clock entries a primitive wants attached to a message it
/// sends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VcRequest {
    /// No vector-clock entries requested.
    #[default]
    None,
    /// Exactly the named entries.
    Entries(Vec<ReplicaId>),
    /// Every entry currently in the local vector clock.
    All,
    /// Whatever entries are needed so a remote receiver never has to look
    /// beyond what this replica observed. No primitive currently has a way
    /// to report exactly which entries its local echo read, so this
    /// resolves to the same thing as `All`: a safe superset rather than an
    /// under-inclusive guess.
    Automatic,
}

/// A primitive's request for causal metadata on a message it is about to
/// send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRequest {
    /// Vector-clock entries to attach.
    pub vc: VcRequest,
    /// Whether to attach the current wall-clock time.
    pub wall_clock_time: bool,
    /// Whether to attach the current Lamport timestamp.
    pub lamport_timestamp: bool,
}

impl MetadataRequest {
    /// No metadata requested beyond the mandatory sender/senderCounter.
    pub fn none() -> Self {
        Self::default()
    }

    /// Request the named vector-clock entries.
    pub fn entries(replicas: impl IntoIterator<Item = ReplicaId>) -> Self {
        Self {
            vc: VcRequest::Entries(replicas.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Request the full vector clock, a Lamport timestamp, and wall-clock
    /// time — what an LWW register needs.
    pub fn lww() -> Self {
        Self {
            vc: VcRequest::None,
            wall_clock_time: true,
            lamport_timestamp: true,
        }
    }

    /// Request automatic tracking of whatever the local echo reads.
    pub fn automatic() -> Self {
        Self {
            vc: VcRequest::Automatic,
            ..Self::default()
        }
    }

    /// Widen `self` to also satisfy `other`, for batching several
    /// primitives' requests into the one stamp a transaction carries.
    /// `Automatic` dominates (any automatic request makes the whole
    /// transaction automatic); otherwise `All` dominates `Entries`, and
    /// `Entries` sets are unioned.
    pub fn merge(&mut self, other: &MetadataRequest) {
        self.vc = match (std::mem::take(&mut self.vc), other.vc.clone()) {
            (VcRequest::Automatic, _) | (_, VcRequest::Automatic) => VcRequest::Automatic,
            (VcRequest::All, _) | (_, VcRequest::All) => VcRequest::All,
            (VcRequest::None, other) => other,
            (this, VcRequest::None) => this,
            (VcRequest::Entries(mut a), VcRequest::Entries(b)) => {
                for r in b {
                    if !a.contains(&r) {
                        a.push(r);
                    }
                }
                VcRequest::Entries(a)
            }
        };
        self.wall_clock_time |= other.wall_clock_time;
        self.lamport_timestamp |= other.lamport_timestamp;
    }
}

/// Resolve `vc` against a snapshot `(replica -> counter)` view.
pub fn resolve_static(
    vc: &VcRequest,
    snapshot: impl Fn(&ReplicaId) -> u64,
    all_entries: impl Iterator<Item = (ReplicaId, u64)>,
) -> BTreeMap<ReplicaId, u64> {
    match vc {
        VcRequest::None => BTreeMap::new(),
        VcRequest::Entries(replicas) => replicas.iter().map(|r| (*r, snapshot(r))).collect(),
        VcRequest::All | VcRequest::Automatic => all_entries.collect(),
    }
}
