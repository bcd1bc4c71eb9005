//! Unified error taxonomy for the collab runtime.

use thiserror::Error;

/// Standard result type for collab operations.
pub type Result<T> = std::result::Result<T, CollabError>;

/// The error taxonomy a collab operation can raise.
///
/// `OutOfRange` and `NotOwner` are reported to the caller without corrupting
/// state. `Malformed` and `UnknownChild` on an inbound transaction are fatal
/// for that transaction only: callers should discard the transaction, emit
/// an observability event, and continue delivering others. `InvalidState` is
/// a programmer error and is always fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollabError {
    /// Operation attempted in the wrong runtime lifecycle phase
    /// (e.g. `register_collab` after the runtime went live).
    #[error("invalid state: {message}")]
    InvalidState {
        /// What was attempted and why it is illegal in the current phase.
        message: String,
    },

    /// A received envelope addresses a name-path with no registered collab.
    #[error("unknown child: {name_path}")]
    UnknownChild {
        /// The offending name-path, rendered for diagnostics.
        name_path: String,
    },

    /// Wire bytes failed to decode.
    #[error("malformed message: {message}")]
    Malformed {
        /// Decoder-provided detail.
        message: String,
    },

    /// An indexed operation (insert/delete/positionOf/indexOfPosition) fell
    /// outside `0 ..= length`.
    #[error("index {index} out of range (length {length})")]
    OutOfRange {
        /// The index that was rejected.
        index: usize,
        /// The collection length at the time of the check.
        length: usize,
    },

    /// Operation applied to a collab that does not belong to the caller
    /// (e.g. restoring a foreign child into a set it wasn't created in).
    #[error("not owner: {message}")]
    NotOwner {
        /// Description of the ownership mismatch.
        message: String,
    },

    /// A primitive tried to read causal metadata it never requested.
    #[error("metadata unavailable: {field}")]
    RequestUnavailable {
        /// Name of the metadata field that was read without being requested.
        field: String,
    },
}

impl CollabError {
    /// Build an [`CollabError::InvalidState`].
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Build an [`CollabError::UnknownChild`].
    pub fn unknown_child(name_path: impl Into<String>) -> Self {
        Self::UnknownChild {
            name_path: name_path.into(),
        }
    }

    /// Build an [`CollabError::Malformed`].
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Build an [`CollabError::OutOfRange`].
    pub fn out_of_range(index: usize, length: usize) -> Self {
        Self::OutOfRange { index, length }
    }

    /// Build an [`CollabError::NotOwner`].
    pub fn not_owner(message: impl Into<String>) -> Self {
        Self::NotOwner {
            message: message.into(),
        }
    }

    /// Build an [`CollabError::RequestUnavailable`].
    pub fn request_unavailable(field: impl Into<String>) -> Self {
        Self::RequestUnavailable {
            field: field.into(),
        }
    }
}
