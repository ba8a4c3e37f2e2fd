use crate::op::Assertion;

/// All errors that can be returned by a DocumentStore implementation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    /// An operation's precondition did not hold. The whole batch was
    /// rejected and nothing was applied.
    #[error("transaction aborted: assertion {assertion} failed on {collection}/{doc_id} (op {index})")]
    AssertionFailed {
        index: usize,
        collection: String,
        doc_id: String,
        assertion: Assertion,
    },

    /// An insert targeted an id that is already taken and the operation did
    /// not opt into keeping the existing document.
    #[error("transaction aborted: document {collection}/{doc_id} already exists (op {index})")]
    DocumentExists {
        index: usize,
        collection: String,
        doc_id: String,
    },

    /// The operation payload is not something the store can hold
    /// (e.g. a non-object document).
    #[error("invalid document {collection}/{doc_id}: {reason}")]
    InvalidDocument {
        collection: String,
        doc_id: String,
        reason: String,
    },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// True when the batch was rejected because of a failed precondition
    /// rather than an infrastructure problem.
    pub fn is_aborted(&self) -> bool {
        matches!(
            self,
            StorageError::AssertionFailed { .. } | StorageError::DocumentExists { .. }
        )
    }

    /// Index of the operation that caused the batch to abort, if any.
    pub fn failed_op(&self) -> Option<usize> {
        match self {
            StorageError::AssertionFailed { index, .. }
            | StorageError::DocumentExists { index, .. } => Some(*index),
            _ => None,
        }
    }
}
