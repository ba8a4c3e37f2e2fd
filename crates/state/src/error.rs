use cluster_state_storage::StorageError;

/// Errors surfaced by the machine removal protocol and the backup catalog.
///
/// Assertion failures from the store never leak out as `Storage`; each
/// protocol translates them into the domain variant that explains them.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Lookup or mutation target is absent.
    #[error("{0} not found")]
    NotFound(String),

    /// An insert with a caller-chosen id collided with an existing record.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// A lifecycle precondition did not hold.
    #[error("{0}")]
    InvalidState(String),

    /// The input record is structurally incomplete.
    #[error("invalid metadata: {0}")]
    Validation(String),

    /// A stored document could not be mapped to or from its record type.
    #[error("cannot convert {what}: {source}")]
    Serialization {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// The store is unreachable or failed internally.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StateError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StateError::AlreadyExists(_))
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, StateError::InvalidState(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StateError::Validation(_))
    }

    pub(crate) fn serialization(what: impl Into<String>, source: serde_json::Error) -> Self {
        StateError::Serialization {
            what: what.into(),
            source,
        }
    }
}

pub type Result<T, E = StateError> = std::result::Result<T, E>;
