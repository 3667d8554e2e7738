use crate::domain::job::JobState;

/// Top level error type for the scheduling core.
///
/// Mirrors the five error kinds from the error-handling design: submissions
/// that fail validation, wire payloads that fail to decode, references to
/// entities that don't exist, transient client-unavailability, and anything
/// else that indicates an internal bug or infrastructure failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("admission rejected: {0}")]
    Admission(String),

    #[error("failed to decode wire payload: {0}")]
    Decode(#[from] crate::wire::error::WireError),

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: &'static str, id: String },

    #[error("no client available for job {job_id}")]
    ClientUnavailable { job_id: String },

    #[error("invalid state transition for job {job_id}: {from:?} -> {to:?}")]
    InvalidStateTransition {
        job_id: String,
        from: JobState,
        to: JobState,
    },

    #[error("repository error: {0}")]
    Repository(#[from] crate::repository::error::RepositoryError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn admission(msg: impl Into<String>) -> Self {
        Error::Admission(msg.into())
    }

    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    pub fn client_unavailable(job_id: impl Into<String>) -> Self {
        Error::ClientUnavailable { job_id: job_id.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether this failure should be surfaced to a submitting client as a
    /// rejection rather than logged as an operational fault.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Error::Admission(_) | Error::Decode(_) | Error::NotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
