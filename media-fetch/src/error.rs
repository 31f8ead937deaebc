//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
///
/// Variants map onto the fault taxonomy of the download pipeline; [`Error::kind`]
/// gives the stable name used when a fault is written to a job log.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    /// The job could not be handed to the task queue.
    #[error("{0}")]
    QueueDispatch(String),

    /// The external extractor reported a failure.
    #[error("{0}")]
    Extractor(String),

    /// The extractor finished but no deliverable could be found.
    #[error("{0}")]
    Verification(String),

    /// A job exceeded its deadline or was revoked.
    #[error("{0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {op} '{}': {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn extractor(msg: impl Into<String>) -> Self {
        Self::Extractor(msg.into())
    }

    pub fn verification(msg: impl Into<String>) -> Self {
        Self::Verification(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Stable fault name, used as the `{kind}` half of persisted error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DatabaseSqlx(_) => "DatabaseFault",
            Self::Serialization(_) => "SerializationFault",
            Self::InvalidStateTransition { .. } => "InvalidStateTransition",
            Self::NotFound { .. } => "NotFound",
            Self::Validation(_) => "ValidationFault",
            Self::QueueDispatch(_) => "QueueDispatchFault",
            Self::Extractor(_) => "ExtractorFault",
            Self::Verification(_) => "VerificationFault",
            Self::Cancelled(_) => "CancelledFault",
            Self::Io(_) | Self::IoPath { .. } => "FilesystemFault",
            Self::ApiError(_) => "ApiFault",
            Self::Other(_) => "InternalFault",
        }
    }

    /// Short `"{kind}: {message}"` form stored on failed job logs.
    pub fn summary(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}
