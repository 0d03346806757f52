use std::path::PathBuf;
use thiserror::Error;

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Failures surfaced by [`SessionStore`](super::SessionStore) operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed session file {}: {source}", .path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },
}

impl SessionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Io { .. } => "io",
            Self::Format { .. } => "format",
        }
    }
}

/// Why a session document was rejected, independent of where it came from.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("entry '{key}' carries mismatched session_id '{inner}'")]
    IdMismatch { key: String, inner: String },

    #[error("session entry has an empty id")]
    EmptyId,

    #[error("session '{0}' was updated before it was created")]
    UpdatedBeforeCreated(String),

    #[error("session '{0}' has messages out of order or outside its lifetime")]
    MessagesOutOfOrder(String),
}
