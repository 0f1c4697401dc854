//! Storage error types.

use mediamirror_common::StorageLocation;
use thiserror::Error;

/// Errors raised by blob stores and the syncing facade.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    /// A provider was selected but its credentials or bucket are missing.
    #[error("Remote storage is misconfigured: {0}")]
    ProviderMisconfigured(String),

    /// No remote provider is configured at all.
    #[error("Remote storage is disabled")]
    RemoteDisabled,

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("{backend} error: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A pull or push did not complete. The destination may be absent or truncated.
    #[error("Transfer of {path} from {from} to {to} failed: {source}")]
    TransferFailed {
        path: String,
        from: StorageLocation,
        to: StorageLocation,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    pub fn backend<S: Into<String>>(backend: &'static str, message: S) -> Self {
        Self::Backend {
            backend,
            message: message.into(),
        }
    }

    /// Whether this error means the object is simply absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<mediamirror_common::Error> for StorageError {
    fn from(e: mediamirror_common::Error) -> Self {
        match e {
            mediamirror_common::Error::InvalidInput(msg) => Self::InvalidKey(msg),
            mediamirror_common::Error::Io(io) => Self::Io(io),
            other => Self::backend("common", other.to_string()),
        }
    }
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
