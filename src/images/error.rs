//! Per-size failures of the reconciliation workflow.
//!
//! These never abort a request. They are caught at the workflow boundary and
//! rendered into the `generation` block of the size's status entry.

use mediamirror_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The original is absent locally and could not be pulled from the remote.
    #[error("Original {path} is not available locally or remotely")]
    SourceUnavailable { path: String },

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Transfer failed: {0}")]
    TransferFailed(#[source] StorageError),

    #[error("Remote storage is misconfigured: {0}")]
    ProviderMisconfigured(String),

    #[error("Size '{0}' is not defined")]
    PresetNotDefined(String),
}

impl SyncError {
    /// Stable machine-readable name used in status payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::GenerationFailed(_) => "generation_failed",
            Self::TransferFailed(_) => "transfer_failed",
            Self::ProviderMisconfigured(_) => "provider_misconfigured",
            Self::PresetNotDefined(_) => "preset_not_defined",
        }
    }

    pub fn generation<S: Into<String>>(message: S) -> Self {
        Self::GenerationFailed(message.into())
    }
}

impl From<StorageError> for SyncError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::ProviderMisconfigured(reason) => Self::ProviderMisconfigured(reason),
            StorageError::TransferFailed {
                path,
                from,
                to,
                source,
            } => match *source {
                StorageError::ProviderMisconfigured(reason) => Self::ProviderMisconfigured(reason),
                inner => Self::TransferFailed(StorageError::TransferFailed {
                    path,
                    from,
                    to,
                    source: Box::new(inner),
                }),
            },
            other => Self::TransferFailed(other),
        }
    }
}
