//! The syncing facade over the local and remote stores.
//!
//! Pull and push are whole-file copies through memory. They are not
//! transactional: a failure part-way leaves the destination absent or
//! truncated, and nothing retries automatically.

use std::sync::Arc;

use bytes::Bytes;
use mediamirror_common::paths::normalize_key;
use mediamirror_common::StorageLocation;

use crate::error::{Result, StorageError};
use crate::traits::BlobStore;

/// What the remote side of the mirror currently is.
#[derive(Clone)]
pub enum RemoteState {
    /// No provider selected. Remote operations are skipped by callers.
    Disabled,
    /// A provider was selected but cannot be used; every remote operation fails.
    Misconfigured(String),
    /// A working remote store.
    Ready(Arc<dyn BlobStore>),
}

impl std::fmt::Debug for RemoteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "Disabled"),
            Self::Misconfigured(reason) => f.debug_tuple("Misconfigured").field(reason).finish(),
            Self::Ready(store) => f.debug_tuple("Ready").field(&store.name()).finish(),
        }
    }
}

/// Existence check, pull, push and delete keyed by relative path.
#[derive(Clone)]
pub struct SyncingStore {
    local: Arc<dyn BlobStore>,
    remote: RemoteState,
}

impl SyncingStore {
    pub fn new(local: Arc<dyn BlobStore>, remote: RemoteState) -> Self {
        Self { local, remote }
    }

    pub fn remote_state(&self) -> &RemoteState {
        &self.remote
    }

    /// False only when no provider is configured at all.
    pub fn remote_enabled(&self) -> bool {
        !matches!(self.remote, RemoteState::Disabled)
    }

    fn store(&self, location: StorageLocation) -> Result<&Arc<dyn BlobStore>> {
        match location {
            StorageLocation::Local => Ok(&self.local),
            StorageLocation::Remote => match &self.remote {
                RemoteState::Ready(store) => Ok(store),
                RemoteState::Disabled => Err(StorageError::RemoteDisabled),
                RemoteState::Misconfigured(reason) => {
                    Err(StorageError::ProviderMisconfigured(reason.clone()))
                }
            },
        }
    }

    /// Whether `path` exists at `location`. Lookup errors count as absent.
    pub async fn has(&self, location: StorageLocation, path: &str) -> bool {
        let result = match self.store(location) {
            Ok(store) => match normalize_key(path) {
                Ok(key) => store.exists(&key).await,
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(found) => found,
            Err(StorageError::RemoteDisabled) => false,
            Err(e) => {
                tracing::warn!(%location, path, error = %e, "Existence check failed");
                false
            }
        }
    }

    /// Read a file from one location.
    pub async fn read(&self, location: StorageLocation, path: &str) -> Result<Bytes> {
        let key = normalize_key(path)?;
        self.store(location)?.read(&key).await
    }

    /// Write a file to one location.
    pub async fn write(&self, location: StorageLocation, path: &str, data: Bytes) -> Result<()> {
        let key = normalize_key(path)?;
        self.store(location)?.write(&key, data).await
    }

    /// Copy `path` from remote to local.
    ///
    /// Succeeds without copying when the file is already local.
    pub async fn pull(&self, path: &str) -> Result<()> {
        let key = normalize_key(path)?;
        if self.has(StorageLocation::Local, &key).await {
            tracing::trace!(path = %key, "Pull skipped, already local");
            return Ok(());
        }
        self.copy(StorageLocation::Remote, StorageLocation::Local, &key)
            .await
    }

    /// Copy `path` from local to remote, overwriting any remote object.
    pub async fn push(&self, path: &str) -> Result<()> {
        let key = normalize_key(path)?;
        self.copy(StorageLocation::Local, StorageLocation::Remote, &key)
            .await
    }

    async fn copy(&self, from: StorageLocation, to: StorageLocation, key: &str) -> Result<()> {
        let wrap = |source: StorageError| StorageError::TransferFailed {
            path: key.to_string(),
            from,
            to,
            source: Box::new(source),
        };

        let source = self.store(from).map_err(wrap)?;
        let destination = self.store(to).map_err(wrap)?;

        let data = source.read(key).await.map_err(wrap)?;
        let size = data.len();
        destination.write(key, data).await.map_err(wrap)?;

        tracing::debug!(path = key, %from, %to, size, "Transferred file");
        Ok(())
    }

    /// Delete `path` at `location`.
    ///
    /// Returns `true` when the file is absent afterwards, including when it
    /// was never there. A disabled remote has nothing to delete.
    pub async fn delete(&self, location: StorageLocation, path: &str) -> bool {
        let key = match normalize_key(path) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(path, error = %e, "Refusing to delete invalid key");
                return false;
            }
        };

        let store = match self.store(location) {
            Ok(store) => store,
            Err(StorageError::RemoteDisabled) => return true,
            Err(e) => {
                tracing::warn!(%location, path = %key, error = %e, "Delete failed");
                return false;
            }
        };

        match store.delete(&key).await {
            Ok(()) => {
                tracing::debug!(%location, path = %key, "Deleted file");
                true
            }
            Err(e) if e.is_not_found() => true,
            Err(e) => {
                tracing::warn!(%location, path = %key, error = %e, "Delete failed");
                false
            }
        }
    }
}
