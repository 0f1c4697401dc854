//! The blob store abstraction shared by every adapter.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// A key-addressed store for whole files.
///
/// Keys are already-normalised relative paths. Adapters map them onto a
/// directory, a bucket prefix, or a map.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short adapter name used in logs (`local`, `s3`, `gcs`, `memory`).
    fn name(&self) -> &'static str;

    /// Whether an object exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Read the whole object. Absent objects yield `StorageError::NotFound`.
    async fn read(&self, key: &str) -> Result<Bytes>;

    /// Create or overwrite the object.
    async fn write(&self, key: &str, data: Bytes) -> Result<()>;

    /// Delete the object. Deleting an absent object succeeds.
    async fn delete(&self, key: &str) -> Result<()>;
}
