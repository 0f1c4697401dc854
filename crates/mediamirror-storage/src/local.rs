//! Local-disk blob store rooted at the uploads directory.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use mediamirror_common::paths::normalize_key;

use crate::error::{Result, StorageError};
use crate::traits::BlobStore;

/// Filesystem store organised as `{base_dir}/{key}`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    base_dir: PathBuf,
}

impl LocalStore {
    /// Create a new `LocalStore` with the given base directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Absolute path for a storage key.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let key = normalize_key(key)?;
        Ok(self.base_dir.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, key: &str) -> Result<Bytes> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        tracing::trace!(path = %path.display(), size = data.len(), "Wrote local file");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        assert!(!store.exists("2024/05/a.jpg").await.unwrap());
        store
            .write("2024/05/a.jpg", Bytes::from_static(b"abc"))
            .await
            .unwrap();
        assert!(dir.path().join("2024/05/a.jpg").is_file());
        assert!(store.exists("/2024/05/a.jpg").await.unwrap());
        assert_eq!(store.read("2024/05/a.jpg").await.unwrap(), Bytes::from_static(b"abc"));

        store.delete("2024/05/a.jpg").await.unwrap();
        assert!(!store.exists("2024/05/a.jpg").await.unwrap());

        // Already absent is fine
        store.delete("2024/05/a.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let err = store.read("missing.jpg").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        assert!(matches!(
            store.exists("../secret").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("2024")).unwrap();
        let store = LocalStore::new(dir.path());
        assert!(!store.exists("2024").await.unwrap());
    }
}
