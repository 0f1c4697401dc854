//! In-memory blob store.
//!
//! Stands in for a remote bucket in tests. Writes and reads can be switched
//! to fail so callers can exercise transfer failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use mediamirror_common::paths::normalize_key;
use parking_lot::RwLock;

use crate::error::{Result, StorageError};
use crate::traits::BlobStore;

/// A map-backed store. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
    fail_writes: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `write` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `read` fail (or succeed again).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let key = normalize_key(key)?;
        Ok(self.objects.read().contains_key(&key))
    }

    async fn read(&self, key: &str) -> Result<Bytes> {
        let key = normalize_key(key)?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::backend("memory", "injected read failure"));
        }
        self.objects
            .read()
            .get(&key)
            .cloned()
            .ok_or(StorageError::NotFound(key))
    }

    async fn write(&self, key: &str, data: Bytes) -> Result<()> {
        let key = normalize_key(key)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::backend("memory", "injected write failure"));
        }
        self.objects.write().insert(key, data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = normalize_key(key)?;
        self.objects.write().remove(&key);
        Ok(())
    }
}
