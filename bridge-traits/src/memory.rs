//! In-memory store implementations
//!
//! Used by tests and by hosts that do not need persistence across restarts.
//! Both stores can be switched into a failing mode to exercise storage-error
//! paths (quota exceeded, corrupted database).

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{BridgeError, Result};
use crate::storage::{BlobStore, KeyValueStore};

/// Key-value store kept in a `BTreeMap`
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set`/`remove` fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `get`/`list_keys` fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BridgeError::Storage("quota exceeded".to_string()));
        }
        Ok(())
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BridgeError::Storage("store unreadable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_read()?;
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_write()?;
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check_write()?;
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        self.check_read()?;
        Ok(self.entries.lock().keys().cloned().collect())
    }
}

/// Blob store kept in a `BTreeMap`; locators use the `memory://` scheme
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Bytes>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `get`/`locate` fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BridgeError::Storage("disk I/O error".to_string()));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BridgeError::Storage("quota exceeded".to_string()));
        }
        self.blobs.lock().insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.check_reads()?;
        Ok(self.blobs.lock().get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.blobs.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.blobs.lock().contains_key(key))
    }

    async fn size(&self, key: &str) -> Result<Option<u64>> {
        Ok(self.blobs.lock().get(key).map(|b| b.len() as u64))
    }

    async fn locate(&self, key: &str) -> Result<Option<String>> {
        self.check_reads()?;
        Ok(self
            .blobs
            .lock()
            .contains_key(key)
            .then(|| format!("memory://{}", key)))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.blobs.lock().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_key_value_round_trip_and_prefix() {
        let store = MemoryKeyValueStore::new();
        store.set("intercept.v1.a", "1").await.unwrap();
        store.set("intercept.v2.b", "2").await.unwrap();
        store.set("sync_queue.pending", "[]").await.unwrap();

        assert_eq!(store.get("intercept.v1.a").await.unwrap(), Some("1".into()));
        let keys = store.keys_with_prefix("intercept.").await.unwrap();
        assert_eq!(keys.len(), 2);

        store.remove("intercept.v1.a").await.unwrap();
        assert!(!store.has_key("intercept.v1.a").await.unwrap());
    }

    #[tokio::test]
    async fn test_key_value_failing_writes() {
        let store = MemoryKeyValueStore::new();
        store.set_fail_writes(true);
        assert!(matches!(
            store.set("k", "v").await,
            Err(BridgeError::Storage(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_blob_store_accounting() {
        let store = MemoryBlobStore::new();
        store.put("42:movie", Bytes::from_static(b"abcd")).await.unwrap();
        store.put("7:episode", Bytes::from_static(b"xy")).await.unwrap();

        assert_eq!(store.size("42:movie").await.unwrap(), Some(4));
        assert_eq!(store.total_size().await.unwrap(), 6);
        assert_eq!(
            store.locate("42:movie").await.unwrap(),
            Some("memory://42:movie".to_string())
        );
        assert_eq!(store.locate("missing").await.unwrap(), None);
    }
}
