//! Storage Abstractions
//!
//! Provides platform-agnostic traits for the two durable stores the offline
//! layer relies on: a small string key-value store used for queue and index
//! bookkeeping, and a blob-capable store for large media payloads.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Durable key-value storage trait
///
/// Abstracts platform-specific small-record storage:
/// - Desktop: SQLite-backed table
/// - iOS: UserDefaults / file in Application Support
/// - Android: DataStore
/// - Web: localStorage / IndexedDB
///
/// Values are opaque strings; callers serialize structured records
/// themselves (usually as JSON).
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::KeyValueStore;
///
/// async fn remember_generation(store: &dyn KeyValueStore) -> Result<()> {
///     store.set("intercept.generation", "v42").await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Retrieve a value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value; deleting a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;

    /// List all keys
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Check if a key exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// List keys starting with `prefix`
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .list_keys()
            .await?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect())
    }
}

/// Durable blob storage trait
///
/// Abstracts storage of large binary payloads:
/// - Desktop: one file per blob under the app cache directory
/// - Mobile: sandboxed cache directory
/// - Web: IndexedDB / OPFS
///
/// Writes must be all-or-nothing: a failed `put` must never leave a
/// truncated blob readable under `key`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a blob, replacing any previous one
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;

    /// Read an entire blob
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Delete a blob; deleting a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;

    /// Check if a blob exists
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Size of a stored blob in bytes
    async fn size(&self, key: &str) -> Result<Option<u64>>;

    /// Locally resolvable locator (file URL, object URL) for a stored blob
    async fn locate(&self, key: &str) -> Result<Option<String>>;

    /// List all blob keys
    async fn keys(&self) -> Result<Vec<String>>;

    /// Total bytes used by all blobs
    async fn total_size(&self) -> Result<u64> {
        let mut total = 0u64;
        for key in self.keys().await? {
            total += self.size(&key).await?.unwrap_or(0);
        }
        Ok(total)
    }
}
