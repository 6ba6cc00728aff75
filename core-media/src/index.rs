//! Durable index of cached media records
//!
//! One JSON array under a single key-value entry. The blob store holds the
//! bytes; this index is the authority on what is cached.

use std::collections::BTreeMap;
use std::sync::Arc;

use bridge_traits::KeyValueStore;
use tracing::debug;

use crate::error::{MediaError, Result};
use crate::models::{CachedMedia, MediaKey};

pub type IndexMap = BTreeMap<MediaKey, CachedMedia>;

pub struct MediaIndex {
    kv: Arc<dyn KeyValueStore>,
    key: String,
}

impl MediaIndex {
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self { kv, key: key.into() }
    }

    pub async fn load(&self) -> Result<IndexMap> {
        let Some(raw) = self.kv.get(&self.key).await? else {
            return Ok(IndexMap::new());
        };

        let records: Vec<CachedMedia> =
            serde_json::from_str(&raw).map_err(|e| MediaError::CorruptedIndex(e.to_string()))?;
        Ok(records.into_iter().map(|m| (m.key.clone(), m)).collect())
    }

    pub async fn save(&self, index: &IndexMap) -> Result<()> {
        if index.is_empty() {
            self.kv.remove(&self.key).await?;
        } else {
            let records: Vec<&CachedMedia> = index.values().collect();
            let raw = serde_json::to_string(&records)
                .map_err(|e| MediaError::Storage(format!("Failed to serialize index: {}", e)))?;
            self.kv.set(&self.key, &raw).await?;
        }
        debug!(entries = index.len(), "Persisted media index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentCategory;
    use bridge_traits::MemoryKeyValueStore;
    use chrono::Utc;

    fn media(id: &str) -> CachedMedia {
        CachedMedia {
            key: MediaKey::new(id, ContentCategory::Episode),
            size_bytes: 3,
            expires_at: Utc::now(),
            rental_reference: Some("rental-1".to_string()),
            content_hash: "abc".to_string(),
            downloaded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_load_missing_is_empty() {
        let index = MediaIndex::new(Arc::new(MemoryKeyValueStore::new()), "idx");
        assert!(index.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let index = MediaIndex::new(kv.clone(), "idx");

        let mut map = IndexMap::new();
        for m in [media("a"), media("b")] {
            map.insert(m.key.clone(), m);
        }
        index.save(&map).await.unwrap();

        assert_eq!(MediaIndex::new(kv, "idx").load().await.unwrap(), map);
    }

    #[tokio::test]
    async fn test_corrupted_index_reported() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set("idx", "[{").await.unwrap();

        assert!(matches!(
            MediaIndex::new(kv, "idx").load().await,
            Err(MediaError::CorruptedIndex(_))
        ));
    }
}
