//! Generation-partitioned response cache
//!
//! Entries live in the key-value store under
//! `<prefix>:<generation>:<METHOD> <url>`, one JSON record each, with the
//! body base64-encoded. The active generation is recorded under
//! `<prefix>.generation`.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bridge_traits::{HttpResponse, KeyValueStore};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{InterceptError, Result};
use crate::policy::Strategy;

/// A stored response plus how and when it was stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub response: HttpResponse,
    pub strategy: Strategy,
    pub generation: String,
    pub stored_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    status: u16,
    headers: HashMap<String, String>,
    body: String,
    strategy: Strategy,
    generation: String,
    stored_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ResponseCache {
    kv: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl ResponseCache {
    pub fn new(kv: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
        }
    }

    fn all_entries_prefix(&self) -> String {
        format!("{}:", self.prefix)
    }

    fn generation_prefix(&self, generation: &str) -> String {
        format!("{}:{}:", self.prefix, generation)
    }

    fn entry_key(&self, generation: &str, identity: &str) -> String {
        format!("{}{}", self.generation_prefix(generation), identity)
    }

    fn generation_key(&self) -> String {
        format!("{}.generation", self.prefix)
    }

    pub async fn active_generation(&self) -> Result<Option<String>> {
        Ok(self.kv.get(&self.generation_key()).await?)
    }

    /// Delete every entry outside `generation`, then record it as active.
    ///
    /// Returns the number of entries deleted.
    pub async fn activate(&self, generation: &str) -> Result<usize> {
        let keep = self.generation_prefix(generation);
        let mut purged = 0usize;

        for key in self.kv.keys_with_prefix(&self.all_entries_prefix()).await? {
            if !key.starts_with(&keep) {
                self.kv.remove(&key).await?;
                purged += 1;
            }
        }

        self.kv.set(&self.generation_key(), generation).await?;
        debug!(generation, purged, "Response cache generation recorded");
        Ok(purged)
    }

    pub async fn get(&self, generation: &str, identity: &str) -> Result<Option<CachedResponse>> {
        let Some(raw) = self.kv.get(&self.entry_key(generation, identity)).await? else {
            return Ok(None);
        };

        let record: StoredRecord = serde_json::from_str(&raw)?;
        let body = BASE64
            .decode(record.body.as_bytes())
            .map_err(|e| InterceptError::Serialization(e.to_string()))?;

        let mut response = HttpResponse::new(record.status, Bytes::from(body));
        response.headers = record.headers;

        Ok(Some(CachedResponse {
            response,
            strategy: record.strategy,
            generation: record.generation,
            stored_at: record.stored_at,
        }))
    }

    pub async fn put(
        &self,
        generation: &str,
        identity: &str,
        response: &HttpResponse,
        strategy: Strategy,
    ) -> Result<()> {
        let record = StoredRecord {
            status: response.status,
            headers: response.headers.clone(),
            body: BASE64.encode(&response.body),
            strategy,
            generation: generation.to_string(),
            stored_at: Utc::now(),
        };
        let raw = serde_json::to_string(&record)?;
        self.kv.set(&self.entry_key(generation, identity), &raw).await?;
        Ok(())
    }

    pub async fn entry_count(&self, generation: &str) -> Result<usize> {
        Ok(self
            .kv
            .keys_with_prefix(&self.generation_prefix(generation))
            .await?
            .len())
    }

    /// Delete every entry of every generation.
    pub async fn purge(&self) -> Result<usize> {
        let keys = self.kv.keys_with_prefix(&self.all_entries_prefix()).await?;
        for key in &keys {
            self.kv.remove(key).await?;
        }
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::MemoryKeyValueStore;

    fn cache() -> (ResponseCache, Arc<MemoryKeyValueStore>) {
        let kv = Arc::new(MemoryKeyValueStore::new());
        (ResponseCache::new(kv.clone(), "ic"), kv)
    }

    #[tokio::test]
    async fn test_binary_body_survives_storage() {
        let (cache, _) = cache();
        let body = vec![0u8, 159, 146, 150, 255];
        let response = HttpResponse::new(200, body.clone()).with_header("Content-Type", "image/png");

        cache
            .put("v1", "GET https://x/a.png", &response, Strategy::CacheFirstWithRefresh)
            .await
            .unwrap();
        let cached = cache.get("v1", "GET https://x/a.png").await.unwrap().unwrap();

        assert_eq!(cached.response.body.as_ref(), body.as_slice());
        assert_eq!(cached.response.header("content-type"), Some("image/png"));
        assert_eq!(cached.strategy, Strategy::CacheFirstWithRefresh);
    }

    #[tokio::test]
    async fn test_activate_purges_other_generations() {
        let (cache, kv) = cache();
        let ok = HttpResponse::new(200, "x");
        cache.put("v1", "GET https://x/1", &ok, Strategy::CacheFirst).await.unwrap();
        cache.put("v1", "GET https://x/2", &ok, Strategy::CacheFirst).await.unwrap();
        cache.put("v2", "GET https://x/3", &ok, Strategy::CacheFirst).await.unwrap();
        kv.set("unrelated", "kept").await.unwrap();

        assert_eq!(cache.activate("v2").await.unwrap(), 2);
        assert_eq!(cache.active_generation().await.unwrap().as_deref(), Some("v2"));
        assert!(cache.get("v1", "GET https://x/1").await.unwrap().is_none());
        assert_eq!(cache.entry_count("v2").await.unwrap(), 1);
        assert_eq!(kv.get("unrelated").await.unwrap().as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_error() {
        let (cache, kv) = cache();
        kv.set("ic:v1:GET https://x/1", "{").await.unwrap();

        assert!(matches!(
            cache.get("v1", "GET https://x/1").await,
            Err(InterceptError::Serialization(_))
        ));
    }
}
