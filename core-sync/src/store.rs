//! Durable layout of the pending queue
//!
//! The whole queue is one JSON array under a single key, so every mutation
//! is one atomic `set` on the underlying store. Dead letters live under a
//! second key with the same layout.

use std::sync::Arc;

use bridge_traits::KeyValueStore;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::task::{DeadLetter, SyncTask};

pub struct QueueStore {
    kv: Arc<dyn KeyValueStore>,
    pending_key: String,
    dead_letter_key: String,
}

impl QueueStore {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        pending_key: impl Into<String>,
        dead_letter_key: impl Into<String>,
    ) -> Self {
        Self {
            kv,
            pending_key: pending_key.into(),
            dead_letter_key: dead_letter_key.into(),
        }
    }

    pub async fn load_pending(&self) -> Result<Vec<SyncTask>> {
        self.load(&self.pending_key).await
    }

    pub async fn save_pending(&self, tasks: &[SyncTask]) -> Result<()> {
        self.save(&self.pending_key, tasks).await
    }

    pub async fn load_dead_letters(&self) -> Result<Vec<DeadLetter>> {
        self.load(&self.dead_letter_key).await
    }

    pub async fn save_dead_letters(&self, letters: &[DeadLetter]) -> Result<()> {
        self.save(&self.dead_letter_key, letters).await
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let Some(raw) = self.kv.get(key).await? else {
            return Ok(Vec::new());
        };

        serde_json::from_str(&raw).map_err(|e| SyncError::Corrupted {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    async fn save<T: Serialize>(&self, key: &str, records: &[T]) -> Result<()> {
        if records.is_empty() {
            self.kv.remove(key).await?;
        } else {
            let raw = serde_json::to_string(records)
                .map_err(|e| SyncError::Storage(format!("Failed to serialize queue: {}", e)))?;
            self.kv.set(key, &raw).await?;
        }
        debug!(key, records = records.len(), "Persisted queue records");
        Ok(())
    }
}
