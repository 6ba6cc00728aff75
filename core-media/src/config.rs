//! Media cache configuration

use std::time::Duration;

use crate::error::{MediaError, Result};

/// Key-value store key holding the cached media index
pub const DEFAULT_INDEX_KEY: &str = "offline_media.index";

/// Configuration for the offline media manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCacheConfig {
    /// Maximum total bytes of stored media (default: 5GB)
    pub capacity_bytes: u64,

    /// Read buffer size for streamed downloads (default: 64KB)
    pub chunk_size: usize,

    /// Upper bound for one whole transfer (default: 30 minutes)
    pub download_timeout: Duration,

    /// Verify stored bytes against the recorded SHA-256 on read (default: true)
    pub verify_integrity: bool,

    pub index_key: String,
}

impl Default for MediaCacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 5 * 1024 * 1024 * 1024, // 5GB
            chunk_size: 64 * 1024,
            download_timeout: Duration::from_secs(30 * 60),
            verify_integrity: true,
            index_key: DEFAULT_INDEX_KEY.to_string(),
        }
    }
}

impl MediaCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capacity ceiling in bytes.
    pub fn with_capacity(mut self, bytes: u64) -> Self {
        self.capacity_bytes = bytes;
        self
    }

    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_integrity_checks(mut self, enabled: bool) -> Self {
        self.verify_integrity = enabled;
        self
    }

    pub fn with_index_key(mut self, key: impl Into<String>) -> Self {
        self.index_key = key.into();
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.capacity_bytes == 0 {
            return Err(MediaError::Config(
                "capacity_bytes must be greater than 0".to_string(),
            ));
        }

        if self.chunk_size == 0 {
            return Err(MediaError::Config("chunk_size must be greater than 0".to_string()));
        }

        if self.download_timeout.is_zero() {
            return Err(MediaError::Config(
                "download_timeout must be greater than 0".to_string(),
            ));
        }

        if self.index_key.is_empty() {
            return Err(MediaError::Config("index_key cannot be empty".to_string()));
        }

        Ok(())
    }
}
