//! Cache statistics and download progress

use serde::{Deserialize, Serialize};

use crate::models::MediaKey;

/// Statistics about the offline media cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaCacheStats {
    /// Number of indexed entries
    pub entries: usize,

    /// Entries whose rental window has passed
    pub expired_entries: usize,

    /// Sum of `size_bytes` over all entries
    pub total_bytes: u64,

    pub capacity_bytes: u64,
}

impl MediaCacheStats {
    /// Cache usage as a percentage of capacity.
    pub fn usage_percentage(&self) -> f64 {
        if self.capacity_bytes == 0 {
            return 0.0;
        }

        (self.total_bytes as f64 / self.capacity_bytes as f64) * 100.0
    }

    /// Returns true if the cache is near capacity (>90%).
    pub fn is_near_capacity(&self) -> bool {
        self.usage_percentage() > 90.0
    }

    pub fn available_bytes(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.total_bytes)
    }
}

/// Progress of one in-flight download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub key: MediaKey,

    pub received_bytes: u64,

    /// Announced length; `None` when the server sent no content length
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    pub fn new(key: MediaKey, total_bytes: Option<u64>) -> Self {
        Self {
            key,
            received_bytes: 0,
            total_bytes,
        }
    }

    /// Fraction in `0.0..=1.0`, or `None` when progress is indeterminate.
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(1.0),
            Some(total) => Some((self.received_bytes as f64 / total as f64).min(1.0)),
            None => None,
        }
    }

    pub fn percent(&self) -> Option<u8> {
        self.fraction().map(|f| (f * 100.0).floor() as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentCategory;

    #[test]
    fn test_usage_percentage() {
        let stats = MediaCacheStats {
            entries: 2,
            expired_entries: 0,
            total_bytes: 950,
            capacity_bytes: 1000,
        };
        assert_eq!(stats.usage_percentage(), 95.0);
        assert!(stats.is_near_capacity());
        assert_eq!(stats.available_bytes(), 50);
    }

    #[test]
    fn test_progress_fraction() {
        let key = MediaKey::new("1", ContentCategory::Movie);
        let mut progress = DownloadProgress::new(key.clone(), Some(200));
        progress.received_bytes = 50;
        assert_eq!(progress.percent(), Some(25));

        let unknown = DownloadProgress::new(key, None);
        assert_eq!(unknown.fraction(), None);
    }
}
