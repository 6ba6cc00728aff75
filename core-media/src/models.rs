//! Offline media records

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MediaError;

/// Kind of playable content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentCategory {
    Movie,
    Episode,
}

impl ContentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::Movie => "movie",
            ContentCategory::Episode => "episode",
        }
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentCategory {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(ContentCategory::Movie),
            "episode" => Ok(ContentCategory::Episode),
            other => Err(MediaError::InvalidCategory(other.to_string())),
        }
    }
}

/// Composite identity of a cached asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MediaKey {
    pub content_id: String,
    pub category: ContentCategory,
}

impl MediaKey {
    pub fn new(content_id: impl Into<String>, category: ContentCategory) -> Self {
        Self {
            content_id: content_id.into(),
            category,
        }
    }

    /// Key used in the blob store: `"<content_id>:<category>"`.
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.content_id, self.category)
    }

    /// Inverse of [`storage_key`](Self::storage_key). The category is taken
    /// after the last `:` so content ids may themselves contain colons.
    pub fn parse_storage_key(key: &str) -> Result<Self, MediaError> {
        let (content_id, category) = key
            .rsplit_once(':')
            .ok_or_else(|| MediaError::InvalidCategory(key.to_string()))?;
        Ok(Self::new(content_id, category.parse()?))
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.content_id, self.category)
    }
}

/// Index record of a locally stored asset. The bytes live in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedMedia {
    pub key: MediaKey,
    pub size_bytes: u64,
    /// End of the rental window; the blob stays stored past it until purged
    pub expires_at: DateTime<Utc>,
    pub rental_reference: Option<String>,
    /// SHA-256 hex digest of the blob
    pub content_hash: String,
    pub downloaded_at: DateTime<Utc>,
}

impl CachedMedia {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Local locator for playing a cached asset without the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackHandle {
    pub key: MediaKey,
    /// `file://` URL on desktop, store-specific URI elsewhere
    pub locator: String,
    pub size_bytes: u64,
    pub expires_at: DateTime<Utc>,
}

/// Result of [`OfflineMediaManager::download`](crate::OfflineMediaManager::download).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed(CachedMedia),
    Failed { reason: String },
}

impl DownloadOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, DownloadOutcome::Completed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_storage_key_format() {
        let key = MediaKey::new("tt0111161", ContentCategory::Movie);
        assert_eq!(key.storage_key(), "tt0111161:movie");
        assert_eq!(MediaKey::parse_storage_key("tt0111161:movie").unwrap(), key);
    }

    #[test]
    fn test_storage_key_with_colon_in_id() {
        let key = MediaKey::new("show:s01e02", ContentCategory::Episode);
        assert_eq!(MediaKey::parse_storage_key(&key.storage_key()).unwrap(), key);
    }

    #[test]
    fn test_invalid_category_rejected() {
        assert!("trailer".parse::<ContentCategory>().is_err());
        assert!(MediaKey::parse_storage_key("no-category").is_err());
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let media = CachedMedia {
            key: MediaKey::new("1", ContentCategory::Movie),
            size_bytes: 10,
            expires_at: now,
            rental_reference: None,
            content_hash: String::new(),
            downloaded_at: now - Duration::hours(1),
        };
        assert!(media.is_expired(now));
        assert!(!media.is_expired(now - Duration::seconds(1)));
    }
}
