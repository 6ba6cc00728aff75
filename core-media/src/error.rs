//! # Offline Media Error Types

use std::time::Duration;

use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors that can occur while storing or reading offline media.
#[derive(Error, Debug)]
pub enum MediaError {
    // ========================================================================
    // Download Errors
    // ========================================================================
    /// The entitlement collaborator refused or failed to sign a location.
    #[error("Entitlement check failed: {0}")]
    Entitlement(String),

    /// Transfer failed before the whole body arrived.
    #[error("Download failed: {0}")]
    Download(String),

    #[error("Download timed out after {0:?}")]
    Timeout(Duration),

    /// The blob cannot fit even in an empty cache.
    #[error("Cache full: {required} bytes needed, capacity is {capacity} bytes")]
    CacheFull { required: u64, capacity: u64 },

    // ========================================================================
    // Cache Errors
    // ========================================================================
    #[error("Media not cached: {0}")]
    NotCached(String),

    /// Stored bytes no longer match the hash recorded at download time.
    #[error("Integrity check failed for {0}")]
    Integrity(String),

    #[error("Media storage error: {0}")]
    Storage(String),

    #[error("Corrupted media index: {0}")]
    CorruptedIndex(String),

    // ========================================================================
    // Input Errors
    // ========================================================================
    #[error("Invalid content category: {0}")]
    InvalidCategory(String),

    #[error("Invalid media cache configuration: {0}")]
    Config(String),
}

impl From<BridgeError> for MediaError {
    fn from(err: BridgeError) -> Self {
        MediaError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
