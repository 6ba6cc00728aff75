//! # Offline Media Module
//!
//! Stores rented titles locally for playback without network access.
//!
//! ## Overview
//!
//! - Streamed downloads from signed locations issued by an [`EntitlementProvider`]
//! - Blobs in a [`BlobStore`](bridge_traits::BlobStore), keyed `"<content_id>:<category>"`
//! - Index of [`CachedMedia`] records in the key-value store
//! - Capacity ceiling with eviction of the entries ending soonest
//! - Expiry-aware playability checks and revocation cleanup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_media::{ContentCategory, DownloadOutcome, OfflineMediaManager};
//!
//! let outcome = manager
//!     .download("tt0111161", ContentCategory::Movie, rental.expires_at, Some(rental.id), |p| {
//!         ui.set_progress(p.fraction());
//!     })
//!     .await;
//!
//! if let DownloadOutcome::Failed { reason } = outcome {
//!     ui.show_error(reason);
//! }
//!
//! if manager.is_playable("tt0111161", ContentCategory::Movie).await {
//!     let handle = manager.playback_handle("tt0111161", ContentCategory::Movie).await;
//! }
//! ```

pub mod config;
pub mod entitlement;
pub mod error;
pub mod index;
pub mod manager;
pub mod models;
pub mod stats;

pub use config::MediaCacheConfig;
pub use entitlement::{EntitlementProvider, SignedLocation, StorageSignedUrlProvider};
pub use error::{MediaError, Result};
pub use manager::OfflineMediaManager;
pub use models::{CachedMedia, ContentCategory, DownloadOutcome, MediaKey, PlaybackHandle};
pub use stats::{DownloadProgress, MediaCacheStats};
