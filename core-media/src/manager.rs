//! # Offline Media Manager
//!
//! Downloads rented titles into the blob store for playback without network
//! access, and keeps the total stored size under a capacity ceiling.
//!
//! - The body is streamed chunk by chunk and only committed once complete,
//!   so an interrupted or abandoned transfer never leaves an entry behind.
//! - When a new blob does not fit, entries whose rental ends soonest are
//!   evicted first.
//! - Stored bytes are verified against their SHA-256 on read.
//!
//! Reads degrade to a cache miss on storage failure; mutations surface it.

use std::sync::Arc;

use bridge_traits::{BlobStore, Clock, HttpClient, KeyValueStore};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use core_runtime::events::{CoreEvent, EventBus, MediaEvent};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::config::MediaCacheConfig;
use crate::entitlement::EntitlementProvider;
use crate::error::{MediaError, Result};
use crate::index::{IndexMap, MediaIndex};
use crate::models::{CachedMedia, ContentCategory, DownloadOutcome, MediaKey, PlaybackHandle};
use crate::stats::{DownloadProgress, MediaCacheStats};

/// Progress events for downloads of unknown length are published every this many bytes.
const INDETERMINATE_EVENT_STEP: u64 = 1024 * 1024;

/// Offline media manager for downloading and managing cached titles.
pub struct OfflineMediaManager {
    config: MediaCacheConfig,
    index: MediaIndex,
    blobs: Arc<dyn BlobStore>,
    http: Arc<dyn HttpClient>,
    entitlements: Arc<dyn EntitlementProvider>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    /// Serializes index mutations; transfers themselves run unlocked.
    commit_lock: Mutex<()>,
}

impl OfflineMediaManager {
    /// Create a new offline media manager.
    ///
    /// # Arguments
    ///
    /// * `config` - Capacity, chunking and timeout settings
    /// * `kv` - Key-value store holding the media index
    /// * `blobs` - Blob store holding the media bytes
    /// * `http` - HTTP client used for streamed downloads
    /// * `entitlements` - Issues signed retrieval locations
    /// * `clock` - Time source for expiry checks
    pub fn new(
        config: MediaCacheConfig,
        kv: Arc<dyn KeyValueStore>,
        blobs: Arc<dyn BlobStore>,
        http: Arc<dyn HttpClient>,
        entitlements: Arc<dyn EntitlementProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let index = MediaIndex::new(kv, config.index_key.clone());

        Ok(Self {
            config,
            index,
            blobs,
            http,
            entitlements,
            clock,
            event_bus: None,
            commit_lock: Mutex::new(()),
        })
    }

    /// Set event bus for download and eviction events.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &MediaCacheConfig {
        &self.config
    }

    /// Whether an entry exists for the key, regardless of expiry.
    pub async fn is_cached(&self, content_id: &str, category: ContentCategory) -> bool {
        let key = MediaKey::new(content_id, category);
        self.read_index().await.contains_key(&key)
    }

    /// Whether an entry exists and its rental window is still open.
    pub async fn is_playable(&self, content_id: &str, category: ContentCategory) -> bool {
        let key = MediaKey::new(content_id, category);
        let now = self.clock.now();
        self.read_index()
            .await
            .get(&key)
            .map(|media| !media.is_expired(now))
            .unwrap_or(false)
    }

    /// Local locator for playback. No expiry check; see [`is_playable`](Self::is_playable).
    #[instrument(skip(self))]
    pub async fn playback_handle(
        &self,
        content_id: &str,
        category: ContentCategory,
    ) -> Option<PlaybackHandle> {
        let key = MediaKey::new(content_id, category);
        let media = self.read_index().await.remove(&key)?;

        match self.blobs.locate(&key.storage_key()).await {
            Ok(Some(locator)) => Some(PlaybackHandle {
                key,
                locator,
                size_bytes: media.size_bytes,
                expires_at: media.expires_at,
            }),
            Ok(None) => {
                warn!(key = %key, "Indexed media has no stored blob");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to locate cached media");
                None
            }
        }
    }

    /// Download a title into the offline cache.
    ///
    /// This method:
    /// 1. Asks the entitlement collaborator for a signed location
    /// 2. Streams the body, calling `on_progress` after every chunk
    /// 3. Evicts entries ending soonest until the blob fits
    /// 4. Stores the blob and its index record, replacing any prior entry
    ///
    /// Never fails with an error; failures come back as
    /// [`DownloadOutcome::Failed`] and leave no new entry.
    #[instrument(skip(self, rental_reference, on_progress), fields(key = %MediaKey::new(content_id, category)))]
    pub async fn download<F>(
        &self,
        content_id: &str,
        category: ContentCategory,
        expires_at: DateTime<Utc>,
        rental_reference: Option<String>,
        on_progress: F,
    ) -> DownloadOutcome
    where
        F: Fn(&DownloadProgress) + Send + Sync,
    {
        let key = MediaKey::new(content_id, category);
        info!("Starting offline download");
        self.emit(MediaEvent::DownloadStarted {
            key: key.storage_key(),
        });

        let fetched = match tokio::time::timeout(
            self.config.download_timeout,
            self.fetch_body(&key, &on_progress),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MediaError::Timeout(self.config.download_timeout)),
        };

        let result = match fetched {
            Ok(data) => self.commit(&key, data, expires_at, rental_reference).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(media) => {
                info!(size_bytes = media.size_bytes, "Offline download complete");
                self.emit(MediaEvent::DownloadCompleted {
                    key: key.storage_key(),
                    size_bytes: media.size_bytes,
                });
                DownloadOutcome::Completed(media)
            }
            Err(e) => {
                warn!(error = %e, "Offline download failed");
                self.emit(MediaEvent::DownloadFailed {
                    key: key.storage_key(),
                    message: e.to_string(),
                });
                DownloadOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn fetch_body<F>(&self, key: &MediaKey, on_progress: &F) -> Result<Bytes>
    where
        F: Fn(&DownloadProgress) + Send + Sync,
    {
        let capacity = self.config.capacity_bytes;
        let location = self
            .entitlements
            .signed_retrieval_location(&key.content_id)
            .await?;
        debug!(valid_until = %location.valid_until, "Signed location issued");

        let stream = self
            .http
            .download_stream(location.url)
            .await
            .map_err(|e| MediaError::Download(e.to_string()))?;

        if let Some(total) = stream.content_length {
            if total > capacity {
                return Err(MediaError::CacheFull {
                    required: total,
                    capacity,
                });
            }
        }

        let mut body = stream.body;
        let mut progress = DownloadProgress::new(key.clone(), stream.content_length);
        let mut data = BytesMut::with_capacity(stream.content_length.unwrap_or(0) as usize);
        let mut chunk = vec![0u8; self.config.chunk_size];
        let mut last_percent = None;
        let mut last_event_bytes = 0u64;

        on_progress(&progress);

        loop {
            let read = body
                .read(&mut chunk)
                .await
                .map_err(|e| MediaError::Download(e.to_string()))?;
            if read == 0 {
                break;
            }

            data.extend_from_slice(&chunk[..read]);
            progress.received_bytes += read as u64;

            if progress.received_bytes > capacity {
                return Err(MediaError::CacheFull {
                    required: progress.received_bytes,
                    capacity,
                });
            }

            on_progress(&progress);

            let percent = progress.percent();
            let publish = match percent {
                Some(_) => percent != last_percent,
                None => progress.received_bytes - last_event_bytes >= INDETERMINATE_EVENT_STEP,
            };
            if publish {
                last_percent = percent;
                last_event_bytes = progress.received_bytes;
                self.emit(MediaEvent::DownloadProgress {
                    key: key.storage_key(),
                    received_bytes: progress.received_bytes,
                    total_bytes: progress.total_bytes,
                    percent,
                });
            }
        }

        if let Some(total) = progress.total_bytes {
            if progress.received_bytes != total {
                return Err(MediaError::Download(format!(
                    "Body ended after {} of {} bytes",
                    progress.received_bytes, total
                )));
            }
        }

        Ok(data.freeze())
    }

    async fn commit(
        &self,
        key: &MediaKey,
        data: Bytes,
        expires_at: DateTime<Utc>,
        rental_reference: Option<String>,
    ) -> Result<CachedMedia> {
        let size_bytes = data.len() as u64;
        let capacity = self.config.capacity_bytes;
        if size_bytes > capacity {
            return Err(MediaError::CacheFull {
                required: size_bytes,
                capacity,
            });
        }
        let content_hash = hex::encode(Sha256::digest(&data));

        let _guard = self.commit_lock.lock().await;
        let mut index = self.load_for_write().await?;

        // The entry being replaced does not count against capacity.
        let mut used: u64 = index
            .values()
            .filter(|m| &m.key != key)
            .map(|m| m.size_bytes)
            .sum();
        let mut evicted = Vec::new();
        while used + size_bytes > capacity {
            let Some(victim) = index
                .values()
                .filter(|m| &m.key != key)
                .min_by_key(|m| m.expires_at)
                .map(|m| m.key.clone())
            else {
                break;
            };
            if let Some(media) = index.remove(&victim) {
                used -= media.size_bytes;
                evicted.push(media);
            }
        }

        if !evicted.is_empty() {
            self.index.save(&index).await?;
            for media in &evicted {
                if let Err(e) = self.blobs.remove(&media.key.storage_key()).await {
                    warn!(key = %media.key, error = %e, "Failed to delete evicted blob");
                }
                info!(
                    key = %media.key,
                    size_bytes = media.size_bytes,
                    expires_at = %media.expires_at,
                    "Evicted cached media"
                );
                self.emit(MediaEvent::Evicted {
                    key: media.key.storage_key(),
                    size_bytes: media.size_bytes,
                });
            }
        }

        // Kept so a failed index write can put the playable copy back.
        let previous = if index.contains_key(key) {
            match self.blobs.get(&key.storage_key()).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(key = %key, error = %e, "Could not read blob being replaced");
                    None
                }
            }
        } else {
            None
        };

        self.blobs.put(&key.storage_key(), data).await?;

        let media = CachedMedia {
            key: key.clone(),
            size_bytes,
            expires_at,
            rental_reference,
            content_hash,
            downloaded_at: self.clock.now(),
        };
        index.insert(key.clone(), media.clone());

        if let Err(e) = self.index.save(&index).await {
            self.roll_back_blob(key, previous).await;
            return Err(e);
        }

        Ok(media)
    }

    /// Undo the blob write of a commit whose index write failed.
    async fn roll_back_blob(&self, key: &MediaKey, previous: Option<Bytes>) {
        match previous {
            Some(bytes) => {
                error!(key = %key, "Failed to record cached media, restoring previous blob");
                if let Err(e) = self.blobs.put(&key.storage_key(), bytes).await {
                    error!(key = %key, error = %e, "Failed to restore previous blob");
                }
            }
            None => {
                error!(key = %key, "Failed to record cached media, discarding blob");
                if let Err(e) = self.blobs.remove(&key.storage_key()).await {
                    warn!(key = %key, error = %e, "Failed to discard unrecorded blob");
                }
            }
        }
    }

    /// Remove an entry. Removing a missing entry is not an error.
    #[instrument(skip(self))]
    pub async fn remove(&self, content_id: &str, category: ContentCategory) -> Result<()> {
        let key = MediaKey::new(content_id, category);
        let _guard = self.commit_lock.lock().await;
        let removed = self.remove_locked(|media| media.key == key).await?;

        if removed == 0 {
            // Clears a blob left behind by an interrupted commit.
            self.blobs.remove(&key.storage_key()).await?;
        }
        Ok(())
    }

    /// Remove every entry whose rental window has closed.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let removed = self.remove_where(|media| media.is_expired(now)).await?;
        if removed > 0 {
            info!(removed, "Purged expired media");
        }
        Ok(removed)
    }

    /// Remove every entry downloaded under a revoked rental.
    #[instrument(skip(self))]
    pub async fn remove_by_rental(&self, rental_reference: &str) -> Result<usize> {
        self.remove_where(|media| media.rental_reference.as_deref() == Some(rental_reference))
            .await
    }

    async fn remove_where<P>(&self, predicate: P) -> Result<usize>
    where
        P: Fn(&CachedMedia) -> bool,
    {
        let _guard = self.commit_lock.lock().await;
        self.remove_locked(predicate).await
    }

    /// Caller holds `commit_lock`.
    async fn remove_locked<P>(&self, predicate: P) -> Result<usize>
    where
        P: Fn(&CachedMedia) -> bool,
    {
        let mut index = self.load_for_write().await?;

        let doomed: Vec<MediaKey> = index
            .values()
            .filter(|m| predicate(m))
            .map(|m| m.key.clone())
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        for key in &doomed {
            index.remove(key);
        }
        self.index.save(&index).await?;

        for key in &doomed {
            if let Err(e) = self.blobs.remove(&key.storage_key()).await {
                warn!(key = %key, error = %e, "Failed to delete cached blob");
            }
            debug!(key = %key, "Removed cached media");
            self.emit(MediaEvent::Removed {
                key: key.storage_key(),
            });
        }

        Ok(doomed.len())
    }

    /// Read the stored bytes, verifying their hash.
    ///
    /// A missing blob or a hash mismatch drops the entry and reads as a miss.
    #[instrument(skip(self))]
    pub async fn read_media(&self, content_id: &str, category: ContentCategory) -> Option<Bytes> {
        let key = MediaKey::new(content_id, category);
        let media = self.read_index().await.remove(&key)?;

        let data = match self.blobs.get(&key.storage_key()).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                warn!(key = %key, "Indexed media has no stored blob, dropping entry");
                self.drop_entry(&key).await;
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read cached media");
                return None;
            }
        };

        if self.config.verify_integrity && !media.content_hash.is_empty() {
            let hash = hex::encode(Sha256::digest(&data));
            if hash != media.content_hash {
                warn!(key = %key, "Cache integrity check failed, dropping entry");
                self.drop_entry(&key).await;
                return None;
            }
        }

        Some(data)
    }

    async fn drop_entry(&self, key: &MediaKey) {
        if let Err(e) = self.remove(&key.content_id, key.category).await {
            warn!(key = %key, error = %e, "Failed to drop invalid cache entry");
        }
    }

    /// All indexed entries, ordered by key.
    pub async fn list_cached(&self) -> Vec<CachedMedia> {
        self.read_index().await.into_values().collect()
    }

    pub async fn stats(&self) -> MediaCacheStats {
        let now = self.clock.now();
        let index = self.read_index().await;

        MediaCacheStats {
            entries: index.len(),
            expired_entries: index.values().filter(|m| m.is_expired(now)).count(),
            total_bytes: index.values().map(|m| m.size_bytes).sum(),
            capacity_bytes: self.config.capacity_bytes,
        }
    }

    /// Bring the index and the blob store back in agreement.
    ///
    /// Deletes blobs no entry refers to and entries whose blob is gone.
    /// Returns how many of either were removed.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<usize> {
        let _guard = self.commit_lock.lock().await;
        let mut index = self.load_for_write().await?;
        let mut fixed = 0usize;

        for blob_key in self.blobs.keys().await? {
            let known = MediaKey::parse_storage_key(&blob_key)
                .map(|key| index.contains_key(&key))
                .unwrap_or(false);
            if !known {
                debug!(blob_key = %blob_key, "Deleting orphaned blob");
                self.blobs.remove(&blob_key).await?;
                fixed += 1;
            }
        }

        let mut missing = Vec::new();
        for key in index.keys() {
            if !self.blobs.exists(&key.storage_key()).await? {
                missing.push(key.clone());
            }
        }
        if !missing.is_empty() {
            for key in &missing {
                index.remove(key);
            }
            self.index.save(&index).await?;
            fixed += missing.len();
        }

        if fixed > 0 {
            info!(fixed, "Reconciled offline media store");
        }
        Ok(fixed)
    }

    async fn read_index(&self) -> IndexMap {
        match self.index.load().await {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "Media index unreadable, treating as empty");
                IndexMap::new()
            }
        }
    }

    async fn load_for_write(&self) -> Result<IndexMap> {
        match self.index.load().await {
            Ok(index) => Ok(index),
            Err(MediaError::CorruptedIndex(message)) => {
                error!(message = %message, "Media index corrupted, starting over");
                Ok(IndexMap::new())
            }
            Err(e) => Err(e),
        }
    }

    fn emit(&self, event: MediaEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Media(event)).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlement::SignedLocation;
    use async_trait::async_trait;
    use bridge_traits::{
        BridgeError, DownloadStream, HttpRequest, HttpResponse, ManualClock, MemoryBlobStore,
        MemoryKeyValueStore,
    };
    use chrono::Duration;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    struct AlwaysEntitled;

    #[async_trait]
    impl EntitlementProvider for AlwaysEntitled {
        async fn signed_retrieval_location(&self, content_id: &str) -> Result<SignedLocation> {
            Ok(SignedLocation {
                url: format!("https://cdn.example.com/{}?token=t", content_id),
                valid_until: Utc::now() + Duration::hours(1),
            })
        }

        async fn current_user_id(&self) -> Option<String> {
            Some("user-1".to_string())
        }
    }

    /// Serves a fixed body for every URL.
    struct FixedBody {
        body: Vec<u8>,
        announce_length: bool,
        stall: bool,
    }

    impl FixedBody {
        fn new(body: &[u8]) -> Self {
            Self {
                body: body.to_vec(),
                announce_length: true,
                stall: false,
            }
        }
    }

    /// Body that never yields a byte.
    struct Stalled;

    impl AsyncRead for Stalled {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Pending
        }
    }

    #[async_trait]
    impl HttpClient for FixedBody {
        async fn execute(&self, _request: HttpRequest) -> bridge_traits::error::Result<HttpResponse> {
            Err(BridgeError::NotAvailable("execute".into()))
        }

        async fn download_stream(&self, _url: String) -> bridge_traits::error::Result<DownloadStream> {
            let content_length = self.announce_length.then_some(self.body.len() as u64);
            if self.stall {
                return Ok(DownloadStream {
                    content_length,
                    body: Box::new(Stalled),
                });
            }
            Ok(DownloadStream {
                content_length,
                body: Box::new(Cursor::new(self.body.clone())),
            })
        }
    }

    struct Harness {
        manager: OfflineMediaManager,
        blobs: Arc<MemoryBlobStore>,
        kv: Arc<MemoryKeyValueStore>,
        clock: Arc<ManualClock>,
    }

    fn harness(http: FixedBody, config: MediaCacheConfig) -> Harness {
        let blobs = Arc::new(MemoryBlobStore::new());
        let kv = Arc::new(MemoryKeyValueStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let manager = OfflineMediaManager::new(
            config,
            kv.clone(),
            blobs.clone(),
            Arc::new(http),
            Arc::new(AlwaysEntitled),
            clock.clone(),
        )
        .unwrap();
        Harness {
            manager,
            blobs,
            kv,
            clock,
        }
    }

    fn manager(body: &[u8], capacity: u64) -> (OfflineMediaManager, Arc<MemoryBlobStore>, Arc<ManualClock>) {
        let h = harness(
            FixedBody::new(body),
            MediaCacheConfig::default().with_capacity(capacity).with_chunk_size(4),
        );
        (h.manager, h.blobs, h.clock)
    }

    #[tokio::test]
    async fn test_download_then_cached_and_playable() {
        let (manager, blobs, clock) = manager(b"0123456789", 100);
        let expires = clock.now() + Duration::hours(48);

        let outcome = manager
            .download("m1", ContentCategory::Movie, expires, Some("r1".into()), |_| {})
            .await;
        assert!(outcome.is_completed());
        assert!(manager.is_cached("m1", ContentCategory::Movie).await);
        assert!(!manager.is_cached("m1", ContentCategory::Episode).await);
        assert!(manager.is_playable("m1", ContentCategory::Movie).await);
        assert!(blobs.len() == 1);

        let handle = manager
            .playback_handle("m1", ContentCategory::Movie)
            .await
            .unwrap();
        assert_eq!(handle.size_bytes, 10);
        assert!(handle.locator.starts_with("memory://"));
    }

    #[tokio::test]
    async fn test_expired_entry_not_playable_but_has_handle() {
        let (manager, _, clock) = manager(b"abc", 100);
        let expires = clock.now() + Duration::hours(1);
        manager
            .download("m1", ContentCategory::Movie, expires, None, |_| {})
            .await;

        clock.advance(Duration::hours(2));
        assert!(!manager.is_playable("m1", ContentCategory::Movie).await);
        assert!(manager.playback_handle("m1", ContentCategory::Movie).await.is_some());

        assert_eq!(manager.purge_expired().await.unwrap(), 1);
        assert!(!manager.is_cached("m1", ContentCategory::Movie).await);
    }

    #[tokio::test]
    async fn test_progress_reported_per_chunk() {
        let (manager, _, clock) = manager(b"0123456789", 100);
        let seen = parking_lot::Mutex::new(Vec::new());

        manager
            .download(
                "m1",
                ContentCategory::Movie,
                clock.now() + Duration::hours(1),
                None,
                |p| seen.lock().push(p.percent()),
            )
            .await;

        // Initial report, then chunks of 4, 4 and 2 bytes.
        assert_eq!(*seen.lock(), vec![Some(0), Some(40), Some(80), Some(100)]);
    }

    #[tokio::test]
    async fn test_blob_larger_than_capacity_fails() {
        let (manager, blobs, clock) = manager(b"0123456789", 5);

        let outcome = manager
            .download("big", ContentCategory::Movie, clock.now(), None, |_| {})
            .await;
        match outcome {
            DownloadOutcome::Failed { reason } => assert!(reason.contains("Cache full")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_redownload_replaces_entry() {
        let (manager, _, clock) = manager(b"abcd", 6);
        let first = clock.now() + Duration::hours(1);
        let second = clock.now() + Duration::hours(5);

        manager.download("m1", ContentCategory::Movie, first, None, |_| {}).await;
        manager.download("m1", ContentCategory::Movie, second, None, |_| {}).await;

        let entries = manager.list_cached().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].expires_at, second);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (manager, blobs, clock) = manager(b"abc", 100);
        manager
            .download("m1", ContentCategory::Episode, clock.now(), None, |_| {})
            .await;

        manager.remove("m1", ContentCategory::Episode).await.unwrap();
        manager.remove("m1", ContentCategory::Episode).await.unwrap();
        assert!(!manager.is_cached("m1", ContentCategory::Episode).await);
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_tampered_blob_reads_as_miss() {
        let (manager, blobs, clock) = manager(b"original", 100);
        manager
            .download("m1", ContentCategory::Movie, clock.now(), None, |_| {})
            .await;
        assert_eq!(
            manager.read_media("m1", ContentCategory::Movie).await.unwrap(),
            Bytes::from_static(b"original")
        );

        blobs.put("m1:movie", Bytes::from_static(b"tampered")).await.unwrap();
        assert!(manager.read_media("m1", ContentCategory::Movie).await.is_none());
        assert!(!manager.is_cached("m1", ContentCategory::Movie).await);
    }

    #[tokio::test]
    async fn test_reconcile_removes_orphans() {
        let (manager, blobs, clock) = manager(b"abc", 100);
        manager
            .download("m1", ContentCategory::Movie, clock.now(), None, |_| {})
            .await;
        blobs.put("stray:movie", Bytes::from_static(b"x")).await.unwrap();
        blobs.put("garbage", Bytes::from_static(b"x")).await.unwrap();

        assert_eq!(manager.reconcile().await.unwrap(), 2);
        assert_eq!(blobs.len(), 1);
        assert!(manager.is_cached("m1", ContentCategory::Movie).await);
    }
    #[tokio::test]
    async fn test_failed_redownload_keeps_previous_copy() {
        let h = harness(
            FixedBody::new(b"first copy"),
            MediaCacheConfig::default().with_capacity(100).with_chunk_size(4),
        );
        let expires = h.clock.now() + Duration::hours(48);
        assert!(h
            .manager
            .download("m1", ContentCategory::Movie, expires, None, |_| {})
            .await
            .is_completed());

        h.kv.set_fail_writes(true);
        let outcome = h
            .manager
            .download("m1", ContentCategory::Movie, expires, None, |_| {})
            .await;
        match outcome {
            DownloadOutcome::Failed { reason } => assert!(reason.contains("quota exceeded")),
            other => panic!("unexpected outcome {:?}", other),
        }

        h.kv.set_fail_writes(false);
        assert!(h.manager.is_cached("m1", ContentCategory::Movie).await);
        assert!(h.manager.playback_handle("m1", ContentCategory::Movie).await.is_some());
        assert_eq!(
            h.manager.read_media("m1", ContentCategory::Movie).await.unwrap(),
            Bytes::from_static(b"first copy")
        );
    }

    #[tokio::test]
    async fn test_failed_first_download_leaves_nothing() {
        let h = harness(
            FixedBody::new(b"payload"),
            MediaCacheConfig::default().with_capacity(100),
        );
        h.kv.set_fail_writes(true);

        let outcome = h
            .manager
            .download("m1", ContentCategory::Movie, h.clock.now(), None, |_| {})
            .await;
        assert!(!outcome.is_completed());
        assert!(h.blobs.is_empty());
    }

    #[tokio::test]
    async fn test_remove_clears_unindexed_blob() {
        let (manager, blobs, _) = manager(b"abc", 100);
        blobs.put("m9:movie", Bytes::from_static(b"left over")).await.unwrap();

        manager.remove("m9", ContentCategory::Movie).await.unwrap();
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_length_progress_is_indeterminate() {
        let body = vec![7u8; 2 * 1024 * 1024 + 512 * 1024];
        let mut http = FixedBody::new(&body);
        http.announce_length = false;
        let bus = EventBus::new(64);
        let mut events = bus.subscribe();
        let h = harness(
            http,
            MediaCacheConfig::default()
                .with_capacity(10 * 1024 * 1024)
                .with_chunk_size(64 * 1024),
        );
        let manager = h.manager.with_event_bus(bus);
        let fractions = parking_lot::Mutex::new(Vec::new());

        let outcome = manager
            .download(
                "m1",
                ContentCategory::Movie,
                h.clock.now() + Duration::hours(1),
                None,
                |p| fractions.lock().push((p.fraction(), p.received_bytes)),
            )
            .await;
        assert!(outcome.is_completed());

        let fractions = fractions.lock();
        assert!(fractions.iter().all(|(fraction, _)| fraction.is_none()));
        assert_eq!(fractions.last().unwrap().1, body.len() as u64);

        // One event per full MiB received.
        let mut progress_events = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let CoreEvent::Media(MediaEvent::DownloadProgress {
                received_bytes,
                percent,
                ..
            }) = event
            {
                assert_eq!(percent, None);
                progress_events.push(received_bytes);
            }
        }
        assert_eq!(progress_events, vec![1024 * 1024, 2 * 1024 * 1024]);
    }

    #[tokio::test]
    async fn test_stalled_download_times_out() {
        let mut http = FixedBody::new(b"never arrives");
        http.stall = true;
        let h = harness(
            http,
            MediaCacheConfig::default()
                .with_capacity(100)
                .with_download_timeout(std::time::Duration::from_millis(50)),
        );

        let outcome = h
            .manager
            .download("m1", ContentCategory::Movie, h.clock.now(), None, |_| {})
            .await;
        match outcome {
            DownloadOutcome::Failed { reason } => assert!(reason.contains("timed out")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!h.manager.is_cached("m1", ContentCategory::Movie).await);
        assert!(h.blobs.is_empty());
    }

    #[tokio::test]
    async fn test_storage_read_failures_read_as_miss() {
        let h = harness(
            FixedBody::new(b"movie bytes"),
            MediaCacheConfig::default().with_capacity(100),
        );
        h.manager
            .download("m1", ContentCategory::Movie, h.clock.now() + Duration::hours(1), None, |_| {})
            .await;

        h.blobs.set_fail_reads(true);
        assert!(h.manager.read_media("m1", ContentCategory::Movie).await.is_none());
        assert!(h.manager.playback_handle("m1", ContentCategory::Movie).await.is_none());
        h.blobs.set_fail_reads(false);

        // A blob read failure is not evidence of corruption; the entry stays.
        assert!(h.manager.is_cached("m1", ContentCategory::Movie).await);

        h.kv.set_fail_reads(true);
        assert!(!h.manager.is_cached("m1", ContentCategory::Movie).await);
        assert!(!h.manager.is_playable("m1", ContentCategory::Movie).await);
        assert!(h.manager.read_media("m1", ContentCategory::Movie).await.is_none());
        assert_eq!(h.manager.stats().await.entries, 0);

        h.kv.set_fail_reads(false);
        assert!(h.manager.read_media("m1", ContentCategory::Movie).await.is_some());
    }
}
