//! Integration tests for the façade
//!
//! These tests build `OfflineCore` over in-memory bridges and check that the
//! components are wired to each other:
//! - Missing collaborators are reported at build time
//! - Startup rehydrates the queue and drains it when online
//! - Reconnects drain work submitted while offline
//! - The exposed HTTP client is the interceptor

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::{
    BlobStore, BridgeError, DownloadStream, HttpClient, HttpRequest, HttpResponse, KeyValueStore,
    MemoryBlobStore, MemoryKeyValueStore,
};
use core_intercept::{Strategy, CACHE_STATUS_HEADER};
use core_media::{EntitlementProvider, MediaError, SignedLocation};
use core_runtime::config::CoreConfig;
use core_service::{BackendEndpoint, CoreError, OfflineCore};
use core_sync::{
    ApplyError, FavoriteToggle, RentalCreate, SubmitOutcome, SyncBackend, SyncOperation,
    WalletTransaction, WatchProgressUpdate,
};
use mockall::mock;

// ============================================================================
// Mock Implementations
// ============================================================================

mock! {
    pub Backend {}

    #[async_trait]
    impl SyncBackend for Backend {
        async fn apply_favorite_toggle(&self, payload: &FavoriteToggle) -> Result<(), ApplyError>;
        async fn apply_watch_progress(&self, payload: &WatchProgressUpdate) -> Result<(), ApplyError>;
        async fn create_rental(&self, payload: &RentalCreate) -> Result<(), ApplyError>;
        async fn record_wallet_transaction(&self, payload: &WalletTransaction) -> Result<(), ApplyError>;
    }
}

/// Answers every request with 200 unless switched off.
#[derive(Default)]
struct SwitchableNetwork {
    down: AtomicBool,
    calls: AtomicUsize,
}

#[async_trait]
impl HttpClient for SwitchableNetwork {
    async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(BridgeError::Network("unreachable".into()));
        }
        Ok(HttpResponse::new(200, format!("body of {}", request.url)))
    }

    async fn download_stream(&self, _url: String) -> bridge_traits::error::Result<DownloadStream> {
        Err(BridgeError::NotAvailable("no downloads in these tests".into()))
    }
}

struct NoEntitlements;

#[async_trait]
impl EntitlementProvider for NoEntitlements {
    async fn signed_retrieval_location(&self, content_id: &str) -> core_media::Result<SignedLocation> {
        Err(MediaError::Entitlement(format!("no rental for {}", content_id)))
    }

    async fn current_user_id(&self) -> Option<String> {
        None
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn core_config(
    http: Arc<dyn HttpClient>,
    kv: Arc<dyn KeyValueStore>,
    blobs: Arc<dyn BlobStore>,
) -> CoreConfig {
    let mut config = CoreConfig::builder()
        .database_path("/unused/offline.db")
        .cache_dir("/unused/cache")
        .http_client(http)
        .key_value_store(kv)
        .blob_store(blobs)
        .build()
        .unwrap();
    config.network_monitor = None;
    config
}

async fn build_core(
    kv: Arc<dyn KeyValueStore>,
    backend: MockBackend,
) -> (OfflineCore, Arc<SwitchableNetwork>) {
    let network = Arc::new(SwitchableNetwork::default());
    let config = core_config(network.clone(), kv, Arc::new(MemoryBlobStore::new()));
    let core = OfflineCore::builder(config)
        .sync_backend(Arc::new(backend))
        .entitlements(Arc::new(NoEntitlements))
        .build()
        .await
        .unwrap();
    (core, network)
}

fn favorite(content_id: &str) -> SyncOperation {
    SyncOperation::FavoriteToggle(FavoriteToggle {
        user_id: "user-1".to_string(),
        content_id: content_id.to_string(),
        favorited: true,
    })
}

async fn wait_until_empty(core: &OfflineCore) {
    for _ in 0..100 {
        if core.sync().pending_count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("queue still holds {} tasks", core.sync().pending_count());
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_build_requires_backend_or_endpoint() {
    let config = core_config(
        Arc::new(SwitchableNetwork::default()),
        Arc::new(MemoryKeyValueStore::new()),
        Arc::new(MemoryBlobStore::new()),
    );

    let result = OfflineCore::builder(config)
        .entitlements(Arc::new(NoEntitlements))
        .build()
        .await;

    match result {
        Err(CoreError::CapabilityMissing { capability, .. }) => assert_eq!(capability, "SyncBackend"),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("build succeeded without a sync backend"),
    }
}

#[tokio::test]
async fn test_endpoint_supplies_defaults() {
    let config = core_config(
        Arc::new(SwitchableNetwork::default()),
        Arc::new(MemoryKeyValueStore::new()),
        Arc::new(MemoryBlobStore::new()),
    );

    let core = OfflineCore::builder(config)
        .backend_endpoint(BackendEndpoint::new("https://db.example.com", "media").with_api_key("anon"))
        .build()
        .await
        .unwrap();

    assert!(core.is_online());
    assert_eq!(
        core.interceptor()
            .policy()
            .classify("https://db.example.com/rest/v1/movies?select=*"),
        Strategy::NetworkFirst
    );
}

#[tokio::test]
async fn test_start_rehydrates_and_drains_queue() {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());

    // First session: offline, the operation is queued durably.
    let (first, _) = build_core(kv.clone(), MockBackend::new()).await;
    first.connectivity().set_online(false);
    let outcome = first.sync().submit(favorite("movie-1")).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Queued(_)));
    drop(first);

    // Second session: online, startup replays it once.
    let mut backend = MockBackend::new();
    backend
        .expect_apply_favorite_toggle()
        .withf(|p| p.content_id == "movie-1")
        .times(1)
        .returning(|_| Ok(()));
    let (second, _) = build_core(kv, backend).await;

    let report = second.start().await.unwrap();
    assert_eq!(report.pending_tasks, 1);
    assert!(report.activation.is_some());

    wait_until_empty(&second).await;
    second.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_drains_offline_submissions() {
    let mut backend = MockBackend::new();
    backend
        .expect_apply_favorite_toggle()
        .times(2)
        .returning(|_| Ok(()));
    let (core, _) = build_core(Arc::new(MemoryKeyValueStore::new()), backend).await;
    core.start().await.unwrap();

    core.connectivity().set_online(false);
    core.sync().submit(favorite("movie-1")).await.unwrap();
    core.sync().submit(favorite("movie-2")).await.unwrap();
    assert_eq!(core.sync().pending_count(), 2);

    core.connectivity().set_online(true);
    wait_until_empty(&core).await;
    core.shutdown().await;
}

#[tokio::test]
async fn test_start_twice_is_rejected_until_shutdown() {
    let (core, _) = build_core(Arc::new(MemoryKeyValueStore::new()), MockBackend::new()).await;

    core.start().await.unwrap();
    assert!(core.is_started().await);
    assert!(matches!(core.start().await, Err(CoreError::AlreadyStarted)));

    core.shutdown().await;
    assert!(!core.is_started().await);
    core.start().await.unwrap();
    core.shutdown().await;
}

#[tokio::test]
async fn test_http_client_serves_cached_images_when_network_fails() {
    let (core, network) = build_core(Arc::new(MemoryKeyValueStore::new()), MockBackend::new()).await;
    core.start().await.unwrap();

    let client = core.http_client();
    let url = "https://cdn.example.com/posters/7.webp";
    client.execute(HttpRequest::get(url)).await.unwrap();

    network.down.store(true, Ordering::SeqCst);
    let cached = client.execute(HttpRequest::get(url)).await.unwrap();
    assert_eq!(cached.text().unwrap(), format!("body of {}", url));
    assert_eq!(cached.header(CACHE_STATUS_HEADER), Some("hit"));

    core.shutdown().await;
}
