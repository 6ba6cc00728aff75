use std::sync::Arc;

use bridge_traits::HttpClient;
use core_intercept::{ActivationReport, InterceptConfig, NetworkInterceptor};
use core_media::{EntitlementProvider, MediaCacheConfig, OfflineMediaManager, StorageSignedUrlProvider};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, Receiver};
use core_runtime::ConnectivityMonitor;
use core_sync::{HttpSyncBackend, SyncBackend, SyncConfig, SyncQueueManager, SyncTrigger};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::error::{CoreError, Result};

/// Location of the managed data backend.
///
/// When set on the builder it supplies the REST [`SyncBackend`], the
/// storage [`EntitlementProvider`] and the network-first API origin, unless
/// those are provided explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoint {
    pub base_url: String,
    /// Storage bucket holding downloadable media
    pub media_bucket: String,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub user_id: Option<String>,
}

impl BackendEndpoint {
    pub fn new(base_url: impl Into<String>, media_bucket: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            media_bucket: media_bucket.into(),
            api_key: None,
            access_token: None,
            user_id: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_session(mut self, access_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self.user_id = Some(user_id.into());
        self
    }
}

/// What [`OfflineCore::start`] found and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupReport {
    /// Tasks rehydrated from the durable queue
    pub pending_tasks: usize,
    /// `None` when activation failed and the interceptor stays pass-through
    pub activation: Option<ActivationReport>,
    /// Index entries dropped because their blob was missing
    pub reconciled_media: usize,
    pub expired_media: usize,
}

/// Builder for [`OfflineCore`].
pub struct OfflineCoreBuilder {
    config: CoreConfig,
    sync_config: SyncConfig,
    media_config: MediaCacheConfig,
    intercept_config: InterceptConfig,
    endpoint: Option<BackendEndpoint>,
    sync_backend: Option<Arc<dyn SyncBackend>>,
    entitlements: Option<Arc<dyn EntitlementProvider>>,
}

impl OfflineCoreBuilder {
    fn new(config: CoreConfig) -> Self {
        Self {
            config,
            sync_config: SyncConfig::default(),
            media_config: MediaCacheConfig::default(),
            intercept_config: InterceptConfig::default(),
            endpoint: None,
            sync_backend: None,
            entitlements: None,
        }
    }

    pub fn sync_config(mut self, config: SyncConfig) -> Self {
        self.sync_config = config;
        self
    }

    pub fn media_config(mut self, config: MediaCacheConfig) -> Self {
        self.media_config = config;
        self
    }

    pub fn intercept_config(mut self, config: InterceptConfig) -> Self {
        self.intercept_config = config;
        self
    }

    pub fn backend_endpoint(mut self, endpoint: BackendEndpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Sets the backend the queue replays against (overrides the endpoint).
    pub fn sync_backend(mut self, backend: Arc<dyn SyncBackend>) -> Self {
        self.sync_backend = Some(backend);
        self
    }

    /// Sets the signed-location issuer for downloads (overrides the endpoint).
    pub fn entitlements(mut self, provider: Arc<dyn EntitlementProvider>) -> Self {
        self.entitlements = Some(provider);
        self
    }

    /// Wire every component.
    ///
    /// Must run inside a tokio runtime; the platform connectivity listener
    /// is spawned here.
    ///
    /// # Errors
    ///
    /// - `CoreError::CapabilityMissing` when neither an explicit collaborator
    ///   nor a backend endpoint is available
    /// - the component's own error when one of the nested configs is invalid
    pub async fn build(self) -> Result<OfflineCore> {
        let Self {
            config,
            sync_config,
            media_config,
            mut intercept_config,
            endpoint,
            sync_backend,
            entitlements,
        } = self;

        let sync_backend = match (sync_backend, &endpoint) {
            (Some(backend), _) => backend,
            (None, Some(endpoint)) => rest_backend(&config, endpoint),
            (None, None) => return Err(missing("SyncBackend", ".sync_backend()")),
        };

        let entitlements = match (entitlements, &endpoint) {
            (Some(provider), _) => provider,
            (None, Some(endpoint)) => storage_entitlements(&config, endpoint),
            (None, None) => return Err(missing("EntitlementProvider", ".entitlements()")),
        };

        if let Some(endpoint) = &endpoint {
            if intercept_config.api_origins.is_empty() {
                intercept_config = intercept_config.with_api_origin(endpoint.base_url.clone());
            }
        }

        let event_bus = EventBus::new(config.event_buffer_size);

        let (connectivity, platform_listener) = match &config.network_monitor {
            Some(monitor) => ConnectivityMonitor::from_platform(monitor.clone(), event_bus.clone()).await,
            None => {
                info!("No platform network monitor, assuming online");
                (ConnectivityMonitor::new(true, event_bus.clone()), None)
            }
        };

        let interceptor = Arc::new(
            NetworkInterceptor::new(
                config.http_client.clone(),
                config.key_value_store.clone(),
                intercept_config,
            )?
            .with_connectivity(connectivity.clone())
            .with_event_bus(event_bus.clone()),
        );

        let sync = SyncQueueManager::new(
            sync_config,
            config.key_value_store.clone(),
            sync_backend,
            connectivity.clone(),
            event_bus.clone(),
            config.clock.clone(),
        )?;

        let media = Arc::new(
            OfflineMediaManager::new(
                media_config,
                config.key_value_store.clone(),
                config.blob_store.clone(),
                config.http_client.clone(),
                entitlements,
                config.clock.clone(),
            )?
            .with_event_bus(event_bus.clone()),
        );

        Ok(OfflineCore {
            event_bus,
            connectivity,
            interceptor,
            sync,
            media,
            trigger: Mutex::new(None),
            platform_listener: std::sync::Mutex::new(platform_listener),
        })
    }
}

fn missing(capability: &str, setter: &str) -> CoreError {
    CoreError::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "Use {} to inject one, or .backend_endpoint() to use the REST defaults.",
            setter
        ),
    }
}

fn rest_backend(config: &CoreConfig, endpoint: &BackendEndpoint) -> Arc<dyn SyncBackend> {
    let mut backend = HttpSyncBackend::new(config.http_client.clone(), endpoint.base_url.clone());
    if let Some(key) = &endpoint.api_key {
        backend = backend.with_api_key(key.clone());
    }
    if let Some(token) = &endpoint.access_token {
        backend = backend.with_access_token(token.clone());
    }
    Arc::new(backend)
}

fn storage_entitlements(
    config: &CoreConfig,
    endpoint: &BackendEndpoint,
) -> Arc<dyn EntitlementProvider> {
    let mut provider = StorageSignedUrlProvider::new(
        config.http_client.clone(),
        endpoint.base_url.clone(),
        endpoint.media_bucket.clone(),
    );
    if let Some(key) = &endpoint.api_key {
        provider = provider.with_api_key(key.clone());
    }
    if let (Some(token), Some(user_id)) = (&endpoint.access_token, &endpoint.user_id) {
        provider = provider.with_session(token.clone(), user_id.clone());
    }
    Arc::new(provider)
}

/// Primary façade exposed to host applications.
///
/// Queue writes and media downloads use the host HTTP client directly;
/// [`http_client`](Self::http_client) hands the UI the intercepted one.
pub struct OfflineCore {
    event_bus: EventBus,
    connectivity: ConnectivityMonitor,
    interceptor: Arc<NetworkInterceptor>,
    sync: SyncQueueManager,
    media: Arc<OfflineMediaManager>,
    trigger: Mutex<Option<SyncTrigger>>,
    platform_listener: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl OfflineCore {
    pub fn builder(config: CoreConfig) -> OfflineCoreBuilder {
        OfflineCoreBuilder::new(config)
    }

    /// Rehydrate the queue, activate the response cache generation, repair
    /// the media index and start the reconnect drain trigger.
    ///
    /// Interceptor and media maintenance failures are logged and leave
    /// those components usable; a queue that cannot be loaded fails startup.
    ///
    /// # Errors
    ///
    /// - `CoreError::AlreadyStarted` on a second call before `shutdown`
    /// - `CoreError::Sync` when the durable queue cannot be read
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<StartupReport> {
        let mut trigger = self.trigger.lock().await;
        if trigger.is_some() {
            return Err(CoreError::AlreadyStarted);
        }

        let pending_tasks = self.sync.load().await?;

        let activation = match self.interceptor.activate().await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "Response cache activation failed, interceptor stays pass-through");
                None
            }
        };

        let reconciled_media = self.media.reconcile().await.unwrap_or_else(|e| {
            warn!(error = %e, "Media index reconciliation failed");
            0
        });

        let expired_media = self.media.purge_expired().await.unwrap_or_else(|e| {
            warn!(error = %e, "Expired media purge failed");
            0
        });

        *trigger = Some(self.sync.start());

        info!(
            pending_tasks,
            reconciled_media,
            expired_media,
            online = self.connectivity.is_online(),
            "Offline core started"
        );

        Ok(StartupReport {
            pending_tasks,
            activation,
            reconciled_media,
            expired_media,
        })
    }

    /// Stop background work and wait for an in-flight drain to finish.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        if let Some(trigger) = self.trigger.lock().await.take() {
            trigger.shutdown().await;
        }
        self.abort_platform_listener();
        info!("Offline core stopped");
    }

    pub async fn is_started(&self) -> bool {
        self.trigger.lock().await.is_some()
    }

    /// Intercepted HTTP client for catalog, API and image requests.
    pub fn http_client(&self) -> Arc<dyn HttpClient> {
        self.interceptor.clone()
    }

    pub fn interceptor(&self) -> &Arc<NetworkInterceptor> {
        &self.interceptor
    }

    pub fn sync(&self) -> &SyncQueueManager {
        &self.sync
    }

    pub fn media(&self) -> &Arc<OfflineMediaManager> {
        &self.media
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    fn abort_platform_listener(&self) {
        let handle = match self.platform_listener.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for OfflineCore {
    fn drop(&mut self) {
        self.abort_platform_listener();
    }
}
