//! # Network Interceptor
//!
//! [`NetworkInterceptor`] wraps an [`HttpClient`] and is itself an
//! `HttpClient`, so callers keep issuing ordinary requests while responses
//! are served from, or recorded into, the generation's response cache.
//!
//! ## Request Flow
//!
//! ```text
//! request ─► PolicyTable::classify ─┬─ CacheFirstWithRefresh ─► cache ─► network ─► placeholder
//!                                   ├─ NetworkFirst          ─► network ─► cache ─► error / 5xx
//!                                   └─ CacheFirst            ─► cache ─► network
//! ```
//!
//! - Only `GET` requests touch the cache; other methods go straight through.
//! - Until [`activate`](NetworkInterceptor::activate) completes, every request
//!   goes straight through.
//! - Cache faults are logged and treated as a miss; they never fail a request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{DownloadStream, HttpClient, HttpMethod, HttpRequest, HttpResponse, KeyValueStore, RetryPolicy};
use core_runtime::connectivity::ConnectivityMonitor;
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::cache::ResponseCache;
use crate::config::InterceptConfig;
use crate::error::Result;
use crate::policy::{PolicyTable, Strategy};

/// Header added to responses the interceptor produced itself.
///
/// Values: `hit` (fresh cache hit), `stale` (cache fallback after a network
/// failure), `placeholder` (substitute image).
pub const CACHE_STATUS_HEADER: &str = "x-offline-cache";

const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="320" height="480" viewBox="0 0 320 480"><rect width="320" height="480" fill="#1f2937"/><path d="M136 204l64 36-64 36z" fill="#4b5563"/></svg>"##;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationReport {
    pub generation: String,
    /// Entries of older generations deleted
    pub purged_entries: usize,
    pub precached: usize,
    /// Manifest paths that could not be precached
    pub failed_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptCacheStats {
    pub generation: String,
    pub active: bool,
    pub entries: usize,
}

pub struct NetworkInterceptor {
    inner: Arc<dyn HttpClient>,
    cache: ResponseCache,
    policy: PolicyTable,
    config: InterceptConfig,
    connectivity: Option<ConnectivityMonitor>,
    event_bus: Option<EventBus>,
    active: AtomicBool,
    activation: Mutex<()>,
}

impl NetworkInterceptor {
    pub fn new(
        inner: Arc<dyn HttpClient>,
        kv: Arc<dyn KeyValueStore>,
        config: InterceptConfig,
    ) -> Result<Self> {
        config.validate()?;
        let policy = PolicyTable::from_config(&config)?;
        let cache = ResponseCache::new(kv, config.cache_prefix.clone());

        Ok(Self {
            inner,
            cache,
            policy,
            config,
            connectivity: None,
            event_bus: None,
            active: AtomicBool::new(false),
            activation: Mutex::new(()),
        })
    }

    /// Replace the rule table derived from the configuration.
    pub fn with_policy(mut self, policy: PolicyTable) -> Self {
        self.policy = policy;
        self
    }

    /// When offline, network-first requests try the cache before the network.
    pub fn with_connectivity(mut self, connectivity: ConnectivityMonitor) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Purge older generations, precache the manifest, then start serving.
    ///
    /// Individual precache failures are reported in the result and do not
    /// block activation.
    ///
    /// # Errors
    ///
    /// `InterceptError::Storage` if older generations could not be purged.
    /// The interceptor stays inactive (pass-through) in that case.
    #[instrument(skip(self), fields(generation = %self.config.generation))]
    pub async fn activate(&self) -> Result<ActivationReport> {
        let _guard = self.activation.lock().await;
        let generation = self.config.generation.clone();

        let purged_entries = self.cache.activate(&generation).await?;

        let mut precached = 0usize;
        let mut failed_paths = Vec::new();
        for path in self.config.manifest.paths() {
            match self.precache(path).await {
                Ok(()) => precached += 1,
                Err(message) => {
                    warn!(path, error = %message, "Failed to precache manifest path");
                    self.emit(CacheEvent::PrecacheFailed {
                        path: path.to_string(),
                        message,
                    });
                    failed_paths.push(path.to_string());
                }
            }
        }

        self.active.store(true, Ordering::Release);
        info!(
            purged_entries,
            precached,
            failed = failed_paths.len(),
            "Response cache generation activated"
        );
        self.emit(CacheEvent::GenerationActivated {
            generation: generation.clone(),
            purged_entries,
            precached,
        });

        Ok(ActivationReport {
            generation,
            purged_entries,
            precached,
            failed_paths,
        })
    }

    async fn precache(&self, path: &str) -> std::result::Result<(), String> {
        let url = self.config.resolve_path(path).map_err(|e| e.to_string())?;
        let strategy = self.policy.classify(&url);
        let request = HttpRequest::get(url);
        let identity = request.identity();

        let response = self.inner.execute(request).await.map_err(|e| e.to_string())?;
        if !response.is_success() {
            return Err(format!("HTTP {}", response.status));
        }

        self.cache
            .put(&self.config.generation, &identity, &response, strategy)
            .await
            .map_err(|e| e.to_string())
    }

    pub async fn cache_stats(&self) -> Result<InterceptCacheStats> {
        Ok(InterceptCacheStats {
            generation: self.config.generation.clone(),
            active: self.is_active(),
            entries: self.cache.entry_count(&self.config.generation).await?,
        })
    }

    /// Drop every cached response, including the precached manifest.
    #[instrument(skip(self))]
    pub async fn purge(&self) -> Result<usize> {
        let removed = self.cache.purge().await?;
        info!(removed, "Response cache purged");
        Ok(removed)
    }

    async fn handle(&self, request: HttpRequest, retry: Option<RetryPolicy>) -> BridgeResult<HttpResponse> {
        if request.method != HttpMethod::Get || !self.is_active() {
            return self.fetch(request, retry).await;
        }

        match self.policy.classify(&request.url) {
            Strategy::NetworkFirst => self.network_first(request, retry).await,
            strategy => self.cache_first(request, retry, strategy).await,
        }
    }

    async fn cache_first(
        &self,
        request: HttpRequest,
        retry: Option<RetryPolicy>,
        strategy: Strategy,
    ) -> BridgeResult<HttpResponse> {
        let identity = request.identity();
        let refreshing = strategy == Strategy::CacheFirstWithRefresh;

        if let Some(hit) = self.lookup(&identity).await {
            debug!(url = %request.url, strategy = strategy.as_str(), "Serving cached response");
            if refreshing && self.config.background_refresh && !self.is_offline() {
                self.spawn_refresh(request, identity);
            }
            return Ok(hit.with_header(CACHE_STATUS_HEADER, "hit"));
        }

        let response = match self.fetch(request, retry).await {
            Ok(response) => response,
            Err(e) if refreshing => {
                debug!(error = %e, "Image unavailable, serving placeholder");
                return Ok(self.placeholder().await);
            }
            Err(e) => return Err(e),
        };

        if response.is_success() {
            self.store(&identity, &response, strategy).await;
        }
        Ok(response)
    }

    async fn network_first(
        &self,
        request: HttpRequest,
        retry: Option<RetryPolicy>,
    ) -> BridgeResult<HttpResponse> {
        let identity = request.identity();

        if self.is_offline() {
            if let Some(hit) = self.lookup(&identity).await {
                debug!(url = %request.url, "Offline, serving cached response");
                return Ok(hit.with_header(CACHE_STATUS_HEADER, "stale"));
            }
        }

        match self.fetch(request, retry).await {
            Ok(response) if response.is_success() => {
                self.store(&identity, &response, Strategy::NetworkFirst).await;
                Ok(response)
            }
            Ok(response) if response.is_server_error() => match self.lookup(&identity).await {
                Some(hit) => {
                    info!(status = response.status, "Backend error, serving cached response");
                    Ok(hit.with_header(CACHE_STATUS_HEADER, "stale"))
                }
                None => Ok(response),
            },
            Ok(response) => Ok(response),
            Err(e) => match self.lookup(&identity).await {
                Some(hit) => {
                    info!(error = %e, "Backend unreachable, serving cached response");
                    Ok(hit.with_header(CACHE_STATUS_HEADER, "stale"))
                }
                None => Err(e),
            },
        }
    }

    async fn fetch(&self, request: HttpRequest, retry: Option<RetryPolicy>) -> BridgeResult<HttpResponse> {
        match retry {
            Some(policy) => self.inner.execute_with_retry(request, policy).await,
            None => self.inner.execute(request).await,
        }
    }

    async fn lookup(&self, identity: &str) -> Option<HttpResponse> {
        match self.cache.get(&self.config.generation, identity).await {
            Ok(hit) => hit.map(|cached| cached.response),
            Err(e) => {
                warn!(error = %e, "Response cache read failed, treating as miss");
                None
            }
        }
    }

    async fn store(&self, identity: &str, response: &HttpResponse, strategy: Strategy) {
        if let Err(e) = self
            .cache
            .put(&self.config.generation, identity, response, strategy)
            .await
        {
            warn!(error = %e, "Response cache write failed");
        }
    }

    fn spawn_refresh(&self, request: HttpRequest, identity: String) {
        let inner = self.inner.clone();
        let cache = self.cache.clone();
        let generation = self.config.generation.clone();

        tokio::spawn(async move {
            match inner.execute(request).await {
                Ok(response) if response.is_success() => {
                    if let Err(e) = cache
                        .put(&generation, &identity, &response, Strategy::CacheFirstWithRefresh)
                        .await
                    {
                        debug!(error = %e, "Background refresh not stored");
                    }
                }
                Ok(response) => debug!(status = response.status, "Background refresh skipped"),
                Err(e) => debug!(error = %e, "Background refresh failed"),
            }
        });
    }

    async fn placeholder(&self) -> HttpResponse {
        if let Some(path) = &self.config.manifest.fallback_image {
            if let Ok(url) = self.config.resolve_path(path) {
                if let Some(hit) = self.lookup(&HttpRequest::get(url).identity()).await {
                    return hit.with_header(CACHE_STATUS_HEADER, "placeholder");
                }
            }
        }

        HttpResponse::new(200, PLACEHOLDER_SVG)
            .with_header("Content-Type", "image/svg+xml")
            .with_header(CACHE_STATUS_HEADER, "placeholder")
    }

    fn is_offline(&self) -> bool {
        self.connectivity
            .as_ref()
            .map(|c| !c.is_online())
            .unwrap_or(false)
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Cache(event)).ok();
        }
    }
}

#[async_trait]
impl HttpClient for NetworkInterceptor {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.handle(request, None).await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> BridgeResult<HttpResponse> {
        self.handle(request, Some(policy)).await
    }

    /// Media bodies are never cached here; see the offline media manager.
    async fn download_stream(&self, url: String) -> BridgeResult<DownloadStream> {
        self.inner.download_stream(url).await
    }
}
