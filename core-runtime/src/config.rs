//! # Core Configuration Module
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! holding every host bridge the offline core needs. Validation is fail-fast:
//! a missing capability is reported at build time with an actionable message
//! instead of surfacing as a failure on the first network call.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - backend, API and media transfers (desktop default: reqwest)
//! - `KeyValueStore` - pending queue, media index, response cache (desktop default: SQLite)
//! - `BlobStore` - downloaded media payloads (desktop default: one file per blob)
//!
//! ## Optional Dependencies
//!
//! - `NetworkMonitor` - connectivity signal (desktop default: TCP probe). Without
//!   one the core assumes it is online until told otherwise.
//! - `Clock` - time source for expiry checks (default: system clock)
//!
//! When the `desktop-shims` feature is enabled, desktop defaults are injected
//! for every required bridge that was not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/rental/offline.db")
//!     .cache_dir("/var/cache/rental")
//!     .http_client(Arc::new(MyHttpClient))
//!     .key_value_store(Arc::new(MyKeyValueStore))
//!     .blob_store(Arc::new(MyBlobStore))
//!     .build()?;
//! ```
//!
//! Without `desktop-shims`, leaving out a required bridge fails:
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let err = CoreConfig::builder()
//!     .database_path("/tmp/offline.db")
//!     .cache_dir("/tmp/cache")
//!     .build()
//!     .unwrap_err();
//! assert!(err.to_string().contains("HttpClient"));
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{BlobStore, Clock, HttpClient, KeyValueStore, NetworkMonitor, SystemClock};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Core configuration for the offline layer.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database backing the key-value store
    pub database_path: PathBuf,

    /// Directory for downloaded media blobs
    pub cache_dir: PathBuf,

    pub http_client: Arc<dyn HttpClient>,

    pub key_value_store: Arc<dyn KeyValueStore>,

    pub blob_store: Arc<dyn BlobStore>,

    /// Platform connectivity signal (optional)
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    pub clock: Arc<dyn Clock>,

    /// Capacity of the broadcast channel behind the event bus
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("cache_dir", &self.cache_dir)
            .field("http_client", &"HttpClient { ... }")
            .field("key_value_store", &"KeyValueStore { ... }")
            .field("blob_store", &"BlobStore { ... }")
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - Database path and cache directory are not empty
    /// - The event buffer can hold at least one event
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, purpose: &str, hint: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: enable the 'desktop-shims' feature to use the default {}. \
             Other hosts: inject a platform-native implementation.",
            capability, purpose, hint
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::new().map_err(|e| {
        Error::Internal(format!("Failed to initialize default HttpClient: {}", e))
    })?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(capability_missing(
        "HttpClient",
        "backend calls and media downloads",
        "ReqwestHttpClient",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_key_value_store(database_path: &Path) -> Result<Arc<dyn KeyValueStore>> {
    use bridge_desktop::SqliteKeyValueStore;
    use std::thread;
    use tokio::runtime::{Handle, Runtime};

    let init_store = |path: PathBuf| -> Result<SqliteKeyValueStore> {
        let runtime = Runtime::new().map_err(|e| {
            Error::Internal(format!(
                "Failed to create Tokio runtime for default KeyValueStore: {}",
                e
            ))
        })?;

        runtime
            .block_on(SqliteKeyValueStore::new(path))
            .map_err(|e| {
                Error::Internal(format!("Failed to initialize default KeyValueStore: {}", e))
            })
    };

    // A runtime cannot be blocked on from inside another one.
    let store = match Handle::try_current() {
        Ok(_) => {
            let path = database_path.to_path_buf();
            thread::spawn(move || init_store(path))
                .join()
                .map_err(|_| {
                    Error::Internal(
                        "Worker thread panicked while creating default KeyValueStore".to_string(),
                    )
                })??
        }
        Err(_) => init_store(database_path.to_path_buf())?,
    };

    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_key_value_store(_database_path: &Path) -> Result<Arc<dyn KeyValueStore>> {
    Err(capability_missing(
        "KeyValueStore",
        "the pending queue and media index",
        "SqliteKeyValueStore",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_blob_store(cache_dir: &Path) -> Result<Arc<dyn BlobStore>> {
    Ok(Arc::new(bridge_desktop::FsBlobStore::new(
        cache_dir.join("media"),
    )))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_blob_store(_cache_dir: &Path) -> Result<Arc<dyn BlobStore>> {
    Err(capability_missing(
        "BlobStore",
        "offline media payloads",
        "FsBlobStore",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_network_monitor() -> Option<Arc<dyn NetworkMonitor>> {
    Some(Arc::new(bridge_desktop::DesktopNetworkMonitor::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_network_monitor() -> Option<Arc<dyn NetworkMonitor>> {
    None
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    key_value_store: Option<Arc<dyn KeyValueStore>>,
    blob_store: Option<Arc<dyn BlobStore>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().database_path("/data/offline.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the cache directory. Desktop media blobs land in `<cache_dir>/media`.
    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn key_value_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.key_value_store = Some(store);
        self
    }

    pub fn blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    /// Sets the network monitor. Overrides the desktop default.
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Sets the time source used for expiry checks.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig`.
    ///
    /// # Errors
    ///
    /// - `Error::Config` when a path is missing or a value is invalid
    /// - `Error::CapabilityMissing` when a required bridge is absent and no
    ///   desktop default is available
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let cache_dir = self.cache_dir.ok_or_else(|| {
            Error::Config("Cache directory is required. Use .cache_dir() to set it.".to_string())
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let key_value_store = match self.key_value_store {
            Some(store) => store,
            None => provide_default_key_value_store(&database_path)?,
        };

        let blob_store = match self.blob_store {
            Some(store) => store,
            None => provide_default_blob_store(&cache_dir)?,
        };

        let config = CoreConfig {
            database_path,
            cache_dir,
            http_client,
            key_value_store,
            blob_store,
            network_monitor: self
                .network_monitor
                .or_else(provide_default_network_monitor),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}
