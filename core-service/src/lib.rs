//! Core service façade and bootstrap helpers.
//!
//! This crate wires the host-provided bridges of a [`CoreConfig`] into the
//! offline layer: one shared [`ConnectivityMonitor`], the
//! [`NetworkInterceptor`] wrapped around the host HTTP client, the
//! [`SyncQueueManager`] and the [`OfflineMediaManager`]. Desktop apps
//! typically enable the `desktop-shims` feature so that missing bridges are
//! filled with the `bridge-desktop` adapters.
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::{BackendEndpoint, OfflineCore};
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/rental/offline.db")
//!     .cache_dir("/var/cache/rental")
//!     .build()?;
//!
//! let core = OfflineCore::builder(config)
//!     .backend_endpoint(BackendEndpoint::new("https://db.example.com", "media"))
//!     .build()
//!     .await?;
//! core.start().await?;
//!
//! let catalog = core.http_client();
//! ```
//!
//! [`CoreConfig`]: core_runtime::config::CoreConfig
//! [`ConnectivityMonitor`]: core_runtime::ConnectivityMonitor
//! [`NetworkInterceptor`]: core_intercept::NetworkInterceptor
//! [`SyncQueueManager`]: core_sync::SyncQueueManager
//! [`OfflineMediaManager`]: core_media::OfflineMediaManager

pub mod error;
pub mod service;

pub use error::{CoreError, Result};
pub use service::{BackendEndpoint, OfflineCore, OfflineCoreBuilder, StartupReport};
