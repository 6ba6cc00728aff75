//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the offline core and
//! platform-specific implementations. Each trait represents a capability the
//! core requires but that is implemented differently per platform (desktop,
//! iOS, Android, web).
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with retry and streaming downloads
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity signal and change stream
//!
//! ### Storage
//! - [`KeyValueStore`](storage::KeyValueStore) - Durable small records (queue, indexes, response cache)
//! - [`BlobStore`](storage::BlobStore) - Durable large payloads (downloaded media)
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | iOS      | TBD                 | 📋 Planned |
//! | Android  | TBD                 | 📋 Planned |
//! | Web      | TBD                 | 📋 Planned |
//!
//! In-memory stores live in [`memory`] for tests and for hosts without a
//! persistent backend.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! must map "no connectivity" transport failures to `BridgeError::Network` or
//! `BridgeError::Timeout`; the queue and interception layers depend on that
//! distinction.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single implementation can be
//! shared across async tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod memory;
pub mod network;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{DownloadStream, HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use memory::{MemoryBlobStore, MemoryKeyValueStore};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use storage::{BlobStore, KeyValueStore};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
