//! # Network Interception Layer
//!
//! Offline-aware [`HttpClient`](bridge_traits::HttpClient) decorator. Every
//! request is classified by a [`PolicyTable`] into one of three strategies
//! and served from, or recorded into, a generation-partitioned response
//! cache kept in the key-value store.
//!
//! ## Components
//!
//! - **Policy** (`policy`): ordered URL rules selecting a [`Strategy`]
//! - **Cache** (`cache`): response records partitioned by generation
//! - **Interceptor** (`interceptor`): strategy execution, precache, placeholder

pub mod cache;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod policy;

pub use cache::{CachedResponse, ResponseCache};
pub use config::{InterceptConfig, PrecacheManifest};
pub use error::{InterceptError, Result};
pub use interceptor::{ActivationReport, InterceptCacheStats, NetworkInterceptor, CACHE_STATUS_HEADER};
pub use policy::{CacheRule, PolicyTable, Strategy, UrlMatcher};
