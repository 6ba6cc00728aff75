//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux):
//! - `HttpClient` using `reqwest`
//! - `KeyValueStore` using SQLite via `sqlx`
//! - `BlobStore` using one file per blob under a cache directory
//! - `NetworkMonitor` using a TCP reachability probe
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FsBlobStore, ReqwestHttpClient, SqliteKeyValueStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), bridge_traits::BridgeError> {
//!     let http = ReqwestHttpClient::new()?;
//!     let kv = SqliteKeyValueStore::new("/tmp/offline.db".into()).await?;
//!     let blobs = FsBlobStore::new("/tmp/offline-media");
//!     // hand these to CoreConfig::builder()
//!     Ok(())
//! }
//! ```

mod blob_store;
mod http;
mod kv_store;
mod network;

pub use blob_store::FsBlobStore;
pub use http::ReqwestHttpClient;
pub use kv_store::SqliteKeyValueStore;
pub use network::DesktopNetworkMonitor;
