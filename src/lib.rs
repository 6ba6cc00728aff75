//! Workspace umbrella crate.
//!
//! Host applications can depend on `offline-core-workspace` and reach the
//! offline layer through the re-exported [`core_service`] façade without
//! wiring each workspace crate individually. The `desktop-shims` feature
//! (enabled by default) pulls in the desktop bridge adapters.

pub use core_service;
pub use core_service::{CoreError, OfflineCore, Result};
