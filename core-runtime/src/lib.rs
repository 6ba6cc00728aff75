//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the offline core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//! - Connectivity monitor
//!
//! Every other core crate depends on this one for its logging conventions,
//! its event types and the shared online/offline signal.

pub mod config;
pub mod connectivity;
pub mod error;
pub mod events;
pub mod logging;

pub use connectivity::ConnectivityMonitor;
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus};
