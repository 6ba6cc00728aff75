//! # Pending-Operation Queue
//!
//! Keeps user mutations (favorites, watch progress, rentals, wallet
//! transactions) durable while the backend is unreachable and replays them
//! in order once connectivity returns.
//!
//! ## Components
//!
//! - **Tasks** (`task`): the queued operation kinds and their payloads
//! - **Backend** (`backend`): per-kind apply handlers and the REST implementation
//! - **Store** (`store`): durable layout of the queue in the key-value store
//! - **Manager** (`manager`): enqueue, drain, retry accounting and drain triggers

pub mod backend;
pub mod config;
pub mod error;
pub mod manager;
pub mod store;
pub mod task;

pub use backend::{dispatch, ApplyError, HttpSyncBackend, SyncBackend};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use manager::{DrainReport, SubmitOutcome, SyncQueueManager, SyncTrigger};
pub use task::{
    DeadLetter, FavoriteToggle, RentalCreate, SyncOperation, SyncTask, SyncTaskId, SyncTaskKind,
    WalletTransaction, WalletTransactionType, WatchProgressUpdate,
};
