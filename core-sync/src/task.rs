//! # Queued Operations
//!
//! A [`SyncTask`] wraps one state-changing [`SyncOperation`] that could not
//! reach the backend. The operation set is closed: each variant carries its
//! own typed payload and dispatch over it is an exhaustive `match`.
//!
//! ## Idempotence
//!
//! Replays may deliver an operation more than once (a success whose removal
//! was not persisted, a timeout after the backend committed). Every payload
//! is therefore safe to apply twice:
//! - favorite toggles and watch progress carry the absolute target state
//! - rentals and wallet transactions carry an idempotency key the backend
//!   uses to reject duplicates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Result, SyncError};

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a queued task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncTaskId(Uuid);

impl SyncTaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::InvalidTaskId(e.to_string()))
    }
}

impl Default for SyncTaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Operation Kinds
// ============================================================================

/// Tag of a queued operation; ordering is preserved per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTaskKind {
    FavoriteToggle,
    WatchProgressUpdate,
    RentalCreate,
    WalletTransaction,
}

impl SyncTaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FavoriteToggle => "favorite_toggle",
            Self::WatchProgressUpdate => "watch_progress_update",
            Self::RentalCreate => "rental_create",
            Self::WalletTransaction => "wallet_transaction",
        }
    }
}

impl fmt::Display for SyncTaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncTaskKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "favorite_toggle" => Ok(Self::FavoriteToggle),
            "watch_progress_update" => Ok(Self::WatchProgressUpdate),
            "rental_create" => Ok(Self::RentalCreate),
            "wallet_transaction" => Ok(Self::WalletTransaction),
            other => Err(SyncError::InvalidKind(other.to_string())),
        }
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Set (not flip) the favorite flag for a title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteToggle {
    pub user_id: String,
    pub content_id: String,
    pub favorited: bool,
}

/// Absolute playback position for a title or episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchProgressUpdate {
    pub user_id: String,
    pub content_id: String,
    pub position_seconds: u64,
    pub duration_seconds: Option<u64>,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalCreate {
    pub user_id: String,
    pub content_id: String,
    pub price_cents: i64,
    pub rental_hours: u32,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTransactionType {
    TopUp,
    Purchase,
    Refund,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub user_id: String,
    /// Signed amount; purchases are negative
    pub amount_cents: i64,
    pub transaction_type: WalletTransactionType,
    pub description: Option<String>,
    pub idempotency_key: String,
}

/// A state-changing operation destined for the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum SyncOperation {
    FavoriteToggle(FavoriteToggle),
    WatchProgressUpdate(WatchProgressUpdate),
    RentalCreate(RentalCreate),
    WalletTransaction(WalletTransaction),
}

impl SyncOperation {
    pub fn kind(&self) -> SyncTaskKind {
        match self {
            Self::FavoriteToggle(_) => SyncTaskKind::FavoriteToggle,
            Self::WatchProgressUpdate(_) => SyncTaskKind::WatchProgressUpdate,
            Self::RentalCreate(_) => SyncTaskKind::RentalCreate,
            Self::WalletTransaction(_) => SyncTaskKind::WalletTransaction,
        }
    }

    /// Caller-supplied deduplication key, for the kinds that are not upserts.
    pub fn idempotency_key(&self) -> Option<&str> {
        match self {
            Self::RentalCreate(p) => Some(&p.idempotency_key),
            Self::WalletTransaction(p) => Some(&p.idempotency_key),
            Self::FavoriteToggle(_) | Self::WatchProgressUpdate(_) => None,
        }
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// A queued mutation awaiting replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: SyncTaskId,
    pub operation: SyncOperation,
    pub enqueued_at: DateTime<Utc>,
    /// Failed apply attempts so far
    pub attempt_count: u32,
    pub last_error: Option<String>,
}

impl SyncTask {
    pub fn new(operation: SyncOperation, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: SyncTaskId::new(),
            operation,
            enqueued_at,
            attempt_count: 0,
            last_error: None,
        }
    }

    pub fn kind(&self) -> SyncTaskKind {
        self.operation.kind()
    }
}

/// A task removed after exhausting its retries, kept for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub task: SyncTask,
    pub dropped_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rental() -> SyncOperation {
        SyncOperation::RentalCreate(RentalCreate {
            user_id: "u1".to_string(),
            content_id: "42".to_string(),
            price_cents: 399,
            rental_hours: 48,
            idempotency_key: "rent-u1-42-1".to_string(),
        })
    }

    #[test]
    fn test_kind_and_idempotency_key() {
        let op = rental();
        assert_eq!(op.kind(), SyncTaskKind::RentalCreate);
        assert_eq!(op.idempotency_key(), Some("rent-u1-42-1"));

        let fav = SyncOperation::FavoriteToggle(FavoriteToggle {
            user_id: "u1".to_string(),
            content_id: "42".to_string(),
            favorited: true,
        });
        assert_eq!(fav.kind().as_str(), "favorite_toggle");
        assert_eq!(fav.idempotency_key(), None);
    }

    #[test]
    fn test_task_ids_unique_for_same_timestamp() {
        let now = Utc::now();
        let a = SyncTask::new(rental(), now);
        let b = SyncTask::new(rental(), now);
        assert_ne!(a.id, b.id);
        assert_eq!(a.attempt_count, 0);
    }

    #[test]
    fn test_operation_serialized_with_kind_tag() {
        let json = serde_json::to_value(rental()).unwrap();
        assert_eq!(json["kind"], "rental_create");
        assert_eq!(json["payload"]["rental_hours"], 48);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(
            "wallet_transaction".parse::<SyncTaskKind>().unwrap(),
            SyncTaskKind::WalletTransaction
        );
        assert!("bogus".parse::<SyncTaskKind>().is_err());
    }

    #[test]
    fn test_task_id_parsing() {
        let id = SyncTaskId::new();
        assert_eq!(SyncTaskId::from_string(&id.to_string()).unwrap(), id);
        assert!(SyncTaskId::from_string("not-a-uuid").is_err());
    }
}
