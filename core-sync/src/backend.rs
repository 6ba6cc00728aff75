//! # Backend Apply Handlers
//!
//! [`SyncBackend`] is the narrow write interface to the data backend: one
//! method per operation kind. [`HttpSyncBackend`] implements it over the
//! REST surface of the managed backend.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::{BridgeError, HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::task::{
    FavoriteToggle, RentalCreate, SyncOperation, WalletTransaction, WatchProgressUpdate,
};

/// Why an apply attempt failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// The request did not get a definitive answer; safe to retry.
    #[error("Backend unreachable: {0}")]
    Network(String),

    /// The backend validated and refused the operation.
    #[error("Rejected by backend: {0}")]
    Rejected(String),
}

impl ApplyError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ApplyError::Network(_))
    }
}

impl From<BridgeError> for ApplyError {
    fn from(err: BridgeError) -> Self {
        ApplyError::Network(err.to_string())
    }
}

/// Write interface to the data backend.
#[async_trait]
pub trait SyncBackend: Send + Sync {
    async fn apply_favorite_toggle(&self, payload: &FavoriteToggle) -> Result<(), ApplyError>;

    async fn apply_watch_progress(&self, payload: &WatchProgressUpdate)
        -> Result<(), ApplyError>;

    async fn create_rental(&self, payload: &RentalCreate) -> Result<(), ApplyError>;

    async fn record_wallet_transaction(
        &self,
        payload: &WalletTransaction,
    ) -> Result<(), ApplyError>;
}

/// Route an operation to the handler for its kind.
pub async fn dispatch(backend: &dyn SyncBackend, operation: &SyncOperation) -> Result<(), ApplyError> {
    match operation {
        SyncOperation::FavoriteToggle(p) => backend.apply_favorite_toggle(p).await,
        SyncOperation::WatchProgressUpdate(p) => backend.apply_watch_progress(p).await,
        SyncOperation::RentalCreate(p) => backend.create_rental(p).await,
        SyncOperation::WalletTransaction(p) => backend.record_wallet_transaction(p).await,
    }
}

// ============================================================================
// REST implementation
// ============================================================================

const FAVORITES_PATH: &str = "/rest/v1/favorites";
const WATCH_PROGRESS_PATH: &str = "/rest/v1/watch_progress";
const RENTALS_PATH: &str = "/rest/v1/rentals";
const WALLET_TRANSACTIONS_PATH: &str = "/rest/v1/wallet_transactions";

/// [`SyncBackend`] over the backend's REST tables.
///
/// Status mapping:
/// - 2xx: applied
/// - 409: duplicate idempotency key or unique row, already applied
/// - 408, 429, 5xx: transient
/// - other 4xx: rejected
pub struct HttpSyncBackend {
    http: Arc<dyn HttpClient>,
    base_url: String,
    api_key: Option<String>,
    access_token: Option<String>,
}

impl HttpSyncBackend {
    pub fn new(http: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            access_token: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn request<T: Serialize>(
        &self,
        path: &str,
        body: &T,
        upsert: bool,
    ) -> Result<HttpRequest, ApplyError> {
        let mut request = HttpRequest::new(HttpMethod::Post, format!("{}{}", self.base_url, path))
            .json(body)
            .map_err(|e| ApplyError::Rejected(format!("Unserializable payload: {}", e)))?;

        if upsert {
            request = request.header("Prefer", "resolution=merge-duplicates");
        }
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key.clone());
        }
        if let Some(token) = &self.access_token {
            request = request.bearer_token(token.clone());
        }
        Ok(request)
    }

    fn classify(response: &HttpResponse) -> Result<(), ApplyError> {
        match response.status {
            200..=299 | 409 => Ok(()),
            408 | 429 | 500..=599 => Err(ApplyError::Network(format!(
                "HTTP {}",
                response.status
            ))),
            status => Err(ApplyError::Rejected(format!(
                "HTTP {}: {}",
                status,
                response.text().unwrap_or_default()
            ))),
        }
    }

    async fn send<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
        upsert: bool,
    ) -> Result<(), ApplyError> {
        let request = self.request(path, body, upsert)?;
        // The queue owns retries; one attempt per apply.
        let response = self
            .http
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await?;
        debug!(path, status = response.status, "Backend apply answered");
        Self::classify(&response)
    }
}

#[async_trait]
impl SyncBackend for HttpSyncBackend {
    async fn apply_favorite_toggle(&self, payload: &FavoriteToggle) -> Result<(), ApplyError> {
        self.send(FAVORITES_PATH, payload, true).await
    }

    async fn apply_watch_progress(
        &self,
        payload: &WatchProgressUpdate,
    ) -> Result<(), ApplyError> {
        self.send(WATCH_PROGRESS_PATH, payload, true).await
    }

    async fn create_rental(&self, payload: &RentalCreate) -> Result<(), ApplyError> {
        self.send(RENTALS_PATH, payload, false).await
    }

    async fn record_wallet_transaction(
        &self,
        payload: &WalletTransaction,
    ) -> Result<(), ApplyError> {
        self.send(WALLET_TRANSACTIONS_PATH, payload, false).await
    }
}
