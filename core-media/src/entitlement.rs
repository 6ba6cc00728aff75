//! # Entitlement Collaborator
//!
//! Media bytes are only reachable through short-lived signed locations
//! handed out by the backend's file storage. [`EntitlementProvider`] is the
//! narrow interface to that service; [`StorageSignedUrlProvider`] implements
//! it against the storage REST endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::{HttpClient, HttpMethod, HttpRequest, RetryPolicy};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{MediaError, Result};

/// Signed, time-limited retrieval URL for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedLocation {
    pub url: String,
    pub valid_until: DateTime<Utc>,
}

/// Issues signed retrieval locations for content the user is entitled to.
#[async_trait]
pub trait EntitlementProvider: Send + Sync {
    /// Sign a retrieval location for `content_id`.
    ///
    /// # Errors
    ///
    /// `MediaError::Entitlement` when the user holds no valid rental or the
    /// signing service cannot be reached.
    async fn signed_retrieval_location(&self, content_id: &str) -> Result<SignedLocation>;

    /// Identity of the signed-in user, if any.
    async fn current_user_id(&self) -> Option<String>;
}

#[derive(Serialize)]
struct SignRequest {
    #[serde(rename = "expiresIn")]
    expires_in: i64,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

/// [`EntitlementProvider`] over the storage service's sign endpoint
/// (`POST /storage/v1/object/sign/<bucket>/<content_id>`).
///
/// The backend's row-level policies decide entitlement; an unentitled user
/// gets a 4xx and the download fails.
pub struct StorageSignedUrlProvider {
    http: Arc<dyn HttpClient>,
    base_url: String,
    bucket: String,
    api_key: Option<String>,
    access_token: Option<String>,
    user_id: Option<String>,
    validity: Duration,
}

impl StorageSignedUrlProvider {
    pub fn new(http: Arc<dyn HttpClient>, base_url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            api_key: None,
            access_token: None,
            user_id: None,
            validity: Duration::hours(1),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Session token and user identity of the signed-in user.
    pub fn with_session(mut self, access_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Sign endpoint for one object. `content_id` is a single path segment.
    fn sign_endpoint(&self, content_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| MediaError::Entitlement(format!("Invalid storage URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| MediaError::Entitlement(format!("Storage URL cannot hold a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["storage", "v1", "object", "sign", self.bucket.as_str(), content_id]);
        Ok(url)
    }
}

#[async_trait]
impl EntitlementProvider for StorageSignedUrlProvider {
    async fn signed_retrieval_location(&self, content_id: &str) -> Result<SignedLocation> {
        let url = self.sign_endpoint(content_id)?;
        let mut request = HttpRequest::new(HttpMethod::Post, url.as_str())
            .json(&SignRequest {
                expires_in: self.validity.num_seconds(),
            })
            .map_err(|e| MediaError::Entitlement(e.to_string()))?;
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key.clone());
        }
        if let Some(token) = &self.access_token {
            request = request.bearer_token(token.clone());
        }

        let issued_at = Utc::now();
        let response = self
            .http
            .execute_with_retry(request, RetryPolicy::default())
            .await
            .map_err(|e| MediaError::Entitlement(e.to_string()))?;

        if !response.is_success() {
            return Err(MediaError::Entitlement(format!(
                "Signing refused for {} (HTTP {})",
                content_id, response.status
            )));
        }

        let body: SignResponse = response
            .json()
            .map_err(|e| MediaError::Entitlement(format!("Malformed sign response: {}", e)))?;
        debug!(content_id, "Signed retrieval location issued");

        let signed = if body.signed_url.starts_with("http") {
            body.signed_url
        } else {
            format!("{}/storage/v1{}", self.base_url, body.signed_url)
        };

        Ok(SignedLocation {
            url: signed,
            valid_until: issued_at + self.validity,
        })
    }

    async fn current_user_id(&self) -> Option<String> {
        self.user_id.clone()
    }
}
