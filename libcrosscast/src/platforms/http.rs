//! Shared HTTP plumbing for provider adapters
//!
//! Every adapter talks to its provider through [`ProviderClient`], which
//! applies the configured timeouts and funnels non-success responses
//! through one classifier, so a 401 means the same thing no matter which
//! platform produced it.

use crate::config::HttpConfig;
use crate::credentials::TokenGrant;
use crate::error::{ConfigError, PublishError, Result};
use crate::types::PlatformId;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Token endpoint response shared by the OAuth2 providers.
///
/// Providers differ on which optional fields they return; anything absent
/// stays `None` and the refresh manager keeps the prior value.
#[derive(Debug, Deserialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
}

impl From<OAuthTokenResponse> for TokenGrant {
    fn from(response: OAuthTokenResponse) -> Self {
        TokenGrant {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_in_secs: response.expires_in,
            scope: response.scope,
        }
    }
}

/// HTTP client shared by all provider adapters.
#[derive(Clone)]
pub struct ProviderClient {
    client: reqwest::Client,
}

impl ProviderClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConfigError::Invalid(format!("Failed to build HTTP client: {e}")))?;
        Ok(ProviderClient { client })
    }

    /// The underlying client, for flows that need full request control
    /// (multipart uploads, raw byte PUTs) and for the media pipeline.
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    /// GET a JSON resource with a bearer token.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        bearer: &str,
        query: &[(&str, &str)],
    ) -> std::result::Result<T, PublishError> {
        let request = self.client.get(url).bearer_auth(bearer).query(query);
        self.execute_json(request).await
    }

    /// POST a JSON body with a bearer token and parse the JSON response.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        bearer: &str,
        body: &Value,
    ) -> std::result::Result<T, PublishError> {
        let request = self.client.post(url).bearer_auth(bearer).json(body);
        self.execute_json(request).await
    }

    /// Send a prepared request, classify the status, and parse the response
    /// body as JSON.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<T, PublishError> {
        let response = self.execute(request).await?;
        response.json::<T>().await.map_err(|e| {
            PublishError::ProviderRequest(format!("Failed to parse provider response: {e}"))
        })
    }

    /// Send a prepared request and classify any non-success status into a
    /// [`PublishError`]. The successful response is handed back untouched
    /// for callers that need headers or a raw body.
    pub async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<reqwest::Response, PublishError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), body = %body, "provider returned error status");
        Err(classify_status(status.as_u16(), &body))
    }

    /// POST an OAuth token request as form data.
    ///
    /// Refresh failures classify differently from publish failures: a
    /// provider answering `invalid_grant` is telling us the grant itself is
    /// gone, which surfaces as a revoked credential rather than an auth
    /// hiccup.
    pub async fn refresh_token_form<T: DeserializeOwned>(
        &self,
        platform: PlatformId,
        url: &str,
        params: &[(&str, &str)],
        basic_auth: Option<(&str, &str)>,
    ) -> std::result::Result<T, PublishError> {
        let mut request = self.client.post(url).form(params);
        if let Some((user, password)) = basic_auth {
            request = request.basic_auth(user, Some(password));
        }
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                PublishError::ProviderRequest(format!(
                    "Failed to parse token refresh response: {e}"
                ))
            });
        }
        let body = response.text().await.unwrap_or_default();
        debug!(
            platform = %platform,
            status = status.as_u16(),
            body = %body,
            "token refresh returned error status"
        );
        Err(classify_refresh_failure(platform, status.as_u16(), &body))
    }
}

fn transport_error(e: reqwest::Error) -> PublishError {
    if e.is_timeout() {
        PublishError::ProviderRequest(format!("Provider request timed out: {e}"))
    } else {
        PublishError::ProviderRequest(format!("Request to provider failed: {e}"))
    }
}

/// Classify a non-success publish response.
///
/// 401 and 403 normally map to [`PublishError::ProviderAuth`] so the caller
/// can attempt one credential refresh. The exception is a duplicate-content
/// rejection, which some providers also deliver as 403: that call was
/// authorized and understood, so it stays a plain provider error and must
/// not trigger a refresh.
pub fn classify_status(status: u16, body: &str) -> PublishError {
    let message = extract_error_message(body);
    match status {
        401 | 403 => {
            if message.to_lowercase().contains("duplicate") {
                PublishError::ProviderRequest(format!(
                    "Provider flagged duplicate content (HTTP {status}): {message}"
                ))
            } else {
                PublishError::ProviderAuth(format!("Provider returned HTTP {status}: {message}"))
            }
        }
        429 => PublishError::ProviderRequest(format!(
            "Provider rate limit reached (HTTP 429): {message}"
        )),
        400..=499 => PublishError::ProviderRequest(format!(
            "Provider rejected the request (HTTP {status}): {message}"
        )),
        500..=599 => PublishError::ProviderRequest(format!(
            "Provider server error (HTTP {status}): {message}"
        )),
        _ => PublishError::ProviderRequest(format!(
            "Unexpected provider response (HTTP {status}): {message}"
        )),
    }
}

/// Classify a failed OAuth token refresh.
pub fn classify_refresh_failure(platform: PlatformId, status: u16, body: &str) -> PublishError {
    if body.contains("invalid_grant") {
        return PublishError::CredentialRevoked { platform };
    }
    let message = extract_error_message(body);
    match status {
        400 | 401 | 403 => PublishError::ProviderAuth(format!(
            "Token refresh rejected (HTTP {status}): {message}"
        )),
        _ => PublishError::ProviderRequest(format!(
            "Token refresh failed (HTTP {status}): {message}"
        )),
    }
}

/// Pull a human-readable message out of a provider error body.
///
/// Providers disagree on their error envelope; this walks the common
/// shapes and falls back to the raw body, truncated to keep log lines
/// and outcome messages bounded.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = value.get("message").and_then(Value::as_str) {
            return msg.to_string();
        }
        if let Some(msg) = value.pointer("/error/message").and_then(Value::as_str) {
            return msg.to_string();
        }
        if let Some(msg) = value.get("error_description").and_then(Value::as_str) {
            return msg.to_string();
        }
        if let Some(msg) = value.get("error").and_then(Value::as_str) {
            return msg.to_string();
        }
        if let Some(msg) = value.pointer("/errors/0/message").and_then(Value::as_str) {
            return msg.to_string();
        }
        if let Some(msg) = value.get("detail").and_then(Value::as_str) {
            return msg.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no response body".to_string()
    } else {
        trimmed.chars().take(300).collect()
    }
}
