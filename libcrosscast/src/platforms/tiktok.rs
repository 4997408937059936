//! TikTok adapter
//!
//! Uses the content posting API's PULL_FROM_URL flow: the provider
//! downloads the video from the rehosted URL itself, and the publish is
//! tracked through a status endpoint until it completes. TikTok wraps
//! every response in a data/error envelope and can report failures with
//! an HTTP 200, so the envelope is checked on every call.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::TikTokConfig;
use crate::credentials::{Credential, TokenGrant};
use crate::error::PublishError;
use crate::types::{PlatformId, PlatformPost, ProcessingContainer, ProcessingStatus};

use super::http::{OAuthTokenResponse, ProviderClient};
use super::{await_processing, PlatformAdapter, PublishContext};

fn build_init_body(title: &str, video_url: &str) -> Value {
    json!({
        "post_info": {
            "title": title,
            "privacy_level": "PUBLIC_TO_EVERYONE"
        },
        "source_info": {
            "source": "PULL_FROM_URL",
            "video_url": video_url
        }
    })
}

fn publish_status(status: &str) -> ProcessingStatus {
    match status {
        "PUBLISH_COMPLETE" => ProcessingStatus::Ready,
        "FAILED" => ProcessingStatus::Failed,
        _ => ProcessingStatus::Processing,
    }
}

#[derive(Debug, Deserialize)]
struct TikTokEnvelope<T> {
    data: Option<T>,
    error: Option<TikTokError>,
}

#[derive(Debug, Deserialize)]
struct TikTokError {
    code: String,
    message: String,
}

fn envelope_error(error: &TikTokError) -> Option<PublishError> {
    if error.code == "ok" {
        return None;
    }
    let detail = format!("TikTok rejected the call ({}): {}", error.code, error.message);
    if error.code.contains("token") || error.code.contains("scope") || error.code.contains("auth")
    {
        Some(PublishError::ProviderAuth(detail))
    } else {
        Some(PublishError::ProviderRequest(detail))
    }
}

fn unwrap_envelope<T>(envelope: TikTokEnvelope<T>) -> Result<T, PublishError> {
    if let Some(error) = &envelope.error {
        if let Some(err) = envelope_error(error) {
            return Err(err);
        }
    }
    envelope.data.ok_or_else(|| {
        PublishError::ProviderRequest("TikTok response contained no data".to_string())
    })
}

#[derive(Debug, Deserialize)]
struct PublishInitData {
    publish_id: String,
}

#[derive(Debug, Deserialize)]
struct PublishStatusData {
    status: Option<String>,
    fail_reason: Option<String>,
    // Field name as the provider spells it.
    #[serde(rename = "publicaly_available_post_id")]
    post_ids: Option<Vec<Value>>,
}

fn first_post_id(data: &PublishStatusData) -> Option<String> {
    data.post_ids.as_ref()?.first().and_then(|v| {
        v.as_i64()
            .map(|n| n.to_string())
            .or_else(|| v.as_str().map(str::to_string))
    })
}

pub struct TikTokAdapter {
    config: TikTokConfig,
    client: ProviderClient,
}

impl TikTokAdapter {
    pub fn new(config: TikTokConfig, client: ProviderClient) -> Self {
        TikTokAdapter { config, client }
    }

    async fn fetch_status(
        &self,
        ctx: &PublishContext<'_>,
        publish_id: &str,
    ) -> Result<PublishStatusData, PublishError> {
        let url = format!("{}/v2/post/publish/status/fetch/", self.config.api_base);
        let request = self
            .client
            .inner()
            .post(&url)
            .bearer_auth(&ctx.token.secret)
            .json(&json!({ "publish_id": publish_id }));
        let envelope: TikTokEnvelope<PublishStatusData> =
            self.client.execute_json(request).await?;
        unwrap_envelope(envelope)
    }

    async fn poll_publish_status(
        &self,
        ctx: &PublishContext<'_>,
        publish_id: &str,
    ) -> Result<ProcessingStatus, PublishError> {
        let data = self.fetch_status(ctx, publish_id).await?;
        match data.status.as_deref() {
            Some("FAILED") => {
                let reason = data
                    .fail_reason
                    .unwrap_or_else(|| "unspecified reason".to_string());
                Err(PublishError::ProcessingFailed(format!(
                    "TikTok publish failed: {reason}"
                )))
            }
            Some(status) => Ok(publish_status(status)),
            None => Ok(ProcessingStatus::Processing),
        }
    }
}

#[async_trait]
impl PlatformAdapter for TikTokAdapter {
    fn id(&self) -> PlatformId {
        PlatformId::TikTok
    }

    async fn refresh_credential(
        &self,
        credential: &Credential,
    ) -> Result<TokenGrant, PublishError> {
        let refresh_token = credential.refresh_token.as_deref().ok_or_else(|| {
            PublishError::ProviderAuth("No refresh token on record for TikTok".to_string())
        })?;
        let url = format!("{}/v2/oauth/token/", self.config.api_base);
        let params = [
            ("client_key", self.config.client_key.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let response: OAuthTokenResponse = self
            .client
            .refresh_token_form(PlatformId::TikTok, &url, &params, None)
            .await?;
        Ok(response.into())
    }

    async fn publish(&self, ctx: &PublishContext<'_>) -> Result<PlatformPost, PublishError> {
        let media = ctx.media.ok_or_else(|| {
            PublishError::Validation("TikTok requires media content".to_string())
        })?;

        let url = format!("{}/v2/post/publish/video/init/", self.config.api_base);
        let body = build_init_body(&ctx.content.caption, &media.url);
        let request = self
            .client
            .inner()
            .post(&url)
            .bearer_auth(&ctx.token.secret)
            .json(&body);
        let envelope: TikTokEnvelope<PublishInitData> = self.client.execute_json(request).await?;
        let publish_id = unwrap_envelope(envelope)?.publish_id;

        let mut container = ProcessingContainer::new(publish_id.clone(), ctx.clock.now());
        await_processing(ctx, &mut container, || {
            self.poll_publish_status(ctx, &publish_id)
        })
        .await?;

        // The public post id only appears on the status feed once publishing
        // completes; fall back to the publish handle when it never shows.
        let video_id = match self.fetch_status(ctx, &publish_id).await {
            Ok(data) => first_post_id(&data).unwrap_or_else(|| publish_id.clone()),
            Err(e) => {
                debug!(error = %e, "TikTok post id lookup failed");
                publish_id.clone()
            }
        };

        let mut post = PlatformPost::new(video_id.clone());
        if let Some(handle) = ctx.display_handle {
            post = post.with_permalink(format!(
                "https://www.tiktok.com/@{handle}/video/{video_id}"
            ));
        }
        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_body_shape() {
        let body = build_init_body("my clip", "https://cdn.example.com/v.mp4");
        assert_eq!(body["post_info"]["title"], "my clip");
        assert_eq!(body["source_info"]["source"], "PULL_FROM_URL");
        assert_eq!(body["source_info"]["video_url"], "https://cdn.example.com/v.mp4");
    }

    #[test]
    fn test_envelope_ok_is_not_an_error() {
        let error = TikTokError {
            code: "ok".to_string(),
            message: String::new(),
        };
        assert!(envelope_error(&error).is_none());
    }

    #[test]
    fn test_envelope_token_errors_are_auth() {
        let error = TikTokError {
            code: "access_token_invalid".to_string(),
            message: "The access token is invalid".to_string(),
        };
        assert!(matches!(
            envelope_error(&error),
            Some(PublishError::ProviderAuth(_))
        ));

        let error = TikTokError {
            code: "spam_risk_too_many_posts".to_string(),
            message: "Daily post cap reached".to_string(),
        };
        assert!(matches!(
            envelope_error(&error),
            Some(PublishError::ProviderRequest(_))
        ));
    }

    #[test]
    fn test_unwrap_envelope_without_data() {
        let envelope: TikTokEnvelope<PublishInitData> = TikTokEnvelope {
            data: None,
            error: Some(TikTokError {
                code: "ok".to_string(),
                message: String::new(),
            }),
        };
        let err = unwrap_envelope(envelope).unwrap_err();
        assert!(err.to_string().contains("no data"));
    }

    #[test]
    fn test_publish_status_mapping() {
        assert_eq!(publish_status("PUBLISH_COMPLETE"), ProcessingStatus::Ready);
        assert_eq!(publish_status("FAILED"), ProcessingStatus::Failed);
        assert_eq!(
            publish_status("PROCESSING_DOWNLOAD"),
            ProcessingStatus::Processing
        );
    }

    #[test]
    fn test_first_post_id_handles_numbers_and_strings() {
        let data: PublishStatusData = serde_json::from_str(
            r#"{"status": "PUBLISH_COMPLETE", "publicaly_available_post_id": [7345678901234567890]}"#,
        )
        .unwrap();
        assert_eq!(first_post_id(&data), Some("7345678901234567890".to_string()));

        let data: PublishStatusData = serde_json::from_str(
            r#"{"status": "PUBLISH_COMPLETE", "publicaly_available_post_id": ["7345"]}"#,
        )
        .unwrap();
        assert_eq!(first_post_id(&data), Some("7345".to_string()));

        let data: PublishStatusData =
            serde_json::from_str(r#"{"status": "PROCESSING_UPLOAD"}"#).unwrap();
        assert_eq!(first_post_id(&data), None);
    }
}
