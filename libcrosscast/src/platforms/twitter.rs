//! Twitter adapter
//!
//! Media goes through the v1.1 upload endpoint (simple upload for images
//! and GIFs, chunked INIT/APPEND/FINALIZE for video, with STATUS polling
//! while the provider transcodes), then the tweet itself is created
//! through the v2 API.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::TwitterConfig;
use crate::credentials::{Credential, TokenGrant};
use crate::error::PublishError;
use crate::media::RehostedMedia;
use crate::types::{MediaKind, PlatformId, PlatformPost, ProcessingContainer, ProcessingStatus};

use super::http::{OAuthTokenResponse, ProviderClient};
use super::{await_processing, PlatformAdapter, PublishContext};

/// Chunk size for APPEND segments. The provider caps segments at 5MB.
const UPLOAD_CHUNK_BYTES: usize = 4 * 1024 * 1024;

fn build_tweet_body(text: &str, media_id: Option<&str>) -> Value {
    let mut body = json!({ "text": text });
    if let Some(id) = media_id {
        body["media"] = json!({ "media_ids": [id] });
    }
    body
}

fn permalink(handle: Option<&str>, tweet_id: &str) -> String {
    match handle {
        Some(handle) => format!("https://twitter.com/{handle}/status/{tweet_id}"),
        None => format!("https://twitter.com/i/web/status/{tweet_id}"),
    }
}

fn processing_state(state: &str) -> ProcessingStatus {
    match state {
        "succeeded" => ProcessingStatus::Ready,
        "failed" => ProcessingStatus::Failed,
        "pending" => ProcessingStatus::Created,
        _ => ProcessingStatus::Processing,
    }
}

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    media_id_string: String,
    processing_info: Option<ProcessingInfo>,
}

#[derive(Debug, Deserialize)]
struct ProcessingInfo {
    state: String,
    error: Option<ProcessingInfoError>,
}

#[derive(Debug, Deserialize)]
struct ProcessingInfoError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TweetResponse {
    data: TweetData,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}

pub struct TwitterAdapter {
    config: TwitterConfig,
    client: ProviderClient,
}

impl TwitterAdapter {
    pub fn new(config: TwitterConfig, client: ProviderClient) -> Self {
        TwitterAdapter { config, client }
    }

    fn upload_url(&self) -> String {
        format!("{}/1.1/media/upload.json", self.config.upload_base)
    }

    /// One-shot upload for images and GIFs.
    async fn upload_simple(
        &self,
        ctx: &PublishContext<'_>,
        media: &RehostedMedia,
    ) -> Result<String, PublishError> {
        let form = reqwest::multipart::Form::new()
            .part("media", reqwest::multipart::Part::bytes(media.bytes.clone()));
        let request = self
            .client
            .inner()
            .post(self.upload_url())
            .bearer_auth(&ctx.token.secret)
            .multipart(form);
        let response: MediaUploadResponse = self.client.execute_json(request).await?;
        Ok(response.media_id_string)
    }

    /// Chunked upload for video, waiting out server-side transcoding.
    async fn upload_video(
        &self,
        ctx: &PublishContext<'_>,
        media: &RehostedMedia,
    ) -> Result<String, PublishError> {
        let init_form = [
            ("command", "INIT".to_string()),
            ("total_bytes", media.bytes.len().to_string()),
            ("media_type", media.content_type.clone()),
            ("media_category", "tweet_video".to_string()),
        ];
        let request = self
            .client
            .inner()
            .post(self.upload_url())
            .bearer_auth(&ctx.token.secret)
            .form(&init_form);
        let init: MediaUploadResponse = self.client.execute_json(request).await?;
        let media_id = init.media_id_string;

        for (index, chunk) in media.bytes.chunks(UPLOAD_CHUNK_BYTES).enumerate() {
            let form = reqwest::multipart::Form::new()
                .text("command", "APPEND")
                .text("media_id", media_id.clone())
                .text("segment_index", index.to_string())
                .part("media", reqwest::multipart::Part::bytes(chunk.to_vec()));
            let request = self
                .client
                .inner()
                .post(self.upload_url())
                .bearer_auth(&ctx.token.secret)
                .multipart(form);
            self.client.execute(request).await?;
        }

        let finalize_form = [
            ("command", "FINALIZE".to_string()),
            ("media_id", media_id.clone()),
        ];
        let request = self
            .client
            .inner()
            .post(self.upload_url())
            .bearer_auth(&ctx.token.secret)
            .form(&finalize_form);
        let finalized: MediaUploadResponse = self.client.execute_json(request).await?;

        let needs_polling = finalized
            .processing_info
            .as_ref()
            .map(|info| processing_state(&info.state) != ProcessingStatus::Ready)
            .unwrap_or(false);
        if needs_polling {
            let mut container = ProcessingContainer::new(media_id.clone(), ctx.clock.now());
            await_processing(ctx, &mut container, || {
                self.poll_media_status(ctx, &media_id)
            })
            .await?;
        }

        Ok(media_id)
    }

    async fn poll_media_status(
        &self,
        ctx: &PublishContext<'_>,
        media_id: &str,
    ) -> Result<ProcessingStatus, PublishError> {
        let response: MediaUploadResponse = self
            .client
            .get_json(
                &self.upload_url(),
                &ctx.token.secret,
                &[("command", "STATUS"), ("media_id", media_id)],
            )
            .await?;
        match response.processing_info {
            Some(info) => {
                if info.state == "failed" {
                    let detail = info
                        .error
                        .and_then(|e| e.message)
                        .unwrap_or_else(|| "unspecified error".to_string());
                    return Err(PublishError::ProcessingFailed(format!(
                        "Twitter media processing failed: {detail}"
                    )));
                }
                Ok(processing_state(&info.state))
            }
            None => Ok(ProcessingStatus::Ready),
        }
    }
}

#[async_trait]
impl PlatformAdapter for TwitterAdapter {
    fn id(&self) -> PlatformId {
        PlatformId::Twitter
    }

    async fn refresh_credential(
        &self,
        credential: &Credential,
    ) -> Result<TokenGrant, PublishError> {
        let refresh_token = credential.refresh_token.as_deref().ok_or_else(|| {
            PublishError::ProviderAuth("No refresh token on record for Twitter".to_string())
        })?;
        let url = format!("{}/2/oauth2/token", self.config.api_base);
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        let response: OAuthTokenResponse = self
            .client
            .refresh_token_form(
                PlatformId::Twitter,
                &url,
                &params,
                Some((
                    self.config.client_id.as_str(),
                    self.config.client_secret.expose_secret(),
                )),
            )
            .await?;
        Ok(response.into())
    }

    async fn publish(&self, ctx: &PublishContext<'_>) -> Result<PlatformPost, PublishError> {
        let media_id = match ctx.media {
            Some(media) => Some(match media.kind {
                MediaKind::Video => self.upload_video(ctx, media).await?,
                _ => self.upload_simple(ctx, media).await?,
            }),
            None => None,
        };

        let body = build_tweet_body(&ctx.content.caption, media_id.as_deref());
        let url = format!("{}/2/tweets", self.config.api_base);
        let response: TweetResponse = self
            .client
            .post_json(&url, &ctx.token.secret, &body)
            .await?;

        let tweet_id = response.data.id;
        let url = permalink(ctx.display_handle, &tweet_id);
        Ok(PlatformPost::new(tweet_id).with_permalink(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_tweet_body_text_only() {
        let body = build_tweet_body("hello world", None);
        assert_eq!(body["text"], "hello world");
        assert!(body.get("media").is_none());
    }

    #[test]
    fn test_build_tweet_body_with_media() {
        let body = build_tweet_body("look", Some("710511363345354753"));
        assert_eq!(body["media"]["media_ids"][0], "710511363345354753");
    }

    #[test]
    fn test_permalink_prefers_handle() {
        assert_eq!(
            permalink(Some("alice"), "123"),
            "https://twitter.com/alice/status/123"
        );
        assert_eq!(
            permalink(None, "123"),
            "https://twitter.com/i/web/status/123"
        );
    }

    #[test]
    fn test_processing_state_mapping() {
        assert_eq!(processing_state("succeeded"), ProcessingStatus::Ready);
        assert_eq!(processing_state("failed"), ProcessingStatus::Failed);
        assert_eq!(processing_state("pending"), ProcessingStatus::Created);
        assert_eq!(processing_state("in_progress"), ProcessingStatus::Processing);
    }

    #[test]
    fn test_media_upload_response_parsing() {
        let finalized: MediaUploadResponse = serde_json::from_str(
            r#"{
                "media_id": 710511363345354753,
                "media_id_string": "710511363345354753",
                "processing_info": {"state": "pending", "check_after_secs": 5}
            }"#,
        )
        .unwrap();
        assert_eq!(finalized.media_id_string, "710511363345354753");
        assert_eq!(
            finalized.processing_info.map(|i| i.state),
            Some("pending".to_string())
        );

        let simple: MediaUploadResponse =
            serde_json::from_str(r#"{"media_id_string": "99"}"#).unwrap();
        assert!(simple.processing_info.is_none());
    }

    #[test]
    fn test_tweet_response_parsing() {
        let response: TweetResponse = serde_json::from_str(
            r#"{"data": {"id": "1445880548472328192", "text": "hello"}}"#,
        )
        .unwrap();
        assert_eq!(response.data.id, "1445880548472328192");
    }
}
