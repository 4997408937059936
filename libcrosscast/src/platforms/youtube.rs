//! YouTube adapter
//!
//! Videos go up through the resumable upload protocol: an initiation call
//! carrying the metadata returns a session URL, the bytes are PUT there,
//! and the new video id is polled until the provider finishes processing.
//! Hashtags ride in the snippet's tags field rather than the description.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::YouTubeConfig;
use crate::credentials::{Credential, TokenGrant};
use crate::error::PublishError;
use crate::types::{PlatformId, PlatformPost, ProcessingContainer, ProcessingStatus};

use super::http::{OAuthTokenResponse, ProviderClient};
use super::{await_processing, PlatformAdapter, PublishContext};

const TITLE_LIMIT_CHARS: usize = 100;

/// Pick the video title: the explicit title when given, otherwise the
/// caption's first line cut to the title limit.
fn video_title(title: Option<&str>, caption: &str) -> String {
    if let Some(title) = title {
        return title.to_string();
    }
    let first_line = caption.lines().next().unwrap_or("").trim();
    if first_line.is_empty() {
        "Untitled upload".to_string()
    } else {
        first_line.chars().take(TITLE_LIMIT_CHARS).collect()
    }
}

fn build_metadata(title: &str, description: &str, tags: &[String]) -> Value {
    json!({
        "snippet": {
            "title": title,
            "description": description,
            "tags": tags,
            "categoryId": "22"
        },
        "status": {
            "privacyStatus": "public",
            "selfDeclaredMadeForKids": false
        }
    })
}

fn processing_status(status: &str) -> ProcessingStatus {
    match status {
        "succeeded" => ProcessingStatus::Ready,
        "failed" | "terminated" => ProcessingStatus::Failed,
        _ => ProcessingStatus::Processing,
    }
}

#[derive(Debug, Deserialize)]
struct VideoResource {
    id: String,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    items: Vec<VideoStatusItem>,
}

#[derive(Debug, Deserialize)]
struct VideoStatusItem {
    #[serde(rename = "processingDetails")]
    processing_details: Option<ProcessingDetails>,
}

#[derive(Debug, Deserialize)]
struct ProcessingDetails {
    #[serde(rename = "processingStatus")]
    processing_status: Option<String>,
}

pub struct YouTubeAdapter {
    config: YouTubeConfig,
    client: ProviderClient,
}

impl YouTubeAdapter {
    pub fn new(config: YouTubeConfig, client: ProviderClient) -> Self {
        YouTubeAdapter { config, client }
    }

    async fn poll_processing(
        &self,
        ctx: &PublishContext<'_>,
        video_id: &str,
    ) -> Result<ProcessingStatus, PublishError> {
        let url = format!("{}/youtube/v3/videos", self.config.api_base);
        let response: VideoListResponse = self
            .client
            .get_json(
                &url,
                &ctx.token.secret,
                &[("part", "processingDetails"), ("id", video_id)],
            )
            .await?;
        let status = response
            .items
            .first()
            .and_then(|item| item.processing_details.as_ref())
            .and_then(|details| details.processing_status.as_deref());
        match status {
            Some("failed") | Some("terminated") => Err(PublishError::ProcessingFailed(format!(
                "YouTube reported a processing failure for video {video_id}"
            ))),
            Some(status) => Ok(processing_status(status)),
            None => Ok(ProcessingStatus::Processing),
        }
    }
}

#[async_trait]
impl PlatformAdapter for YouTubeAdapter {
    fn id(&self) -> PlatformId {
        PlatformId::YouTube
    }

    async fn refresh_credential(
        &self,
        credential: &Credential,
    ) -> Result<TokenGrant, PublishError> {
        let refresh_token = credential.refresh_token.as_deref().ok_or_else(|| {
            PublishError::ProviderAuth("No refresh token on record for YouTube".to_string())
        })?;
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
        ];
        let response: OAuthTokenResponse = self
            .client
            .refresh_token_form(
                PlatformId::YouTube,
                &self.config.token_endpoint,
                &params,
                None,
            )
            .await?;
        Ok(response.into())
    }

    async fn publish(&self, ctx: &PublishContext<'_>) -> Result<PlatformPost, PublishError> {
        let media = ctx.media.ok_or_else(|| {
            PublishError::Validation("YouTube requires media content".to_string())
        })?;

        let title = video_title(ctx.content.title.as_deref(), &ctx.content.caption);
        let metadata = build_metadata(&title, &ctx.content.caption, &ctx.content.hashtags);

        let init_url = format!("{}/youtube/v3/videos", self.config.upload_base);
        let request = self
            .client
            .inner()
            .post(&init_url)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(&ctx.token.secret)
            .header("X-Upload-Content-Length", media.bytes.len().to_string())
            .header("X-Upload-Content-Type", &media.content_type)
            .json(&metadata);
        let response = self.client.execute(request).await?;
        let session_url = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                PublishError::ProviderRequest(
                    "YouTube did not return an upload session URL".to_string(),
                )
            })?;

        let upload = self
            .client
            .inner()
            .put(&session_url)
            .bearer_auth(&ctx.token.secret)
            .header("Content-Type", &media.content_type)
            .body(media.bytes.clone());
        let video: VideoResource = self.client.execute_json(upload).await?;
        let video_id = video.id;

        let mut container = ProcessingContainer::new(video_id.clone(), ctx.clock.now());
        await_processing(ctx, &mut container, || {
            self.poll_processing(ctx, &video_id)
        })
        .await?;

        let permalink = format!("https://www.youtube.com/watch?v={video_id}");
        Ok(PlatformPost::new(video_id).with_permalink(permalink))
    }
}
