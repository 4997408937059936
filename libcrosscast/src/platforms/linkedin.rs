//! LinkedIn adapter
//!
//! Publishes member posts through the versioned REST API. LinkedIn retires
//! protocol versions on a rolling schedule, so the publish call walks an
//! ordered list of version tags and finally tries with no tag at all; the
//! first attempt the provider accepts wins and its tag is reported on the
//! outcome.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::LinkedInConfig;
use crate::credentials::{Credential, TokenGrant};
use crate::error::PublishError;
use crate::media::RehostedMedia;
use crate::types::{MediaKind, PlatformId, PlatformPost};

use super::http::{OAuthTokenResponse, ProviderClient};
use super::{PlatformAdapter, PublishContext};

/// One step of version negotiation: the tag to send in the
/// `LinkedIn-Version` header, or `None` for the final untagged attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionAttempt {
    pub tag: Option<String>,
}

/// Build the ordered attempt list from the configured tags. The untagged
/// attempt is always appended last.
pub fn version_attempts(tags: &[String]) -> Vec<VersionAttempt> {
    tags.iter()
        .map(|t| VersionAttempt {
            tag: Some(t.clone()),
        })
        .chain(std::iter::once(VersionAttempt { tag: None }))
        .collect()
}

/// Decide whether a failure indicts the version tag rather than the post.
///
/// Only provider-side rejections that name the version qualify; auth and
/// content problems must surface unchanged instead of burning through the
/// remaining attempts.
pub fn is_version_rejection(error: &PublishError) -> bool {
    let PublishError::ProviderRequest(msg) = error else {
        return false;
    };
    let msg = msg.to_lowercase();
    msg.contains("version")
        && (msg.contains("not active") || msg.contains("invalid") || msg.contains("unsupported"))
}

fn author_urn(provider_user_id: &str) -> String {
    if provider_user_id.starts_with("urn:") {
        provider_user_id.to_string()
    } else {
        format!("urn:li:person:{provider_user_id}")
    }
}

/// Request body for the posts endpoint.
fn build_post_body(author: &str, commentary: &str, media_asset: Option<&str>) -> Value {
    let mut body = json!({
        "author": author,
        "commentary": commentary,
        "visibility": "PUBLIC",
        "distribution": {
            "feedDistribution": "MAIN_FEED",
            "targetEntities": [],
            "thirdPartyDistributionChannels": []
        },
        "lifecycleState": "PUBLISHED",
        "isReshareDisabledByAuthor": false
    });
    if let Some(asset) = media_asset {
        body["content"] = json!({ "media": { "id": asset } });
    }
    body
}

#[derive(Debug, Deserialize)]
struct InitializeUploadResponse {
    value: InitializeUploadValue,
}

#[derive(Debug, Deserialize)]
struct InitializeUploadValue {
    #[serde(rename = "uploadUrl")]
    upload_url: String,
    image: Option<String>,
    video: Option<String>,
}

pub struct LinkedInAdapter {
    config: LinkedInConfig,
    client: ProviderClient,
}

impl LinkedInAdapter {
    pub fn new(config: LinkedInConfig, client: ProviderClient) -> Self {
        LinkedInAdapter { config, client }
    }

    fn posts_url(&self) -> String {
        format!("{}/rest/posts", self.config.api_base)
    }

    fn apply_version(
        &self,
        request: reqwest::RequestBuilder,
        attempt: &VersionAttempt,
    ) -> reqwest::RequestBuilder {
        match &attempt.tag {
            Some(tag) => request
                .header("LinkedIn-Version", tag)
                .header("X-Restli-Protocol-Version", "2.0.0"),
            None => request,
        }
    }

    fn resolve_author(&self, ctx: &PublishContext<'_>) -> Result<String, PublishError> {
        ctx.provider_user_id.map(author_urn).ok_or_else(|| {
            PublishError::ProviderRequest(
                "LinkedIn credential does not include the member id needed to author posts"
                    .to_string(),
            )
        })
    }

    /// Initialize an upload slot, PUT the bytes, and return the asset URN.
    async fn upload_media(
        &self,
        ctx: &PublishContext<'_>,
        attempt: &VersionAttempt,
        author: &str,
        media: &RehostedMedia,
    ) -> Result<String, PublishError> {
        let endpoint = match media.kind {
            MediaKind::Video => "videos",
            _ => "images",
        };
        let init_url = format!(
            "{}/rest/{}?action=initializeUpload",
            self.config.api_base, endpoint
        );
        let init_body = json!({ "initializeUploadRequest": { "owner": author } });
        let request = self
            .client
            .inner()
            .post(&init_url)
            .bearer_auth(&ctx.token.secret)
            .json(&init_body);
        let init: InitializeUploadResponse = self
            .client
            .execute_json(self.apply_version(request, attempt))
            .await?;

        let asset = init
            .value
            .image
            .or(init.value.video)
            .ok_or_else(|| {
                PublishError::ProviderRequest(
                    "LinkedIn upload initialization returned no asset URN".to_string(),
                )
            })?;

        let upload = self
            .client
            .inner()
            .put(&init.value.upload_url)
            .bearer_auth(&ctx.token.secret)
            .header("Content-Type", &media.content_type)
            .body(media.bytes.clone());
        self.client.execute(upload).await?;

        Ok(asset)
    }

    /// Run one full publish attempt under a single version descriptor.
    async fn publish_once(
        &self,
        ctx: &PublishContext<'_>,
        attempt: &VersionAttempt,
    ) -> Result<PlatformPost, PublishError> {
        let author = self.resolve_author(ctx)?;

        let asset = match ctx.media {
            Some(media) => Some(self.upload_media(ctx, attempt, &author, media).await?),
            None => None,
        };

        let body = build_post_body(&author, &ctx.content.caption, asset.as_deref());
        let request = self
            .client
            .inner()
            .post(self.posts_url())
            .bearer_auth(&ctx.token.secret)
            .json(&body);
        let response = self
            .client
            .execute(self.apply_version(request, attempt))
            .await?;

        // A created post comes back with the share URN in a header and an
        // empty body; older versions returned the id in the body instead.
        let header_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let post_id = match header_id {
            Some(id) => id,
            None => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                body.get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        PublishError::ProviderRequest(
                            "LinkedIn did not return a post id".to_string(),
                        )
                    })?
            }
        };

        let permalink = format!("https://www.linkedin.com/feed/update/{post_id}");
        let mut post = PlatformPost::new(post_id).with_permalink(permalink);
        if let Some(tag) = &attempt.tag {
            post = post.with_api_version(tag.clone());
        }
        Ok(post)
    }
}

#[async_trait]
impl PlatformAdapter for LinkedInAdapter {
    fn id(&self) -> PlatformId {
        PlatformId::LinkedIn
    }

    async fn refresh_credential(
        &self,
        credential: &Credential,
    ) -> Result<TokenGrant, PublishError> {
        let refresh_token = credential.refresh_token.as_deref().ok_or_else(|| {
            PublishError::ProviderAuth("No refresh token on record for LinkedIn".to_string())
        })?;
        let url = format!("{}/oauth/v2/accessToken", self.config.oauth_base);
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
        ];
        let response: OAuthTokenResponse = self
            .client
            .refresh_token_form(PlatformId::LinkedIn, &url, &params, None)
            .await?;
        Ok(response.into())
    }

    async fn publish(&self, ctx: &PublishContext<'_>) -> Result<PlatformPost, PublishError> {
        let attempts = version_attempts(&self.config.version_tags);
        let total = attempts.len();

        let mut last_error = None;
        for (index, attempt) in attempts.iter().enumerate() {
            match self.publish_once(ctx, attempt).await {
                Ok(post) => {
                    if index > 0 {
                        info!(
                            version = attempt.tag.as_deref().unwrap_or("untagged"),
                            "published after version fallback"
                        );
                    }
                    return Ok(post);
                }
                Err(e) if is_version_rejection(&e) && index + 1 < total => {
                    warn!(
                        version = attempt.tag.as_deref().unwrap_or("untagged"),
                        error = %e,
                        "version rejected, trying next tag"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            PublishError::ProviderRequest("No LinkedIn version attempts were made".to_string())
        }))
    }
}
