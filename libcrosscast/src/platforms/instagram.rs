//! Instagram adapter
//!
//! Publishing goes through the Graph API container flow: create a media
//! container pointing at the rehosted URL, wait for the provider to ingest
//! it (videos report progress through a status code that must be polled),
//! then commit with a publish call.
//!
//! The Graph API has no separate refresh token; the long-lived user token
//! doubles as the exchange token and lives in the credential's refresh
//! slot.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use crate::config::InstagramConfig;
use crate::credentials::{Credential, TokenGrant};
use crate::error::PublishError;
use crate::media::RehostedMedia;
use crate::types::{MediaKind, PlatformId, PlatformPost, ProcessingContainer, ProcessingStatus};

use super::http::{OAuthTokenResponse, ProviderClient};
use super::{await_processing, PlatformAdapter, PublishContext};

fn container_status(status_code: &str) -> ProcessingStatus {
    match status_code {
        "FINISHED" => ProcessingStatus::Ready,
        "ERROR" | "EXPIRED" => ProcessingStatus::Failed,
        _ => ProcessingStatus::Processing,
    }
}

#[derive(Debug, Deserialize)]
struct GraphId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ContainerStatusResponse {
    status_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PermalinkResponse {
    permalink: Option<String>,
}

pub struct InstagramAdapter {
    config: InstagramConfig,
    client: ProviderClient,
}

impl InstagramAdapter {
    pub fn new(config: InstagramConfig, client: ProviderClient) -> Self {
        InstagramAdapter { config, client }
    }

    fn account_id<'a>(&self, ctx: &'a PublishContext<'_>) -> Result<&'a str, PublishError> {
        ctx.provider_user_id.ok_or_else(|| {
            PublishError::ProviderRequest(
                "Instagram credential does not include the account id needed to publish"
                    .to_string(),
            )
        })
    }

    async fn create_container(
        &self,
        ctx: &PublishContext<'_>,
        account_id: &str,
        media: &RehostedMedia,
    ) -> Result<String, PublishError> {
        let url = format!("{}/{}/media", self.config.graph_base, account_id);
        let caption = ctx.content.caption.as_str();
        let params: Vec<(&str, &str)> = match media.kind {
            MediaKind::Video => vec![
                ("video_url", media.url.as_str()),
                ("media_type", "REELS"),
                ("caption", caption),
            ],
            _ => vec![("image_url", media.url.as_str()), ("caption", caption)],
        };
        let request = self
            .client
            .inner()
            .post(&url)
            .bearer_auth(&ctx.token.secret)
            .form(&params);
        let created: GraphId = self.client.execute_json(request).await?;
        Ok(created.id)
    }

    async fn poll_container(
        &self,
        ctx: &PublishContext<'_>,
        creation_id: &str,
    ) -> Result<ProcessingStatus, PublishError> {
        let url = format!("{}/{}", self.config.graph_base, creation_id);
        let response: ContainerStatusResponse = self
            .client
            .get_json(&url, &ctx.token.secret, &[("fields", "status_code")])
            .await?;
        match response.status_code.as_deref() {
            Some("ERROR") | Some("EXPIRED") => Err(PublishError::ProcessingFailed(format!(
                "Instagram could not process the media for container {creation_id}"
            ))),
            Some(code) => Ok(container_status(code)),
            None => Ok(ProcessingStatus::Processing),
        }
    }

    async fn commit(
        &self,
        ctx: &PublishContext<'_>,
        account_id: &str,
        creation_id: &str,
    ) -> Result<String, PublishError> {
        let url = format!("{}/{}/media_publish", self.config.graph_base, account_id);
        let request = self
            .client
            .inner()
            .post(&url)
            .bearer_auth(&ctx.token.secret)
            .form(&[("creation_id", creation_id)]);
        let published: GraphId = self.client.execute_json(request).await?;
        Ok(published.id)
    }

    async fn lookup_permalink(&self, ctx: &PublishContext<'_>, media_id: &str) -> Option<String> {
        let url = format!("{}/{}", self.config.graph_base, media_id);
        match self
            .client
            .get_json::<PermalinkResponse>(&url, &ctx.token.secret, &[("fields", "permalink")])
            .await
        {
            Ok(response) => response.permalink,
            Err(e) => {
                debug!(error = %e, "Instagram permalink lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl PlatformAdapter for InstagramAdapter {
    fn id(&self) -> PlatformId {
        PlatformId::Instagram
    }

    async fn refresh_credential(
        &self,
        credential: &Credential,
    ) -> Result<TokenGrant, PublishError> {
        let exchange_token = credential
            .refresh_token
            .as_deref()
            .unwrap_or(&credential.access_token);
        let url = format!("{}/oauth/access_token", self.config.graph_base);
        let params = [
            ("grant_type", "fb_exchange_token"),
            ("client_id", self.config.app_id.as_str()),
            ("client_secret", self.config.app_secret.expose_secret()),
            ("fb_exchange_token", exchange_token),
        ];
        let response: OAuthTokenResponse = self
            .client
            .refresh_token_form(PlatformId::Instagram, &url, &params, None)
            .await?;
        Ok(response.into())
    }

    async fn publish(&self, ctx: &PublishContext<'_>) -> Result<PlatformPost, PublishError> {
        let account_id = self.account_id(ctx)?;
        let media = ctx.media.ok_or_else(|| {
            PublishError::Validation("Instagram requires media content".to_string())
        })?;

        let creation_id = self.create_container(ctx, account_id, media).await?;

        if media.kind == MediaKind::Video {
            let mut container = ProcessingContainer::new(creation_id.clone(), ctx.clock.now());
            await_processing(ctx, &mut container, || {
                self.poll_container(ctx, &creation_id)
            })
            .await?;
        }

        let media_id = self.commit(ctx, account_id, &creation_id).await?;

        let permalink = match self.lookup_permalink(ctx, &media_id).await {
            Some(url) => url,
            None => format!("https://www.instagram.com/p/{media_id}"),
        };
        Ok(PlatformPost::new(media_id).with_permalink(permalink))
    }
}
