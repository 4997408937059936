//! Facebook adapter
//!
//! Posts land on a page through the Graph API. Text goes to the feed
//! endpoint; media posts use the photos or videos endpoint with the
//! rehosted URL, which the provider ingests itself. Token refresh is the
//! same long-lived token exchange Instagram uses.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use crate::config::FacebookConfig;
use crate::credentials::{Credential, TokenGrant};
use crate::error::PublishError;
use crate::media::RehostedMedia;
use crate::types::{MediaKind, PlatformId, PlatformPost};

use super::http::{OAuthTokenResponse, ProviderClient};
use super::{PlatformAdapter, PublishContext};

#[derive(Debug, Deserialize)]
struct FacebookPostResponse {
    id: String,
    /// Photo uploads return the photo id in `id` and the feed story
    /// in `post_id`; the story is the one with a public page.
    post_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PermalinkResponse {
    permalink_url: Option<String>,
}

pub struct FacebookAdapter {
    config: FacebookConfig,
    client: ProviderClient,
}

impl FacebookAdapter {
    pub fn new(config: FacebookConfig, client: ProviderClient) -> Self {
        FacebookAdapter { config, client }
    }

    fn page_id<'a>(&self, ctx: &'a PublishContext<'_>) -> Result<&'a str, PublishError> {
        ctx.provider_user_id.ok_or_else(|| {
            PublishError::ProviderRequest(
                "Facebook credential does not include the page id needed to publish".to_string(),
            )
        })
    }

    async fn create_post(
        &self,
        ctx: &PublishContext<'_>,
        page_id: &str,
    ) -> Result<String, PublishError> {
        let caption = ctx.content.caption.as_str();
        let (endpoint, params): (&str, Vec<(&str, &str)>) = match ctx.media {
            None => ("feed", vec![("message", caption)]),
            Some(RehostedMedia {
                kind: MediaKind::Video,
                url,
                ..
            }) => (
                "videos",
                vec![("file_url", url.as_str()), ("description", caption)],
            ),
            Some(media) => (
                "photos",
                vec![("url", media.url.as_str()), ("caption", caption)],
            ),
        };

        let url = format!("{}/{}/{}", self.config.graph_base, page_id, endpoint);
        let request = self
            .client
            .inner()
            .post(&url)
            .bearer_auth(&ctx.token.secret)
            .form(&params);
        let response: FacebookPostResponse = self.client.execute_json(request).await?;
        Ok(response.post_id.unwrap_or(response.id))
    }

    async fn lookup_permalink(&self, ctx: &PublishContext<'_>, post_id: &str) -> Option<String> {
        let url = format!("{}/{}", self.config.graph_base, post_id);
        match self
            .client
            .get_json::<PermalinkResponse>(&url, &ctx.token.secret, &[("fields", "permalink_url")])
            .await
        {
            Ok(response) => response.permalink_url,
            Err(e) => {
                debug!(error = %e, "Facebook permalink lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl PlatformAdapter for FacebookAdapter {
    fn id(&self) -> PlatformId {
        PlatformId::Facebook
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
            .refresh_token_form(PlatformId::Facebook, &url, &params, None)
            .await?;
        Ok(response.into())
    }

    async fn publish(&self, ctx: &PublishContext<'_>) -> Result<PlatformPost, PublishError> {
        let page_id = self.page_id(ctx)?;
        let post_id = self.create_post(ctx, page_id).await?;

        let permalink = match self.lookup_permalink(ctx, &post_id).await {
            Some(url) => url,
            None => format!("https://www.facebook.com/{post_id}"),
        };
        Ok(PlatformPost::new(post_id).with_permalink(permalink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_response_prefers_story_id() {
        let photo: FacebookPostResponse = serde_json::from_str(
            r#"{"id": "1001", "post_id": "129_4471"}"#,
        )
        .unwrap();
        assert_eq!(photo.post_id.unwrap_or(photo.id), "129_4471");

        let feed: FacebookPostResponse = serde_json::from_str(r#"{"id": "129_4480"}"#).unwrap();
        assert_eq!(feed.post_id.unwrap_or(feed.id), "129_4480");
    }

    #[test]
    fn test_permalink_response_parsing() {
        let response: PermalinkResponse = serde_json::from_str(
            r#"{"permalink_url": "https://www.facebook.com/129/posts/4471", "id": "129_4471"}"#,
        )
        .unwrap();
        assert_eq!(
            response.permalink_url.as_deref(),
            Some("https://www.facebook.com/129/posts/4471")
        );
    }
}
