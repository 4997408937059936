//! Mock adapter implementation for testing
//!
//! This module provides a configurable mock adapter that can simulate
//! successes, auth failures, request failures, scripted result sequences,
//! and provider-side processing waits. It's designed for use in integration
//! tests to verify multi-platform publishing logic without requiring actual
//! provider credentials or network access.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::credentials::{Credential, TokenGrant};
use crate::error::PublishError;
use crate::types::{PlatformId, PlatformPost, ProcessingContainer, ProcessingStatus};

use super::{await_processing, PlatformAdapter, PublishContext};

/// What a publish call does once any scripted results are used up.
#[derive(Debug, Clone)]
enum DefaultOutcome {
    Succeed,
    AuthError(String),
    RequestError(String),
}

/// Mock adapter for testing
pub struct MockAdapter {
    platform: PlatformId,
    post_id: String,
    permalink: Option<String>,
    api_version: Option<String>,
    default_outcome: DefaultOutcome,
    grant: TokenGrant,
    publish_results: Mutex<VecDeque<Result<PlatformPost, PublishError>>>,
    refresh_results: Mutex<VecDeque<Result<TokenGrant, PublishError>>>,
    processing_script: Mutex<VecDeque<ProcessingStatus>>,
    publish_calls: Mutex<usize>,
    refresh_calls: Mutex<usize>,
    published_captions: Mutex<Vec<String>>,
}

impl MockAdapter {
    fn with_outcome(platform: PlatformId, post_id: &str, outcome: DefaultOutcome) -> Self {
        MockAdapter {
            platform,
            post_id: post_id.to_string(),
            permalink: None,
            api_version: None,
            default_outcome: outcome,
            grant: TokenGrant {
                access_token: "refreshed-token".to_string(),
                refresh_token: None,
                expires_in_secs: Some(3600),
                scope: None,
            },
            publish_results: Mutex::new(VecDeque::new()),
            refresh_results: Mutex::new(VecDeque::new()),
            processing_script: Mutex::new(VecDeque::new()),
            publish_calls: Mutex::new(0),
            refresh_calls: Mutex::new(0),
            published_captions: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock adapter whose publishes succeed with the given post id
    pub fn succeeding(platform: PlatformId, post_id: &str) -> Self {
        Self::with_outcome(platform, post_id, DefaultOutcome::Succeed)
    }

    /// Create a mock adapter whose publishes fail with an auth error
    pub fn auth_failing(platform: PlatformId, message: &str) -> Self {
        Self::with_outcome(
            platform,
            "unused",
            DefaultOutcome::AuthError(message.to_string()),
        )
    }

    /// Create a mock adapter whose publishes fail with a request error
    pub fn request_failing(platform: PlatformId, message: &str) -> Self {
        Self::with_outcome(
            platform,
            "unused",
            DefaultOutcome::RequestError(message.to_string()),
        )
    }

    /// Attach a permalink to successful publishes
    pub fn with_permalink(mut self, permalink: &str) -> Self {
        self.permalink = Some(permalink.to_string());
        self
    }

    /// Report an API version on successful publishes
    pub fn with_api_version(mut self, version: &str) -> Self {
        self.api_version = Some(version.to_string());
        self
    }

    /// Set the grant returned by successful refreshes
    pub fn with_grant(mut self, grant: TokenGrant) -> Self {
        self.grant = grant;
        self
    }

    /// Script the first publish calls; later calls fall back to the
    /// adapter's default outcome
    pub fn with_publish_results(
        self,
        results: Vec<Result<PlatformPost, PublishError>>,
    ) -> Self {
        *self.publish_results.lock().unwrap() = results.into();
        self
    }

    /// Script the first refresh calls; later calls return the default grant
    pub fn with_refresh_results(
        self,
        results: Vec<Result<TokenGrant, PublishError>>,
    ) -> Self {
        *self.refresh_results.lock().unwrap() = results.into();
        self
    }

    /// Make publish walk a provider-side processing sequence before
    /// resolving, one status per poll
    pub fn with_processing_script(self, script: Vec<ProcessingStatus>) -> Self {
        *self.processing_script.lock().unwrap() = script.into();
        self
    }

    /// Get the number of times publish was called
    pub fn publish_calls(&self) -> usize {
        *self.publish_calls.lock().unwrap()
    }

    /// Get the number of times refresh_credential was called
    pub fn refresh_calls(&self) -> usize {
        *self.refresh_calls.lock().unwrap()
    }

    /// Get the captions that reached the provider call
    pub fn published_captions(&self) -> Vec<String> {
        self.published_captions.lock().unwrap().clone()
    }

    fn success_post(&self) -> PlatformPost {
        let mut post = PlatformPost::new(self.post_id.clone());
        if let Some(permalink) = &self.permalink {
            post = post.with_permalink(permalink.clone());
        }
        if let Some(version) = &self.api_version {
            post = post.with_api_version(version.clone());
        }
        post
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn id(&self) -> PlatformId {
        self.platform
    }

    async fn refresh_credential(
        &self,
        _credential: &Credential,
    ) -> Result<TokenGrant, PublishError> {
        *self.refresh_calls.lock().unwrap() += 1;

        if let Some(scripted) = self.refresh_results.lock().unwrap().pop_front() {
            return scripted;
        }
        Ok(self.grant.clone())
    }

    async fn publish(&self, ctx: &PublishContext<'_>) -> Result<PlatformPost, PublishError> {
        *self.publish_calls.lock().unwrap() += 1;
        self.published_captions
            .lock()
            .unwrap()
            .push(ctx.content.caption.clone());

        let has_script = !self.processing_script.lock().unwrap().is_empty();
        if has_script {
            let mut container =
                ProcessingContainer::new(format!("{}-container", self.post_id), ctx.clock.now());
            await_processing(ctx, &mut container, || {
                let next = self.processing_script.lock().unwrap().pop_front();
                async move { Ok(next.unwrap_or(ProcessingStatus::Ready)) }
            })
            .await?;
        }

        if let Some(scripted) = self.publish_results.lock().unwrap().pop_front() {
            return scripted;
        }

        match &self.default_outcome {
            DefaultOutcome::Succeed => Ok(self.success_post()),
            DefaultOutcome::AuthError(message) => {
                Err(PublishError::ProviderAuth(message.clone()))
            }
            DefaultOutcome::RequestError(message) => {
                Err(PublishError::ProviderRequest(message.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::PollingConfig;
    use crate::credentials::AccessToken;
    use crate::service::validation::{validate, ValidatedContent};
    use crate::types::PublishContent;
    use chrono::{Duration, Utc};

    fn sample_content(platform: PlatformId) -> ValidatedContent {
        let content = PublishContent {
            caption: Some("Mock caption".to_string()),
            ..Default::default()
        };
        validate(platform, &content).unwrap()
    }

    fn token() -> AccessToken {
        AccessToken::new("token-secret", Utc::now() + Duration::hours(1))
    }

    #[tokio::test]
    async fn test_mock_success() {
        let adapter = MockAdapter::succeeding(PlatformId::Twitter, "post-9")
            .with_permalink("https://example.com/post-9");
        let clock = ManualClock::starting_at(Utc::now());
        let content = sample_content(PlatformId::Twitter);
        let token = token();
        let polling = PollingConfig::default();
        let ctx = PublishContext {
            owner_id: "owner-1",
            token: &token,
            content: &content,
            media: None,
            provider_user_id: None,
            display_handle: None,
            clock: &clock,
            polling: &polling,
        };

        let post = adapter.publish(&ctx).await.unwrap();
        assert_eq!(post.external_id, "post-9");
        assert_eq!(post.permalink.as_deref(), Some("https://example.com/post-9"));
        assert_eq!(adapter.publish_calls(), 1);
        assert_eq!(adapter.published_captions(), vec!["Mock caption"]);
    }

    #[tokio::test]
    async fn test_mock_auth_failure() {
        let adapter = MockAdapter::auth_failing(PlatformId::Twitter, "token expired");
        let clock = ManualClock::starting_at(Utc::now());
        let content = sample_content(PlatformId::Twitter);
        let token = token();
        let polling = PollingConfig::default();
        let ctx = PublishContext {
            owner_id: "owner-1",
            token: &token,
            content: &content,
            media: None,
            provider_user_id: None,
            display_handle: None,
            clock: &clock,
            polling: &polling,
        };

        let err = adapter.publish(&ctx).await.unwrap_err();
        assert!(matches!(err, PublishError::ProviderAuth(_)));
        assert!(err.to_string().contains("token expired"));
    }

    #[tokio::test]
    async fn test_mock_scripted_results_run_before_default() {
        let adapter = MockAdapter::succeeding(PlatformId::Facebook, "post-2")
            .with_publish_results(vec![Err(PublishError::ProviderAuth(
                "first call fails".to_string(),
            ))]);
        let clock = ManualClock::starting_at(Utc::now());
        let content = sample_content(PlatformId::Facebook);
        let token = token();
        let polling = PollingConfig::default();
        let ctx = PublishContext {
            owner_id: "owner-1",
            token: &token,
            content: &content,
            media: None,
            provider_user_id: None,
            display_handle: None,
            clock: &clock,
            polling: &polling,
        };

        assert!(adapter.publish(&ctx).await.is_err());
        let post = adapter.publish(&ctx).await.unwrap();
        assert_eq!(post.external_id, "post-2");
        assert_eq!(adapter.publish_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_processing_script_polls_until_ready() {
        let adapter = MockAdapter::succeeding(PlatformId::TikTok, "post-3")
            .with_processing_script(vec![
                ProcessingStatus::Processing,
                ProcessingStatus::Processing,
                ProcessingStatus::Ready,
            ]);
        let clock = ManualClock::starting_at(Utc::now());
        let content = sample_content(PlatformId::TikTok);
        let token = token();
        let polling = PollingConfig::default();
        let ctx = PublishContext {
            owner_id: "owner-1",
            token: &token,
            content: &content,
            media: None,
            provider_user_id: None,
            display_handle: None,
            clock: &clock,
            polling: &polling,
        };

        let post = adapter.publish(&ctx).await.unwrap();
        assert_eq!(post.external_id, "post-3");
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_refresh_counts_and_grant() {
        let adapter = MockAdapter::succeeding(PlatformId::LinkedIn, "post-4").with_grant(
            TokenGrant {
                access_token: "brand-new".to_string(),
                refresh_token: Some("rotated".to_string()),
                expires_in_secs: Some(7200),
                scope: None,
            },
        );
        let credential = Credential::new(
            "owner-1",
            PlatformId::LinkedIn,
            "old-token",
            Utc::now() + Duration::minutes(1),
        );

        let grant = adapter.refresh_credential(&credential).await.unwrap();
        assert_eq!(grant.access_token, "brand-new");
        assert_eq!(grant.refresh_token.as_deref(), Some("rotated"));
        assert_eq!(adapter.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_request_failure() {
        let adapter = MockAdapter::request_failing(PlatformId::Twitter, "rate limited");
        let clock = ManualClock::starting_at(Utc::now());
        let content = sample_content(PlatformId::Twitter);
        let token = token();
        let polling = PollingConfig::default();
        let ctx = PublishContext {
            owner_id: "owner-1",
            token: &token,
            content: &content,
            media: None,
            provider_user_id: None,
            display_handle: None,
            clock: &clock,
            polling: &polling,
        };

        let err = adapter.publish(&ctx).await.unwrap_err();
        assert!(matches!(err, PublishError::ProviderRequest(_)));
        assert!(err.to_string().contains("rate limited"));
    }
}
