//! Platform adapters
//!
//! One adapter per provider, all behind the [`PlatformAdapter`] trait.
//! Adapters live in an [`AdapterRegistry`] keyed by [`PlatformId`], so the
//! publisher dispatches by lookup instead of branching on platform names,
//! and tests can slot in a [`mock::MockAdapter`] wherever a real one goes.
//!
//! # Examples
//!
//! ```no_run
//! use libcrosscast::config::Config;
//! use libcrosscast::platforms::{AdapterRegistry, http::ProviderClient};
//!
//! # fn example() -> libcrosscast::error::Result<()> {
//! let config = Config::load()?;
//! let client = ProviderClient::new(&config.http)?;
//! let registry = AdapterRegistry::from_config(&config, &client);
//!
//! for platform in registry.platforms() {
//!     println!("adapter registered for {platform}");
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::config::{Config, PollingConfig};
use crate::credentials::{AccessToken, Credential, TokenGrant};
use crate::error::PublishError;
use crate::media::RehostedMedia;
use crate::service::validation::ValidatedContent;
use crate::types::{PlatformId, PlatformPost, ProcessingContainer, ProcessingStatus};

use http::ProviderClient;

pub mod facebook;
pub mod http;
pub mod instagram;
pub mod linkedin;
pub mod tiktok;
pub mod twitter;
pub mod youtube;

// Mock adapter is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Everything an adapter needs for one publish attempt.
///
/// Built by the publisher after validation, credential resolution, and
/// media rehosting have all succeeded, so adapters can assume the content
/// is within platform limits and the token was fresh moments ago.
pub struct PublishContext<'a> {
    pub owner_id: &'a str,
    pub token: &'a AccessToken,
    pub content: &'a ValidatedContent,
    pub media: Option<&'a RehostedMedia>,
    /// Provider-side account id from the stored credential, when known.
    pub provider_user_id: Option<&'a str>,
    /// Public handle on the provider, used for constructed permalinks.
    pub display_handle: Option<&'a str>,
    pub clock: &'a dyn Clock,
    pub polling: &'a PollingConfig,
}

/// Common contract for publishing to one provider.
///
/// Implementations hold their platform's configuration and a
/// [`ProviderClient`]; they never reach into global state.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Platform this adapter serves.
    fn id(&self) -> PlatformId;

    /// Exchange the stored refresh token for a fresh grant.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::CredentialRevoked`] when the provider reports
    /// the grant itself is gone (`invalid_grant`), and
    /// [`PublishError::ProviderAuth`] or [`PublishError::ProviderRequest`]
    /// for other refresh failures.
    async fn refresh_credential(
        &self,
        credential: &Credential,
    ) -> Result<TokenGrant, PublishError>;

    /// Publish one piece of content and return the provider's post handle.
    ///
    /// Adapters that upload video follow the provider's container flow:
    /// initiate the upload, poll until the provider reports the media
    /// ready, then commit. The permalink is best effort; adapters construct
    /// one from the post id when the provider does not return it.
    async fn publish(&self, ctx: &PublishContext<'_>) -> Result<PlatformPost, PublishError>;
}

/// Registry of adapters, one per configured platform.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<PlatformId, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every platform with a configuration section.
    pub fn from_config(config: &Config, client: &ProviderClient) -> Self {
        let mut registry = AdapterRegistry::new();
        if let Some(cfg) = &config.platforms.linkedin {
            registry.register(Arc::new(linkedin::LinkedInAdapter::new(
                cfg.clone(),
                client.clone(),
            )));
        }
        if let Some(cfg) = &config.platforms.twitter {
            registry.register(Arc::new(twitter::TwitterAdapter::new(
                cfg.clone(),
                client.clone(),
            )));
        }
        if let Some(cfg) = &config.platforms.instagram {
            registry.register(Arc::new(instagram::InstagramAdapter::new(
                cfg.clone(),
                client.clone(),
            )));
        }
        if let Some(cfg) = &config.platforms.facebook {
            registry.register(Arc::new(facebook::FacebookAdapter::new(
                cfg.clone(),
                client.clone(),
            )));
        }
        if let Some(cfg) = &config.platforms.tiktok {
            registry.register(Arc::new(tiktok::TikTokAdapter::new(
                cfg.clone(),
                client.clone(),
            )));
        }
        if let Some(cfg) = &config.platforms.youtube {
            registry.register(Arc::new(youtube::YouTubeAdapter::new(
                cfg.clone(),
                client.clone(),
            )));
        }
        registry
    }

    /// Register an adapter under its own platform id. A later registration
    /// for the same platform replaces the earlier one.
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.insert(adapter.id(), adapter);
    }

    pub fn get(&self, platform: PlatformId) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    /// Registered platforms in stable name order.
    pub fn platforms(&self) -> Vec<PlatformId> {
        let mut platforms: Vec<PlatformId> = self.adapters.keys().copied().collect();
        platforms.sort_by_key(|p| p.as_str());
        platforms
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Drive a provider processing container to a terminal state.
///
/// The first status check runs immediately; the configured interval elapses
/// between checks. The loop ends when the container reaches `Ready`, the
/// provider reports `Failed`, or the polling budget is spent, in which case
/// the error carries how long was waited.
pub async fn await_processing<F, Fut>(
    ctx: &PublishContext<'_>,
    container: &mut ProcessingContainer,
    mut check: F,
) -> Result<(), PublishError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<ProcessingStatus, PublishError>>,
{
    let started = ctx.clock.now();
    let timeout_secs = ctx.polling.timeout().as_secs();

    loop {
        let reported = check().await?;
        container.record_poll();
        let effective = container.advance(reported);
        debug!(
            handle = %container.handle,
            status = ?effective,
            polls = container.polls(),
            "processing status poll"
        );

        match effective {
            ProcessingStatus::Ready => return Ok(()),
            ProcessingStatus::Failed => {
                return Err(PublishError::ProcessingFailed(format!(
                    "container {} failed during processing",
                    container.handle
                )))
            }
            _ => {}
        }

        let waited = (ctx.clock.now() - started).num_seconds().max(0) as u64;
        if waited >= timeout_secs {
            return Err(PublishError::ProcessingTimeout {
                waited_secs: waited,
            });
        }
        ctx.clock.sleep(ctx.polling.interval()).await;
    }
}
