//! Publish orchestration across platforms
//!
//! This module fans a publish request out to the requested platforms, runs
//! each one through validation, credential resolution, media rehosting, and
//! the provider call as an independent unit of work, and collects one
//! outcome per platform into a report.

use std::str::FromStr;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::PollingConfig;
use crate::credentials::{AccessToken, Credential, CredentialStore, RefreshManager};
use crate::error::{PublishError, Result};
use crate::media::{MediaRehoster, RehostedMedia};
use crate::platforms::{AdapterRegistry, PlatformAdapter, PublishContext};
use crate::service::validation::{self, ValidatedContent};
use crate::types::{PlatformId, PlatformOutcome, PlatformPost, PublishReport, PublishRequest};

/// Multi-platform publish orchestrator
///
/// Holds the adapter registry and the shared collaborators every platform
/// attempt needs. One `Publisher` serves many requests.
pub struct Publisher {
    registry: Arc<AdapterRegistry>,
    store: Arc<dyn CredentialStore>,
    refresh: RefreshManager,
    rehoster: MediaRehoster,
    clock: Arc<dyn Clock>,
    polling: PollingConfig,
}

impl Publisher {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        store: Arc<dyn CredentialStore>,
        rehoster: MediaRehoster,
        clock: Arc<dyn Clock>,
        polling: PollingConfig,
    ) -> Self {
        let refresh = RefreshManager::new(Arc::clone(&store), Arc::clone(&clock));
        Publisher {
            registry,
            store,
            refresh,
            rehoster,
            clock,
            polling,
        }
    }

    /// Publish content to every requested platform concurrently.
    ///
    /// Platforms are attempted together and awaited jointly; no platform's
    /// failure aborts another's attempt. The report carries exactly one
    /// outcome per requested platform, and overall success means at least
    /// one of them succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error only when the request itself is malformed.
    /// Individual platform failures are captured in the report's outcomes.
    pub async fn publish(&self, request: &PublishRequest) -> Result<PublishReport> {
        request.ensure_well_formed()?;

        let platforms = request.requested_platforms();
        info!(
            owner = %request.owner_id,
            platforms = ?platforms,
            "Starting publish across {} platform(s)",
            platforms.len()
        );

        let attempts: Vec<_> = platforms
            .iter()
            .map(|name| async move {
                match self.publish_one(name, request).await {
                    Ok(post) => {
                        info!(platform = %name, post_id = %post.external_id, "Publish succeeded");
                        PlatformOutcome::succeeded(name.clone(), post)
                    }
                    Err(e) => {
                        warn!(platform = %name, error = %e, "Publish failed");
                        PlatformOutcome::failed(name.clone(), &e)
                    }
                }
            })
            .collect();

        let outcomes = join_all(attempts).await;
        let report = PublishReport::from_outcomes(outcomes);
        info!("{}", report.message);
        Ok(report)
    }

    /// Run one platform through the full pipeline: validate the content,
    /// resolve a usable token, rehost any media, then call the provider.
    ///
    /// A `ProviderAuth` rejection from the call gets exactly one forced
    /// refresh and retry. Duplicate-content rejections never reach that
    /// path; the response classifier surfaces them as request errors.
    async fn publish_one(
        &self,
        name: &str,
        request: &PublishRequest,
    ) -> std::result::Result<PlatformPost, PublishError> {
        let platform = PlatformId::from_str(name)?;
        let adapter = self
            .registry
            .get(platform)
            .ok_or_else(|| PublishError::UnknownPlatform(name.to_string()))?;

        debug!(%platform, stage = "validating", "Checking content against platform rules");
        let content = validation::validate(platform, &request.content)?;

        debug!(%platform, stage = "resolving_credential", "Ensuring a usable access token");
        let token = self
            .refresh
            .ensure_valid(&request.owner_id, adapter.as_ref())
            .await?;
        let credential = self.load_credential(&request.owner_id, platform).await?;

        let media = match &request.content.media {
            Some(source) => {
                debug!(%platform, stage = "rehosting", "Rehosting attached media");
                let rehosted = self.rehoster.rehost(source, &request.owner_id).await?;
                // The fetched bytes settle the media kind; re-check acceptance
                // now that it is known for certain.
                validation::ensure_kind_accepted(platform, rehosted.kind)?;
                Some(rehosted)
            }
            None => None,
        };

        debug!(%platform, stage = "calling", "Calling the provider");
        let first = self
            .call_adapter(adapter.as_ref(), request, &content, &credential, &token, media.as_ref())
            .await;

        match first {
            Err(PublishError::ProviderAuth(detail)) => {
                info!(
                    %platform,
                    "Provider rejected authorization ({}); refreshing credential and retrying once",
                    detail
                );
                let token = self
                    .refresh
                    .refresh_now(&request.owner_id, adapter.as_ref())
                    .await?;
                self.call_adapter(
                    adapter.as_ref(),
                    request,
                    &content,
                    &credential,
                    &token,
                    media.as_ref(),
                )
                .await
            }
            other => other,
        }
    }

    async fn call_adapter(
        &self,
        adapter: &dyn PlatformAdapter,
        request: &PublishRequest,
        content: &ValidatedContent,
        credential: &Credential,
        token: &AccessToken,
        media: Option<&RehostedMedia>,
    ) -> std::result::Result<PlatformPost, PublishError> {
        let ctx = PublishContext {
            owner_id: &request.owner_id,
            token,
            content,
            media,
            provider_user_id: credential.provider_user_id.as_deref(),
            display_handle: credential.display_handle.as_deref(),
            clock: self.clock.as_ref(),
            polling: &self.polling,
        };
        adapter.publish(&ctx).await
    }

    async fn load_credential(
        &self,
        owner_id: &str,
        platform: PlatformId,
    ) -> std::result::Result<Credential, PublishError> {
        self.store
            .get(owner_id, platform)
            .await
            .map_err(|e| {
                PublishError::ProviderRequest(format!("Credential store unavailable: {}", e))
            })?
            .ok_or(PublishError::CredentialMissing { platform })
    }
}
