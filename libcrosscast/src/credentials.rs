//! Credential records, storage and the refresh manager
//!
//! A credential is created by the external OAuth flow writing into the
//! store; this module only ever reads records and mutates them through
//! [`RefreshManager`]. Records are never deleted here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{PublishError, StoreError};
use crate::platforms::PlatformAdapter;
use crate::types::PlatformId;

/// Tokens are refreshed once they are within this window of their expiry.
pub const EXPIRY_SAFETY_WINDOW_SECS: i64 = 300;

/// Assumed grant lifetime when a provider omits `expires_in`.
const DEFAULT_GRANT_TTL_SECS: i64 = 3600;

pub(crate) fn expiry_safety_window() -> chrono::Duration {
    chrono::Duration::seconds(EXPIRY_SAFETY_WINDOW_SECS)
}

/// Lifecycle state of a stored credential.
///
/// Only `Active` and `Revoked` are persisted; `ExpiringSoon` and `Expired`
/// are derived from the expiry timestamp so a stored snapshot can never
/// contradict the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    ExpiringSoon,
    Expired,
    Revoked,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Active => "active",
            CredentialStatus::ExpiringSoon => "expiring_soon",
            CredentialStatus::Expired => "expired",
            CredentialStatus::Revoked => "revoked",
        }
    }

    pub fn from_str_or_active(s: &str) -> Self {
        match s {
            "revoked" => CredentialStatus::Revoked,
            "expired" => CredentialStatus::Expired,
            "expiring_soon" => CredentialStatus::ExpiringSoon,
            _ => CredentialStatus::Active,
        }
    }
}

/// Stored token material for one (owner, platform) pair.
#[derive(Debug, Clone)]
pub struct Credential {
    pub owner_id: String,
    pub platform: PlatformId,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Token scheme, normally `bearer`.
    pub token_kind: String,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    /// Persisted state; see [`Credential::lifecycle_status`] for the
    /// time-aware view.
    pub status: CredentialStatus,
    /// Provider-side account id (person URN, IG user id, page id, channel
    /// id) captured at OAuth time.
    pub provider_user_id: Option<String>,
    /// Cached display handle, refreshed out of band.
    pub display_handle: Option<String>,
    pub handle_refreshed_at: Option<DateTime<Utc>>,
    /// Most recent refresh failure, cleared by a successful refresh.
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        owner_id: impl Into<String>,
        platform: PlatformId,
        access_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Credential {
            owner_id: owner_id.into(),
            platform,
            access_token: access_token.into(),
            refresh_token: None,
            token_kind: "bearer".to_string(),
            scopes: Vec::new(),
            expires_at,
            status: CredentialStatus::Active,
            provider_user_id: None,
            display_handle: None,
            handle_refreshed_at: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn with_provider_user_id(mut self, id: impl Into<String>) -> Self {
        self.provider_user_id = Some(id.into());
        self
    }

    pub fn with_display_handle(mut self, handle: impl Into<String>) -> Self {
        self.display_handle = Some(handle.into());
        self.handle_refreshed_at = Some(Utc::now());
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Time-aware lifecycle state. Revocation sticks; the remaining states
    /// follow from the expiry timestamp.
    pub fn lifecycle_status(&self, now: DateTime<Utc>) -> CredentialStatus {
        if self.status == CredentialStatus::Revoked {
            return CredentialStatus::Revoked;
        }
        if self.expires_at <= now {
            CredentialStatus::Expired
        } else if self.expires_at <= now + expiry_safety_window() {
            CredentialStatus::ExpiringSoon
        } else {
            CredentialStatus::Active
        }
    }
}

/// A verified access token handed to an adapter for one publish attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        AccessToken {
            secret: secret.into(),
            expires_at,
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// What a provider's token endpoint returned for a refresh call.
#[derive(Debug, Clone, Default)]
pub struct TokenGrant {
    pub access_token: String,
    /// Absent when the provider keeps the prior refresh token valid.
    pub refresh_token: Option<String>,
    pub expires_in_secs: Option<u64>,
    pub scope: Option<String>,
}

/// Storage for credentials, keyed by (owner, platform).
///
/// Writes are last-writer-wins; racing refreshes for the same record keep
/// the later write.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(
        &self,
        owner_id: &str,
        platform: PlatformId,
    ) -> Result<Option<Credential>, StoreError>;

    async fn put(&self, credential: &Credential) -> Result<(), StoreError>;

    async fn list(&self, owner_id: &str) -> Result<Vec<Credential>, StoreError>;
}

/// In-memory store used by tests and embedders that manage persistence
/// themselves.
#[derive(Default)]
pub struct MemoryCredentialStore {
    records: RwLock<HashMap<(String, PlatformId), Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor preloading one record.
    pub async fn with_credential(credential: Credential) -> Self {
        let store = Self::new();
        store
            .records
            .write()
            .await
            .insert((credential.owner_id.clone(), credential.platform), credential);
        store
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(
        &self,
        owner_id: &str,
        platform: PlatformId,
    ) -> Result<Option<Credential>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(&(owner_id.to_string(), platform)).cloned())
    }

    async fn put(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.insert(
            (credential.owner_id.clone(), credential.platform),
            credential.clone(),
        );
        Ok(())
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<Credential>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect())
    }
}

/// Keeps access tokens usable: returns the stored token while it is fresh,
/// refreshes it inside the safety window, and records revocations.
pub struct RefreshManager {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
}

impl RefreshManager {
    pub fn new(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        RefreshManager { store, clock }
    }

    /// Returns an access token valid for at least the safety window where
    /// possible.
    ///
    /// The stored token is returned unchanged while `now + window < expiry`.
    /// Otherwise the platform's refresh endpoint is called; on success the
    /// record is replaced with expiry advanced strictly forward and the
    /// prior refresh token kept when no new one was issued. A refresh
    /// failure other than revocation falls back to the stored token once,
    /// as long as it has not hard-expired.
    ///
    /// # Errors
    ///
    /// `CredentialMissing` when no record exists, `CredentialRevoked` when
    /// the record is revoked or the provider reports the grant gone,
    /// `CredentialExpired` when neither refresh nor fallback can produce a
    /// usable token.
    pub async fn ensure_valid(
        &self,
        owner_id: &str,
        adapter: &dyn PlatformAdapter,
    ) -> Result<AccessToken, PublishError> {
        let platform = adapter.id();
        let credential = self.load(owner_id, platform).await?;

        if credential.status == CredentialStatus::Revoked {
            return Err(PublishError::CredentialRevoked { platform });
        }

        let now = self.clock.now();
        if now + expiry_safety_window() < credential.expires_at {
            debug!(%platform, owner = %owner_id, "stored token still fresh");
            return Ok(AccessToken::new(
                credential.access_token,
                credential.expires_at,
            ));
        }

        self.refresh_and_store(owner_id, adapter, credential, true)
            .await
    }

    /// Unconditional refresh, used for the single bounded retry after a
    /// provider rejected authorization. Never falls back to the stored
    /// token: the provider just refused it.
    pub async fn refresh_now(
        &self,
        owner_id: &str,
        adapter: &dyn PlatformAdapter,
    ) -> Result<AccessToken, PublishError> {
        let platform = adapter.id();
        let credential = self.load(owner_id, platform).await?;

        if credential.status == CredentialStatus::Revoked {
            return Err(PublishError::CredentialRevoked { platform });
        }

        self.refresh_and_store(owner_id, adapter, credential, false)
            .await
    }

    async fn load(
        &self,
        owner_id: &str,
        platform: PlatformId,
    ) -> Result<Credential, PublishError> {
        self.store
            .get(owner_id, platform)
            .await
            .map_err(|e| {
                PublishError::ProviderRequest(format!("Credential store unavailable: {}", e))
            })?
            .ok_or(PublishError::CredentialMissing { platform })
    }

    async fn refresh_and_store(
        &self,
        owner_id: &str,
        adapter: &dyn PlatformAdapter,
        credential: Credential,
        allow_stale_fallback: bool,
    ) -> Result<AccessToken, PublishError> {
        let platform = adapter.id();
        let now = self.clock.now();

        if credential.refresh_token.is_none() {
            return self.handle_refresh_failure(
                owner_id,
                credential,
                PublishError::CredentialExpired {
                    platform,
                    detail: "no refresh token on record".to_string(),
                },
                allow_stale_fallback,
                now,
            );
        }

        match adapter.refresh_credential(&credential).await {
            Ok(grant) => {
                let mut updated = credential.clone();
                updated.access_token = grant.access_token;
                if let Some(refresh_token) = grant.refresh_token {
                    updated.refresh_token = Some(refresh_token);
                }
                let offered = now
                    + chrono::Duration::seconds(
                        grant
                            .expires_in_secs
                            .map(|s| s as i64)
                            .unwrap_or(DEFAULT_GRANT_TTL_SECS),
                    );
                // Expiry never moves backward, whatever the provider says.
                updated.expires_at = offered.max(credential.expires_at);
                if let Some(scope) = grant.scope {
                    updated.scopes = scope.split_whitespace().map(str::to_string).collect();
                }
                updated.status = CredentialStatus::Active;
                updated.last_error = None;
                updated.updated_at = now;

                self.store.put(&updated).await.map_err(|e| {
                    PublishError::ProviderRequest(format!(
                        "Failed to store refreshed credential: {}",
                        e
                    ))
                })?;

                info!(%platform, owner = %owner_id, expires_at = %updated.expires_at, "refreshed credential");
                Ok(AccessToken::new(updated.access_token, updated.expires_at))
            }
            Err(PublishError::CredentialRevoked { .. }) => {
                let mut revoked = credential;
                revoked.status = CredentialStatus::Revoked;
                revoked.last_error = Some("provider reported the grant revoked".to_string());
                revoked.updated_at = now;
                if let Err(e) = self.store.put(&revoked).await {
                    warn!(%platform, owner = %owner_id, error = %e, "failed to record revocation");
                }
                Err(PublishError::CredentialRevoked { platform })
            }
            Err(err) => {
                self.handle_refresh_failure(owner_id, credential, err, allow_stale_fallback, now)
            }
        }
    }

    fn handle_refresh_failure(
        &self,
        owner_id: &str,
        credential: Credential,
        err: PublishError,
        allow_stale_fallback: bool,
        now: DateTime<Utc>,
    ) -> Result<AccessToken, PublishError> {
        let platform = credential.platform;
        if allow_stale_fallback && credential.expires_at > now {
            warn!(
                %platform,
                owner = %owner_id,
                error = %err,
                "token refresh failed; falling back to the stored token"
            );
            return Ok(AccessToken::new(
                credential.access_token,
                credential.expires_at,
            ));
        }

        match err {
            e @ PublishError::CredentialExpired { .. } => Err(e),
            e => Err(PublishError::CredentialExpired {
                platform,
                detail: format!("refresh failed: {}", e),
            }),
        }
    }
}
