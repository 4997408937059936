//! Integration tests for credential storage and token refresh
//!
//! Exercises the refresh manager against the in-memory store and mock
//! adapters: the safety window, forward-only expiry, refresh token
//! retention, stale fallback, and terminal revocation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use libcrosscast::clock::{Clock, ManualClock};
use libcrosscast::credentials::{
    Credential, CredentialStatus, CredentialStore, MemoryCredentialStore, RefreshManager,
    TokenGrant, EXPIRY_SAFETY_WINDOW_SECS,
};
use libcrosscast::error::PublishError;
use libcrosscast::platforms::mock::MockAdapter;
use libcrosscast::types::PlatformId;

fn credential_expiring_at(expires_at: DateTime<Utc>) -> Credential {
    Credential::new("owner-1", PlatformId::Twitter, "stored-token", expires_at)
        .with_refresh_token("refresh-token-1")
}

async fn manager_for(
    credential: Credential,
    clock: Arc<ManualClock>,
) -> (RefreshManager, Arc<MemoryCredentialStore>) {
    let store = Arc::new(MemoryCredentialStore::with_credential(credential).await);
    let manager = RefreshManager::new(store.clone(), clock);
    (manager, store)
}

async fn stored_twitter(store: &MemoryCredentialStore) -> Credential {
    store
        .get("owner-1", PlatformId::Twitter)
        .await
        .unwrap()
        .expect("credential on record")
}

#[tokio::test]
async fn test_fresh_token_is_returned_without_refreshing() {
    let clock = Arc::new(ManualClock::default());
    let credential = credential_expiring_at(clock.now() + Duration::hours(2));
    let (manager, _store) = manager_for(credential, Arc::clone(&clock)).await;
    let adapter = MockAdapter::succeeding(PlatformId::Twitter, "unused");

    let token = manager.ensure_valid("owner-1", &adapter).await.unwrap();

    assert_eq!(token.secret, "stored-token");
    assert_eq!(adapter.refresh_calls(), 0);
}

#[tokio::test]
async fn test_token_inside_the_safety_window_is_refreshed() {
    let clock = Arc::new(ManualClock::default());
    let old_expiry = clock.now() + Duration::minutes(2);
    let (manager, store) =
        manager_for(credential_expiring_at(old_expiry), Arc::clone(&clock)).await;
    let adapter = MockAdapter::succeeding(PlatformId::Twitter, "unused").with_grant(TokenGrant {
        access_token: "fresh-token".to_string(),
        refresh_token: Some("rotated-refresh".to_string()),
        expires_in_secs: Some(3600),
        scope: None,
    });

    let token = manager.ensure_valid("owner-1", &adapter).await.unwrap();

    assert_eq!(adapter.refresh_calls(), 1);
    assert_eq!(token.secret, "fresh-token");

    let stored = stored_twitter(&store).await;
    assert_eq!(stored.access_token, "fresh-token");
    assert_eq!(stored.refresh_token.as_deref(), Some("rotated-refresh"));
    assert!(
        stored.expires_at > old_expiry,
        "refresh must push the expiry forward"
    );
    assert_eq!(stored.status, CredentialStatus::Active);
}

#[tokio::test]
async fn test_clock_advance_moves_a_token_into_the_window() {
    let clock = Arc::new(ManualClock::default());
    let credential = credential_expiring_at(clock.now() + Duration::hours(2));
    let (manager, _store) = manager_for(credential, Arc::clone(&clock)).await;
    let adapter = MockAdapter::succeeding(PlatformId::Twitter, "unused");

    manager.ensure_valid("owner-1", &adapter).await.unwrap();
    assert_eq!(adapter.refresh_calls(), 0);

    // Two hours minus one minute later the token has a minute left.
    clock.advance(std::time::Duration::from_secs(2 * 3600 - 60));
    manager.ensure_valid("owner-1", &adapter).await.unwrap();
    assert_eq!(adapter.refresh_calls(), 1);
}

#[tokio::test]
async fn test_hard_expired_token_is_refreshed() {
    let clock = Arc::new(ManualClock::default());
    let credential = credential_expiring_at(clock.now() - Duration::minutes(1));
    let (manager, store) = manager_for(credential, Arc::clone(&clock)).await;
    let adapter = MockAdapter::succeeding(PlatformId::Twitter, "unused");

    let token = manager.ensure_valid("owner-1", &adapter).await.unwrap();

    assert_eq!(token.secret, "refreshed-token");
    assert_eq!(adapter.refresh_calls(), 1);
    let stored = stored_twitter(&store).await;
    assert!(stored.expires_at > clock.now());
}

#[tokio::test]
async fn test_expiry_never_moves_backward() {
    let clock = Arc::new(ManualClock::default());
    let old_expiry = clock.now() + Duration::minutes(4);
    let (manager, store) =
        manager_for(credential_expiring_at(old_expiry), Arc::clone(&clock)).await;
    // The provider hands out a grant shorter than what is already stored.
    let adapter = MockAdapter::succeeding(PlatformId::Twitter, "unused").with_grant(TokenGrant {
        access_token: "short-lived".to_string(),
        refresh_token: None,
        expires_in_secs: Some(60),
        scope: None,
    });

    let token = manager.ensure_valid("owner-1", &adapter).await.unwrap();

    assert_eq!(token.secret, "short-lived");
    let stored = stored_twitter(&store).await;
    assert_eq!(stored.expires_at, old_expiry);
}

#[tokio::test]
async fn test_prior_refresh_token_is_kept_when_the_grant_omits_one() {
    let clock = Arc::new(ManualClock::default());
    let credential = credential_expiring_at(clock.now() + Duration::minutes(2));
    let (manager, store) = manager_for(credential, Arc::clone(&clock)).await;
    // The default mock grant carries no refresh token.
    let adapter = MockAdapter::succeeding(PlatformId::Twitter, "unused");

    manager.ensure_valid("owner-1", &adapter).await.unwrap();

    let stored = stored_twitter(&store).await;
    assert_eq!(stored.access_token, "refreshed-token");
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-token-1"));
}

#[tokio::test]
async fn test_no_refresh_token_falls_back_to_the_stored_token() {
    let clock = Arc::new(ManualClock::default());
    let credential =
        Credential::new("owner-1", PlatformId::Twitter, "stored-token", clock.now() + Duration::minutes(2));
    let (manager, _store) = manager_for(credential, Arc::clone(&clock)).await;
    let adapter = MockAdapter::succeeding(PlatformId::Twitter, "unused");

    // Nothing to refresh with, but the stored token is still alive.
    let token = manager.ensure_valid("owner-1", &adapter).await.unwrap();

    assert_eq!(token.secret, "stored-token");
    assert_eq!(adapter.refresh_calls(), 0);
}

#[tokio::test]
async fn test_no_refresh_token_and_hard_expiry_is_an_error() {
    let clock = Arc::new(ManualClock::default());
    let credential =
        Credential::new("owner-1", PlatformId::Twitter, "stored-token", clock.now() - Duration::minutes(1));
    let (manager, _store) = manager_for(credential, Arc::clone(&clock)).await;
    let adapter = MockAdapter::succeeding(PlatformId::Twitter, "unused");

    let err = manager.ensure_valid("owner-1", &adapter).await.unwrap_err();

    match err {
        PublishError::CredentialExpired { detail, .. } => {
            assert!(detail.contains("no refresh token"));
        }
        other => panic!("expected CredentialExpired, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_refresh_falls_back_to_a_still_valid_token() {
    let clock = Arc::new(ManualClock::default());
    let credential = credential_expiring_at(clock.now() + Duration::minutes(2));
    let (manager, store) = manager_for(credential, Arc::clone(&clock)).await;
    let adapter =
        MockAdapter::succeeding(PlatformId::Twitter, "unused").with_refresh_results(vec![Err(
            PublishError::ProviderRequest("token endpoint returned 500".to_string()),
        )]);

    let token = manager.ensure_valid("owner-1", &adapter).await.unwrap();

    assert_eq!(token.secret, "stored-token");
    assert_eq!(adapter.refresh_calls(), 1);
    // The failed attempt does not clobber the stored record.
    assert_eq!(stored_twitter(&store).await.access_token, "stored-token");
}

#[tokio::test]
async fn test_failed_refresh_with_expired_token_is_an_error() {
    let clock = Arc::new(ManualClock::default());
    let credential = credential_expiring_at(clock.now() - Duration::minutes(1));
    let (manager, _store) = manager_for(credential, Arc::clone(&clock)).await;
    let adapter =
        MockAdapter::succeeding(PlatformId::Twitter, "unused").with_refresh_results(vec![Err(
            PublishError::ProviderRequest("token endpoint returned 500".to_string()),
        )]);

    let err = manager.ensure_valid("owner-1", &adapter).await.unwrap_err();

    match err {
        PublishError::CredentialExpired { detail, .. } => {
            assert!(detail.contains("refresh failed"));
        }
        other => panic!("expected CredentialExpired, got {other:?}"),
    }
}

#[tokio::test]
async fn test_provider_revocation_is_persisted_and_terminal() {
    let clock = Arc::new(ManualClock::default());
    let credential = credential_expiring_at(clock.now() + Duration::minutes(2));
    let (manager, store) = manager_for(credential, Arc::clone(&clock)).await;
    let adapter =
        MockAdapter::succeeding(PlatformId::Twitter, "unused").with_refresh_results(vec![Err(
            PublishError::CredentialRevoked {
                platform: PlatformId::Twitter,
            },
        )]);

    let err = manager.ensure_valid("owner-1", &adapter).await.unwrap_err();
    assert!(matches!(err, PublishError::CredentialRevoked { .. }));

    // The revocation was written back.
    let stored = stored_twitter(&store).await;
    assert_eq!(stored.status, CredentialStatus::Revoked);
    assert!(stored.last_error.is_some());

    // Later calls fail up front without touching the token endpoint again.
    let err = manager.ensure_valid("owner-1", &adapter).await.unwrap_err();
    assert!(matches!(err, PublishError::CredentialRevoked { .. }));
    assert_eq!(adapter.refresh_calls(), 1);
}

#[tokio::test]
async fn test_stored_revocation_short_circuits() {
    let clock = Arc::new(ManualClock::default());
    let mut credential = credential_expiring_at(clock.now() + Duration::hours(2));
    credential.status = CredentialStatus::Revoked;
    let (manager, _store) = manager_for(credential, Arc::clone(&clock)).await;
    let adapter = MockAdapter::succeeding(PlatformId::Twitter, "unused");

    let err = manager.ensure_valid("owner-1", &adapter).await.unwrap_err();

    assert!(matches!(err, PublishError::CredentialRevoked { .. }));
    assert_eq!(adapter.refresh_calls(), 0);
}

#[tokio::test]
async fn test_refresh_now_never_falls_back() {
    let clock = Arc::new(ManualClock::default());
    // Two hours of validity left; ensure_valid would not refresh at all.
    let credential = credential_expiring_at(clock.now() + Duration::hours(2));
    let (manager, _store) = manager_for(credential, Arc::clone(&clock)).await;
    let adapter =
        MockAdapter::succeeding(PlatformId::Twitter, "unused").with_refresh_results(vec![Err(
            PublishError::ProviderRequest("token endpoint returned 500".to_string()),
        )]);

    let err = manager.refresh_now("owner-1", &adapter).await.unwrap_err();

    assert!(matches!(err, PublishError::CredentialExpired { .. }));
    assert_eq!(adapter.refresh_calls(), 1);
}

#[tokio::test]
async fn test_refresh_now_replaces_a_token_the_provider_refused() {
    let clock = Arc::new(ManualClock::default());
    let credential = credential_expiring_at(clock.now() + Duration::hours(2));
    let (manager, store) = manager_for(credential, Arc::clone(&clock)).await;
    let adapter = MockAdapter::succeeding(PlatformId::Twitter, "unused");

    let token = manager.refresh_now("owner-1", &adapter).await.unwrap();

    assert_eq!(token.secret, "refreshed-token");
    assert_eq!(adapter.refresh_calls(), 1);
    assert_eq!(stored_twitter(&store).await.access_token, "refreshed-token");
}

#[tokio::test]
async fn test_missing_credential_is_its_own_error() {
    let manager = RefreshManager::new(
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(ManualClock::default()),
    );
    let adapter = MockAdapter::succeeding(PlatformId::Twitter, "unused");

    let err = manager.ensure_valid("owner-1", &adapter).await.unwrap_err();

    assert!(matches!(
        err,
        PublishError::CredentialMissing {
            platform: PlatformId::Twitter
        }
    ));
}

#[tokio::test]
async fn test_safety_window_constant_is_five_minutes() {
    assert_eq!(EXPIRY_SAFETY_WINDOW_SECS, 300);
}
