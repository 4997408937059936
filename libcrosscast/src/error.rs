//! Error types for Crosscast

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::PlatformId;

pub type Result<T> = std::result::Result<T, CrosscastError>;

#[derive(Error, Debug)]
pub enum CrosscastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CrosscastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosscastError::InvalidInput(_) => 3,
            CrosscastError::Publish(e) if e.is_credential_class() => 2,
            CrosscastError::Publish(_) => 1,
            CrosscastError::Config(_) => 1,
            CrosscastError::Store(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store operation failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single platform publish attempt.
///
/// One value of this type is the terminal error for exactly one platform;
/// it never aborts sibling attempts in the same request.
#[derive(Error, Debug, Clone)]
pub enum PublishError {
    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("No credential stored for {platform}")]
    CredentialMissing { platform: PlatformId },

    #[error("Credential for {platform} has expired: {detail}")]
    CredentialExpired { platform: PlatformId, detail: String },

    #[error("Credential for {platform} was revoked; the owner must reconnect the account")]
    CredentialRevoked { platform: PlatformId },

    #[error("Media rehosting failed: {0}")]
    MediaRehost(String),

    #[error("Provider request failed: {0}")]
    ProviderRequest(String),

    #[error("Provider rejected authorization: {0}")]
    ProviderAuth(String),

    #[error("Media processing did not finish within {waited_secs}s")]
    ProcessingTimeout { waited_secs: u64 },

    #[error("Provider reported a media processing failure: {0}")]
    ProcessingFailed(String),

    #[error("No adapter registered for platform '{0}'")]
    UnknownPlatform(String),
}

impl PublishError {
    /// Machine-readable classification carried on the outward outcome.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PublishError::Validation(_) => ErrorKind::Validation,
            PublishError::CredentialMissing { .. } => ErrorKind::CredentialMissing,
            PublishError::CredentialExpired { .. } => ErrorKind::CredentialExpired,
            PublishError::CredentialRevoked { .. } => ErrorKind::CredentialRevoked,
            PublishError::MediaRehost(_) => ErrorKind::MediaRehost,
            PublishError::ProviderRequest(_) => ErrorKind::ProviderRequest,
            PublishError::ProviderAuth(_) => ErrorKind::ProviderAuth,
            PublishError::ProcessingTimeout { .. } => ErrorKind::ProcessingTimeout,
            PublishError::ProcessingFailed(_) => ErrorKind::ProcessingFailed,
            PublishError::UnknownPlatform(_) => ErrorKind::UnknownPlatform,
        }
    }

    /// True when the provider rejected the call because identical content
    /// was already posted. A duplicate rejection proves the call was
    /// authorized and delivered, so connection probes count it as success
    /// and it must never trigger the credential refresh-and-retry path.
    pub fn is_duplicate_content(&self) -> bool {
        match self {
            PublishError::ProviderRequest(msg) => {
                msg.to_lowercase().contains("duplicate")
            }
            _ => false,
        }
    }

    /// Credential problems share an exit code so scripts can tell
    /// "reconnect the account" apart from transient provider trouble.
    pub fn is_credential_class(&self) -> bool {
        matches!(
            self,
            PublishError::CredentialMissing { .. }
                | PublishError::CredentialExpired { .. }
                | PublishError::CredentialRevoked { .. }
                | PublishError::ProviderAuth(_)
        )
    }
}

/// Stable error classification surfaced in the per-platform outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    CredentialMissing,
    CredentialExpired,
    CredentialRevoked,
    MediaRehost,
    ProviderRequest,
    ProviderAuth,
    ProcessingTimeout,
    ProcessingFailed,
    UnknownPlatform,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::CredentialMissing => "credential_missing",
            ErrorKind::CredentialExpired => "credential_expired",
            ErrorKind::CredentialRevoked => "credential_revoked",
            ErrorKind::MediaRehost => "media_rehost",
            ErrorKind::ProviderRequest => "provider_request",
            ErrorKind::ProviderAuth => "provider_auth",
            ErrorKind::ProcessingTimeout => "processing_timeout",
            ErrorKind::ProcessingFailed => "processing_failed",
            ErrorKind::UnknownPlatform => "unknown_platform",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
