//! Core data types for Crosscast

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ErrorKind, PublishError};

/// Identifier of a supported publish target.
///
/// Parsing an unrecognized identifier yields
/// [`PublishError::UnknownPlatform`] so a request naming a platform we do
/// not speak still produces a normal per-platform outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    LinkedIn,
    Twitter,
    Instagram,
    Facebook,
    TikTok,
    YouTube,
}

impl PlatformId {
    pub const ALL: [PlatformId; 6] = [
        PlatformId::LinkedIn,
        PlatformId::Twitter,
        PlatformId::Instagram,
        PlatformId::Facebook,
        PlatformId::TikTok,
        PlatformId::YouTube,
    ];

    /// Canonical lowercase identifier used in requests, config and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformId::LinkedIn => "linkedin",
            PlatformId::Twitter => "twitter",
            PlatformId::Instagram => "instagram",
            PlatformId::Facebook => "facebook",
            PlatformId::TikTok => "tiktok",
            PlatformId::YouTube => "youtube",
        }
    }

    /// Name shown in human-readable messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            PlatformId::LinkedIn => "LinkedIn",
            PlatformId::Twitter => "Twitter",
            PlatformId::Instagram => "Instagram",
            PlatformId::Facebook => "Facebook",
            PlatformId::TikTok => "TikTok",
            PlatformId::YouTube => "YouTube",
        }
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlatformId {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linkedin" => Ok(PlatformId::LinkedIn),
            "twitter" | "x" => Ok(PlatformId::Twitter),
            "instagram" => Ok(PlatformId::Instagram),
            "facebook" => Ok(PlatformId::Facebook),
            "tiktok" => Ok(PlatformId::TikTok),
            "youtube" => Ok(PlatformId::YouTube),
            other => Err(PublishError::UnknownPlatform(other.to_string())),
        }
    }
}

/// Media category as providers distinguish it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Gif,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Gif => "gif",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Media handed in with a publish request: either a reference to fetch or
/// bytes supplied directly.
#[derive(Clone)]
pub enum MediaSource {
    Url(String),
    Bytes {
        data: Vec<u8>,
        filename: Option<String>,
    },
}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaSource::Url(url) => f.debug_tuple("Url").field(url).finish(),
            MediaSource::Bytes { data, filename } => f
                .debug_struct("Bytes")
                .field("len", &data.len())
                .field("filename", filename)
                .finish(),
        }
    }
}

/// Content of a publish request before per-platform normalization.
#[derive(Debug, Clone, Default)]
pub struct PublishContent {
    /// Caption or body text.
    pub caption: Option<String>,
    /// Raw hashtags, with or without a leading `#`.
    pub hashtags: Vec<String>,
    /// Title, used by platforms with a dedicated title field.
    pub title: Option<String>,
    /// Attached media, if any.
    pub media: Option<MediaSource>,
    /// Caller-declared media kind; signature detection takes precedence.
    pub media_kind_hint: Option<MediaKind>,
}

impl PublishContent {
    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }

    pub fn has_caption(&self) -> bool {
        self.caption.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

/// One inbound request to publish a piece of content to several platforms.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub owner_id: String,
    /// Requested platform identifiers as received; parsed per platform so an
    /// unknown name fails only its own outcome.
    pub platforms: Vec<String>,
    pub content: PublishContent,
}

impl PublishRequest {
    /// Shape checks that apply to the request as a whole, before any
    /// per-platform work starts.
    pub fn ensure_well_formed(&self) -> crate::error::Result<()> {
        if self.owner_id.trim().is_empty() {
            return Err(crate::error::CrosscastError::InvalidInput(
                "Owner id must not be empty".to_string(),
            ));
        }
        if self.requested_platforms().is_empty() {
            return Err(crate::error::CrosscastError::InvalidInput(
                "At least one target platform is required".to_string(),
            ));
        }
        if !self.content.has_caption() && !self.content.has_media() {
            return Err(crate::error::CrosscastError::InvalidInput(
                "At least one of caption or media is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Requested platform ids, trimmed, lowercased and de-duplicated while
    /// preserving first-seen order. One outcome is produced per entry.
    pub fn requested_platforms(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.platforms
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty() && seen.insert(p.clone()))
            .collect()
    }
}

/// What an adapter hands back after a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformPost {
    /// Provider-assigned id of the created post.
    pub external_id: String,
    /// Resolved or constructed permalink.
    pub permalink: Option<String>,
    /// Protocol version the call was made with, where negotiated.
    pub api_version: Option<String>,
}

impl PlatformPost {
    pub fn new(external_id: impl Into<String>) -> Self {
        PlatformPost {
            external_id: external_id.into(),
            permalink: None,
            api_version: None,
        }
    }

    pub fn with_permalink(mut self, permalink: impl Into<String>) -> Self {
        self.permalink = Some(permalink.into());
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }
}

/// Per-platform result of one publish attempt, surfaced upward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformOutcome {
    pub platform: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

impl PlatformOutcome {
    pub fn succeeded(platform: impl Into<String>, post: PlatformPost) -> Self {
        let platform = platform.into();
        let message = match &post.permalink {
            Some(url) => format!("Published to {}: {}", platform, url),
            None => format!("Published to {} (id {})", platform, post.external_id),
        };
        PlatformOutcome {
            platform,
            success: true,
            post_id: Some(post.external_id),
            url: post.permalink,
            message,
            error: None,
            api_version: post.api_version,
        }
    }

    pub fn failed(platform: impl Into<String>, error: &PublishError) -> Self {
        PlatformOutcome {
            platform: platform.into(),
            success: false,
            post_id: None,
            url: None,
            message: error.to_string(),
            error: Some(error.kind()),
            api_version: None,
        }
    }
}

/// Aggregated result of a multi-platform publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    pub overall_success: bool,
    pub message: String,
    pub outcomes: Vec<PlatformOutcome>,
}

impl PublishReport {
    /// Builds the report from per-platform outcomes. Overall success means
    /// at least one platform succeeded.
    pub fn from_outcomes(outcomes: Vec<PlatformOutcome>) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let total = outcomes.len();
        PublishReport {
            overall_success: succeeded > 0,
            message: format!("Published to {}/{} platforms", succeeded, total),
            outcomes,
        }
    }

    pub fn succeeded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }
}

/// Server-side media processing state reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Created,
    Processing,
    Ready,
    Failed,
}

impl ProcessingStatus {
    fn rank(&self) -> u8 {
        match self {
            ProcessingStatus::Created => 0,
            ProcessingStatus::Processing => 1,
            ProcessingStatus::Ready | ProcessingStatus::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Ready | ProcessingStatus::Failed)
    }
}

/// Opaque provider handle for media still processing server-side.
///
/// Created right after upload initiation, polled until terminal, then
/// consumed by the commit step. The recorded status walk never moves
/// backward: a provider momentarily reporting an earlier state is ignored.
#[derive(Debug, Clone)]
pub struct ProcessingContainer {
    pub handle: String,
    status: ProcessingStatus,
    pub created_at: DateTime<Utc>,
    polls: u32,
}

impl ProcessingContainer {
    pub fn new(handle: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        ProcessingContainer {
            handle: handle.into(),
            status: ProcessingStatus::Created,
            created_at,
            polls: 0,
        }
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    /// Number of status polls issued for this container.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn record_poll(&mut self) {
        self.polls += 1;
    }

    /// Applies a provider-reported status, keeping the walk non-decreasing.
    /// Terminal states never change again. Returns the effective status.
    pub fn advance(&mut self, next: ProcessingStatus) -> ProcessingStatus {
        if !self.status.is_terminal() && next.rank() >= self.status.rank() {
            self.status = next;
        }
        self.status
    }
}
