//! Content validation and normalization
//!
//! Every platform enforces its own caption length, hashtag count, and media
//! rules. This module holds those rules in one table and checks content
//! against them before any network call is made, so a post that cannot
//! succeed fails immediately with a clear message.

use crate::error::PublishError;
use crate::media::kind_from_filename;
use crate::types::{MediaKind, MediaSource, PlatformId, PublishContent};
use std::collections::HashSet;

/// Whether a platform accepts text-only posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaRequirement {
    /// Media may be attached but is not required.
    Optional,
    /// Publishing without media is rejected up front.
    Required,
}

/// Casing applied to hashtags when building the outgoing payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashtagStyle {
    /// Keep tags exactly as the author wrote them.
    AsWritten,
    /// Capitalize each word and drop separators ("social-media" -> "SocialMedia").
    PascalCase,
}

/// Per-platform publishing rules.
///
/// Caption limits apply to the fully assembled caption, including any
/// hashtag block appended to it.
#[derive(Debug, Clone, Copy)]
pub struct ContentPolicy {
    pub platform: PlatformId,
    pub max_caption_chars: usize,
    pub max_hashtags: usize,
    pub media: MediaRequirement,
    /// Media kinds the platform can ingest.
    pub accepted_kinds: &'static [MediaKind],
    /// When false, hashtags travel in a dedicated field instead of the caption.
    pub hashtags_in_caption: bool,
    pub hashtag_style: HashtagStyle,
    /// Separate title field limit, for platforms that have one.
    pub max_title_chars: Option<usize>,
}

const LINKEDIN_POLICY: ContentPolicy = ContentPolicy {
    platform: PlatformId::LinkedIn,
    max_caption_chars: 3000,
    max_hashtags: 15,
    media: MediaRequirement::Optional,
    accepted_kinds: &[MediaKind::Image, MediaKind::Video],
    hashtags_in_caption: true,
    hashtag_style: HashtagStyle::PascalCase,
    max_title_chars: None,
};

const TWITTER_POLICY: ContentPolicy = ContentPolicy {
    platform: PlatformId::Twitter,
    max_caption_chars: 280,
    max_hashtags: 10,
    media: MediaRequirement::Optional,
    accepted_kinds: &[MediaKind::Image, MediaKind::Video, MediaKind::Gif],
    hashtags_in_caption: true,
    hashtag_style: HashtagStyle::AsWritten,
    max_title_chars: None,
};

const INSTAGRAM_POLICY: ContentPolicy = ContentPolicy {
    platform: PlatformId::Instagram,
    max_caption_chars: 2200,
    max_hashtags: 30,
    media: MediaRequirement::Required,
    accepted_kinds: &[MediaKind::Image, MediaKind::Video],
    hashtags_in_caption: true,
    hashtag_style: HashtagStyle::AsWritten,
    max_title_chars: None,
};

const FACEBOOK_POLICY: ContentPolicy = ContentPolicy {
    platform: PlatformId::Facebook,
    max_caption_chars: 63_206,
    max_hashtags: 30,
    media: MediaRequirement::Optional,
    accepted_kinds: &[MediaKind::Image, MediaKind::Video],
    hashtags_in_caption: true,
    hashtag_style: HashtagStyle::AsWritten,
    max_title_chars: None,
};

const TIKTOK_POLICY: ContentPolicy = ContentPolicy {
    platform: PlatformId::TikTok,
    max_caption_chars: 150,
    max_hashtags: 30,
    media: MediaRequirement::Required,
    accepted_kinds: &[MediaKind::Video],
    hashtags_in_caption: true,
    hashtag_style: HashtagStyle::AsWritten,
    max_title_chars: None,
};

const YOUTUBE_POLICY: ContentPolicy = ContentPolicy {
    platform: PlatformId::YouTube,
    max_caption_chars: 5000,
    max_hashtags: 15,
    media: MediaRequirement::Required,
    accepted_kinds: &[MediaKind::Video],
    hashtags_in_caption: false,
    hashtag_style: HashtagStyle::AsWritten,
    max_title_chars: Some(100),
};

/// Look up the publishing rules for a platform.
pub fn policy_for(platform: PlatformId) -> &'static ContentPolicy {
    match platform {
        PlatformId::LinkedIn => &LINKEDIN_POLICY,
        PlatformId::Twitter => &TWITTER_POLICY,
        PlatformId::Instagram => &INSTAGRAM_POLICY,
        PlatformId::Facebook => &FACEBOOK_POLICY,
        PlatformId::TikTok => &TIKTOK_POLICY,
        PlatformId::YouTube => &YOUTUBE_POLICY,
    }
}

impl ContentPolicy {
    pub fn requires_media(&self) -> bool {
        self.media == MediaRequirement::Required
    }

    pub fn accepts(&self, kind: MediaKind) -> bool {
        self.accepted_kinds.contains(&kind)
    }

    fn accepted_kinds_label(&self) -> String {
        self.accepted_kinds
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Content that passed validation for one platform, ready for its adapter.
///
/// The caption is fully assembled: trimmed, with the hashtag block already
/// appended for platforms that carry hashtags in the caption.
#[derive(Debug, Clone)]
pub struct ValidatedContent {
    pub platform: PlatformId,
    pub caption: String,
    pub title: Option<String>,
    /// Normalized tags without the leading '#', in first-seen order.
    pub hashtags: Vec<String>,
    pub has_media: bool,
    /// Media kind as declared or inferred from the filename, if known.
    pub declared_kind: Option<MediaKind>,
}

/// Validate content against one platform's rules.
///
/// Checks run in a fixed order: media requirement, declared media kind,
/// hashtag count, assembled caption length, then title length. The first
/// failure is returned as a [`PublishError::Validation`].
///
/// # Arguments
///
/// * `platform` - Platform whose rules to apply
/// * `content` - Content as submitted by the caller
///
/// # Returns
///
/// The normalized content on success, or the first validation failure.
pub fn validate(
    platform: PlatformId,
    content: &PublishContent,
) -> Result<ValidatedContent, PublishError> {
    let policy = policy_for(platform);

    let has_media = content.has_media();
    if policy.requires_media() && !has_media {
        return Err(PublishError::Validation(format!(
            "{} requires media content",
            platform.display_name()
        )));
    }
    if !has_media && !content.has_caption() {
        return Err(PublishError::Validation(
            "Caption cannot be empty when no media is attached".to_string(),
        ));
    }

    let declared = declared_kind(content);
    if has_media {
        if let Some(kind) = declared {
            ensure_kind_accepted(platform, kind)?;
        }
    }

    let normalized = normalize_hashtags(&content.hashtags);
    if normalized.len() > policy.max_hashtags {
        return Err(PublishError::Validation(format!(
            "Too many hashtags for {}: {} exceeds the limit of {}",
            platform.display_name(),
            normalized.len(),
            policy.max_hashtags
        )));
    }
    let hashtags: Vec<String> = match policy.hashtag_style {
        HashtagStyle::AsWritten => normalized,
        HashtagStyle::PascalCase => normalized.iter().map(|t| pascal_case(t)).collect(),
    };

    let caption = assemble_caption(
        content.caption.as_deref(),
        &hashtags,
        policy.hashtags_in_caption,
    );
    let caption_chars = caption.chars().count();
    if caption_chars > policy.max_caption_chars {
        return Err(PublishError::Validation(format!(
            "Caption length ({} characters) exceeds {} limit of {} characters",
            caption_chars,
            platform.display_name(),
            policy.max_caption_chars
        )));
    }

    let title = content
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    if let (Some(max), Some(title)) = (policy.max_title_chars, title.as_deref()) {
        let title_chars = title.chars().count();
        if title_chars > max {
            return Err(PublishError::Validation(format!(
                "Title length ({} characters) exceeds {} limit of {} characters",
                title_chars,
                platform.display_name(),
                max
            )));
        }
    }

    Ok(ValidatedContent {
        platform,
        caption,
        title,
        hashtags,
        has_media,
        declared_kind: declared,
    })
}

/// Check a media kind against a platform's accepted kinds.
///
/// Used both pre-flight (when the kind can be inferred from a filename)
/// and again after the media bytes have been fetched and sniffed.
pub fn ensure_kind_accepted(platform: PlatformId, kind: MediaKind) -> Result<(), PublishError> {
    let policy = policy_for(platform);
    if policy.accepts(kind) {
        Ok(())
    } else {
        Err(PublishError::Validation(format!(
            "{} does not accept {} media (accepted: {})",
            platform.display_name(),
            kind,
            policy.accepted_kinds_label()
        )))
    }
}

/// Normalize a raw hashtag list.
///
/// Strips leading '#' characters and surrounding whitespace, drops empty
/// entries, and removes case-insensitive duplicates while keeping the
/// first-seen casing and order. Running this twice yields the same result.
pub fn normalize_hashtags(raw: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for tag in raw {
        let cleaned = tag.trim().trim_start_matches('#').trim();
        if cleaned.is_empty() {
            continue;
        }
        if seen.insert(cleaned.to_lowercase()) {
            out.push(cleaned.to_string());
        }
    }
    out
}

/// Convert a tag to PascalCase, treating '-', '_', and whitespace as word
/// boundaries. Characters after the first of each word are left untouched,
/// so acronyms like "AI" survive.
pub fn pascal_case(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len());
    let mut upper_next = true;
    for ch in tag.chars() {
        if ch == '-' || ch == '_' || ch.is_whitespace() {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Build the final caption for a platform.
///
/// When `append_hashtags` is set and tags are present, they are joined as
/// a "#tag" block separated from the caption body by a blank line. A post
/// with no caption text gets the tag block alone.
pub fn assemble_caption(caption: Option<&str>, hashtags: &[String], append_hashtags: bool) -> String {
    let base = caption.map(str::trim).unwrap_or("");
    if !append_hashtags || hashtags.is_empty() {
        return base.to_string();
    }
    let tag_block = hashtags
        .iter()
        .map(|t| format!("#{t}"))
        .collect::<Vec<_>>()
        .join(" ");
    if base.is_empty() {
        tag_block
    } else {
        format!("{base}\n\n{tag_block}")
    }
}

/// Best-effort media kind before any bytes are fetched: the caller's hint
/// wins, otherwise the filename or URL extension is consulted.
fn declared_kind(content: &PublishContent) -> Option<MediaKind> {
    if let Some(kind) = content.media_kind_hint {
        return Some(kind);
    }
    match &content.media {
        Some(MediaSource::Url(url)) => {
            let path = url.split(['?', '#']).next().unwrap_or(url);
            kind_from_filename(path)
        }
        Some(MediaSource::Bytes { filename, .. }) => {
            filename.as_deref().and_then(kind_from_filename)
        }
        None => None,
    }
}

/// Validation result for one platform in a pre-flight check.
#[derive(Debug, Clone)]
pub struct PlatformValidation {
    pub platform: String,
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Run validation for several platforms without publishing anything.
///
/// Unknown platform names are reported as errors rather than panicking,
/// so the result always has one entry per requested platform.
pub fn preflight(content: &PublishContent, platforms: &[String]) -> Vec<PlatformValidation> {
    platforms
        .iter()
        .map(|name| {
            let mut errors = Vec::new();
            let mut warnings = Vec::new();
            match name.parse::<PlatformId>() {
                Ok(platform) => match validate(platform, content) {
                    Ok(validated) => {
                        if validated.has_media && validated.declared_kind.is_none() {
                            warnings.push(
                                "Media kind could not be determined up front; it is checked again after the file is fetched"
                                    .to_string(),
                            );
                        }
                        if content.title.is_some()
                            && policy_for(platform).max_title_chars.is_none()
                        {
                            warnings.push(format!(
                                "{} does not use a title; it will be ignored",
                                platform.display_name()
                            ));
                        }
                    }
                    Err(e) => errors.push(e.to_string()),
                },
                Err(e) => errors.push(e.to_string()),
            }
            PlatformValidation {
                platform: name.clone(),
                valid: errors.is_empty(),
                errors,
                warnings,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_content(caption: &str) -> PublishContent {
        PublishContent {
            caption: Some(caption.to_string()),
            hashtags: Vec::new(),
            title: None,
            media: None,
            media_kind_hint: None,
        }
    }

    fn media_content(caption: &str, kind: MediaKind) -> PublishContent {
        PublishContent {
            caption: Some(caption.to_string()),
            hashtags: Vec::new(),
            title: None,
            media: Some(MediaSource::Url("https://cdn.example.com/file".to_string())),
            media_kind_hint: Some(kind),
        }
    }

    #[test]
    fn test_policy_table_values() {
        assert_eq!(policy_for(PlatformId::Twitter).max_caption_chars, 280);
        assert_eq!(policy_for(PlatformId::Twitter).max_hashtags, 10);
        assert_eq!(policy_for(PlatformId::Instagram).max_caption_chars, 2200);
        assert!(policy_for(PlatformId::Instagram).requires_media());
        assert_eq!(policy_for(PlatformId::Facebook).max_caption_chars, 63_206);
        assert_eq!(policy_for(PlatformId::LinkedIn).max_caption_chars, 3000);
        assert_eq!(policy_for(PlatformId::TikTok).max_caption_chars, 150);
        assert_eq!(policy_for(PlatformId::YouTube).max_title_chars, Some(100));
        assert!(!policy_for(PlatformId::YouTube).hashtags_in_caption);
    }

    #[test]
    fn test_tiktok_and_youtube_are_video_only() {
        for platform in [PlatformId::TikTok, PlatformId::YouTube] {
            let policy = policy_for(platform);
            assert!(policy.requires_media());
            assert!(policy.accepts(MediaKind::Video));
            assert!(!policy.accepts(MediaKind::Image));
            assert!(!policy.accepts(MediaKind::Gif));
        }
    }

    #[test]
    fn test_only_twitter_accepts_gif() {
        assert!(policy_for(PlatformId::Twitter).accepts(MediaKind::Gif));
        assert!(!policy_for(PlatformId::Instagram).accepts(MediaKind::Gif));
        assert!(!policy_for(PlatformId::Facebook).accepts(MediaKind::Gif));
        assert!(!policy_for(PlatformId::LinkedIn).accepts(MediaKind::Gif));
    }

    #[test]
    fn test_normalize_hashtags_strips_and_dedupes() {
        let raw = vec![
            "#Marketing".to_string(),
            "growth".to_string(),
            "  #marketing  ".to_string(),
            "GROWTH".to_string(),
            "##startup".to_string(),
            "".to_string(),
            "#".to_string(),
        ];
        let normalized = normalize_hashtags(&raw);
        assert_eq!(normalized, vec!["Marketing", "growth", "startup"]);
    }

    #[test]
    fn test_normalize_hashtags_is_idempotent() {
        let raw = vec![
            "#Tech".to_string(),
            "tech".to_string(),
            "#AI".to_string(),
        ];
        let once = normalize_hashtags(&raw);
        let twice = normalize_hashtags(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("social-media"), "SocialMedia");
        assert_eq!(pascal_case("growth_hacks"), "GrowthHacks");
        assert_eq!(pascal_case("open graph tips"), "OpenGraphTips");
        assert_eq!(pascal_case("AI"), "AI");
        assert_eq!(pascal_case("marketing"), "Marketing");
    }

    #[test]
    fn test_assemble_caption_appends_tag_block() {
        let tags = vec!["rust".to_string(), "async".to_string()];
        assert_eq!(
            assemble_caption(Some("Hello"), &tags, true),
            "Hello\n\n#rust #async"
        );
    }

    #[test]
    fn test_assemble_caption_without_base_text() {
        let tags = vec!["photo".to_string()];
        assert_eq!(assemble_caption(None, &tags, true), "#photo");
        assert_eq!(assemble_caption(Some("   "), &tags, true), "#photo");
    }

    #[test]
    fn test_assemble_caption_separate_tag_field() {
        let tags = vec!["rust".to_string()];
        assert_eq!(assemble_caption(Some("Hello"), &tags, false), "Hello");
    }

    #[test]
    fn test_validate_instagram_without_media_fails() {
        let err = validate(PlatformId::Instagram, &text_content("nice photo")).unwrap_err();
        assert!(matches!(err, PublishError::Validation(_)));
        assert!(err.to_string().contains("Instagram requires media content"));
    }

    #[test]
    fn test_validate_tiktok_rejects_image() {
        let content = media_content("clip", MediaKind::Image);
        let err = validate(PlatformId::TikTok, &content).unwrap_err();
        assert!(err.to_string().contains("does not accept image media"));
    }

    #[test]
    fn test_validate_twitter_accepts_gif() {
        let content = media_content("look at this", MediaKind::Gif);
        let validated = validate(PlatformId::Twitter, &content).unwrap();
        assert_eq!(validated.declared_kind, Some(MediaKind::Gif));
    }

    #[test]
    fn test_validate_caption_at_limit_passes() {
        let caption = "a".repeat(280);
        let validated = validate(PlatformId::Twitter, &text_content(&caption)).unwrap();
        assert_eq!(validated.caption.chars().count(), 280);
    }

    #[test]
    fn test_validate_caption_over_limit_fails() {
        let caption = "a".repeat(281);
        let err = validate(PlatformId::Twitter, &text_content(&caption)).unwrap_err();
        assert!(err.to_string().contains("280"));
    }

    #[test]
    fn test_validate_appended_hashtags_count_toward_limit() {
        // 275 chars of text plus "\n\n#tags" pushes past 280.
        let mut content = text_content(&"a".repeat(275));
        content.hashtags = vec!["tags".to_string()];
        let err = validate(PlatformId::Twitter, &content).unwrap_err();
        assert!(err.to_string().contains("exceeds Twitter limit"));

        // YouTube keeps hashtags out of the caption, so the same tag list
        // does not inflate the description length.
        let mut content = media_content(&"a".repeat(4999), MediaKind::Video);
        content.hashtags = vec!["tags".to_string()];
        let validated = validate(PlatformId::YouTube, &content).unwrap();
        assert!(!validated.caption.contains('#'));
        assert_eq!(validated.hashtags, vec!["tags"]);
    }

    #[test]
    fn test_validate_too_many_hashtags() {
        let mut content = text_content("short");
        content.hashtags = (0..11).map(|i| format!("tag{i}")).collect();
        let err = validate(PlatformId::Twitter, &content).unwrap_err();
        assert!(err.to_string().contains("Too many hashtags"));

        // The same list is fine on Instagram, which allows 30.
        content.media = Some(MediaSource::Url("https://x.test/a.jpg".to_string()));
        assert!(validate(PlatformId::Instagram, &content).is_ok());
    }

    #[test]
    fn test_validate_duplicate_hashtags_do_not_count_twice() {
        let mut content = text_content("short");
        content.hashtags = vec!["a".to_string(); 20];
        let validated = validate(PlatformId::Twitter, &content).unwrap();
        assert_eq!(validated.hashtags.len(), 1);
    }

    #[test]
    fn test_validate_linkedin_pascal_cases_hashtags() {
        let mut content = text_content("announcement");
        content.hashtags = vec!["open-source".to_string(), "rust".to_string()];
        let validated = validate(PlatformId::LinkedIn, &content).unwrap();
        assert_eq!(validated.hashtags, vec!["OpenSource", "Rust"]);
        assert!(validated.caption.ends_with("#OpenSource #Rust"));
    }

    #[test]
    fn test_validate_youtube_title_limit() {
        let mut content = media_content("description", MediaKind::Video);
        content.title = Some("t".repeat(101));
        let err = validate(PlatformId::YouTube, &content).unwrap_err();
        assert!(err.to_string().contains("Title length"));

        content.title = Some("t".repeat(100));
        assert!(validate(PlatformId::YouTube, &content).is_ok());
    }

    #[test]
    fn test_validate_empty_text_only_post_fails() {
        let err = validate(PlatformId::Twitter, &text_content("   ")).unwrap_err();
        assert!(err.to_string().contains("Caption cannot be empty"));
    }

    #[test]
    fn test_validate_infers_kind_from_url_extension() {
        let content = PublishContent {
            caption: Some("clip".to_string()),
            hashtags: Vec::new(),
            title: None,
            media: Some(MediaSource::Url(
                "https://cdn.example.com/video.mp4?sig=abc".to_string(),
            )),
            media_kind_hint: None,
        };
        let validated = validate(PlatformId::TikTok, &content).unwrap();
        assert_eq!(validated.declared_kind, Some(MediaKind::Video));

        // An image extension is caught before any bytes move.
        let content = PublishContent {
            media: Some(MediaSource::Url(
                "https://cdn.example.com/photo.png".to_string(),
            )),
            ..content
        };
        assert!(validate(PlatformId::TikTok, &content).is_err());
    }

    #[test]
    fn test_preflight_reports_one_entry_per_platform() {
        let content = text_content("hello");
        let results = preflight(
            &content,
            &[
                "twitter".to_string(),
                "instagram".to_string(),
                "myspace".to_string(),
            ],
        );
        assert_eq!(results.len(), 3);
        assert!(results[0].valid);
        assert!(!results[1].valid);
        assert!(results[1].errors[0].contains("Instagram requires media content"));
        assert!(!results[2].valid);
        assert!(results[2].errors[0].contains("myspace"));
    }

    #[test]
    fn test_preflight_warns_on_unused_title() {
        let mut content = text_content("hello");
        content.title = Some("My title".to_string());
        let results = preflight(&content, &["twitter".to_string()]);
        assert!(results[0].valid);
        assert!(results[0].warnings[0].contains("does not use a title"));
    }
}
