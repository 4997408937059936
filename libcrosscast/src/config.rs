//! Configuration management for Crosscast
//!
//! The configuration is constructed once at startup and passed into the
//! publisher and adapters by parameter. Every provider endpoint base lives
//! here so tests can point adapters at fake servers.

use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::logging::LoggingConfig;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    /// Object storage for rehosted media. Publishes without media work
    /// without it; a publish with media fails per-platform when absent.
    pub storage: Option<StorageConfig>,
    #[serde(default)]
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Owner id assumed when a request does not carry one (CLI convenience).
    pub default_owner: Option<String>,
    /// Location of the sqlite credential store.
    #[serde(default = "default_store_path")]
    pub store_path: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            default_owner: None,
            store_path: default_store_path(),
        }
    }
}

fn default_store_path() -> String {
    "~/.local/share/crosscast/credentials.db".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Timeout for fetching externally referenced media.
    #[serde(default = "default_media_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Hard ceiling on fetched media size.
    #[serde(default = "default_media_max_bytes")]
    pub max_bytes: usize,
}

impl MediaConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        MediaConfig {
            fetch_timeout_secs: default_media_fetch_timeout_secs(),
            max_bytes: default_media_max_bytes(),
        }
    }
}

fn default_media_fetch_timeout_secs() -> u64 {
    30
}

fn default_media_max_bytes() -> usize {
    200 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Seconds between container status polls.
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    /// Ceiling on the whole polling loop.
    #[serde(default = "default_poll_timeout_secs")]
    pub timeout_secs: u64,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        PollingConfig {
            interval_secs: default_poll_interval_secs(),
            timeout_secs: default_poll_timeout_secs(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_poll_timeout_secs() -> u64 {
    120
}

/// Object storage backend receiving rehosted media.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Upload endpoint; objects are PUT at `{endpoint}/{key}`.
    pub endpoint: String,
    /// Public base for canonical URLs: `{public_base_url}/{key}`.
    pub public_base_url: String,
    /// Bearer token for the upload endpoint, when it requires one.
    pub api_key: Option<SecretString>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PlatformsConfig {
    pub linkedin: Option<LinkedInConfig>,
    pub twitter: Option<TwitterConfig>,
    pub instagram: Option<InstagramConfig>,
    pub facebook: Option<FacebookConfig>,
    pub tiktok: Option<TikTokConfig>,
    pub youtube: Option<YouTubeConfig>,
}

impl PlatformsConfig {
    /// Names of the platforms with a configuration section present.
    pub fn configured(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.linkedin.is_some() {
            names.push("linkedin");
        }
        if self.twitter.is_some() {
            names.push("twitter");
        }
        if self.instagram.is_some() {
            names.push("instagram");
        }
        if self.facebook.is_some() {
            names.push("facebook");
        }
        if self.tiktok.is_some() {
            names.push("tiktok");
        }
        if self.youtube.is_some() {
            names.push("youtube");
        }
        names
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkedInConfig {
    #[serde(default = "default_linkedin_api_base")]
    pub api_base: String,
    #[serde(default = "default_linkedin_oauth_base")]
    pub oauth_base: String,
    /// Protocol version tags tried in order; a final attempt without a tag
    /// is always appended.
    #[serde(default = "default_linkedin_version_tags")]
    pub version_tags: Vec<String>,
    pub client_id: String,
    pub client_secret: SecretString,
}

fn default_linkedin_api_base() -> String {
    "https://api.linkedin.com".to_string()
}

fn default_linkedin_oauth_base() -> String {
    "https://www.linkedin.com".to_string()
}

fn default_linkedin_version_tags() -> Vec<String> {
    vec![
        "202506".to_string(),
        "202412".to_string(),
        "202406".to_string(),
    ]
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitterConfig {
    #[serde(default = "default_twitter_api_base")]
    pub api_base: String,
    #[serde(default = "default_twitter_upload_base")]
    pub upload_base: String,
    pub client_id: String,
    pub client_secret: SecretString,
}

fn default_twitter_api_base() -> String {
    "https://api.twitter.com".to_string()
}

fn default_twitter_upload_base() -> String {
    "https://upload.twitter.com".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstagramConfig {
    #[serde(default = "default_graph_base")]
    pub graph_base: String,
    pub app_id: String,
    pub app_secret: SecretString,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FacebookConfig {
    #[serde(default = "default_graph_base")]
    pub graph_base: String,
    pub app_id: String,
    pub app_secret: SecretString,
}

fn default_graph_base() -> String {
    "https://graph.facebook.com/v19.0".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TikTokConfig {
    #[serde(default = "default_tiktok_api_base")]
    pub api_base: String,
    pub client_key: String,
    pub client_secret: SecretString,
}

fn default_tiktok_api_base() -> String {
    "https://open.tiktokapis.com".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct YouTubeConfig {
    #[serde(default = "default_youtube_api_base")]
    pub api_base: String,
    #[serde(default = "default_youtube_upload_base")]
    pub upload_base: String,
    #[serde(default = "default_youtube_token_endpoint")]
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: SecretString,
}

fn default_youtube_api_base() -> String {
    "https://www.googleapis.com".to_string()
}

fn default_youtube_upload_base() -> String {
    "https://www.googleapis.com/upload".to_string()
}

fn default_youtube_token_endpoint() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Expanded path to the sqlite credential store.
    pub fn store_path(&self) -> String {
        shellexpand::tilde(&self.general.store_path).to_string()
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosscast").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_empty_config_gets_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.http.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.polling.interval(), Duration::from_secs(3));
        assert_eq!(config.polling.timeout(), Duration::from_secs(120));
        assert_eq!(config.media.max_bytes, 200 * 1024 * 1024);
        assert!(config.storage.is_none());
        assert!(config.platforms.configured().is_empty());
    }

    #[test]
    fn test_platform_section_with_endpoint_defaults() {
        let config = Config::from_toml_str(
            r#"
            [platforms.twitter]
            client_id = "app-id"
            client_secret = "app-secret"
            "#,
        )
        .unwrap();

        let twitter = config.platforms.twitter.expect("twitter section");
        assert_eq!(twitter.api_base, "https://api.twitter.com");
        assert_eq!(twitter.upload_base, "https://upload.twitter.com");
        assert_eq!(twitter.client_id, "app-id");
        assert_eq!(twitter.client_secret.expose_secret(), "app-secret");
    }

    #[test]
    fn test_endpoint_override_for_tests() {
        let config = Config::from_toml_str(
            r#"
            [platforms.linkedin]
            api_base = "http://127.0.0.1:9090"
            oauth_base = "http://127.0.0.1:9091"
            version_tags = ["202401"]
            client_id = "id"
            client_secret = "secret"
            "#,
        )
        .unwrap();

        let linkedin = config.platforms.linkedin.expect("linkedin section");
        assert_eq!(linkedin.api_base, "http://127.0.0.1:9090");
        assert_eq!(linkedin.version_tags, vec!["202401".to_string()]);
    }

    #[test]
    fn test_linkedin_default_version_tags_are_ordered() {
        let config = Config::from_toml_str(
            r#"
            [platforms.linkedin]
            client_id = "id"
            client_secret = "secret"
            "#,
        )
        .unwrap();

        let tags = config.platforms.linkedin.unwrap().version_tags;
        assert!(tags.len() >= 2, "needs at least a primary and a fallback");
        let mut sorted = tags.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(tags, sorted, "tags should run newest first");
    }

    #[test]
    fn test_storage_section() {
        let config = Config::from_toml_str(
            r#"
            [storage]
            endpoint = "https://store.example.com/u"
            public_base_url = "https://cdn.example.com"
            api_key = "sk-1234"
            "#,
        )
        .unwrap();

        let storage = config.storage.expect("storage section");
        assert_eq!(storage.endpoint, "https://store.example.com/u");
        assert_eq!(storage.public_base_url, "https://cdn.example.com");
        assert_eq!(
            storage.api_key.expect("api key").expose_secret(),
            "sk-1234"
        );
    }

    #[test]
    fn test_configured_platform_names() {
        let config = Config::from_toml_str(
            r#"
            [platforms.twitter]
            client_id = "a"
            client_secret = "b"

            [platforms.youtube]
            client_id = "c"
            client_secret = "d"
            "#,
        )
        .unwrap();

        assert_eq!(config.platforms.configured(), vec!["twitter", "youtube"]);
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let result = Config::from_toml_str("not [valid toml");
        assert!(matches!(
            result,
            Err(crate::error::CrosscastError::Config(
                ConfigError::ParseError(_)
            ))
        ));
    }

    #[test]
    fn test_store_path_expansion() {
        let config = Config::from_toml_str(
            r#"
            [general]
            store_path = "~/creds.db"
            "#,
        )
        .unwrap();
        assert!(!config.store_path().starts_with('~'));
    }

    #[test]
    #[serial]
    fn test_config_env_var_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [general]
            default_owner = "env-owner"
            "#
        )
        .unwrap();

        std::env::set_var("CROSSCAST_CONFIG", file.path());
        let resolved = resolve_config_path().unwrap();
        assert_eq!(resolved, file.path());

        let config = Config::load().unwrap();
        assert_eq!(config.general.default_owner.as_deref(), Some("env-owner"));
        std::env::remove_var("CROSSCAST_CONFIG");
    }

    #[test]
    #[serial]
    fn test_config_path_without_env_var() {
        std::env::remove_var("CROSSCAST_CONFIG");
        let resolved = resolve_config_path().unwrap();
        assert!(resolved.ends_with("crosscast/config.toml"));
    }
}
