//! cross-post - Publish one piece of content to every connected platform

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::debug;

use libcrosscast::clock::SystemClock;
use libcrosscast::media::{HttpObjectStore, MediaRehoster, ObjectStore};
use libcrosscast::platforms::http::ProviderClient;
use libcrosscast::platforms::AdapterRegistry;
use libcrosscast::service::validation::{self, PlatformValidation};
use libcrosscast::types::{MediaKind, MediaSource};
use libcrosscast::{
    Config, CrosscastError, PublishContent, Publisher, PublishReport, PublishRequest, Result,
    SqliteCredentialStore,
};

#[derive(Parser, Debug)]
#[command(name = "cross-post")]
#[command(version)]
#[command(about = "Publish one piece of content to every connected platform")]
#[command(long_about = "\
cross-post - Publish one piece of content to every connected platform

DESCRIPTION:
    cross-post sends a caption with optional hashtags and media to each
    requested platform concurrently. Every platform gets its own outcome
    line; the run counts as successful when at least one platform accepted
    the post.

    Media given as a URL or file path is fetched and rehosted on the
    configured object storage before any provider sees it. Stored
    credentials are refreshed automatically when they are about to expire.

USAGE EXAMPLES:
    # Text post to two platforms
    cross-post \"Release day!\" --platforms twitter,linkedin

    # Read the caption from stdin
    echo \"Release day!\" | cross-post - --platforms twitter

    # Attach media and hashtags
    cross-post \"New tutorial\" --platforms instagram,facebook \\
        --media ./teaser.mp4 --hashtag rust --hashtag tutorial

    # Validate without any network calls
    cross-post \"Draft text\" --platforms tiktok --dry-run

    # Machine-readable report
    cross-post \"Release day!\" --platforms twitter --format json

CONFIGURATION:
    Configuration file: ~/.config/crosscast/config.toml
    Credential store:   ~/.local/share/crosscast/credentials.db

    Override with environment variables:
        CROSSCAST_CONFIG - Path to config file

EXIT CODES:
    0 - Published to at least one platform (or dry run passed)
    1 - Every platform failed (or dry run found errors)
    2 - Credential problem (reconnect the account)
    3 - Invalid input
")]
struct Cli {
    /// Caption text; use '-' to read it from stdin
    caption: Option<String>,

    /// Target platforms, comma-separated
    /// (twitter, linkedin, instagram, facebook, tiktok, youtube)
    #[arg(short, long, value_name = "LIST")]
    platforms: String,

    /// Owner id whose credentials are used (defaults to general.default_owner)
    #[arg(short, long)]
    owner: Option<String>,

    /// Hashtag to append; repeat for several (leading '#' optional)
    #[arg(long = "hashtag", value_name = "TAG")]
    hashtags: Vec<String>,

    /// Title for platforms with a dedicated title field
    #[arg(short, long)]
    title: Option<String>,

    /// Media to attach: an http(s) URL or a local file path
    #[arg(short, long, value_name = "URL|PATH")]
    media: Option<String>,

    /// Declared media kind when the filename gives no clue
    #[arg(long, value_name = "KIND", value_parser = parse_media_kind)]
    media_kind: Option<MediaKind>,

    /// Path to the config file (overrides CROSSCAST_CONFIG)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Validate against every requested platform without publishing
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn parse_media_kind(s: &str) -> std::result::Result<MediaKind, String> {
    match s.to_lowercase().as_str() {
        "image" => Ok(MediaKind::Image),
        "video" => Ok(MediaKind::Video),
        "gif" => Ok(MediaKind::Gif),
        _ => Err(format!(
            "Invalid media kind: '{}'. Valid options: image, video, gif",
            s
        )),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Run the main logic and handle errors
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Load configuration
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    // Initialize logging from the config, with --verbose taking precedence
    let mut logging = config.logging.clone();
    logging.verbose = cli.verbose;
    logging.init();

    if cli.format != "text" && cli.format != "json" {
        return Err(CrosscastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            cli.format
        )));
    }

    let owner = cli
        .owner
        .clone()
        .or_else(|| config.general.default_owner.clone())
        .ok_or_else(|| {
            CrosscastError::InvalidInput(
                "No owner id given; pass --owner or set general.default_owner in the config"
                    .to_string(),
            )
        })?;

    let platforms: Vec<String> = cli
        .platforms
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    let media = match &cli.media {
        Some(arg) => Some(load_media(arg)?),
        None => None,
    };

    let request = PublishRequest {
        owner_id: owner,
        platforms,
        content: PublishContent {
            caption: resolve_caption(cli.caption.as_deref())?,
            hashtags: cli.hashtags.clone(),
            title: cli.title.clone(),
            media,
            media_kind_hint: cli.media_kind,
        },
    };

    if cli.dry_run {
        return cmd_dry_run(&request, &cli.format);
    }

    cmd_publish(&config, &request, &cli.format).await
}

/// Resolve the caption argument, reading stdin when it is '-'.
fn resolve_caption(arg: Option<&str>) -> Result<Option<String>> {
    match arg {
        Some("-") => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| {
                    CrosscastError::InvalidInput(format!("Failed to read stdin: {}", e))
                })?;
            let text = buffer.trim_end().to_string();
            if text.is_empty() {
                Ok(None)
            } else {
                Ok(Some(text))
            }
        }
        Some(text) => Ok(Some(text.to_string())),
        None => Ok(None),
    }
}

/// Turn the --media argument into a media source: URLs pass through, paths
/// are read up front so a missing file fails before any network work.
fn load_media(arg: &str) -> Result<MediaSource> {
    if arg.starts_with("http://") || arg.starts_with("https://") {
        return Ok(MediaSource::Url(arg.to_string()));
    }

    let path = shellexpand::tilde(arg).to_string();
    let data = std::fs::read(&path).map_err(|e| {
        CrosscastError::InvalidInput(format!("Cannot read media file '{}': {}", arg, e))
    })?;
    let filename = Path::new(&path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string());
    Ok(MediaSource::Bytes { data, filename })
}

/// Validate the content against every requested platform without touching
/// the network or the credential store.
fn cmd_dry_run(request: &PublishRequest, format: &str) -> Result<()> {
    request.ensure_well_formed()?;

    let results = validation::preflight(&request.content, &request.requested_platforms());

    if format == "json" {
        output_dry_run_json(&results);
    } else {
        output_dry_run_text(&results);
    }

    if results.iter().any(|r| !r.valid) {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_publish(config: &Config, request: &PublishRequest, format: &str) -> Result<()> {
    let store = SqliteCredentialStore::open(&config.store_path()).await?;
    let client = ProviderClient::new(&config.http)?;

    let registry = AdapterRegistry::from_config(config, &client);
    if registry.is_empty() {
        return Err(CrosscastError::InvalidInput(
            "No platforms are configured; add [platforms.*] sections to the config".to_string(),
        ));
    }
    debug!(platforms = ?registry.platforms(), "Adapters configured");

    let object_store: Option<Arc<dyn ObjectStore>> = config.storage.as_ref().map(|storage| {
        Arc::new(HttpObjectStore::new(client.inner().clone(), storage)) as Arc<dyn ObjectStore>
    });
    let rehoster = MediaRehoster::new(client.inner().clone(), object_store, config.media.clone());

    let publisher = Publisher::new(
        Arc::new(registry),
        Arc::new(store),
        rehoster,
        Arc::new(SystemClock),
        config.polling.clone(),
    );

    let report = publisher.publish(request).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report).unwrap());
    } else {
        output_report_text(&report);
    }

    if !report.overall_success {
        std::process::exit(1);
    }
    Ok(())
}

/// Output the publish report as human-readable text
fn output_report_text(report: &PublishReport) {
    for outcome in &report.outcomes {
        let status = if outcome.success { "ok" } else { "failed" };
        match outcome.api_version.as_deref() {
            Some(version) => {
                println!("[{}] {} (API version {})", status, outcome.message, version)
            }
            None => println!("[{}] {}", status, outcome.message),
        }
    }
    println!("{}", report.message);
}

/// Output dry-run results as human-readable text
fn output_dry_run_text(results: &[PlatformValidation]) {
    for result in results {
        let status = if result.valid { "ok" } else { "invalid" };
        println!("{}: {}", result.platform, status);
        for error in &result.errors {
            println!("  error: {}", error);
        }
        for warning in &result.warnings {
            println!("  warning: {}", warning);
        }
    }
}

/// Output dry-run results as JSON
fn output_dry_run_json(results: &[PlatformValidation]) {
    let json: Vec<serde_json::Value> = results
        .iter()
        .map(|r| {
            serde_json::json!({
                "platform": r.platform,
                "valid": r.valid,
                "errors": r.errors,
                "warnings": r.warnings,
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json).unwrap());
}
