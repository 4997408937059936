//! Media fetching, type detection, and rehosting
//!
//! Providers ingest media in two ways: some pull from a URL they can reach,
//! others want raw bytes on an upload call. Either way the pipeline is the
//! same: obtain the bytes (with a timeout and a size ceiling), sniff the
//! real format from the leading bytes, and push a copy to the configured
//! object store so every adapter works from one canonical URL.

use crate::config::{MediaConfig, StorageConfig};
use crate::error::PublishError;
use crate::types::{MediaKind, MediaSource};
use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// A media format identified by sniffing or filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaFormat {
    pub kind: MediaKind,
    pub content_type: &'static str,
    pub extension: &'static str,
}

const JPEG: MediaFormat = MediaFormat {
    kind: MediaKind::Image,
    content_type: "image/jpeg",
    extension: "jpg",
};
const PNG: MediaFormat = MediaFormat {
    kind: MediaKind::Image,
    content_type: "image/png",
    extension: "png",
};
const GIF: MediaFormat = MediaFormat {
    kind: MediaKind::Gif,
    content_type: "image/gif",
    extension: "gif",
};
const WEBP: MediaFormat = MediaFormat {
    kind: MediaKind::Image,
    content_type: "image/webp",
    extension: "webp",
};
const MP4: MediaFormat = MediaFormat {
    kind: MediaKind::Video,
    content_type: "video/mp4",
    extension: "mp4",
};
const WEBM: MediaFormat = MediaFormat {
    kind: MediaKind::Video,
    content_type: "video/webm",
    extension: "webm",
};

/// Identify a media format from its leading bytes.
///
/// Covers the formats the supported platforms accept: JPEG, PNG, GIF, WebP,
/// MP4/MOV (any ISO base media file), and WebM/Matroska.
pub fn sniff_format(bytes: &[u8]) -> Option<MediaFormat> {
    if bytes.len() >= 3 && bytes[..3] == [0xFF, 0xD8, 0xFF] {
        return Some(JPEG);
    }
    if bytes.len() >= 8 && bytes[..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] {
        return Some(PNG);
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some(GIF);
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some(WEBP);
    }
    // ISO base media: size prefix then "ftyp". Covers .mp4 and .mov.
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return Some(MP4);
    }
    // EBML header, shared by WebM and Matroska.
    if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some(WEBM);
    }
    None
}

/// Identify a media format from a filename extension.
///
/// Fallback for when sniffing fails; also used pre-flight, before any
/// bytes exist to sniff.
pub fn format_from_filename(name: &str) -> Option<MediaFormat> {
    let ext = name.rsplit('.').next()?.to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some(JPEG),
        "png" => Some(PNG),
        "gif" => Some(GIF),
        "webp" => Some(WEBP),
        "mp4" => Some(MP4),
        "mov" => Some(MediaFormat {
            kind: MediaKind::Video,
            content_type: "video/quicktime",
            extension: "mov",
        }),
        "avi" => Some(MediaFormat {
            kind: MediaKind::Video,
            content_type: "video/x-msvideo",
            extension: "avi",
        }),
        "wmv" => Some(MediaFormat {
            kind: MediaKind::Video,
            content_type: "video/x-ms-wmv",
            extension: "wmv",
        }),
        "flv" => Some(MediaFormat {
            kind: MediaKind::Video,
            content_type: "video/x-flv",
            extension: "flv",
        }),
        "mkv" => Some(MediaFormat {
            kind: MediaKind::Video,
            content_type: "video/x-matroska",
            extension: "mkv",
        }),
        "webm" => Some(WEBM),
        _ => None,
    }
}

/// Media kind implied by a filename, if the extension is recognized.
pub fn kind_from_filename(name: &str) -> Option<MediaKind> {
    format_from_filename(name).map(|f| f.kind)
}

/// Destination for rehosted media objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object under `key` and return its publicly reachable URL.
    async fn put(
        &self,
        key: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<String, PublishError>;
}

/// Object store backed by a plain HTTP endpoint.
///
/// Objects are PUT at `{endpoint}/{key}` and served from
/// `{public_base_url}/{key}`.
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    public_base_url: String,
    api_key: Option<SecretString>,
}

impl HttpObjectStore {
    pub fn new(client: reqwest::Client, config: &StorageConfig) -> Self {
        HttpObjectStore {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(
        &self,
        key: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<String, PublishError> {
        let mut request = self
            .client
            .put(format!("{}/{}", self.endpoint, key))
            .header("Content-Type", content_type)
            .body(bytes.to_vec());
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }
        let response = request.send().await.map_err(|e| {
            PublishError::MediaRehost(format!("Object store upload failed: {e}"))
        })?;
        if !response.status().is_success() {
            return Err(PublishError::MediaRehost(format!(
                "Object store upload failed with HTTP {}",
                response.status()
            )));
        }
        Ok(format!("{}/{}", self.public_base_url, key))
    }
}

/// In-memory object store for tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, (String, Vec<u8>)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|(_, bytes)| bytes.clone())
    }

    pub async fn content_type_of(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|(content_type, _)| content_type.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<String, PublishError> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), (content_type.to_string(), bytes.to_vec()));
        Ok(format!("memory://store/{key}"))
    }
}

/// Media after rehosting: the canonical URL plus the bytes themselves,
/// since some providers ingest by URL and others by upload.
#[derive(Clone)]
pub struct RehostedMedia {
    pub url: String,
    pub bytes: Vec<u8>,
    pub kind: MediaKind,
    pub content_type: String,
}

impl fmt::Debug for RehostedMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RehostedMedia")
            .field("url", &self.url)
            .field("bytes", &format!("{} bytes", self.bytes.len()))
            .field("kind", &self.kind)
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Fetches source media and pushes a copy to the object store.
pub struct MediaRehoster {
    client: reqwest::Client,
    store: Option<Arc<dyn ObjectStore>>,
    config: MediaConfig,
}

impl MediaRehoster {
    pub fn new(
        client: reqwest::Client,
        store: Option<Arc<dyn ObjectStore>>,
        config: MediaConfig,
    ) -> Self {
        MediaRehoster {
            client,
            store,
            config,
        }
    }

    /// Rehost one piece of media for a publish attempt.
    ///
    /// URL sources are fetched with the configured timeout and size ceiling;
    /// inline bytes are bounded by the same ceiling. The format comes from
    /// sniffing the leading bytes, falling back to the filename extension.
    ///
    /// # Arguments
    ///
    /// * `source` - Where the media comes from
    /// * `owner_id` - Owner of the publish request; part of the object key
    pub async fn rehost(
        &self,
        source: &MediaSource,
        owner_id: &str,
    ) -> Result<RehostedMedia, PublishError> {
        let store = self.store.as_ref().ok_or_else(|| {
            PublishError::MediaRehost(
                "Media was attached but no media storage is configured".to_string(),
            )
        })?;

        let (bytes, filename) = match source {
            MediaSource::Url(url) => {
                let bytes = self.fetch(url).await?;
                (bytes, filename_from_url(url))
            }
            MediaSource::Bytes { data, filename } => {
                if data.len() > self.config.max_bytes {
                    return Err(PublishError::MediaRehost(format!(
                        "Media is {} bytes, over the {} byte limit",
                        data.len(),
                        self.config.max_bytes
                    )));
                }
                (data.clone(), filename.clone())
            }
        };

        let format = sniff_format(&bytes)
            .or_else(|| filename.as_deref().and_then(format_from_filename))
            .ok_or_else(|| {
                PublishError::MediaRehost(
                    "Could not determine media type from content or filename".to_string(),
                )
            })?;

        let key = format!("media/{}/{}.{}", owner_id, Uuid::new_v4(), format.extension);
        let url = store.put(&key, format.content_type, &bytes).await?;
        info!(
            key = %key,
            kind = %format.kind,
            size = bytes.len(),
            "rehosted media"
        );

        Ok(RehostedMedia {
            url,
            bytes,
            kind: format.kind,
            content_type: format.content_type.to_string(),
        })
    }

    /// Download media from a URL, enforcing the size ceiling while streaming.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PublishError> {
        debug!(url = %url, "fetching media");
        let response = self
            .client
            .get(url)
            .timeout(self.config.fetch_timeout())
            .send()
            .await
            .map_err(|e| {
                PublishError::MediaRehost(format!("Failed to fetch media from {url}: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(PublishError::MediaRehost(format!(
                "Media fetch returned HTTP {} for {url}",
                response.status()
            )));
        }

        if let Some(declared) = response.content_length() {
            if declared as usize > self.config.max_bytes {
                return Err(PublishError::MediaRehost(format!(
                    "Media at {url} is {declared} bytes, over the {} byte limit",
                    self.config.max_bytes
                )));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                PublishError::MediaRehost(format!("Media download from {url} failed: {e}"))
            })?;
            if bytes.len() + chunk.len() > self.config.max_bytes {
                return Err(PublishError::MediaRehost(format!(
                    "Media at {url} exceeds the {} byte limit",
                    self.config.max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

fn filename_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
