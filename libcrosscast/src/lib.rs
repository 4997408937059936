//! Crosscast - one post, every connected platform
//!
//! This library provides core functionality for publishing content to
//! multiple social platforms at once: per-platform content validation,
//! credential storage with automatic token refresh, media rehosting, and
//! adapters for each supported provider behind one trait.

pub mod clock;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod logging;
pub mod media;
pub mod platforms;
pub mod publisher;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use credentials::{Credential, CredentialStore, RefreshManager};
pub use db::SqliteCredentialStore;
pub use error::{CrosscastError, PublishError, Result};
pub use publisher::Publisher;
pub use types::{PlatformId, PlatformOutcome, PublishContent, PublishReport, PublishRequest};
