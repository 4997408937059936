//! Sqlite-backed credential store
//!
//! The production [`CredentialStore`]: the external OAuth flow writes
//! records here and the refresh manager updates them in place. Writes go
//! through `INSERT OR REPLACE`, so a racing refresh keeps the later write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;

use crate::credentials::{Credential, CredentialStatus, CredentialStore};
use crate::error::{Result, StoreError};
use crate::types::PlatformId;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS credentials (
    owner_id            TEXT NOT NULL,
    platform            TEXT NOT NULL,
    access_token        TEXT NOT NULL,
    refresh_token       TEXT,
    token_kind          TEXT NOT NULL DEFAULT 'bearer',
    scopes              TEXT NOT NULL DEFAULT '',
    expires_at          INTEGER NOT NULL,
    status              TEXT NOT NULL DEFAULT 'active',
    provider_user_id    TEXT,
    display_handle      TEXT,
    handle_refreshed_at INTEGER,
    last_error          TEXT,
    updated_at          INTEGER NOT NULL,
    PRIMARY KEY (owner_id, platform)
)
"#;

#[derive(Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    /// Open (and create if needed) the store at `db_path`.
    pub async fn open(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }

        // Forward slashes work for SQLite URLs on every platform; mode=rwc
        // creates the database file if it doesn't exist.
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(StoreError::Sqlx)?;

        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(StoreError::Sqlx)?;

        Ok(Self { pool })
    }

    fn row_to_credential(row: &sqlx::sqlite::SqliteRow) -> Option<Credential> {
        let platform: PlatformId = row.get::<String, _>("platform").parse().ok()?;
        let scopes_raw: String = row.get("scopes");
        let scopes = if scopes_raw.is_empty() {
            Vec::new()
        } else {
            scopes_raw.split(' ').map(str::to_string).collect()
        };

        Some(Credential {
            owner_id: row.get("owner_id"),
            platform,
            access_token: row.get("access_token"),
            refresh_token: row.get("refresh_token"),
            token_kind: row.get("token_kind"),
            scopes,
            expires_at: timestamp_to_datetime(row.get("expires_at")),
            status: CredentialStatus::from_str_or_active(&row.get::<String, _>("status")),
            provider_user_id: row.get("provider_user_id"),
            display_handle: row.get("display_handle"),
            handle_refreshed_at: row
                .get::<Option<i64>, _>("handle_refreshed_at")
                .map(timestamp_to_datetime),
            last_error: row.get("last_error"),
            updated_at: timestamp_to_datetime(row.get("updated_at")),
        })
    }
}

fn timestamp_to_datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn get(
        &self,
        owner_id: &str,
        platform: PlatformId,
    ) -> std::result::Result<Option<Credential>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT owner_id, platform, access_token, refresh_token, token_kind, scopes,
                   expires_at, status, provider_user_id, display_handle,
                   handle_refreshed_at, last_error, updated_at
            FROM credentials WHERE owner_id = ? AND platform = ?
            "#,
        )
        .bind(owner_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Sqlx)?;

        Ok(row.as_ref().and_then(Self::row_to_credential))
    }

    async fn put(&self, credential: &Credential) -> std::result::Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO credentials
                (owner_id, platform, access_token, refresh_token, token_kind, scopes,
                 expires_at, status, provider_user_id, display_handle,
                 handle_refreshed_at, last_error, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&credential.owner_id)
        .bind(credential.platform.as_str())
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(&credential.token_kind)
        .bind(credential.scopes.join(" "))
        .bind(credential.expires_at.timestamp())
        .bind(credential.status.as_str())
        .bind(&credential.provider_user_id)
        .bind(&credential.display_handle)
        .bind(credential.handle_refreshed_at.map(|t| t.timestamp()))
        .bind(&credential.last_error)
        .bind(credential.updated_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Sqlx)?;

        Ok(())
    }

    async fn list(&self, owner_id: &str) -> std::result::Result<Vec<Credential>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT owner_id, platform, access_token, refresh_token, token_kind, scopes,
                   expires_at, status, provider_user_id, display_handle,
                   handle_refreshed_at, last_error, updated_at
            FROM credentials WHERE owner_id = ?
            ORDER BY platform
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Sqlx)?;

        Ok(rows.iter().filter_map(Self::row_to_credential).collect())
    }
}
