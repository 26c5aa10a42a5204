use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};

use crate::core::soundcloud::{AccountSnapshot, SoundCloudError, TokenDocument, TokenStore};

/// SQLite home of the SoundCloud credentials. One row per key.
pub struct SqliteTokenStore {
    pool: Pool<Sqlite>,
}

impl SqliteTokenStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS soundcloud_auth (
                id TEXT PRIMARY KEY,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                token_type TEXT NOT NULL DEFAULT 'OAuth',
                scope TEXT,
                expires_at TEXT,
                account TEXT,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn store_err(e: impl std::fmt::Display) -> SoundCloudError {
    SoundCloudError::Store(e.to_string())
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn load(&self, key: &str) -> Result<Option<TokenDocument>, SoundCloudError> {
        let row = sqlx::query("SELECT * FROM soundcloud_auth WHERE id = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let account = row
            .get::<Option<String>, _>("account")
            .map(|json| serde_json::from_str::<AccountSnapshot>(&json))
            .transpose()
            .map_err(store_err)?;

        Ok(Some(TokenDocument {
            access_token: row.get("access_token"),
            refresh_token: row.get("refresh_token"),
            token_type: row.get("token_type"),
            scope: row.get("scope"),
            expires_at: row.get::<Option<DateTime<Utc>>, _>("expires_at"),
            account,
        }))
    }

    async fn upsert(&self, key: &str, doc: &TokenDocument) -> Result<(), SoundCloudError> {
        let account = doc
            .account
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(store_err)?;

        sqlx::query(
            r#"
            INSERT INTO soundcloud_auth
                (id, access_token, refresh_token, token_type, scope, expires_at, account, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_type = excluded.token_type,
                scope = excluded.scope,
                expires_at = excluded.expires_at,
                account = excluded.account,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(&doc.access_token)
        .bind(&doc.refresh_token)
        .bind(&doc.token_type)
        .bind(&doc.scope)
        .bind(doc.expires_at)
        .bind(account)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        tracing::debug!(key, "Persisted SoundCloud token document");
        Ok(())
    }
}
