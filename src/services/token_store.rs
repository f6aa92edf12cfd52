//! src/services/token_store.rs
//!
//! Token Store: upload-token state, owner display data, and the per-token
//! upload history, persisted in SQLite.

use crate::models::upload_token::{TokenStatus, UploadRecord, UploadToken, User};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("upload token `{0}` not found")]
    TokenNotFound(Uuid),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Look up a token by its bearer value, with its upload history.
    async fn find_by_token(&self, token: &str) -> StoreResult<Option<UploadToken>>;

    async fn find_user_by_id(&self, user_id: &str) -> StoreResult<Option<User>>;

    /// Add `success_count` to the usage counter and append `entries`, as one
    /// atomic update.
    async fn commit_upload(
        &self,
        token_id: Uuid,
        success_count: i64,
        entries: &[UploadRecord],
    ) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct SqliteTokenStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl SqliteTokenStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Create an active token for `user_id` and return it.
    pub async fn issue_token(
        &self,
        user_id: &str,
        max_uploads: i64,
        valid_for: Duration,
    ) -> StoreResult<UploadToken> {
        let now = Utc::now();
        let token = UploadToken {
            id: Uuid::new_v4(),
            token: Uuid::new_v4().simple().to_string(),
            user_id: user_id.to_string(),
            expires_at: now + valid_for,
            max_uploads,
            uploads_used: 0,
            status: TokenStatus::Active,
            created_at: now,
            uploads: Vec::new(),
        };

        sqlx::query(
            "INSERT INTO upload_tokens
                (id, token, user_id, expires_at, max_uploads, uploads_used, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(token.id)
        .bind(&token.token)
        .bind(&token.user_id)
        .bind(token.expires_at)
        .bind(token.max_uploads)
        .bind(token.uploads_used)
        .bind(token.status)
        .bind(token.created_at)
        .execute(&*self.db)
        .await?;

        Ok(token)
    }

    async fn fetch_history(&self, token_id: Uuid) -> StoreResult<Vec<UploadRecord>> {
        let records = sqlx::query_as::<_, UploadRecord>(
            "SELECT file_name, storage_path, uploaded_at
             FROM upload_records WHERE token_id = ? ORDER BY rowid ASC",
        )
        .bind(token_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(records)
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn find_by_token(&self, token: &str) -> StoreResult<Option<UploadToken>> {
        let row = sqlx::query_as::<_, UploadToken>(
            "SELECT id, token, user_id, expires_at, max_uploads, uploads_used, status, created_at
             FROM upload_tokens WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&*self.db)
        .await?;

        match row {
            Some(mut record) => {
                record.uploads = self.fetch_history(record.id).await?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn find_user_by_id(&self, user_id: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, first_name, last_name FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(user)
    }

    async fn commit_upload(
        &self,
        token_id: Uuid,
        success_count: i64,
        entries: &[UploadRecord],
    ) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;

        // Clamped so racing commits can never push usage past the ceiling.
        let result = sqlx::query(
            "UPDATE upload_tokens
             SET uploads_used = MIN(max_uploads, uploads_used + ?)
             WHERE id = ?",
        )
        .bind(success_count)
        .bind(token_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TokenNotFound(token_id));
        }

        for entry in entries {
            sqlx::query(
                "INSERT INTO upload_records (id, token_id, file_name, storage_path, uploaded_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4())
            .bind(token_id)
            .bind(&entry.file_name)
            .bind(&entry.storage_path)
            .bind(entry.uploaded_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(%token_id, success_count, "upload commit applied");
        Ok(())
    }
}

/// Run the statements of a migration script one by one.
pub async fn apply_migrations(db: &SqlitePool, sql: &str) -> StoreResult<usize> {
    let statements = sql
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    for stmt in &statements {
        debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(statements.len())
}
