//! src/services/upload_service.rs
//!
//! UploadService: the ingestion pipeline behind `POST /api/upload`:
//! decode the multipart body, validate the token and every file up front,
//! relay files one at a time, then commit the successful ones to the token
//! in a single store update.
//!
//! Validation failures are raised before any storage call. A failed relay
//! only marks that file as failed; siblings and the commit still proceed.

use crate::{
    errors::UploadError,
    models::{
        upload::{FilePart, TokenStatusResponse, UploadResponse, UploadResult},
        upload_token::{UploadRecord, UploadToken},
    },
    multipart,
    services::{
        object_storage::{ObjectStorage, SMALL_UPLOAD_LIMIT, StorageResult},
        token_store::TokenStore,
    },
};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Largest accepted file, inclusive.
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

pub const ALLOWED_MIME_TYPES: [&str; 5] = [
    "application/pdf",
    "image/jpeg",
    "image/png",
    "image/tiff",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Label used when a token owner has no user record.
pub const DEFAULT_CLIENT_NAME: &str = "Client";

const UPLOAD_FAILED: &str = "Upload failed";

#[derive(Clone)]
pub struct UploadService {
    store: Arc<dyn TokenStore>,
    storage: Arc<dyn ObjectStorage>,
    path_prefix: String,
}

impl UploadService {
    pub fn new(
        store: Arc<dyn TokenStore>,
        storage: Arc<dyn ObjectStorage>,
        path_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            storage,
            path_prefix: path_prefix.into(),
        }
    }

    /// Run the whole pipeline for one request body.
    pub async fn handle_upload(
        &self,
        content_type: Option<&str>,
        body: Bytes,
    ) -> Result<UploadResponse, UploadError> {
        let content_type = content_type.ok_or(UploadError::MalformedRequest)?;
        let form = multipart::decode(&body, content_type)?;

        let token_value = form.token.ok_or(UploadError::TokenRequired)?;
        let files = form.files;
        if files.is_empty() {
            return Err(UploadError::NoFilesProvided);
        }

        let token = self
            .store
            .find_by_token(&token_value)
            .await?
            .ok_or(UploadError::InvalidLink { reason: None })?;
        if !token.is_usable(Utc::now()) {
            return Err(UploadError::InvalidLink { reason: None });
        }

        let remaining = token.remaining();
        if files.len() as i64 > remaining {
            return Err(UploadError::TooManyFiles { remaining });
        }
        validate_files(&files)?;

        // Credential problems fail the request before anything is written.
        self.storage.ensure_credentials().await?;

        let mut results = Vec::with_capacity(files.len());
        let mut staged = Vec::new();
        let mut last_stamp = None;
        for file in files {
            let stamp = next_stamp(Utc::now().timestamp_millis(), last_stamp);
            last_stamp = Some(stamp);
            let stored_name = stored_file_name(stamp, &file.filename);
            let path = storage_path(&self.path_prefix, &token.user_id, &stored_name);
            let size = file.data.len();

            match self.relay(&path, &stored_name, file.data).await {
                Ok(()) => {
                    info!(token_id = %token.id, filename = %file.filename, size, path = %path, "file relayed");
                    staged.push(UploadRecord {
                        file_name: file.filename.clone(),
                        storage_path: path,
                        uploaded_at: Utc::now(),
                    });
                    results.push(UploadResult::ok(file.filename));
                }
                Err(err) => {
                    warn!(token_id = %token.id, filename = %file.filename, size, error = %err, "file relay failed");
                    results.push(UploadResult::failed(file.filename, UPLOAD_FAILED));
                }
            }
        }

        let succeeded = staged.len() as i64;
        if succeeded > 0 {
            self.store
                .commit_upload(token.id, succeeded, &staged)
                .await?;
            info!(token_id = %token.id, succeeded, failed = results.len() as i64 - succeeded, "upload committed");
        }

        Ok(UploadResponse {
            results,
            remaining_uploads: remaining_after(&token, succeeded),
        })
    }

    /// Read-only pre-flight check used by the upload page.
    pub async fn token_status(
        &self,
        token: Option<&str>,
    ) -> Result<TokenStatusResponse, UploadError> {
        let token_value = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(UploadError::TokenRequired)?;

        let token = self
            .store
            .find_by_token(token_value)
            .await?
            .ok_or(UploadError::InvalidLink { reason: None })?;
        token
            .check_usable(Utc::now())
            .map_err(|reason| UploadError::InvalidLink {
                reason: Some(reason),
            })?;

        let client_name = self
            .store
            .find_user_by_id(&token.user_id)
            .await?
            .map(|user| user.display_name())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string());

        Ok(TokenStatusResponse {
            valid: true,
            client_name,
            remaining_uploads: token.remaining(),
            expires_at: token.expires_at,
        })
    }

    async fn relay(&self, path: &str, stored_name: &str, data: Bytes) -> StorageResult<()> {
        if data.len() <= SMALL_UPLOAD_LIMIT {
            self.storage.upload_small(path, data).await
        } else {
            self.storage.upload_large(path, data, stored_name).await
        }
    }
}

/// Reject the batch if any file has a disallowed type, then if any file is
/// oversized. The type pass covers every file before sizes are looked at.
fn validate_files(files: &[FilePart]) -> Result<(), UploadError> {
    if let Some(file) = files.iter().find(|f| !is_allowed_mime(&f.mime_type)) {
        return Err(UploadError::UnsupportedType {
            filename: file.filename.clone(),
        });
    }
    if let Some(file) = files.iter().find(|f| f.data.len() > MAX_FILE_SIZE) {
        return Err(UploadError::FileTooLarge {
            filename: file.filename.clone(),
        });
    }
    Ok(())
}

fn is_allowed_mime(declared: &str) -> bool {
    let essence = declared.split(';').next().unwrap_or("").trim();
    ALLOWED_MIME_TYPES
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(essence))
}

fn remaining_after(token: &UploadToken, succeeded: i64) -> i64 {
    let used = (token.uploads_used + succeeded).min(token.max_uploads);
    (token.max_uploads - used).max(0)
}

/// Replace path separators, drive-reserved and control characters with `_`.
///
/// Leading/trailing dots and spaces are trimmed; an empty result becomes
/// `file`.
pub fn sanitize_segment(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '#' | '%' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim_matches(|c: char| c == '.' || c == ' ');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Millisecond stamp for the next file of a batch, strictly greater than
/// `previous` so same-named files never share a path.
fn next_stamp(now_millis: i64, previous: Option<i64>) -> i64 {
    match previous {
        Some(prev) => now_millis.max(prev + 1),
        None => now_millis,
    }
}

/// `<millis>-<sanitized filename>`.
pub fn stored_file_name(millis: i64, filename: &str) -> String {
    format!("{}-{}", millis, sanitize_segment(filename))
}

pub fn storage_path(prefix: &str, user_id: &str, stored_name: &str) -> String {
    format!(
        "{}/{}/{}",
        prefix.trim_matches('/'),
        sanitize_segment(user_id),
        stored_name
    )
}
