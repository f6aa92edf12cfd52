//! Remote object storage seam.
//!
//! The orchestrator talks to storage only through [`ObjectStorage`], so the
//! Graph client can be swapped for a fake in tests.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Payloads up to and including this size go through a single PUT.
pub const SMALL_UPLOAD_LIMIT: usize = 4 * 1024 * 1024;

/// Size of each ranged PUT in a session upload.
pub const CHUNK_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("credential exchange failed: {0}")]
    Credentials(String),
    #[error("invalid storage url: {0}")]
    InvalidUrl(String),
    #[error("upload of `{filename}` failed: {reason}")]
    UploadFailed { filename: String, reason: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn upload_failed(filename: &str, reason: impl ToString) -> Self {
        Self::UploadFailed {
            filename: filename.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Make sure calls can be authorized before any file is sent.
    async fn ensure_credentials(&self) -> StorageResult<()>;

    /// Direct PUT of the whole payload to `path`.
    async fn upload_small(&self, path: &str, data: Bytes) -> StorageResult<()>;

    /// Session upload: create a session for `path`, then PUT [`CHUNK_SIZE`]
    /// chunks in order, each finishing before the next starts.
    async fn upload_large(&self, path: &str, data: Bytes, filename: &str) -> StorageResult<()>;
}

/// Inclusive byte ranges covering `total` bytes in [`CHUNK_SIZE`] steps.
pub fn chunk_ranges(total: usize) -> Vec<(usize, usize)> {
    let mut ranges = Vec::with_capacity(total.div_ceil(CHUNK_SIZE));
    let mut start = 0;
    while start < total {
        let end = (start + CHUNK_SIZE).min(total);
        ranges.push((start, end - 1));
        start = end;
    }
    ranges
}

/// `Content-Range` value for an inclusive range.
pub fn content_range(start: usize, end: usize, total: usize) -> String {
    format!("bytes {}-{}/{}", start, end, total)
}
