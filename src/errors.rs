use crate::{
    models::upload_token::InvalidReason,
    multipart::MultipartError,
    services::{object_storage::StorageError, token_store::StoreError},
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Request-level failures of the upload and status endpoints.
///
/// The `Display` text is what the client sees; `Internal` carries a detail
/// string that is only ever logged.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Malformed multipart request")]
    MalformedRequest,

    #[error("Upload token is required")]
    TokenRequired,

    #[error("No files provided")]
    NoFilesProvided,

    /// Unknown, revoked, expired, or exhausted token. `reason` is only
    /// disclosed by the status endpoint.
    #[error("Invalid or expired upload link")]
    InvalidLink { reason: Option<InvalidReason> },

    #[error("Too many files. You can upload {remaining} more file(s).")]
    TooManyFiles { remaining: i64 },

    #[error("File type not allowed: {filename}")]
    UnsupportedType { filename: String },

    #[error("File too large (max 50MB): {filename}")]
    FileTooLarge { filename: String },

    #[error("Internal server error")]
    Internal(String),
}

impl UploadError {
    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::InvalidLink { .. } => StatusCode::GONE,
            UploadError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            UploadError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                json!({ "error": self.to_string() })
            }
            UploadError::InvalidLink {
                reason: Some(reason),
            } => json!({ "error": self.to_string(), "reason": reason }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<MultipartError> for UploadError {
    fn from(_: MultipartError) -> Self {
        UploadError::MalformedRequest
    }
}

impl From<StoreError> for UploadError {
    fn from(err: StoreError) -> Self {
        UploadError::Internal(err.to_string())
    }
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        UploadError::Internal(err.to_string())
    }
}
