//! Request-scoped upload values and the JSON bodies built from them.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A file recovered from a multipart body. Filename and MIME type are
/// client-supplied and untrusted.
#[derive(Clone, Debug, PartialEq)]
pub struct FilePart {
    pub filename: String,
    pub mime_type: String,
    pub data: Bytes,
}

/// Outcome for one submitted file.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct UploadResult {
    pub filename: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResult {
    pub fn ok(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(filename: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Body of a processed upload request.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub results: Vec<UploadResult>,
    pub remaining_uploads: i64,
}

/// Body of a successful status check.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatusResponse {
    pub valid: bool,
    pub client_name: String,
    pub remaining_uploads: i64,
    pub expires_at: DateTime<Utc>,
}
