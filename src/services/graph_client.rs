//! OneDrive storage over the Microsoft Graph REST API.
//!
//! All items are written under a single drive owner:
//! `{graph}/users/{owner}/drive/root:/{path}:/{action}`.

use super::{
    access_token::AccessTokenCache,
    object_storage::{
        ObjectStorage, StorageError, StorageResult, chunk_ranges, content_range,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    Response, Url,
    header::{CONTENT_RANGE, CONTENT_TYPE},
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSession {
    upload_url: String,
}

pub struct GraphStorageClient {
    http: reqwest::Client,
    graph_base: Url,
    drive_owner: String,
    tokens: AccessTokenCache,
}

impl GraphStorageClient {
    pub fn new(
        http: reqwest::Client,
        graph_base_url: &str,
        drive_owner: impl Into<String>,
        tokens: AccessTokenCache,
    ) -> StorageResult<Self> {
        let graph_base = Url::parse(graph_base_url)
            .map_err(|e| StorageError::InvalidUrl(format!("{}: {}", graph_base_url, e)))?;
        if graph_base.cannot_be_a_base() {
            return Err(StorageError::InvalidUrl(graph_base_url.to_string()));
        }
        Ok(Self {
            http,
            graph_base,
            drive_owner: drive_owner.into(),
            tokens,
        })
    }

    /// Build the drive-item URL for `path` followed by `action`.
    ///
    /// Segments are percent-encoded individually; the `root:` / trailing `:`
    /// markers that delimit a path-addressed item stay literal.
    fn item_url(&self, path: &str, action: &str) -> StorageResult<Url> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((last, dirs)) = parts.split_last() else {
            return Err(StorageError::InvalidUrl(format!("empty item path `{}`", path)));
        };

        let mut url = self.graph_base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StorageError::InvalidUrl(self.graph_base.to_string()))?;
            segments
                .pop_if_empty()
                .extend(["users", self.drive_owner.as_str(), "drive", "root:"])
                .extend(dirs.iter().copied())
                .push(&format!("{}:", last))
                .push(action);
        }
        Ok(url)
    }

    async fn create_session(&self, path: &str, filename: &str) -> StorageResult<String> {
        let url = self.item_url(path, "createUploadSession")?;
        let token = self.tokens.get_access_token().await?;
        let body = json!({
            "item": {
                "@microsoft.graph.conflictBehavior": "rename",
                "name": filename,
            }
        });

        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(filename, e))?;
        let resp = ensure_success(resp, filename).await?;

        let session: UploadSession = resp
            .json()
            .await
            .map_err(|e| StorageError::upload_failed(filename, e))?;
        Ok(session.upload_url)
    }
}

#[async_trait]
impl ObjectStorage for GraphStorageClient {
    async fn ensure_credentials(&self) -> StorageResult<()> {
        self.tokens.get_access_token().await.map(|_| ())
    }

    async fn upload_small(&self, path: &str, data: Bytes) -> StorageResult<()> {
        let filename = path.rsplit('/').next().unwrap_or(path);
        let url = self.item_url(path, "content")?;
        let token = self.tokens.get_access_token().await?;
        debug!(path, size = data.len(), "direct upload");

        let resp = self
            .http
            .put(url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(filename, e))?;
        ensure_success(resp, filename).await?;
        Ok(())
    }

    async fn upload_large(&self, path: &str, data: Bytes, filename: &str) -> StorageResult<()> {
        let upload_url = self.create_session(path, filename).await?;
        let total = data.len();
        debug!(path, size = total, "session upload started");

        // The session URL is pre-authorized; chunk PUTs carry no bearer token.
        for (start, end) in chunk_ranges(total) {
            let chunk = data.slice(start..=end);
            let resp = self
                .http
                .put(&upload_url)
                .header(CONTENT_RANGE, content_range(start, end, total))
                .body(chunk)
                .send()
                .await
                .map_err(|e| StorageError::upload_failed(filename, e))?;
            ensure_success(resp, filename).await?;
            debug!(path, start, end, total, "chunk accepted");
        }

        Ok(())
    }
}

async fn ensure_success(resp: Response, filename: &str) -> StorageResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(StorageError::upload_failed(
        filename,
        format!("remote returned {}: {}", status, body),
    ))
}
