//! Defines routes for the upload relay.
//!
//! ## Structure
//! - **Upload link**
//!   - `POST /api/upload`        — multipart upload (token + files)
//!   - `GET  /api/upload/status` — token status, `?token=...`
//!   - `POST /api/upload/status` — token status, JSON `{"token": ...}`
//!
//! - **Probes**
//!   - `GET /healthz`
//!   - `GET /readyz`

use crate::handlers::{
    AppState,
    health_handlers::{healthz, readyz},
    upload_handlers::{token_status, token_status_body, upload_files},
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router. Uploads are buffered in full, so the body limit is
/// raised to `max_body_bytes` on the upload route only.
pub fn routes(max_body_bytes: usize) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/api/upload",
            post(upload_files).layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        .route(
            "/api/upload/status",
            get(token_status).post(token_status_body),
        )
}
