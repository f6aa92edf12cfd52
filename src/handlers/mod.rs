//! HTTP handlers and the state they share.

pub mod health_handlers;
pub mod upload_handlers;

use crate::services::upload_service::UploadService;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Router state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub uploads: UploadService,
    /// Pool used by the readiness probe.
    pub db: Arc<SqlitePool>,
}
