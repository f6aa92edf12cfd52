//! Data models for the upload relay.
//!
//! `upload_token` holds the persisted entities and maps to SQLite rows via
//! `sqlx::FromRow`; `upload` holds the request-scoped values and JSON bodies.

pub mod upload;
pub mod upload_token;
