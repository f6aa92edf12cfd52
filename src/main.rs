use anyhow::{Context, Result};
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod multipart;
mod routes;
mod services;

use config::{AppConfig, Command};
use handlers::AppState;
use services::{
    access_token::{AccessTokenCache, ClientCredentials},
    graph_client::GraphStorageClient,
    token_store::{SqliteTokenStore, apply_migrations},
    upload_service::UploadService,
};

const MIGRATION_PATH: &str = "migrations/0001_init.sql";

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting upload-relay with config: {:?}", cfg);
    if let Some(name) = &cfg.database_name {
        tracing::info!(database_name = %name, "database name is implied by the SQLite file");
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let connect_options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("parsing database url `{}`", db_url))?
        .create_if_missing(true);

    // Create parent directory if needed
    if let Some(parent) = connect_options.get_filename().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?,
    );
    let store = SqliteTokenStore::new(db.clone());

    match command {
        Command::Migrate => {
            run_migrations(&store).await?;
            tracing::info!("Database migration complete.");
            return Ok(()); // exit after migration
        }
        Command::IssueToken {
            user_id,
            max_uploads,
            valid_days,
        } => {
            let token = store
                .issue_token(&user_id, max_uploads, chrono::Duration::days(valid_days))
                .await?;
            tracing::info!(token_id = %token.id, user_id = %user_id, max_uploads, "issued upload token");
            println!("{}", token.token);
            return Ok(());
        }
        Command::Serve => {}
    }

    // --- Initialize core services ---
    let drive = cfg.drive_settings()?;
    let http = reqwest::Client::new();
    let tokens = AccessTokenCache::new(
        http.clone(),
        &cfg.login_base_url,
        ClientCredentials {
            tenant_id: drive.tenant_id,
            client_id: drive.client_id,
            client_secret: drive.client_secret,
        },
    );
    let storage = GraphStorageClient::new(http, &cfg.graph_base_url, drive.drive_owner, tokens)?;
    let uploads = UploadService::new(Arc::new(store), Arc::new(storage), cfg.path_prefix.clone());

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_body_bytes).with_state(AppState { uploads, db });

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run SQLite migrations manually from the migration file.
async fn run_migrations(store: &SqliteTokenStore) -> Result<()> {
    if !Path::new(MIGRATION_PATH).exists() {
        anyhow::bail!("Migration file not found: {}", MIGRATION_PATH);
    }

    let sql = fs::read_to_string(MIGRATION_PATH)?;
    let applied = apply_migrations(&store.db, &sql).await?;
    tracing::info!("Ran {} migration statements", applied);

    Ok(())
}
