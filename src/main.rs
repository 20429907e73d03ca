use anyhow::Result;
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{
    alarm_store::AlarmStore,
    blob_store::{BlobStore, DiskBlobStore},
    catalog::ObjectCatalog,
    pipeline::{RetryPolicy, ScanPipeline},
    removal::{BackgroundRemover, RemovalApi},
};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting wakescan with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    // Extract the local file path SQLx will use
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    let db_path_obj = Path::new(db_path);

    // Create parent directory if needed
    if let Some(parent) = db_path_obj.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    // Try opening manually before SQLx
    match fs::OpenOptions::new().create(true).write(true).open(db_path) {
        Ok(_) => tracing::debug!("Database file can be created/opened successfully."),
        Err(e) => tracing::warn!("Failed to open database file manually: {}", e),
    }

    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?,
    );

    // --- Handle migration mode ---
    if migrate {
        run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize stores ---
    let disk = Arc::new(DiskBlobStore::new(
        db.clone(),
        cfg.storage_dir.clone(),
        cfg.public_base_url.clone(),
    ));
    let blobs: Arc<dyn BlobStore> = disk.clone();
    let catalog = ObjectCatalog::new(db.clone(), blobs.clone());
    let alarms = AlarmStore::new(db.clone(), blobs.clone());

    let remover: Option<Arc<dyn BackgroundRemover>> = cfg
        .removal()
        .map(|(endpoint, key)| Arc::new(RemovalApi::new(endpoint, key)) as Arc<dyn BackgroundRemover>);
    if remover.is_none() {
        tracing::warn!("Background removal disabled: no endpoint/API key configured");
    }

    let pipeline = Arc::new(ScanPipeline::new(
        blobs,
        catalog.clone(),
        remover,
        RetryPolicy {
            max_attempts: cfg.upload_max_attempts,
            base_delay: Duration::from_secs(cfg.upload_base_delay_secs),
        },
        Duration::from_secs(cfg.settle_delay_secs),
    ));

    let app_state = AppState {
        db,
        disk,
        pipeline,
        catalog,
        alarms,
    };

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(app_state);

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

/// Run SQLite migrations manually from the embedded SQL file.
async fn run_migrations(db: &Arc<sqlx::Pool<sqlx::Sqlite>>) -> Result<()> {
    let path = "migrations/0001_init.sql";

    if !Path::new(path).exists() {
        anyhow::bail!("Migration file not found: {}", path);
    }

    let sql = fs::read_to_string(path)?;
    let statements = sql
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(&**db).await?;
    }

    Ok(())
}
