use anyhow::{Context, Result};
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod media;
mod models;
mod routes;
mod services;
mod state;

use config::StorageConfig;
use media::ffmpeg::FfmpegRunner;
use services::{
    auth::JwtAuthenticator,
    blob_store::{LocalObjectStore, ObjectStore, S3ObjectStore},
    metadata::{self, SqliteMetadataStore},
    upload_pipeline::{PipelineConfig, UploadPipeline},
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

    tracing::info!(
        addr = %cfg.addr(),
        database_url = %cfg.database_url,
        temp_dir = %cfg.temp_dir.display(),
        max_upload_bytes = cfg.max_upload_bytes,
        storage = ?cfg.storage,
        "Starting video-ingest"
    );

    // --- Ensure working directories exist ---
    ensure_dir(&cfg.temp_dir)?;
    if let StorageConfig::Local { storage_dir, .. } = &cfg.storage {
        ensure_dir(storage_dir)?;
    }

    // --- Initialize SQLite connection ---
    let db_path = cfg
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    // SQLx will not create the file itself.
    if let Err(e) = fs::OpenOptions::new().create(true).append(true).open(db_path) {
        tracing::warn!("Failed to open database file manually: {}", e);
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&cfg.database_url)
            .await
            .with_context(|| format!("connecting to {}", cfg.database_url))?,
    );

    // --- Handle migration mode ---
    if migrate {
        let applied = metadata::run_migrations(&db).await?;
        tracing::info!("Database migration complete ({} statements).", applied);
        return Ok(()); // exit after migration
    }

    // --- Initialize collaborators ---
    let metadata_store = SqliteMetadataStore::new(db.clone());
    let authenticator = Arc::new(JwtAuthenticator::new(&cfg.jwt_secret));
    let media = Arc::new(FfmpegRunner::new(&cfg.ffmpeg_path, &cfg.ffprobe_path));

    let (objects, local_objects): (Arc<dyn ObjectStore>, Option<LocalObjectStore>) =
        match &cfg.storage {
            StorageConfig::Local { storage_dir, .. } => {
                let store = LocalObjectStore::new(storage_dir);
                (Arc::new(store.clone()), Some(store))
            }
            StorageConfig::S3 {
                bucket,
                region,
                endpoint,
                ..
            } => (
                Arc::new(S3ObjectStore::new(bucket, region, endpoint.as_deref())?),
                None,
            ),
        };

    let pipeline = UploadPipeline::new(
        PipelineConfig {
            temp_dir: cfg.temp_dir.clone(),
            max_upload_bytes: cfg.max_upload_bytes,
            location: cfg.storage.location().clone(),
        },
        authenticator.clone(),
        Arc::new(metadata_store.clone()),
        objects,
        media,
    );

    let state = AppState {
        pipeline: Arc::new(pipeline),
        metadata: metadata_store,
        authenticator,
        local_objects,
        upload_timeout: Duration::from_secs(cfg.upload_timeout_secs),
    };

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes).with_state(state);

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

fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path).with_context(|| format!("creating {}", path.display()))?;
        tracing::info!("Created directory at {}", path.display());
    }
    Ok(())
}
