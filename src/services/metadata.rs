//! Video metadata persistence.

use crate::models::video::VideoRecord;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("video `{0}` not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type MetadataResult<T> = Result<T, MetadataError>;

/// Get/update access to video records. Writes are last-writer-wins.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, id: Uuid) -> MetadataResult<VideoRecord>;

    /// Persist the upload-owned columns of `video`: `video_url` and
    /// `updated_at`. Other columns are left as they are in the store.
    async fn update(&self, video: &VideoRecord) -> MetadataResult<()>;
}

/// SQLite-backed [`MetadataStore`].
#[derive(Clone)]
pub struct SqliteMetadataStore {
    pub db: Arc<SqlitePool>,
}

impl SqliteMetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Insert a new record.
    pub async fn create(&self, video: &VideoRecord) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO videos (id, owner_id, title, description, thumbnail_url,
                                 video_url, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(video.id)
        .bind(video.owner_id)
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.thumbnail_url)
        .bind(&video.video_url)
        .bind(video.created_at)
        .bind(video.updated_at)
        .execute(&*self.db)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn get(&self, id: Uuid) -> MetadataResult<VideoRecord> {
        sqlx::query_as::<_, VideoRecord>(
            "SELECT id, owner_id, title, description, thumbnail_url, video_url,
                    created_at, updated_at
             FROM videos WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => MetadataError::NotFound(id),
            other => MetadataError::Sqlx(other),
        })
    }

    async fn update(&self, video: &VideoRecord) -> MetadataResult<()> {
        let result = sqlx::query("UPDATE videos SET video_url = ?, updated_at = ? WHERE id = ?")
            .bind(&video.video_url)
            .bind(video.updated_at)
            .bind(video.id)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(video.id));
        }
        Ok(())
    }
}

/// Apply the embedded schema. Statements are idempotent.
pub async fn run_migrations(db: &SqlitePool) -> Result<usize, sqlx::Error> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    for stmt in &statements {
        debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(statements.len())
}
