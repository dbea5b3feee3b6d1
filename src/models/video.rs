//! The video metadata record an upload is attached to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata for a single video.
///
/// The upload pipeline reads `owner_id` to authorize the caller and writes
/// `video_url` once the blob is durably stored. Everything else is owned by
/// whoever created the record.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct VideoRecord {
    pub id: Uuid,

    /// User that created the record; only they may attach media to it.
    pub owner_id: Uuid,

    pub title: String,

    pub description: String,

    /// Public location of the thumbnail, if one was ever set.
    pub thumbnail_url: Option<String>,

    /// Public location of the processed video, if one was uploaded.
    pub video_url: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Fields a caller supplies when creating a draft record.
#[derive(Deserialize, Debug, Clone)]
pub struct NewVideo {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl VideoRecord {
    pub fn draft(owner_id: Uuid, new: NewVideo) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            title: new.title,
            description: new.description,
            thumbnail_url: None,
            video_url: None,
            created_at: now,
            updated_at: now,
        }
    }
}
