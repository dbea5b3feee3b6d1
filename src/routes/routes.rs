//! Defines routes for the video ingest service.
//!
//! ## Structure
//! - **Videos**
//!   - `POST /api/videos`                     : create a draft video record
//!   - `GET  /api/videos/{video_id}`          : fetch a video record
//!   - `POST /api/video_upload/{video_id}`    : upload, remux and store the video
//!
//! - **Objects** (local storage backend only)
//!   - `GET  /objects/{*key}`                 : stream a stored object
//!   - `HEAD /objects/{*key}`                 : object headers only
//!
//! The wildcard `*key` allows nested keys like `landscape/abc.mp4`.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::{get_object, head_object},
        video_handlers::{MULTIPART_OVERHEAD_BYTES, create_video, get_video, upload_video},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build and return the router for all routes.
///
/// Only the upload route accepts bodies up to `max_upload_bytes`; everything
/// else keeps axum's default limit.
pub fn routes(max_upload_bytes: u64) -> Router<AppState> {
    let upload_limit = usize::try_from(max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES))
        .unwrap_or(usize::MAX);

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/videos", post(create_video))
        .route("/api/videos/{video_id}", get(get_video))
        .route(
            "/api/video_upload/{video_id}",
            post(upload_video).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/objects/{*key}", get(get_object).head(head_object))
}
