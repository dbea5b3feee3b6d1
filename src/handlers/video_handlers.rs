//! HTTP handlers for video records and video uploads.
//!
//! These only translate HTTP into pipeline calls; every rule about what an
//! upload may do lives in `UploadPipeline`.

use crate::{
    errors::AppError,
    models::video::{NewVideo, VideoRecord},
    services::{
        auth::bearer_token,
        metadata::MetadataStore,
        upload_pipeline::{UploadError, UploadRequest},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use futures::TryStreamExt;
use std::io;
use uuid::Uuid;

/// Multipart form field carrying the video bytes.
pub const VIDEO_FIELD: &str = "video";

/// Headroom for multipart boundaries and part headers on top of the file cap.
pub const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

fn token_from(headers: &HeaderMap) -> Option<String> {
    bearer_token(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
    )
    .map(str::to_string)
}

fn parse_video_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::bad_request("Invalid video ID"))
}

/// `POST /api/video_upload/{video_id}`: multipart upload, file in `video`.
pub async fn upload_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<VideoRecord>, AppError> {
    let token = token_from(&headers);
    state
        .pipeline
        .admit(&video_id, token.as_deref())
        .await?;
    let content_length = declared_file_length(&headers);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::bad_request("Couldn't parse multipart body"))?
    {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        let body = field.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
        let request = UploadRequest {
            video_id,
            token,
            content_type,
            content_length,
            body,
        };

        let video = match tokio::time::timeout(
            state.upload_timeout,
            state.pipeline.process(request),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(UploadError::Timeout.into()),
        };
        return Ok(Json(video));
    }

    Err(AppError::bad_request(format!(
        "Missing `{}` form field",
        VIDEO_FIELD
    )))
}

/// Upper bound on the file part implied by the request `Content-Length`.
///
/// The body limit on the upload route admits the cap plus
/// [`MULTIPART_OVERHEAD_BYTES`], so the same allowance is taken off here
/// before the pipeline compares against the cap.
fn declared_file_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|len| len.saturating_sub(MULTIPART_OVERHEAD_BYTES))
}

/// `POST /api/videos`: create a draft record owned by the caller.
pub async fn create_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewVideo>,
) -> Result<impl IntoResponse, AppError> {
    let token = token_from(&headers).ok_or_else(|| AppError::unauthorized("Couldn't find JWT"))?;
    let owner = state
        .authenticator
        .validate(&token)
        .await
        .map_err(|_| AppError::unauthorized("Couldn't validate JWT"))?;

    if payload.title.trim().is_empty() {
        return Err(AppError::bad_request("Title must not be empty"));
    }

    let video = VideoRecord::draft(owner, payload);
    state.metadata.create(&video).await?;
    tracing::info!(video_id = %video.id, owner_id = %owner, "created video record");

    Ok((StatusCode::CREATED, Json(video)))
}

/// `GET /api/videos/{video_id}`
pub async fn get_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Json<VideoRecord>, AppError> {
    let id = parse_video_id(&video_id)?;
    Ok(Json(state.metadata.get(id).await?))
}
