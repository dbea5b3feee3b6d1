use crate::services::{
    blob_store::ObjectStoreError, metadata::MetadataError, upload_pipeline::UploadError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use tracing::{error, warn};

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 401 Unauthorized
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

/// Each pipeline failure gets its own status and a message that does not
/// leak paths, subprocess output or backend detail. The full error is logged.
impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        let (status, message) = match &err {
            UploadError::InvalidIdentifier(_) => (StatusCode::BAD_REQUEST, "Invalid video ID"),
            UploadError::Unauthenticated(_) => {
                (StatusCode::UNAUTHORIZED, "Couldn't validate credentials")
            }
            UploadError::Forbidden { .. } => {
                (StatusCode::FORBIDDEN, "You do not own this video")
            }
            UploadError::PayloadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "Upload exceeds the size limit")
            }
            UploadError::UnsupportedMediaType(_) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "File format not supported, must be video/mp4",
            ),
            UploadError::StorageIo(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Error staging video upload")
            }
            UploadError::Transcode(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Video could not be processed for streaming",
            ),
            UploadError::Probe(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Video stream could not be read",
            ),
            UploadError::ObjectStore(_) => (StatusCode::BAD_GATEWAY, "Error saving video"),
            UploadError::RecordNotFound(_) => (StatusCode::NOT_FOUND, "Video not found"),
            UploadError::MetadataUpdate(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error updating video metadata",
            ),
            UploadError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "Upload timed out"),
        };

        if status.is_server_error() {
            error!(kind = ?err.kind(), error = %err, "video upload failed");
        } else {
            warn!(kind = ?err.kind(), error = %err, "video upload rejected");
        }
        AppError::new(status, message)
    }
}

impl From<MetadataError> for AppError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(_) => AppError::not_found("Video not found"),
            other => {
                error!(error = %other, "metadata store error");
                AppError::internal("Internal server error")
            }
        }
    }
}

impl From<ObjectStoreError> for AppError {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::NotFound(_) | ObjectStoreError::InvalidKey(_) => {
                AppError::not_found("Object not found")
            }
            other => {
                error!(error = %other, "object store error");
                AppError::internal("Internal server error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaToolError;
    use crate::services::auth::AuthError;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn every_kind() -> Vec<UploadError> {
        vec![
            UploadError::InvalidIdentifier("x".into()),
            UploadError::Unauthenticated(AuthError::MissingToken),
            UploadError::Forbidden {
                caller: Uuid::nil(),
                video: Uuid::nil(),
            },
            UploadError::PayloadTooLarge { limit: 1 },
            UploadError::UnsupportedMediaType("video/webm".into()),
            UploadError::StorageIo(std::io::Error::other("disk full")),
            UploadError::Transcode(MediaToolError::NoStreams),
            UploadError::Probe(MediaToolError::NoStreams),
            UploadError::ObjectStore(ObjectStoreError::Backend("boom".into())),
            UploadError::RecordNotFound(Uuid::nil()),
            UploadError::MetadataUpdate(MetadataError::NotFound(Uuid::nil())),
            UploadError::Timeout,
        ]
    }

    #[test]
    fn every_upload_error_has_a_distinct_signal() {
        let signals: HashSet<(u16, String)> = every_kind()
            .into_iter()
            .map(AppError::from)
            .map(|e| (e.status.as_u16(), e.message))
            .collect();
        assert_eq!(signals.len(), 12);
    }

    #[test]
    fn messages_do_not_leak_detail() {
        let err = UploadError::Transcode(MediaToolError::Failed {
            tool: "/usr/bin/ffmpeg".into(),
            status: "exit status: 1".into(),
            stderr: "/tmp/video-upload-123.mp4: moov atom not found".into(),
        });
        let app = AppError::from(err);
        assert_eq!(app.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!app.message.contains("/tmp"));
        assert!(!app.message.contains("ffmpeg"));
    }

    #[test]
    fn status_mapping() {
        let statuses: Vec<u16> = every_kind()
            .into_iter()
            .map(|e| AppError::from(e).status.as_u16())
            .collect();
        assert_eq!(
            statuses,
            vec![400, 401, 403, 413, 415, 500, 422, 422, 502, 404, 500, 504]
        );
    }
}
