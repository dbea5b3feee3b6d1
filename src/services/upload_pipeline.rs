//! UploadPipeline: stage an inbound video, remux it for fast start, classify
//! its frame, store it, and point the video's metadata record at it.
//!
//! Every step is a hard gate. Ownership is checked before anything touches
//! disk or the object store, and the metadata write happens last, after all
//! fallible work has succeeded. Temporary files belong to the invocation
//! that created them and are removed on every exit path; if the future is
//! dropped mid-flight (client disconnect, deadline) the drop guards remove
//! them instead.

use crate::{
    config::ObjectLocation,
    media::{self, MediaToolError, MediaToolRunner, faststart::FastStartTranscoder},
    models::video::VideoRecord,
    services::{
        auth::{AuthError, Authenticator},
        blob_store::{ObjectStore, ObjectStoreError},
        keys::{KeyDeriver, extension_for},
        metadata::{MetadataError, MetadataStore},
    },
};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::TempPath;
use thiserror::Error;
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::{info, warn};
use uuid::Uuid;

/// The only container accepted for upload.
pub const SUPPORTED_MEDIA_TYPE: &str = "video/mp4";

const STAGED_PREFIX: &str = "video-upload-";

/// One inbound upload. `body` is consumed at most once, after every
/// cheap check has passed.
pub struct UploadRequest<B> {
    pub video_id: String,
    /// Bearer token as presented by the caller.
    pub token: Option<String>,
    pub content_type: String,
    /// Declared length of the request body, if the caller sent one.
    pub content_length: Option<u64>,
    pub body: B,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid video id `{0}`")]
    InvalidIdentifier(String),
    #[error("unauthenticated: {0}")]
    Unauthenticated(#[source] AuthError),
    #[error("user {caller} does not own video {video}")]
    Forbidden { caller: Uuid, video: Uuid },
    #[error("upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: u64 },
    #[error("unsupported media type `{0}`")]
    UnsupportedMediaType(String),
    #[error("staging upload failed: {0}")]
    StorageIo(#[source] io::Error),
    #[error("fast-start remux failed: {0}")]
    Transcode(#[source] MediaToolError),
    #[error("probe failed: {0}")]
    Probe(#[source] MediaToolError),
    #[error("object store put failed: {0}")]
    ObjectStore(#[source] ObjectStoreError),
    #[error("video {0} not found")]
    RecordNotFound(Uuid),
    #[error("metadata store failed: {0}")]
    MetadataUpdate(#[source] MetadataError),
    #[error("upload deadline elapsed")]
    Timeout,
}

/// Stable discriminant of [`UploadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadErrorKind {
    InvalidIdentifier,
    Unauthenticated,
    Forbidden,
    PayloadTooLarge,
    UnsupportedMediaType,
    StorageIo,
    Transcode,
    Probe,
    ObjectStore,
    RecordNotFound,
    MetadataUpdate,
    Timeout,
}

impl UploadError {
    pub fn kind(&self) -> UploadErrorKind {
        match self {
            UploadError::InvalidIdentifier(_) => UploadErrorKind::InvalidIdentifier,
            UploadError::Unauthenticated(_) => UploadErrorKind::Unauthenticated,
            UploadError::Forbidden { .. } => UploadErrorKind::Forbidden,
            UploadError::PayloadTooLarge { .. } => UploadErrorKind::PayloadTooLarge,
            UploadError::UnsupportedMediaType(_) => UploadErrorKind::UnsupportedMediaType,
            UploadError::StorageIo(_) => UploadErrorKind::StorageIo,
            UploadError::Transcode(_) => UploadErrorKind::Transcode,
            UploadError::Probe(_) => UploadErrorKind::Probe,
            UploadError::ObjectStore(_) => UploadErrorKind::ObjectStore,
            UploadError::RecordNotFound(_) => UploadErrorKind::RecordNotFound,
            UploadError::MetadataUpdate(_) => UploadErrorKind::MetadataUpdate,
            UploadError::Timeout => UploadErrorKind::Timeout,
        }
    }
}

pub type UploadResult<T> = Result<T, UploadError>;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Where staged and remuxed files live while an upload is in flight.
    pub temp_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub location: ObjectLocation,
}

/// Temporary files owned by a single invocation.
#[derive(Default)]
struct Scratch {
    staged: Option<TempPath>,
    transcoded: Option<TempPath>,
}

impl Scratch {
    /// Best-effort removal; failures are logged and swallowed.
    fn cleanup(&mut self) {
        for temp in [self.transcoded.take(), self.staged.take()]
            .into_iter()
            .flatten()
        {
            let path = temp.to_path_buf();
            match temp.close() {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove temporary upload file")
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct UploadPipeline {
    authenticator: Arc<dyn Authenticator>,
    metadata: Arc<dyn MetadataStore>,
    objects: Arc<dyn ObjectStore>,
    media: Arc<dyn MediaToolRunner>,
    transcoder: FastStartTranscoder,
    keys: KeyDeriver,
    config: PipelineConfig,
}

impl UploadPipeline {
    pub fn new(
        config: PipelineConfig,
        authenticator: Arc<dyn Authenticator>,
        metadata: Arc<dyn MetadataStore>,
        objects: Arc<dyn ObjectStore>,
        media: Arc<dyn MediaToolRunner>,
    ) -> Self {
        Self {
            authenticator,
            metadata,
            objects,
            transcoder: FastStartTranscoder::new(media.clone()),
            media,
            keys: KeyDeriver::new(extension_for(SUPPORTED_MEDIA_TYPE)),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one upload to completion and return the updated record.
    pub async fn process<B>(&self, request: UploadRequest<B>) -> UploadResult<VideoRecord>
    where
        B: Stream<Item = io::Result<Bytes>> + Send,
    {
        let (video_id, caller) = self
            .admit(&request.video_id, request.token.as_deref())
            .await?;

        info!(%video_id, caller_id = %caller, "uploading video file");

        if let Some(declared) = request.content_length {
            if declared > self.config.max_upload_bytes {
                return Err(UploadError::PayloadTooLarge {
                    limit: self.config.max_upload_bytes,
                });
            }
        }

        let media_type = media_type_essence(&request.content_type);
        if media_type != SUPPORTED_MEDIA_TYPE {
            return Err(UploadError::UnsupportedMediaType(request.content_type));
        }

        let video = self.authorize(video_id, caller).await?;

        let mut scratch = Scratch::default();
        let result = self
            .store_and_record(&mut scratch, request.body, video, &media_type)
            .await;
        scratch.cleanup();
        result
    }

    /// Parse the video id and authenticate the caller.
    ///
    /// `process` runs this itself; the HTTP layer also calls it before
    /// reading the request body.
    pub async fn admit(&self, video_id: &str, token: Option<&str>) -> UploadResult<(Uuid, Uuid)> {
        let id = Uuid::parse_str(video_id.trim())
            .map_err(|_| UploadError::InvalidIdentifier(video_id.to_string()))?;
        let token = token.ok_or(UploadError::Unauthenticated(AuthError::MissingToken))?;
        let caller = self
            .authenticator
            .validate(token)
            .await
            .map_err(UploadError::Unauthenticated)?;
        Ok((id, caller))
    }

    /// Fetch the record and require the caller to own it.
    async fn authorize(&self, video_id: Uuid, caller: Uuid) -> UploadResult<VideoRecord> {
        let video = self.metadata.get(video_id).await.map_err(|err| match err {
            MetadataError::NotFound(id) => UploadError::RecordNotFound(id),
            other => UploadError::MetadataUpdate(other),
        })?;
        if video.owner_id != caller {
            return Err(UploadError::Forbidden {
                caller,
                video: video_id,
            });
        }
        Ok(video)
    }

    async fn store_and_record<B>(
        &self,
        scratch: &mut Scratch,
        body: B,
        mut video: VideoRecord,
        media_type: &str,
    ) -> UploadResult<VideoRecord>
    where
        B: Stream<Item = io::Result<Bytes>> + Send,
    {
        let (file, path) = tempfile::Builder::new()
            .prefix(STAGED_PREFIX)
            .suffix(&extension_for(media_type))
            .tempfile_in(&self.config.temp_dir)
            .map_err(UploadError::StorageIo)?
            .into_parts();
        let staged: &Path = scratch.staged.insert(path);
        let size_bytes = self.copy_body(File::from_std(file), body).await?;

        let transcoded: &Path = scratch.transcoded.insert(
            self.transcoder
                .remux(staged)
                .await
                .map_err(UploadError::Transcode)?,
        );

        let (aspect, ratio) = media::classify_file(&*self.media, transcoded)
            .await
            .map_err(UploadError::Probe)?;

        let key = self.keys.derive(aspect);
        self.objects
            .put(key.as_str(), media_type, transcoded)
            .await
            .map_err(UploadError::ObjectStore)?;

        video.video_url = Some(self.config.location.url_for(key.as_str()));
        video.updated_at = Utc::now();
        self.metadata.update(&video).await.map_err(|err| match err {
            MetadataError::NotFound(id) => UploadError::RecordNotFound(id),
            other => UploadError::MetadataUpdate(other),
        })?;

        info!(
            video_id = %video.id,
            key = %key,
            %aspect,
            %ratio,
            size_bytes,
            "video upload stored"
        );
        Ok(video)
    }

    /// Copy the body into `file`, failing as soon as the cap is exceeded.
    async fn copy_body<B>(&self, mut file: File, body: B) -> UploadResult<u64>
    where
        B: Stream<Item = io::Result<Bytes>> + Send,
    {
        let limit = self.config.max_upload_bytes;
        let mut written: u64 = 0;
        pin_mut!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(UploadError::StorageIo)?;
            written += chunk.len() as u64;
            if written > limit {
                return Err(UploadError::PayloadTooLarge { limit });
            }
            file.write_all(&chunk)
                .await
                .map_err(UploadError::StorageIo)?;
        }
        file.flush().await.map_err(UploadError::StorageIo)?;
        Ok(written)
    }
}

/// `type/subtype` of a Content-Type value, lowercased, parameters dropped.
pub fn media_type_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
