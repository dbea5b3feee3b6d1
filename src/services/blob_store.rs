//! Durable object storage for processed videos.
//!
//! Two backends implement [`ObjectStore`]:
//! - [`LocalObjectStore`] writes blobs to disk sharded beneath
//!   `base_path/{shard}/{shard}/{key}`, fsyncing and atomically renaming
//!   each payload into place.
//! - [`S3ObjectStore`] puts blobs into an S3 (or S3-compatible) bucket.
//!
//! Public locations are not part of this contract; they are derived from
//! [`crate::config::ObjectLocation`].

use ::object_store::{
    Attribute, Attributes, DynObjectStore, aws::AmazonS3Builder, buffered::BufWriter,
    path::Path as ObjectPath,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Multipart part size. S3 requires at least 5 MiB for every part but the last.
pub const S3_PART_SIZE: usize = 5 * 1024 * 1024;

const READ_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("backend configuration error: {0}")]
    Config(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

/// Durable blob storage addressed by key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store the contents of the local file at `source` under `key`.
    async fn put(&self, key: &str, content_type: &str, source: &Path) -> ObjectStoreResult<()>;
}

/// Reject keys that could escape the store root.
fn ensure_key_safe(key: &str) -> ObjectStoreResult<()> {
    let invalid = key.is_empty()
        || key.len() > MAX_OBJECT_KEY_LEN
        || key.starts_with('/')
        || key.contains("..")
        || key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
    if invalid {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Local-disk object store.
#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    pub base_path: PathBuf,
}

impl LocalObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Two-level shard directories from MD5(key), as lowercase hex (00–ff).
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// `base_path/{shard}/{shard}/{key}`. Parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Stream bytes into `key`, replacing any existing payload.
    ///
    /// Writes to a temporary sibling first, fsyncs it, then renames it into
    /// place. The temporary file is removed on every error path.
    pub async fn write_stream<S>(&self, key: &str, stream: S) -> ObjectStoreResult<u64>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            ObjectStoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        match write_synced(&tmp_path, stream).await {
            Ok(size) => {
                if let Err(err) = fs::rename(&tmp_path, &file_path).await {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(ObjectStoreError::Io(err));
                }
                Ok(size)
            }
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                Err(ObjectStoreError::Io(err))
            }
        }
    }

    /// Open a stored object for reading.
    pub async fn open(&self, key: &str) -> ObjectStoreResult<(File, u64)> {
        ensure_key_safe(key)?;
        let path = self.object_path(key);
        let file = File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                ObjectStoreError::NotFound(key.to_string())
            } else {
                ObjectStoreError::Io(err)
            }
        })?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }
}

async fn write_synced<S>(path: &Path, stream: S) -> io::Result<u64>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut file = File::create(path).await?;
    let mut size_bytes: u64 = 0;
    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        size_bytes += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(size_bytes)
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, content_type: &str, source: &Path) -> ObjectStoreResult<()> {
        let start = Instant::now();
        let file = File::open(source).await?;
        let size_bytes = self.write_stream(key, ReaderStream::new(file)).await?;
        info!(
            key = %key,
            content_type = %content_type,
            size_bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local object store put successful"
        );
        Ok(())
    }
}

/// S3 / S3-compatible object store.
///
/// Payloads are streamed from disk in chunks. Anything larger than one part
/// goes up as a multipart upload, so memory use per put stays near
/// [`S3_PART_SIZE`] regardless of file size.
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    store: Arc<DynObjectStore>,
    bucket: String,
}

impl S3ObjectStore {
    /// Credentials come from the standard AWS environment variables.
    /// `endpoint` targets S3-compatible providers such as MinIO.
    pub fn new(bucket: &str, region: &str, endpoint: Option<&str>) -> ObjectStoreResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket);

        if let Some(endpoint) = endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder
            .build()
            .map_err(|e| ObjectStoreError::Config(e.to_string()))?;

        Ok(Self::with_store(Arc::new(store), bucket))
    }

    fn with_store(store: Arc<DynObjectStore>, bucket: &str) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, content_type: &str, source: &Path) -> ObjectStoreResult<()> {
        ensure_key_safe(key)?;
        let start = Instant::now();
        let file = File::open(source).await?;

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let mut writer =
            BufWriter::with_capacity(self.store.clone(), ObjectPath::from(key), S3_PART_SIZE)
                .with_attributes(attributes);

        let mut chunks = ReaderStream::with_capacity(file, READ_CHUNK_BYTES);
        let mut size_bytes: u64 = 0;
        while let Some(chunk) = chunks.next().await {
            let sent = match chunk {
                Ok(chunk) => {
                    size_bytes += chunk.len() as u64;
                    writer
                        .put(chunk)
                        .await
                        .map_err(|e| ObjectStoreError::Backend(e.to_string()))
                }
                Err(err) => Err(ObjectStoreError::Io(err)),
            };
            if let Err(err) = sent {
                if let Err(abort) = writer.abort().await {
                    warn!(bucket = %self.bucket, key = %key, error = %abort, "failed to abort S3 upload");
                }
                debug!(bucket = %self.bucket, key = %key, error = %err, "S3 put failed");
                return Err(err);
            }
        }

        writer.shutdown().await.map_err(|e| {
            debug!(bucket = %self.bucket, key = %key, error = %e, "S3 put failed");
            ObjectStoreError::Backend(e.to_string())
        })?;

        info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::object_store::{ObjectStoreExt, memory::InMemory};
    use tempfile::TempDir;

    #[test]
    fn rejects_unsafe_keys() {
        for key in ["", "/etc/passwd", "a/../b", "a\\b", "a\nb"] {
            assert!(matches!(
                ensure_key_safe(key),
                Err(ObjectStoreError::InvalidKey(_))
            ));
        }
        assert!(ensure_key_safe(&"k".repeat(MAX_OBJECT_KEY_LEN + 1)).is_err());
        assert!(ensure_key_safe("landscape/abc_-XYZ.mp4").is_ok());
    }

    #[test]
    fn shards_are_stable_hex_pairs() {
        let (a, b) = LocalObjectStore::object_shards("landscape/abc.mp4");
        assert_eq!((a.len(), b.len()), (2, 2));
        assert_eq!(
            LocalObjectStore::object_shards("landscape/abc.mp4"),
            (a.clone(), b.clone())
        );
        let path = LocalObjectStore::new("/data").object_path("landscape/abc.mp4");
        assert_eq!(
            path,
            PathBuf::from(format!("/data/{}/{}/landscape/abc.mp4", a, b))
        );
    }

    #[tokio::test]
    async fn put_then_open() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.mp4");
        tokio::fs::write(&source, b"fast start bytes").await.unwrap();

        let store = LocalObjectStore::new(dir.path().join("objects"));
        store
            .put("portrait/key.mp4", "video/mp4", &source)
            .await
            .unwrap();

        let (mut file, len) = store.open("portrait/key.mp4").await.unwrap();
        assert_eq!(len, 16);
        let mut contents = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut file, &mut contents)
            .await
            .unwrap();
        assert_eq!(contents, b"fast start bytes");
        assert!(source.exists());
    }

    #[tokio::test]
    async fn failed_stream_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let stream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(ErrorKind::BrokenPipe, "client went away")),
        ]);

        let err = store.write_stream("other/key.mp4", stream).await.unwrap_err();
        assert!(matches!(err, ObjectStoreError::Io(_)));

        let parent = store.object_path("other/key.mp4");
        let parent = parent.parent().unwrap();
        let mut entries = tokio::fs::read_dir(parent).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn open_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(matches!(
            store.open("landscape/nope.mp4").await,
            Err(ObjectStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn missing_source_is_io_error() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(matches!(
            store
                .put("landscape/x.mp4", "video/mp4", &dir.path().join("absent"))
                .await,
            Err(ObjectStoreError::Io(_))
        ));
    }

    fn in_memory_s3() -> (Arc<InMemory>, S3ObjectStore) {
        let memory = Arc::new(InMemory::new());
        let store = S3ObjectStore::with_store(memory.clone(), "videos");
        (memory, store)
    }

    #[tokio::test]
    async fn s3_put_streams_large_files_in_parts() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("large.mp4");
        let payload: Vec<u8> = (0..S3_PART_SIZE * 2 + 12_345)
            .map(|i| (i % 251) as u8)
            .collect();
        tokio::fs::write(&source, &payload).await.unwrap();

        let (memory, store) = in_memory_s3();
        store
            .put("landscape/large.mp4", "video/mp4", &source)
            .await
            .unwrap();

        let stored = memory
            .get(&ObjectPath::from("landscape/large.mp4"))
            .await
            .unwrap();
        assert_eq!(
            stored
                .attributes
                .get(&Attribute::ContentType)
                .map(|v| v.as_ref()),
            Some("video/mp4")
        );
        let bytes = stored.bytes().await.unwrap();
        assert_eq!(bytes.len(), payload.len());
        assert!(bytes.as_ref() == payload.as_slice());
    }

    #[tokio::test]
    async fn s3_put_small_file_keeps_content_type() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("small.mp4");
        tokio::fs::write(&source, b"tiny").await.unwrap();

        let (memory, store) = in_memory_s3();
        store.put("other/small.mp4", "video/mp4", &source).await.unwrap();

        let stored = memory.get(&ObjectPath::from("other/small.mp4")).await.unwrap();
        assert_eq!(
            stored
                .attributes
                .get(&Attribute::ContentType)
                .map(|v| v.as_ref()),
            Some("video/mp4")
        );
        assert_eq!(stored.bytes().await.unwrap().as_ref(), b"tiny");
    }

    #[tokio::test]
    async fn s3_put_missing_source_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let (memory, store) = in_memory_s3();
        let err = store
            .put("portrait/x.mp4", "video/mp4", &dir.path().join("absent"))
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectStoreError::Io(_)));
        assert!(memory.head(&ObjectPath::from("portrait/x.mp4")).await.is_err());
    }
}
