use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, path::PathBuf, str::FromStr};

/// Default upload cap: 1 GiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1 << 30;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub temp_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub upload_timeout_secs: u64,
    pub jwt_secret: String,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    Local,
    S3,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            other => bail!("unknown storage backend `{}` (expected `local` or `s3`)", other),
        }
    }
}

/// Where processed videos are written and how their public location is built.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local {
        storage_dir: PathBuf,
        location: ObjectLocation,
    },
    S3 {
        bucket: String,
        region: String,
        endpoint: Option<String>,
        location: ObjectLocation,
    },
}

impl StorageConfig {
    pub fn location(&self) -> &ObjectLocation {
        match self {
            StorageConfig::Local { location, .. } | StorageConfig::S3 { location, .. } => location,
        }
    }
}

/// Immutable recipe for turning an object key into a retrievable URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectLocation {
    /// `{base_url}/{key}`
    BaseUrl(String),
    /// Virtual-hosted AWS style, or path style when an endpoint is set.
    S3 {
        bucket: String,
        region: String,
        endpoint: Option<String>,
    },
}

impl ObjectLocation {
    pub fn url_for(&self, key: &str) -> String {
        match self {
            ObjectLocation::BaseUrl(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            ObjectLocation::S3 {
                bucket,
                region,
                endpoint: None,
            } => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key),
            ObjectLocation::S3 {
                bucket,
                endpoint: Some(endpoint),
                ..
            } => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key),
        }
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Video upload ingest service")]
pub struct Args {
    /// Host to bind to (overrides VIDEO_INGEST_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides VIDEO_INGEST_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides VIDEO_INGEST_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory for staged and remuxed uploads (overrides VIDEO_INGEST_TEMP_DIR)
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Upload size cap in bytes (overrides VIDEO_INGEST_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<u64>,

    /// Per-upload deadline in seconds (overrides VIDEO_INGEST_UPLOAD_TIMEOUT_SECS)
    #[arg(long)]
    pub upload_timeout_secs: Option<u64>,

    /// Object storage backend (overrides VIDEO_INGEST_STORAGE_BACKEND)
    #[arg(long, value_enum)]
    pub storage_backend: Option<StorageBackend>,

    /// Directory for the local backend (overrides VIDEO_INGEST_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Public base URL for locally stored objects (overrides VIDEO_INGEST_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.into())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        let port = match args.port {
            Some(port) => port,
            None => env_parse("VIDEO_INGEST_PORT", 8091u16)?,
        };
        let max_upload_bytes = match args.max_upload_bytes {
            Some(v) => v,
            None => env_parse("VIDEO_INGEST_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
        };
        let upload_timeout_secs = match args.upload_timeout_secs {
            Some(v) => v,
            None => env_parse("VIDEO_INGEST_UPLOAD_TIMEOUT_SECS", 600u64)?,
        };
        let backend = match args.storage_backend {
            Some(b) => b,
            None => env_parse("VIDEO_INGEST_STORAGE_BACKEND", StorageBackend::Local)?,
        };

        let storage = match backend {
            StorageBackend::Local => {
                let base_url = args.public_base_url.unwrap_or_else(|| {
                    env_or(
                        "VIDEO_INGEST_PUBLIC_BASE_URL",
                        &format!("http://localhost:{}/objects", port),
                    )
                });
                StorageConfig::Local {
                    storage_dir: args.storage_dir.unwrap_or_else(|| {
                        env_or("VIDEO_INGEST_STORAGE_DIR", "./data/objects").into()
                    }),
                    location: ObjectLocation::BaseUrl(base_url),
                }
            }
            StorageBackend::S3 => {
                let bucket = env_opt("VIDEO_INGEST_S3_BUCKET")
                    .context("VIDEO_INGEST_S3_BUCKET is required for the s3 backend")?;
                let region = env_opt("VIDEO_INGEST_S3_REGION")
                    .or_else(|| env_opt("AWS_REGION"))
                    .context("VIDEO_INGEST_S3_REGION or AWS_REGION is required for the s3 backend")?;
                let endpoint = env_opt("VIDEO_INGEST_S3_ENDPOINT");
                StorageConfig::S3 {
                    location: ObjectLocation::S3 {
                        bucket: bucket.clone(),
                        region: region.clone(),
                        endpoint: endpoint.clone(),
                    },
                    bucket,
                    region,
                    endpoint,
                }
            }
        };

        let cfg = Self {
            host: args
                .host
                .unwrap_or_else(|| env_or("VIDEO_INGEST_HOST", "0.0.0.0")),
            port,
            database_url: args.database_url.unwrap_or_else(|| {
                env_or("VIDEO_INGEST_DATABASE_URL", "sqlite://./data/meta/videos.db")
            }),
            temp_dir: args
                .temp_dir
                .or_else(|| env_opt("VIDEO_INGEST_TEMP_DIR").map(PathBuf::from))
                .unwrap_or_else(env::temp_dir),
            max_upload_bytes,
            upload_timeout_secs,
            jwt_secret: env_opt("VIDEO_INGEST_JWT_SECRET")
                .context("VIDEO_INGEST_JWT_SECRET must be set")?,
            ffmpeg_path: env_or("VIDEO_INGEST_FFMPEG_PATH", "ffmpeg").into(),
            ffprobe_path: env_or("VIDEO_INGEST_FFPROBE_PATH", "ffprobe").into(),
            storage,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_location() {
        let loc = ObjectLocation::BaseUrl("http://localhost:8091/objects/".into());
        assert_eq!(
            loc.url_for("landscape/abc.mp4"),
            "http://localhost:8091/objects/landscape/abc.mp4"
        );
    }

    #[test]
    fn s3_locations() {
        let aws = ObjectLocation::S3 {
            bucket: "tubely-videos".into(),
            region: "us-east-2".into(),
            endpoint: None,
        };
        assert_eq!(
            aws.url_for("portrait/k.mp4"),
            "https://tubely-videos.s3.us-east-2.amazonaws.com/portrait/k.mp4"
        );

        let minio = ObjectLocation::S3 {
            bucket: "videos".into(),
            region: "local".into(),
            endpoint: Some("http://localhost:9000/".into()),
        };
        assert_eq!(
            minio.url_for("other/k.mp4"),
            "http://localhost:9000/videos/other/k.mp4"
        );
    }

    #[test]
    fn storage_backend_from_str() {
        assert_eq!("S3".parse::<StorageBackend>().unwrap(), StorageBackend::S3);
        assert_eq!(
            "local".parse::<StorageBackend>().unwrap(),
            StorageBackend::Local
        );
        assert!("gcs".parse::<StorageBackend>().is_err());
    }
}
