//! External media tooling: probing stream geometry and fast-start remuxing.
//!
//! Both capabilities sit behind [`MediaToolRunner`] so the upload pipeline can
//! be exercised without spawning real subprocesses.

pub mod aspect;
pub mod faststart;
pub mod ffmpeg;

use async_trait::async_trait;
use std::{io, path::Path};
use thiserror::Error;

pub use aspect::{AspectClass, AspectRatio, Geometry};

#[derive(Debug, Error)]
pub enum MediaToolError {
    #[error("failed to spawn `{tool}`: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("`{tool}` exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },
    #[error("unreadable probe output: {0}")]
    Malformed(String),
    #[error("no video stream found")]
    NoStreams,
    #[error("invalid stream geometry {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },
}

pub type MediaToolResult<T> = Result<T, MediaToolError>;

/// Subprocess-backed media capabilities.
#[async_trait]
pub trait MediaToolRunner: Send + Sync {
    /// Pixel geometry of the first video stream in `path`.
    async fn probe(&self, path: &Path) -> MediaToolResult<Geometry>;

    /// Stream-copy `input` into `output`, moving the index atom to the front.
    /// `input` is never modified.
    async fn remux(&self, input: &Path, output: &Path) -> MediaToolResult<()>;
}

/// Probe `path` and bucket its frame into an [`AspectClass`].
pub async fn classify_file(
    runner: &dyn MediaToolRunner,
    path: &Path,
) -> MediaToolResult<(AspectClass, AspectRatio)> {
    let geometry = runner.probe(path).await?;
    let ratio = AspectRatio::reduce(geometry).ok_or(MediaToolError::InvalidGeometry {
        width: geometry.width,
        height: geometry.height,
    })?;
    Ok((aspect::classify_ratio(ratio), ratio))
}
