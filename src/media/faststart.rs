//! Fast-start remuxing of staged uploads.

use super::{MediaToolResult, MediaToolRunner};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::TempPath;
use tracing::warn;

const PROCESSING_SUFFIX: &str = ".processing";

/// Derive the remux output path: `<input>.processing`.
pub fn processing_path(input: &Path) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push(PROCESSING_SUFFIX);
    PathBuf::from(name)
}

/// Produces a progressive-download copy of a file next to the original.
#[derive(Clone)]
pub struct FastStartTranscoder {
    runner: Arc<dyn MediaToolRunner>,
}

impl FastStartTranscoder {
    pub fn new(runner: Arc<dyn MediaToolRunner>) -> Self {
        Self { runner }
    }

    /// Remux `input` into `<input>.processing`.
    ///
    /// The returned [`TempPath`] owns the output and deletes it when dropped.
    /// The output is claimed before the remux starts, so a failed or
    /// cancelled run never leaves a partial file behind.
    pub async fn remux(&self, input: &Path) -> MediaToolResult<TempPath> {
        let output = TempPath::from_path(processing_path(input));
        match self.runner.remux(input, &output).await {
            Ok(()) => Ok(output),
            Err(err) => {
                let path = output.to_path_buf();
                if let Err(cleanup) = output.close() {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %path.display(), error = %cleanup, "failed to remove partial remux output");
                    }
                }
                Err(err)
            }
        }
    }
}
