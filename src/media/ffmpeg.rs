//! `ffprobe`/`ffmpeg` backed [`MediaToolRunner`].

use super::{Geometry, MediaToolError, MediaToolResult, MediaToolRunner};
use async_trait::async_trait;
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    process::{Output, Stdio},
};
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Runs the media tools as child processes.
///
/// Children are killed when the owning future is dropped, so an abandoned
/// request does not leave a remux running in the background.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
}

impl FfmpegRunner {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    async fn run(&self, program: &Path, mut cmd: Command) -> MediaToolResult<Output> {
        let tool = program.display().to_string();
        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| MediaToolError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(MediaToolError::Failed {
                tool,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl MediaToolRunner for FfmpegRunner {
    async fn probe(&self, path: &Path) -> MediaToolResult<Geometry> {
        let mut cmd = Command::new(&self.ffprobe_path);
        cmd.args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-select_streams",
            "v:0",
        ])
        .arg(path);

        let output = self.run(&self.ffprobe_path, cmd).await?;
        let geometry = parse_probe_output(&output.stdout)?;
        debug!(
            path = %path.display(),
            width = geometry.width,
            height = geometry.height,
            "probed video geometry"
        );
        Ok(geometry)
    }

    async fn remux(&self, input: &Path, output: &Path) -> MediaToolResult<()> {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(["-y", "-v", "error", "-i"])
            .arg(input)
            .args(["-c", "copy", "-movflags", "faststart", "-f", "mp4"])
            .arg(output);

        self.run(&self.ffmpeg_path, cmd).await?;
        debug!(
            input = %input.display(),
            output = %output.display(),
            "remuxed for fast start"
        );
        Ok(())
    }
}

/// Extract the first video stream's geometry from `ffprobe -print_format json`.
fn parse_probe_output(stdout: &[u8]) -> MediaToolResult<Geometry> {
    let probe: ProbeOutput =
        serde_json::from_slice(stdout).map_err(|e| MediaToolError::Malformed(e.to_string()))?;

    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref().is_none_or(|t| t == "video"))
        .ok_or(MediaToolError::NoStreams)?;

    match (stream.width, stream.height) {
        (Some(width), Some(height)) => Ok(Geometry { width, height }),
        _ => Err(MediaToolError::Malformed(
            "video stream is missing width/height".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_video_stream() {
        let json = br#"{
            "streams": [
                {"index": 0, "codec_type": "audio", "codec_name": "aac"},
                {"index": 1, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080},
                {"index": 2, "codec_type": "video", "width": 640, "height": 360}
            ]
        }"#;
        let geometry = parse_probe_output(json).unwrap();
        assert_eq!(
            geometry,
            Geometry {
                width: 1920,
                height: 1080
            }
        );
    }

    #[test]
    fn stream_without_codec_type_is_accepted() {
        let json = br#"{"streams": [{"width": 720, "height": 1280}]}"#;
        assert_eq!(
            parse_probe_output(json).unwrap(),
            Geometry {
                width: 720,
                height: 1280
            }
        );
    }

    #[test]
    fn zero_streams_is_an_error() {
        assert!(matches!(
            parse_probe_output(br#"{"streams": []}"#),
            Err(MediaToolError::NoStreams)
        ));
        assert!(matches!(
            parse_probe_output(b"{}"),
            Err(MediaToolError::NoStreams)
        ));
    }

    #[test]
    fn missing_dimensions_is_malformed() {
        let json = br#"{"streams": [{"codec_type": "video", "width": 1920}]}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(MediaToolError::Malformed(_))
        ));
    }

    #[test]
    fn garbage_output_is_malformed() {
        assert!(matches!(
            parse_probe_output(b""),
            Err(MediaToolError::Malformed(_))
        ));
        assert!(matches!(
            parse_probe_output(b"not json"),
            Err(MediaToolError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let runner = FfmpegRunner::new(
            "/nonexistent/bin/ffmpeg-for-tests",
            "/nonexistent/bin/ffprobe-for-tests",
        );
        let err = runner.probe(Path::new("/tmp/whatever.mp4")).await.unwrap_err();
        assert!(matches!(err, MediaToolError::Spawn { .. }));
    }
}
