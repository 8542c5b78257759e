//! Multiplexing of the downloaded video and audio streams.
//!
//! The muxer writes to an intermediate file that is renamed over the final
//! path only once it is complete, so the final name never refers to a
//! partial file.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{MergeError, MuxError};
use crate::naming::merging_path_for;
use crate::process::{stderr_tail, tokio_command};

/// Combines one video and one audio file into `output` without re-encoding.
#[async_trait]
pub trait Muxer: Send + Sync {
    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), MuxError>;
}

/// Stream-copy muxer backed by an `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    ffmpeg_path: PathBuf,
    output_format: String,
}

impl FfmpegMuxer {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, output_container: &str) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            output_format: normalize_format(output_container).to_string(),
        }
    }

    /// Use `FFMPEG_PATH` when set, `ffmpeg` from `PATH` otherwise.
    pub fn from_env(output_container: &str) -> Self {
        let path = std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string());
        Self::new(path, output_container)
    }

    pub fn output_format(&self) -> &str {
        &self.output_format
    }

    fn build_args(&self, video: &Path, audio: &Path, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-hide_banner".into(),
            "-nostats".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            video.to_string_lossy().into_owned(),
            "-i".into(),
            audio.to_string_lossy().into_owned(),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0".into(),
            "-c".into(),
            "copy".into(),
        ];

        if self.output_format == "mp4" {
            args.extend(["-movflags".into(), "+faststart".into()]);
        }

        args.extend(["-f".into(), self.output_format.clone()]);
        args.push(output.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), MuxError> {
        let args = self.build_args(video, audio, output);
        debug!(program = %self.ffmpeg_path.display(), ?args, "Running muxer");

        let child = tokio_command(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| MuxError::Spawn {
                program: self.ffmpeg_path.display().to_string(),
                source,
            })?;

        // Dropping the child on cancellation kills it
        let output_result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(output = %output.display(), "Muxing cancelled, killing ffmpeg");
                return Err(MuxError::Cancelled);
            }
            result = child.wait_with_output() => result?,
        };

        if !output_result.status.success() {
            return Err(MuxError::Failed {
                code: output_result.status.code(),
                stderr: stderr_tail(&output_result.stderr, 10),
            });
        }

        if !tokio::fs::try_exists(output).await? {
            return Err(MuxError::MissingOutput {
                path: output.to_path_buf(),
            });
        }
        Ok(())
    }
}

/// Map a container extension to the ffmpeg muxer name.
pub fn normalize_format(container: &str) -> &str {
    let lower = container.trim().trim_start_matches('.');
    if lower.eq_ignore_ascii_case("mkv") {
        "matroska"
    } else if ["ts", "m2ts", "mts"]
        .iter()
        .any(|f| lower.eq_ignore_ascii_case(f))
    {
        "mpegts"
    } else if ["mp4", "m4v", "m4a"]
        .iter()
        .any(|f| lower.eq_ignore_ascii_case(f))
    {
        "mp4"
    } else {
        lower
    }
}

/// Turns two temp streams into exactly one final file.
#[derive(Clone)]
pub struct MediaMerger {
    muxer: Arc<dyn Muxer>,
}

impl MediaMerger {
    pub fn new(muxer: Arc<dyn Muxer>) -> Self {
        Self { muxer }
    }

    /// Mux into the intermediate file, rename it over `output`, then delete
    /// both inputs.
    ///
    /// On failure the inputs are left in place for the cleanup handler; only
    /// the intermediate file is removed here.
    pub async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, MergeError> {
        let intermediate = merging_path_for(output);
        remove_if_exists(&intermediate)
            .await
            .map_err(|e| MergeError::io("remove stale", &intermediate, e))?;

        if let Err(e) = self.muxer.mux(video, audio, &intermediate, cancel).await {
            discard(&intermediate).await;
            return Err(e.into());
        }

        if let Err(e) = tokio::fs::rename(&intermediate, output).await {
            discard(&intermediate).await;
            return Err(MergeError::io("rename", &intermediate, e));
        }

        // The final file is complete at this point, leftovers only get a warning
        for input in [video, audio] {
            if let Err(e) = remove_if_exists(input).await {
                warn!(path = %input.display(), error = %e, "Failed to remove merged input");
            }
        }

        info!(output = %output.display(), "Merge complete");
        Ok(output.to_path_buf())
    }
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

async fn discard(path: &Path) {
    if let Err(e) = remove_if_exists(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove intermediate file");
    }
}
