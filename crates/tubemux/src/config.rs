use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::download::RetryPolicy;
use crate::selector::SelectionConfig;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";
pub const DEFAULT_VIDEO_CONTAINER: &str = "webm";
pub const DEFAULT_AUDIO_CONTAINER: &str = "mp4";
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Engine-wide settings shared by every job of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Container required for the video-only stream
    pub video_container: String,
    /// Container required for the audio-only stream
    pub audio_container: String,
    /// Container of the merged file. Falls back to the audio container.
    pub output_container: Option<String>,
    /// Upper bound on concurrently running jobs
    pub max_concurrent: usize,
    /// Per-job deadline in seconds, 0 disables it
    pub job_timeout_secs: u64,
    /// Retries per stream transfer, not counting the first attempt
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            video_container: DEFAULT_VIDEO_CONTAINER.to_string(),
            audio_container: DEFAULT_AUDIO_CONTAINER.to_string(),
            output_container: None,
            max_concurrent: default_concurrency(),
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout_secs = timeout.map_or(0, |t| t.as_secs());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn output_container(&self) -> &str {
        self.output_container
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(&self.audio_container)
    }

    /// Worker pool size, never below one.
    pub fn concurrency(&self) -> usize {
        self.max_concurrent.max(1)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms.max(self.retry_base_delay_ms)),
            jitter: true,
        }
    }

    pub fn selection(&self) -> SelectionConfig {
        SelectionConfig {
            video_container: self.video_container.clone(),
            audio_container: self.audio_container.clone(),
        }
    }
}

pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
