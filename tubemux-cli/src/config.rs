use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use tubemux_engine::config::{
    DEFAULT_AUDIO_CONTAINER, DEFAULT_JOB_TIMEOUT_SECS, DEFAULT_MAX_RETRIES, DEFAULT_USER_AGENT,
    DEFAULT_VIDEO_CONTAINER, default_concurrency,
};
use tubemux_engine::{EngineConfig, HttpFetcherConfig, YtDlpConfig};

use crate::cli::Args;
use crate::error::{AppError, Result};

const CONFIG_DIR: &str = "tubemux";
const CONFIG_FILE: &str = "config.toml";

/// Settings read from `config.toml`, overridden by command line flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub download_dir: Option<PathBuf>,
    pub ffmpeg_path: PathBuf,
    pub yt_dlp_path: PathBuf,
    pub max_concurrent: usize,
    pub job_timeout_secs: u64,
    pub retries: u32,
    pub video_container: String,
    pub audio_container: String,
    pub output_container: Option<String>,
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            yt_dlp_path: PathBuf::from("yt-dlp"),
            max_concurrent: default_concurrency(),
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
            retries: DEFAULT_MAX_RETRIES,
            video_container: DEFAULT_VIDEO_CONTAINER.to_string(),
            audio_container: DEFAULT_AUDIO_CONTAINER.to_string(),
            output_container: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout_secs: 30,
            read_timeout_secs: 60,
        }
    }
}

impl AppConfig {
    /// Load from `path`, or from the default location when none is given.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => {
                    debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| AppError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| AppError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(loc) = &args.loc {
            self.download_dir = Some(loc.clone());
        }
        if let Some(ffmpeg) = &args.ffmpeg {
            self.ffmpeg_path = ffmpeg.clone();
        }
        if let Some(yt_dlp) = &args.yt_dlp {
            self.yt_dlp_path = yt_dlp.clone();
        }
        if let Some(jobs) = args.jobs {
            self.max_concurrent = jobs;
        }
        if let Some(timeout) = args.timeout {
            self.job_timeout_secs = timeout;
        }
        if let Some(retries) = args.retries {
            self.retries = retries;
        }
    }

    /// Configured directory, then the platform download folder, then
    /// `~/Downloads`, then the working directory.
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            video_container: self.video_container.clone(),
            audio_container: self.audio_container.clone(),
            output_container: self.output_container.clone(),
            max_concurrent: self.max_concurrent,
            job_timeout_secs: self.job_timeout_secs,
            max_retries: self.retries,
            ..EngineConfig::default()
        }
    }

    pub fn fetcher_config(&self) -> HttpFetcherConfig {
        HttpFetcherConfig {
            user_agent: self.user_agent.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
        }
    }

    pub fn yt_dlp_config(&self) -> YtDlpConfig {
        YtDlpConfig {
            program: self.yt_dlp_path.clone(),
            ..YtDlpConfig::default()
        }
    }
}
