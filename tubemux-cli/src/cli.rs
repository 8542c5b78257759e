use std::path::PathBuf;

use clap::Parser;
use tubemux_engine::ResolutionPolicy;

/// Download a video (or a whole playlist) as separate video and audio
/// streams and mux them into one file without re-encoding.
#[derive(Parser, Debug)]
#[command(name = "tubemux", version, about, long_about = None)]
pub struct Args {
    /// Video or playlist URL
    #[arg(short, long)]
    pub url: String,

    /// Destination directory (defaults to the platform download folder)
    #[arg(short, long, value_name = "DIR")]
    pub loc: Option<PathBuf>,

    /// Video resolution: "max" or an exact label such as "720p"
    #[arg(short, long, default_value = "max")]
    pub res: ResolutionPolicy,

    /// Treat the URL as a playlist and download every entry
    #[arg(short, long)]
    pub playlist: bool,

    /// Maximum number of videos processed at once
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Per-video deadline in seconds, 0 disables it
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Retries per stream transfer
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// Path to the config file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path to the ffmpeg binary
    #[arg(long, env = "FFMPEG_PATH", value_name = "PATH")]
    pub ffmpeg: Option<PathBuf>,

    /// Path to the yt-dlp binary
    #[arg(long = "yt-dlp", value_name = "PATH")]
    pub yt_dlp: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors and hide progress bars
    #[arg(short, long)]
    pub quiet: bool,
}
