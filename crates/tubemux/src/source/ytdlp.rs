//! `yt-dlp` backed catalog resolution.
//!
//! Metadata comes from the `-J` JSON dump. Bytes are fetched directly from the
//! format urls with [`HttpFetcher`], so `yt-dlp` never writes to disk.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{HttpFetcher, OpenedStream, SourceProvider};
use crate::error::SourceError;
use crate::media::{Locator, Playlist, StreamDescriptor, StreamKind, VideoCatalog};
use crate::naming::sanitize_filename;
use crate::process::{stderr_tail, tokio_command};

const TOOL: &str = "yt-dlp";

const NOT_FOUND_MARKERS: &[&str] = &[
    "video unavailable",
    "not found",
    "does not exist",
    "http error 404",
];

#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    pub program: PathBuf,
    /// Extra arguments placed before the locator
    pub extra_args: Vec<String>,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(TOOL),
            extra_args: Vec::new(),
        }
    }
}

pub struct YtDlpProvider {
    config: YtDlpConfig,
    fetcher: HttpFetcher,
}

impl YtDlpProvider {
    pub fn new(config: YtDlpConfig, fetcher: HttpFetcher) -> Self {
        Self { config, fetcher }
    }

    async fn dump_json(&self, args: &[&str], locator: &Locator) -> Result<Vec<u8>, SourceError> {
        let mut cmd = tokio_command(&self.config.program);
        cmd.args(args)
            .args(&self.config.extra_args)
            .arg(locator.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(program = %self.config.program.display(), ?args, locator = %locator, "Running extractor");

        let output = cmd.output().await.map_err(|e| {
            SourceError::tool(
                TOOL,
                format!("failed to run {}: {e}", self.config.program.display()),
            )
        })?;

        if !output.status.success() {
            let stderr = stderr_tail(&output.stderr, 5);
            return Err(classify_failure(locator, &stderr));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl SourceProvider for YtDlpProvider {
    async fn resolve(&self, locator: &Locator) -> Result<VideoCatalog, SourceError> {
        let stdout = self
            .dump_json(&["-J", "--no-playlist", "--no-warnings"], locator)
            .await?;
        let catalog = parse_catalog(&stdout)?;
        info!(
            locator = %locator,
            title = %catalog.title,
            streams = catalog.streams.len(),
            "Resolved stream catalog"
        );
        Ok(catalog)
    }

    async fn resolve_playlist(&self, locator: &Locator) -> Result<Playlist, SourceError> {
        let stdout = self
            .dump_json(&["-J", "--flat-playlist", "--no-warnings"], locator)
            .await?;
        let playlist = parse_playlist(&stdout)?;
        info!(
            locator = %locator,
            title = %playlist.title,
            entries = playlist.len(),
            "Resolved playlist"
        );
        Ok(playlist)
    }

    async fn open_stream(
        &self,
        descriptor: &StreamDescriptor,
    ) -> Result<OpenedStream, SourceError> {
        self.fetcher.open(&descriptor.url).await
    }
}

fn classify_failure(locator: &Locator, stderr: &str) -> SourceError {
    let lower = stderr.to_lowercase();
    if NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
        SourceError::not_found(locator.as_str())
    } else if stderr.is_empty() {
        SourceError::network(format!("{TOOL} exited without output"))
    } else {
        SourceError::network(stderr.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct InfoDump {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    formats: Vec<FormatDump>,
}

#[derive(Debug, Deserialize)]
struct FormatDump {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    abr: Option<f64>,
    #[serde(default)]
    tbr: Option<f64>,
    #[serde(default)]
    filesize: Option<u64>,
    #[serde(default)]
    filesize_approx: Option<u64>,
    #[serde(default)]
    format_note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistDump {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    entries: Vec<Option<PlaylistEntry>>,
}

#[derive(Debug, Deserialize)]
struct PlaylistEntry {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

fn has_codec(codec: &Option<String>) -> bool {
    codec.as_deref().is_some_and(|c| !c.is_empty() && c != "none")
}

fn parse_catalog(json: &[u8]) -> Result<VideoCatalog, SourceError> {
    let dump: InfoDump =
        serde_json::from_slice(json).map_err(|e| SourceError::parse(e.to_string()))?;
    let title = dump
        .title
        .or(dump.id)
        .unwrap_or_else(|| "untitled".to_string());
    let base = sanitize_filename(&title);

    let streams = dump
        .formats
        .into_iter()
        .filter_map(|f| to_descriptor(f, &base))
        .collect();

    Ok(VideoCatalog { title, streams })
}

fn to_descriptor(format: FormatDump, base: &str) -> Option<StreamDescriptor> {
    let url = format.url?;
    // Manifests (m3u8, dash fragments) are not directly fetchable
    if let Some(protocol) = format.protocol.as_deref()
        && protocol != "http"
        && protocol != "https"
    {
        return None;
    }
    let container = format
        .ext
        .filter(|e| !e.is_empty())
        .map(|e| normalize_container(&e))?;

    let has_video = has_codec(&format.vcodec);
    let has_audio = has_codec(&format.acodec);
    let (kind, progressive, codec) = match (has_video, has_audio) {
        (true, false) => (StreamKind::Video, false, format.vcodec),
        (false, true) => (StreamKind::Audio, false, format.acodec),
        (true, true) => (StreamKind::Video, true, format.vcodec),
        (false, false) => return None,
    };

    let quality = match kind {
        StreamKind::Video => match format.height {
            Some(h) if h > 0 => format!("{h}p"),
            _ => format.format_note?,
        },
        StreamKind::Audio => match format.abr.or(format.tbr) {
            Some(abr) if abr > 0.0 => format!("{}kbps", abr.round() as u32),
            _ => "unknown".to_string(),
        },
    };

    Some(StreamDescriptor {
        kind,
        default_filename: format!("{base}.{container}"),
        container,
        quality,
        approx_size_bytes: format.filesize.or(format.filesize_approx),
        progressive,
        url,
        codec,
    })
}

/// yt-dlp reports MPEG-4 audio as `m4a`; the selector only knows containers.
fn normalize_container(ext: &str) -> String {
    let ext = ext.to_ascii_lowercase();
    match ext.as_str() {
        "m4a" | "m4v" => "mp4".to_string(),
        _ => ext,
    }
}

fn parse_playlist(json: &[u8]) -> Result<Playlist, SourceError> {
    let dump: PlaylistDump =
        serde_json::from_slice(json).map_err(|e| SourceError::parse(e.to_string()))?;
    let entries = dump
        .entries
        .into_iter()
        .flatten()
        .filter_map(|e| e.url.or(e.id))
        .filter(|s| !s.trim().is_empty())
        .map(Locator::new)
        .collect();

    Ok(Playlist {
        title: dump.title.unwrap_or_else(|| "playlist".to_string()),
        entries,
    })
}
