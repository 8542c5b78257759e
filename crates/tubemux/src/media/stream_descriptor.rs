use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of elementary stream carried by a descriptor.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One downloadable variant of a video.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub kind: StreamKind,
    // Container / file extension, e.g. "webm", "mp4"
    pub container: String,
    // Resolution label for video ("720p", "1080p60"), bitrate label for audio ("128kbps")
    pub quality: String,
    pub approx_size_bytes: Option<u64>,
    // Whether the stream already carries both audio and video
    pub progressive: bool,
    // Suggested file name including the extension
    pub default_filename: String,
    // Direct media url
    pub url: String,
    #[serde(default)]
    pub codec: Option<String>,
}

impl StreamDescriptor {
    /// Vertical resolution parsed from the quality label ("1080p60" -> 1080).
    pub fn resolution(&self) -> Option<u32> {
        leading_number(&self.quality)
    }

    /// Audio bitrate in kbps parsed from the quality label ("160kbps" -> 160).
    pub fn bitrate_kbps(&self) -> Option<u32> {
        leading_number(&self.quality)
    }

    /// `default_filename` without its extension.
    pub fn base_name(&self) -> &str {
        match self.default_filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.contains(['/', '\\', ' ']) => stem,
            _ => &self.default_filename,
        }
    }

    /// Whether this descriptor can feed the separate video + audio pipeline.
    pub fn is_adaptive(&self) -> bool {
        !self.progressive
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.kind, self.quality, self.container)?;
        if let Some(size) = self.approx_size_bytes {
            write!(f, " ~{size} bytes")?;
        }
        Ok(())
    }
}

fn leading_number(label: &str) -> Option<u32> {
    let digits: String = label
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
