//! File names derived for one job.
//!
//! The final file name is the only idempotence key, so every temp name
//! carries an infix that the final name never has.

use std::path::{Path, PathBuf};

use crate::media::StreamDescriptor;

const DEFAULT_FILENAME: &str = "output";
const MAX_STEM_CHARS: usize = 200;
const MERGING_INFIX: &str = "merging";

/// Paths a job reads and writes inside its destination directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNames {
    pub stem: String,
    pub final_path: PathBuf,
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
    pub merging_path: PathBuf,
}

impl OutputNames {
    pub fn new(
        dest_dir: &Path,
        video: &StreamDescriptor,
        audio: &StreamDescriptor,
        output_container: &str,
    ) -> Self {
        // Truncate the title alone so the quality suffix always survives
        let stem = format!(
            "{}-{}",
            sanitize_filename(audio.base_name()),
            sanitize_filename(&video.quality)
        );
        let output_ext = sanitize_extension(output_container);
        let video_ext = sanitize_extension(&video.container);
        let audio_ext = sanitize_extension(&audio.container);

        Self {
            final_path: dest_dir.join(format!("{stem}.{output_ext}")),
            video_path: dest_dir.join(format!("{stem}.video.{video_ext}")),
            audio_path: dest_dir.join(format!("{stem}.audio.{audio_ext}")),
            merging_path: dest_dir.join(format!("{stem}.{MERGING_INFIX}.{output_ext}")),
            stem,
        }
    }

    pub fn file_name(&self) -> String {
        self.final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Every temp file the job may create, in creation order.
    pub fn temp_paths(&self) -> [PathBuf; 3] {
        [
            self.video_path.clone(),
            self.audio_path.clone(),
            self.merging_path.clone(),
        ]
    }
}

/// Intermediate file the muxer writes before it is renamed over `final_path`.
pub fn merging_path_for(final_path: &Path) -> PathBuf {
    let stem = final_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
    let name = match final_path.extension() {
        Some(ext) => format!("{stem}.{MERGING_INFIX}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{MERGING_INFIX}"),
    };
    final_path.with_file_name(name)
}

/// Replace characters that are invalid in file names on common platforms.
pub fn sanitize_filename(input: &str) -> String {
    let invalid_chars = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
    let replaced: String = input
        .chars()
        .map(|c| {
            if invalid_chars.contains(&c) || c < ' ' {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        return DEFAULT_FILENAME.to_string();
    }

    if trimmed.chars().count() > MAX_STEM_CHARS {
        trimmed.chars().take(MAX_STEM_CHARS).collect()
    } else {
        trimmed.to_string()
    }
}

fn sanitize_extension(container: &str) -> String {
    let ext: String = container
        .trim()
        .trim_start_matches('.')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    if ext.is_empty() { "bin".to_string() } else { ext }
}
