//! Stream selector for choosing exactly one video and one audio stream.
//!
//! Only adaptive (non-progressive) streams in the configured containers are
//! eligible. Ordering is deterministic: candidates are stable-sorted, so
//! ties keep the order in which the catalog listed them.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DEFAULT_AUDIO_CONTAINER, DEFAULT_VIDEO_CONTAINER};
use crate::error::SelectionError;
use crate::media::{ResolutionPolicy, StreamDescriptor, StreamKind, VideoCatalog};

/// Container requirements for stream selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub video_container: String,
    pub audio_container: String,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            video_container: DEFAULT_VIDEO_CONTAINER.to_string(),
            audio_container: DEFAULT_AUDIO_CONTAINER.to_string(),
        }
    }
}

/// The pair of streams a job downloads.
#[derive(Debug, Clone)]
pub struct StreamSelection {
    pub video: StreamDescriptor,
    pub audio: StreamDescriptor,
}

#[derive(Debug, Clone, Default)]
pub struct StreamSelector {
    config: SelectionConfig,
}

impl StreamSelector {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Select the video stream first, then the audio stream.
    pub fn select(
        &self,
        catalog: &VideoCatalog,
        policy: &ResolutionPolicy,
    ) -> Result<StreamSelection, SelectionError> {
        let video = self.select_video(&catalog.streams, policy)?;
        let audio = self.select_audio(&catalog.streams)?;
        debug!(video = %video, audio = %audio, "Selected streams");
        Ok(StreamSelection { video, audio })
    }

    pub fn select_video(
        &self,
        streams: &[StreamDescriptor],
        policy: &ResolutionPolicy,
    ) -> Result<StreamDescriptor, SelectionError> {
        let candidates = self.sort_video_candidates(streams, policy);
        candidates.first().map(|s| (*s).clone()).ok_or_else(|| {
            SelectionError::not_available(
                StreamKind::Video,
                format!("{policy} in {}", self.config.video_container),
            )
        })
    }

    pub fn select_audio(
        &self,
        streams: &[StreamDescriptor],
    ) -> Result<StreamDescriptor, SelectionError> {
        let candidates = self.sort_audio_candidates(streams);
        candidates.first().map(|s| (*s).clone()).ok_or_else(|| {
            SelectionError::not_available(
                StreamKind::Audio,
                format!("any bitrate in {}", self.config.audio_container),
            )
        })
    }

    /// Eligible video streams, best first.
    pub fn sort_video_candidates<'a>(
        &self,
        streams: &'a [StreamDescriptor],
        policy: &ResolutionPolicy,
    ) -> Vec<&'a StreamDescriptor> {
        let mut candidates: Vec<&StreamDescriptor> = streams
            .iter()
            .filter(|s| self.is_eligible(s, StreamKind::Video, &self.config.video_container))
            .filter(|s| policy.matches(&s.quality))
            .collect();

        // Exact requests keep catalog order, so only `Max` needs ranking
        if matches!(policy, ResolutionPolicy::Max) {
            candidates.sort_by(|a, b| compare_desc(a.resolution(), b.resolution()));
        }
        candidates
    }

    /// Eligible audio streams, highest bitrate first.
    pub fn sort_audio_candidates<'a>(
        &self,
        streams: &'a [StreamDescriptor],
    ) -> Vec<&'a StreamDescriptor> {
        let mut candidates: Vec<&StreamDescriptor> = streams
            .iter()
            .filter(|s| self.is_eligible(s, StreamKind::Audio, &self.config.audio_container))
            .collect();
        candidates.sort_by(|a, b| compare_desc(a.bitrate_kbps(), b.bitrate_kbps()));
        candidates
    }

    fn is_eligible(&self, stream: &StreamDescriptor, kind: StreamKind, container: &str) -> bool {
        stream.kind == kind
            && stream.is_adaptive()
            && stream.container.eq_ignore_ascii_case(container)
    }
}

// Unparseable labels rank below every numeric one.
fn compare_desc(a: Option<u32>, b: Option<u32>) -> Ordering {
    b.cmp(&a)
}
