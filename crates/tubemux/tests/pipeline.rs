//! End-to-end pipeline tests.
//!
//! These run the real selector, downloader, merger and orchestrator against
//! an in-memory source and a muxer that concatenates its inputs.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use tubemux_engine::{
    EngineConfig, JobStatus, JobStep, Locator, MuxError, Muxer, OpenedStream, Pipeline,
    PipelineError, Playlist, ProgressFactory, ProgressSink, ProgressUpdate, ResolutionPolicy,
    SourceError, SourceProvider, StreamDescriptor, StreamKind, VideoCatalog,
};

struct FakeVideo {
    title: String,
    qualities: Vec<&'static str>,
}

#[derive(Default)]
struct FakeSource {
    videos: HashMap<String, FakeVideo>,
    playlists: HashMap<String, Vec<String>>,
    /// Locators whose audio transfer fails permanently
    broken_audio: HashSet<String>,
    /// Locators whose video transfer never finishes
    stalled_video: HashSet<String>,
    /// Locators whose audio transfer panics
    panicking_audio: HashSet<String>,
    resolve_delay: Duration,
    transfers: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeSource {
    fn with_video(mut self, locator: &str, title: &str, qualities: &[&'static str]) -> Self {
        self.videos.insert(
            locator.to_string(),
            FakeVideo {
                title: title.to_string(),
                qualities: qualities.to_vec(),
            },
        );
        self
    }

    fn with_playlist(mut self, locator: &str, entries: &[&str]) -> Self {
        self.playlists.insert(
            locator.to_string(),
            entries.iter().map(|e| e.to_string()).collect(),
        );
        self
    }

    fn transfers(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }
}

fn payload(url: &str) -> Vec<u8> {
    url.as_bytes().iter().copied().cycle().take(4096).collect()
}

fn descriptor(
    locator: &str,
    title: &str,
    kind: StreamKind,
    container: &str,
    quality: &str,
    progressive: bool,
) -> StreamDescriptor {
    let url = format!("{locator}/{kind}/{container}/{quality}/{progressive}");
    StreamDescriptor {
        kind,
        container: container.to_string(),
        quality: quality.to_string(),
        approx_size_bytes: Some(payload(&url).len() as u64),
        progressive,
        default_filename: format!("{title}.{container}"),
        url,
        codec: None,
    }
}

#[async_trait]
impl SourceProvider for FakeSource {
    async fn resolve(&self, locator: &Locator) -> Result<VideoCatalog, SourceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.resolve_delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let video = self
            .videos
            .get(locator.as_str())
            .ok_or_else(|| SourceError::not_found(locator.as_str()))?;
        let loc = locator.as_str();
        let title = video.title.as_str();

        let mut streams = vec![
            // A progressive stream that must never be picked
            descriptor(loc, title, StreamKind::Video, "webm", "4320p", true),
            descriptor(loc, title, StreamKind::Audio, "mp4", "48kbps", false),
            descriptor(loc, title, StreamKind::Audio, "webm", "160kbps", false),
            descriptor(loc, title, StreamKind::Audio, "mp4", "128kbps", false),
        ];
        for quality in &video.qualities {
            streams.push(descriptor(loc, title, StreamKind::Video, "webm", quality, false));
            streams.push(descriptor(loc, title, StreamKind::Video, "mp4", quality, false));
        }

        Ok(VideoCatalog {
            title: video.title.clone(),
            streams,
        })
    }

    async fn resolve_playlist(&self, locator: &Locator) -> Result<Playlist, SourceError> {
        let entries = self
            .playlists
            .get(locator.as_str())
            .ok_or_else(|| SourceError::not_found(locator.as_str()))?;
        Ok(Playlist {
            title: "Test playlist".to_string(),
            entries: entries.iter().map(|e| Locator::new(e.as_str())).collect(),
        })
    }

    async fn open_stream(
        &self,
        descriptor: &StreamDescriptor,
    ) -> Result<OpenedStream, SourceError> {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        let locator = descriptor.url.split('/').next().unwrap_or_default();

        if descriptor.kind == StreamKind::Audio && self.broken_audio.contains(locator) {
            return Err(SourceError::parse("unexpected response"));
        }
        if descriptor.kind == StreamKind::Audio && self.panicking_audio.contains(locator) {
            panic!("audio backend crashed");
        }

        let data = payload(&descriptor.url);
        let chunks: Vec<Result<Bytes, SourceError>> = data
            .chunks(1000)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        let stream = if descriptor.kind == StreamKind::Video && self.stalled_video.contains(locator)
        {
            futures::stream::iter(chunks.into_iter().take(1))
                .chain(futures::stream::pending())
                .boxed()
        } else {
            futures::stream::iter(chunks).boxed()
        };

        Ok(OpenedStream {
            stream,
            size_hint: Some(data.len() as u64),
        })
    }
}

/// Writes the video bytes followed by the audio bytes.
struct ConcatMuxer;

#[async_trait]
impl Muxer for ConcatMuxer {
    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        _cancel: &CancellationToken,
    ) -> Result<(), MuxError> {
        let mut data = tokio::fs::read(video).await?;
        data.extend(tokio::fs::read(audio).await?);
        tokio::fs::write(output, data).await?;
        Ok(())
    }
}

/// Always exits non-zero without writing anything.
struct BrokenMuxer;

#[async_trait]
impl Muxer for BrokenMuxer {
    async fn mux(
        &self,
        _video: &Path,
        _audio: &Path,
        _output: &Path,
        _cancel: &CancellationToken,
    ) -> Result<(), MuxError> {
        Err(MuxError::Failed {
            code: Some(1),
            stderr: "Invalid data found when processing input".into(),
        })
    }
}

/// Puts the final file in place, then never returns.
struct StallAfterCommitMuxer;

#[async_trait]
impl Muxer for StallAfterCommitMuxer {
    async fn mux(
        &self,
        _video: &Path,
        _audio: &Path,
        output: &Path,
        _cancel: &CancellationToken,
    ) -> Result<(), MuxError> {
        let name = output.file_name().unwrap().to_string_lossy();
        let final_path = output.with_file_name(name.replace(".merging.", "."));
        tokio::fs::write(final_path, b"merged").await?;
        std::future::pending::<()>().await;
        Ok(())
    }
}

#[derive(Default)]
struct RecordingFactory {
    updates: Arc<Mutex<Vec<(usize, ProgressUpdate)>>>,
}

struct RecordingSink {
    index: usize,
    updates: Arc<Mutex<Vec<(usize, ProgressUpdate)>>>,
}

impl ProgressSink for RecordingSink {
    fn on_progress(&self, update: &ProgressUpdate) {
        self.updates.lock().unwrap().push((self.index, *update));
    }
}

impl ProgressFactory for RecordingFactory {
    fn create(&self, index: usize, _locator: &Locator) -> Box<dyn ProgressSink> {
        Box::new(RecordingSink {
            index,
            updates: self.updates.clone(),
        })
    }
}

fn test_config() -> EngineConfig {
    EngineConfig {
        max_concurrent: 4,
        job_timeout_secs: 0,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 5,
        ..EngineConfig::default()
    }
}

fn pipeline(source: &Arc<FakeSource>, config: EngineConfig) -> Pipeline {
    Pipeline::new(source.clone(), Arc::new(ConcatMuxer), config)
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn test_max_policy_downloads_highest_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::default().with_video(
        "v1",
        "Clip",
        &["360p", "1080p", "720p"],
    ));
    let factory = Arc::new(RecordingFactory::default());
    let pipeline = pipeline(&source, test_config()).with_progress(factory.clone());

    let outcome = pipeline
        .run_single(Locator::new("v1"), dir.path(), ResolutionPolicy::Max)
        .await;

    let path = outcome.path().expect("job should complete").to_path_buf();
    assert!(outcome.is_completed());
    assert_eq!(files_in(dir.path()), vec!["Clip-1080p.mp4"]);

    // Merged content is the webm video followed by the best mp4 audio
    let mut expected = payload("v1/video/webm/1080p/false");
    expected.extend(payload("v1/audio/mp4/128kbps/false"));
    assert_eq!(std::fs::read(path).unwrap(), expected);
    assert_eq!(source.transfers(), 2);

    // Progress is monotonic and bounded per stream
    let updates = factory.updates.lock().unwrap();
    for kind in [StreamKind::Video, StreamKind::Audio] {
        let stream: Vec<&ProgressUpdate> = updates
            .iter()
            .filter(|(_, u)| u.kind == kind)
            .map(|(_, u)| u)
            .collect();
        assert!(!stream.is_empty());
        assert!(stream.windows(2).all(|w| w[0].downloaded <= w[1].downloaded));
        assert!(
            stream
                .iter()
                .all(|u| u.downloaded <= u.total.unwrap_or(u64::MAX))
        );
        assert_eq!(stream.last().unwrap().downloaded, 4096);
    }
}

#[tokio::test]
async fn test_exact_policy_produces_named_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::default().with_video(
        "v1",
        "Morning Talk",
        &["480p", "720p", "1080p"],
    ));

    let outcome = pipeline(&source, test_config())
        .run_single(
            Locator::new("v1"),
            dir.path(),
            ResolutionPolicy::Exact("720p".into()),
        )
        .await;

    assert!(outcome.is_completed());
    assert_eq!(files_in(dir.path()), vec!["Morning Talk-720p.mp4"]);
}

#[tokio::test]
async fn test_unavailable_resolution_fails_without_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::default().with_video("v1", "Clip", &["360p", "720p"]));

    let outcome = pipeline(&source, test_config())
        .run_single(
            Locator::new("v1"),
            dir.path(),
            ResolutionPolicy::Exact("1080p".into()),
        )
        .await;

    match outcome.status {
        JobStatus::Failed { step, error } => {
            assert_eq!(step, JobStep::Select);
            assert!(matches!(error, PipelineError::Selection(_)));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(source.transfers(), 0);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_second_run_performs_no_transfers() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::default().with_video("v1", "Clip", &["720p"]));
    let pipeline = pipeline(&source, test_config());

    let first = pipeline
        .run_single(Locator::new("v1"), dir.path(), ResolutionPolicy::Max)
        .await;
    assert!(first.is_completed());
    let after_first = source.transfers();

    let second = pipeline
        .run_single(Locator::new("v1"), dir.path(), ResolutionPolicy::Max)
        .await;
    assert!(second.is_skipped());
    assert_eq!(second.path(), first.path());
    assert_eq!(source.transfers(), after_first);
    assert_eq!(files_in(dir.path()), vec!["Clip-720p.mp4"]);
}

#[tokio::test]
async fn test_failure_after_video_download_removes_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = FakeSource::default().with_video("v1", "Clip", &["720p"]);
    source.broken_audio.insert("v1".to_string());
    let source = Arc::new(source);

    let outcome = pipeline(&source, test_config())
        .run_single(Locator::new("v1"), dir.path(), ResolutionPolicy::Max)
        .await;

    match outcome.status {
        JobStatus::Failed { step, error } => {
            assert_eq!(step, JobStep::Download(StreamKind::Audio));
            assert!(matches!(error, PipelineError::Download(_)));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    // Video transferred once, audio failed on its only attempt
    assert_eq!(source.transfers(), 2);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_playlist_isolates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(
        FakeSource::default()
            .with_video("a", "Alpha", &["720p", "1080p"])
            .with_video("b", "Beta", &["480p"])
            .with_video("c", "Gamma", &["720p"])
            .with_playlist("list", &["a", "b", "c"]),
    );

    let report = pipeline(&source, test_config())
        .run_playlist(
            &Locator::new("list"),
            dir.path(),
            ResolutionPolicy::Exact("720p".into()),
        )
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.completed(), 2);
    assert_eq!(report.failed(), 1);
    assert!(!report.is_success());
    let indexes: Vec<usize> = report.outcomes.iter().map(|o| o.index).collect();
    assert_eq!(indexes, vec![0, 1, 2]);
    assert!(report.outcomes[1].is_failed());
    assert_eq!(
        files_in(dir.path()),
        vec!["Alpha-720p.mp4", "Gamma-720p.mp4"]
    );
}

#[tokio::test]
async fn test_playlist_skips_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = FakeSource::default();
    let entries = ["p0", "p1", "p2", "p3", "p4"];
    for (i, entry) in entries.iter().enumerate() {
        source = source.with_video(entry, &format!("Episode {i}"), &["720p"]);
    }
    let source = Arc::new(source.with_playlist("list", &entries));
    std::fs::write(dir.path().join("Episode 2-720p.mp4"), b"done").unwrap();

    let report = pipeline(&source, test_config())
        .run_playlist(&Locator::new("list"), dir.path(), ResolutionPolicy::Max)
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 5);
    assert_eq!(report.completed(), 4);
    assert_eq!(report.skipped(), 1);
    assert!(report.outcomes[2].is_skipped());
    assert!(report.is_success());
    // Two transfers for each of the four downloaded items
    assert_eq!(source.transfers(), 8);
    assert_eq!(
        std::fs::read(dir.path().join("Episode 2-720p.mp4")).unwrap(),
        b"done"
    );
}

#[tokio::test]
async fn test_playlist_respects_concurrency_limit() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = FakeSource {
        resolve_delay: Duration::from_millis(20),
        ..FakeSource::default()
    };
    let entries: Vec<String> = (0..8).map(|i| format!("item{i}")).collect();
    for entry in &entries {
        source = source.with_video(entry, entry, &["360p"]);
    }
    let refs: Vec<&str> = entries.iter().map(String::as_str).collect();
    let source = Arc::new(source.with_playlist("list", &refs));

    let config = EngineConfig {
        max_concurrent: 2,
        ..test_config()
    };
    let report = pipeline(&source, config)
        .run_playlist(&Locator::new("list"), dir.path(), ResolutionPolicy::Max)
        .await
        .unwrap();

    assert_eq!(report.completed(), 8);
    let peak = source.max_in_flight.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 2, "peak in-flight was {peak}");
}

#[tokio::test]
async fn test_playlist_resolution_failure_is_run_level_error() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::default());

    let err = pipeline(&source, test_config())
        .run_playlist(&Locator::new("missing"), dir.path(), ResolutionPolicy::Max)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Resolve(SourceError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_stalled_job_times_out_and_is_cleaned() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = FakeSource::default()
        .with_video("slow", "Slow", &["720p"])
        .with_video("fast", "Fast", &["720p"])
        .with_playlist("list", &["slow", "fast"]);
    source.stalled_video.insert("slow".to_string());
    let source = Arc::new(source);

    let config = EngineConfig {
        job_timeout_secs: 1,
        ..test_config()
    };
    let report = pipeline(&source, config)
        .run_playlist(&Locator::new("list"), dir.path(), ResolutionPolicy::Max)
        .await
        .unwrap();

    match &report.outcomes[0].status {
        JobStatus::Failed { step, error } => {
            assert_eq!(*step, JobStep::Download(StreamKind::Video));
            assert!(matches!(error, PipelineError::Timeout { .. }));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(report.outcomes[1].is_completed());
    assert_eq!(files_in(dir.path()), vec!["Fast-720p.mp4"]);
}

#[tokio::test]
async fn test_cancelled_run_fails_every_job() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(
        FakeSource::default()
            .with_video("a", "A", &["720p"])
            .with_video("b", "B", &["720p"]),
    );
    let token = CancellationToken::new();
    let pipeline = pipeline(&source, test_config()).with_cancellation(token.clone());
    token.cancel();

    let jobs = ["a", "b"]
        .iter()
        .enumerate()
        .map(|(index, l)| tubemux_engine::DownloadJob {
            index,
            locator: Locator::new(*l),
            dest_dir: PathBuf::from(dir.path()),
            policy: ResolutionPolicy::Max,
        })
        .collect();
    let outcomes = pipeline.run_jobs(jobs).await;

    assert_eq!(outcomes.len(), 2);
    for outcome in outcomes {
        match outcome.status {
            JobStatus::Failed { error, .. } => assert!(error.is_cancelled()),
            other => panic!("expected cancellation, got {other:?}"),
        }
    }
    assert_eq!(source.transfers(), 0);
}

#[tokio::test]
async fn test_unusable_destination_fails_in_prepare_step() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();
    let source = Arc::new(FakeSource::default().with_video("v1", "Clip", &["720p"]));

    let outcome = pipeline(&source, test_config())
        .run_single(Locator::new("v1"), &blocker, ResolutionPolicy::Max)
        .await;

    match outcome.status {
        JobStatus::Failed { step, error } => {
            assert_eq!(step, JobStep::Prepare);
            assert!(matches!(error, PipelineError::Io(_)));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(source.transfers(), 0);
}

#[tokio::test]
async fn test_mux_failure_cleans_downloaded_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::default().with_video("v1", "Clip", &["720p"]));

    let outcome = Pipeline::new(source.clone(), Arc::new(BrokenMuxer), test_config())
        .run_single(Locator::new("v1"), dir.path(), ResolutionPolicy::Max)
        .await;

    match outcome.status {
        JobStatus::Failed { step, error } => {
            assert_eq!(step, JobStep::Merge);
            assert!(matches!(error, PipelineError::Merge(_)));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(source.transfers(), 2);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_panicking_job_is_failed_and_cleaned() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = FakeSource::default()
        .with_video("bad", "Bad", &["720p"])
        .with_video("good", "Good", &["720p"])
        .with_playlist("list", &["bad", "good"]);
    source.panicking_audio.insert("bad".to_string());
    let source = Arc::new(source);

    let report = pipeline(&source, test_config())
        .run_playlist(&Locator::new("list"), dir.path(), ResolutionPolicy::Max)
        .await
        .unwrap();

    match &report.outcomes[0].status {
        JobStatus::Failed { step, error } => {
            assert_eq!(*step, JobStep::Worker);
            assert!(matches!(error, PipelineError::Aborted { .. }));
        }
        other => panic!("expected abort, got {other:?}"),
    }
    assert!(report.outcomes[1].is_completed());
    // The video downloaded before the panic is gone
    assert_eq!(files_in(dir.path()), vec!["Good-720p.mp4"]);
}

#[tokio::test]
async fn test_deadline_after_merge_commit_keeps_completed_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::default().with_video("v1", "Clip", &["720p"]));
    let config = EngineConfig {
        job_timeout_secs: 1,
        ..test_config()
    };

    let outcome = Pipeline::new(source.clone(), Arc::new(StallAfterCommitMuxer), config)
        .run_single(Locator::new("v1"), dir.path(), ResolutionPolicy::Max)
        .await;

    assert!(outcome.is_completed(), "got {:?}", outcome.status);
    assert_eq!(files_in(dir.path()), vec!["Clip-720p.mp4"]);
    assert_eq!(
        std::fs::read(dir.path().join("Clip-720p.mp4")).unwrap(),
        b"merged"
    );
}
