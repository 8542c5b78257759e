use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::job::{DownloadJob, JobOutcome, JobStep};
use crate::cleanup::CleanupHandler;
use crate::config::EngineConfig;
use crate::download::{Downloader, NoopProgressFactory, ProgressFactory};
use crate::error::PipelineError;
use crate::media::{Locator, ResolutionPolicy};
use crate::merge::{MediaMerger, Muxer};
use crate::selector::StreamSelector;
use crate::source::SourceProvider;

/// Outcomes of a playlist run, ordered by playlist index.
#[derive(Debug)]
pub struct RunReport {
    pub title: String,
    pub outcomes: Vec<JobOutcome>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_completed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skipped()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Drives the per-video pipeline for single videos and playlists.
#[derive(Clone)]
pub struct Pipeline {
    pub(super) provider: Arc<dyn SourceProvider>,
    pub(super) selector: StreamSelector,
    pub(super) downloader: Downloader,
    pub(super) merger: MediaMerger,
    pub(super) cleanup: CleanupHandler,
    pub(super) progress: Arc<dyn ProgressFactory>,
    pub(super) config: EngineConfig,
    pub(super) cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn SourceProvider>,
        muxer: Arc<dyn Muxer>,
        config: EngineConfig,
    ) -> Self {
        Self {
            selector: StreamSelector::new(config.selection()),
            downloader: Downloader::new(provider.clone(), config.retry_policy()),
            merger: MediaMerger::new(muxer),
            cleanup: CleanupHandler::new(),
            progress: Arc::new(NoopProgressFactory),
            cancel: CancellationToken::new(),
            provider,
            config,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressFactory>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Token observed by every job. Cancelling it stops all running jobs.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fetch a single video.
    pub async fn run_single(
        &self,
        locator: Locator,
        dest_dir: &Path,
        policy: ResolutionPolicy,
    ) -> JobOutcome {
        self.run_job(DownloadJob {
            index: 0,
            locator,
            dest_dir: dest_dir.to_path_buf(),
            policy,
        })
        .await
    }

    /// Expand a playlist and fetch every entry on the bounded pool.
    ///
    /// Only a failure to resolve the playlist itself is returned as an
    /// error; per-video failures are recorded in the report.
    pub async fn run_playlist(
        &self,
        locator: &Locator,
        dest_dir: &Path,
        policy: ResolutionPolicy,
    ) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        let playlist = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
            playlist = self.provider.resolve_playlist(locator) => playlist?,
        };

        info!(
            locator = %locator,
            title = %playlist.title,
            entries = playlist.len(),
            max_concurrent = self.config.concurrency(),
            "Starting playlist"
        );

        let jobs = playlist
            .entries
            .into_iter()
            .enumerate()
            .map(|(index, locator)| DownloadJob {
                index,
                locator,
                dest_dir: dest_dir.to_path_buf(),
                policy: policy.clone(),
            })
            .collect();
        let outcomes = self.run_jobs(jobs).await;

        let report = RunReport {
            title: playlist.title,
            outcomes,
            elapsed: started.elapsed(),
        };
        info!(
            completed = report.completed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Playlist finished"
        );
        Ok(report)
    }

    /// Run independent jobs with at most `max_concurrent` in flight.
    ///
    /// Returns one outcome per job, sorted by index, once every job is
    /// terminal. A panicking job becomes a failed outcome.
    pub async fn run_jobs(&self, jobs: Vec<DownloadJob>) -> Vec<JobOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency()));
        let mut tasks = JoinSet::new();
        let mut pending = HashMap::with_capacity(jobs.len());

        for job in jobs {
            let semaphore = semaphore.clone();
            let this = self.clone();
            let fallback = job.clone();
            let handle = tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return JobOutcome::failed(&job, JobStep::Resolve, PipelineError::Cancelled);
                };
                this.run_job(job).await
            });
            pending.insert(handle.id(), fallback);
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, outcome)) => {
                    pending.remove(&id);
                    outcomes.push(outcome);
                }
                Err(e) => {
                    let Some(job) = pending.remove(&e.id()) else {
                        continue;
                    };
                    let reason = if e.is_panic() {
                        "task panicked".to_string()
                    } else {
                        e.to_string()
                    };
                    error!(locator = %job.locator, error = %reason, "Job task aborted");
                    outcomes.push(JobOutcome::failed(
                        &job,
                        JobStep::Worker,
                        PipelineError::Aborted { reason },
                    ));
                }
            }
        }

        outcomes.sort_by_key(|o| o.index);
        outcomes
    }
}
