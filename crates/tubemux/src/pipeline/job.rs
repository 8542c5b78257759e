use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{error, info, warn};

use super::orchestrator::Pipeline;
use crate::download::ProgressSink;
use crate::error::PipelineError;
use crate::media::{Locator, ResolutionPolicy, StreamKind};
use crate::naming::OutputNames;

/// One video to fetch, select, download and merge.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    /// Position in the playlist, 0 for a single video
    pub index: usize,
    pub locator: Locator,
    pub dest_dir: PathBuf,
    pub policy: ResolutionPolicy,
}

/// Where a job was when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStep {
    Resolve,
    Select,
    /// Checking for the final file and creating the destination directory
    Prepare,
    Download(StreamKind),
    Merge,
    /// The job panicked or its task died before reporting
    Worker,
}

impl fmt::Display for JobStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStep::Resolve => f.write_str("resolve"),
            JobStep::Select => f.write_str("select"),
            JobStep::Prepare => f.write_str("prepare"),
            JobStep::Download(kind) => write!(f, "download {kind}"),
            JobStep::Merge => f.write_str("merge"),
            JobStep::Worker => f.write_str("worker"),
        }
    }
}

#[derive(Debug)]
pub enum JobStatus {
    Completed { path: PathBuf },
    /// The final file was already present, nothing was transferred
    Skipped { path: PathBuf },
    Failed { step: JobStep, error: PipelineError },
}

#[derive(Debug)]
pub struct JobOutcome {
    pub index: usize,
    pub locator: Locator,
    pub status: JobStatus,
    pub elapsed: Duration,
}

impl JobOutcome {
    pub(crate) fn failed(job: &DownloadJob, step: JobStep, error: PipelineError) -> Self {
        Self {
            index: job.index,
            locator: job.locator.clone(),
            status: JobStatus::Failed { step, error },
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, JobStatus::Completed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, JobStatus::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, JobStatus::Failed { .. })
    }

    /// The final file, for completed and skipped jobs.
    pub fn path(&self) -> Option<&Path> {
        match &self.status {
            JobStatus::Completed { path } | JobStatus::Skipped { path } => Some(path),
            JobStatus::Failed { .. } => None,
        }
    }
}

enum Finished {
    Completed(PathBuf),
    Skipped(PathBuf),
}

// Lives outside the job future so it survives the future being dropped by
// the deadline.
struct JobArtifacts {
    step: JobStep,
    names: Option<OutputNames>,
}

impl Pipeline {
    /// Run one job to a terminal outcome. Never fails: errors end up in the
    /// returned status after the job's temp files have been cleaned.
    pub(crate) async fn run_job(&self, job: DownloadJob) -> JobOutcome {
        let started = Instant::now();
        let sink = self.progress.create(job.index, &job.locator);
        let mut artifacts = JobArtifacts {
            step: JobStep::Resolve,
            names: None,
        };

        let result = {
            // Panics are caught inside the job so `artifacts` stays readable
            let work = AssertUnwindSafe(self.execute(&job, &mut artifacts, sink.as_ref()))
                .catch_unwind()
                .map(|caught| {
                    caught.unwrap_or_else(|payload| {
                        Err(PipelineError::Aborted {
                            reason: panic_reason(payload.as_ref()),
                        })
                    })
                });
            match self.config.job_timeout() {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(result) => result,
                    Err(_) => Err(PipelineError::Timeout { after: limit }),
                },
                None => work.await,
            }
        };

        let result = match result {
            Err(error @ PipelineError::Timeout { .. }) if artifacts.step == JobStep::Merge => {
                self.recover_merged(&job, &artifacts, error).await
            }
            other => other,
        };

        let status = match result {
            Ok(Finished::Completed(path)) => JobStatus::Completed { path },
            Ok(Finished::Skipped(path)) => JobStatus::Skipped { path },
            Err(error) => {
                let step = artifacts.step;
                if error.is_cancelled() {
                    warn!(locator = %job.locator, step = %step, "Job cancelled");
                } else {
                    error!(locator = %job.locator, step = %step, error = %error, "Job failed");
                }
                self.discard_temp_files(&job, &artifacts).await;
                let step = match error {
                    PipelineError::Aborted { .. } => JobStep::Worker,
                    _ => step,
                };
                JobStatus::Failed { step, error }
            }
        };

        JobOutcome {
            index: job.index,
            locator: job.locator,
            status,
            elapsed: started.elapsed(),
        }
    }

    async fn discard_temp_files(&self, job: &DownloadJob, artifacts: &JobArtifacts) {
        let Some(names) = &artifacts.names else {
            return;
        };
        let summary = self.cleanup.on_failure(job, &names.temp_paths()).await;
        if !summary.is_clean() {
            warn!(
                locator = %job.locator,
                leftovers = summary.failed.len(),
                "Some partial outputs could not be removed"
            );
        }
    }

    /// The deadline can fire after the merger has renamed the output into
    /// place. The final file did not exist when the job started, so finding
    /// it now means the merge committed and only input removal was cut short.
    async fn recover_merged(
        &self,
        job: &DownloadJob,
        artifacts: &JobArtifacts,
        error: PipelineError,
    ) -> Result<Finished, PipelineError> {
        let Some(names) = &artifacts.names else {
            return Err(error);
        };
        if !tokio::fs::try_exists(&names.final_path)
            .await
            .unwrap_or(false)
        {
            return Err(error);
        }
        warn!(
            locator = %job.locator,
            path = %names.final_path.display(),
            "Deadline reached after the merged file was written, keeping it"
        );
        self.discard_temp_files(job, artifacts).await;
        Ok(Finished::Completed(names.final_path.clone()))
    }

    async fn execute(
        &self,
        job: &DownloadJob,
        artifacts: &mut JobArtifacts,
        sink: &dyn ProgressSink,
    ) -> Result<Finished, PipelineError> {
        artifacts.step = JobStep::Resolve;
        let catalog = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
            catalog = self.provider.resolve(&job.locator) => catalog?,
        };

        artifacts.step = JobStep::Select;
        let selection = self.selector.select(&catalog, &job.policy)?;
        let names = OutputNames::new(
            &job.dest_dir,
            &selection.video,
            &selection.audio,
            self.config.output_container(),
        );

        artifacts.step = JobStep::Prepare;
        if tokio::fs::try_exists(&names.final_path).await? {
            info!(locator = %job.locator, path = %names.final_path.display(), "Already downloaded, skipping");
            return Ok(Finished::Skipped(names.final_path));
        }
        tokio::fs::create_dir_all(&job.dest_dir).await?;
        artifacts.names = Some(names.clone());

        info!(
            locator = %job.locator,
            title = %catalog.title,
            video = %selection.video.quality,
            audio = %selection.audio.quality,
            output = %names.file_name(),
            "Downloading"
        );

        artifacts.step = JobStep::Download(StreamKind::Video);
        let video = self
            .downloader
            .download(
                &selection.video,
                &job.dest_dir,
                &file_name(&names.video_path),
                sink,
                &self.cancel,
            )
            .await?;

        artifacts.step = JobStep::Download(StreamKind::Audio);
        let audio = self
            .downloader
            .download(
                &selection.audio,
                &job.dest_dir,
                &file_name(&names.audio_path),
                sink,
                &self.cancel,
            )
            .await?;

        artifacts.step = JobStep::Merge;
        let path = self
            .merger
            .merge(&video, &audio, &names.final_path, &self.cancel)
            .await?;

        info!(locator = %job.locator, path = %path.display(), "Job complete");
        Ok(Finished::Completed(path))
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("task panicked: {message}")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
