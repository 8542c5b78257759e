use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::error::CleanupError;
use crate::pipeline::DownloadJob;

/// What a cleanup pass did.
#[derive(Debug, Default)]
pub struct CleanupSummary {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<CleanupError>,
}

impl CleanupSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Best-effort removal of the temp files of an aborted job.
#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupHandler;

impl CleanupHandler {
    pub fn new() -> Self {
        Self
    }

    /// Delete every path the job may have created. Missing files are fine,
    /// other failures are logged and returned, never raised.
    pub async fn on_failure(&self, job: &DownloadJob, paths: &[PathBuf]) -> CleanupSummary {
        let mut summary = CleanupSummary::default();

        for path in paths {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    info!(locator = %job.locator, path = %path.display(), "Cleaned up partial output");
                    summary.removed.push(path.clone());
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(path = %path.display(), "Nothing to clean up");
                }
                Err(source) => {
                    let err = CleanupError {
                        path: path.clone(),
                        source,
                    };
                    warn!(locator = %job.locator, error = %err, "Failed to clean up partial output");
                    summary.failed.push(err);
                }
            }
        }

        summary
    }
}
