use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::progress::{ProgressSink, ProgressState};
use super::retry::{RetryAction, RetryError, RetryPolicy, retry_with_backoff};
use crate::error::{DownloadError, SourceError};
use crate::media::StreamDescriptor;
use crate::source::SourceProvider;

/// Transfers selected streams to local files.
#[derive(Clone)]
pub struct Downloader {
    provider: Arc<dyn SourceProvider>,
    retry: RetryPolicy,
}

impl Downloader {
    pub fn new(provider: Arc<dyn SourceProvider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Stream `descriptor` into `dest_dir/filename`.
    ///
    /// Each retry truncates the file and restarts the transfer. Progress is
    /// reported to `sink` once per chunk and never goes backwards.
    pub async fn download(
        &self,
        descriptor: &StreamDescriptor,
        dest_dir: &Path,
        filename: &str,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        let path = dest_dir.join(filename);
        let state = ProgressState::new(descriptor.kind, descriptor.approx_size_bytes);
        let started = Instant::now();

        sink.on_start(descriptor, state.total());
        debug!(stream = %descriptor, path = %path.display(), "Starting transfer");

        let result = retry_with_backoff(&self.retry, cancel, |attempt| {
            self.attempt(descriptor, &path, &state, sink, cancel, attempt)
        })
        .await;

        match result {
            Ok(bytes) => {
                sink.on_finish(descriptor.kind, true);
                info!(
                    kind = %descriptor.kind,
                    quality = %descriptor.quality,
                    bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    path = %path.display(),
                    "Transfer complete"
                );
                Ok(path)
            }
            Err(RetryError::Cancelled) => {
                sink.on_finish(descriptor.kind, false);
                Err(DownloadError::Cancelled)
            }
            Err(RetryError::Failed { attempts, error }) => {
                sink.on_finish(descriptor.kind, false);
                Err(DownloadError::Failed {
                    path,
                    attempts,
                    source: error,
                })
            }
        }
    }

    async fn attempt(
        &self,
        descriptor: &StreamDescriptor,
        path: &Path,
        state: &ProgressState,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
        attempt: u32,
    ) -> RetryAction<u64, SourceError> {
        if attempt > 0 {
            state.restart();
            debug!(attempt, path = %path.display(), "Restarting transfer from zero");
        }

        match self.transfer(descriptor, path, state, sink, cancel).await {
            Ok(bytes) => RetryAction::Success(bytes),
            Err(e) if e.is_retryable() => RetryAction::Retry(e),
            Err(e) => RetryAction::Fail(e),
        }
    }

    async fn transfer(
        &self,
        descriptor: &StreamDescriptor,
        path: &Path,
        state: &ProgressState,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64, SourceError> {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(interrupted()),
            opened = self.provider.open_stream(descriptor) => opened?,
        };
        state.set_total_if_unknown(opened.size_hint);

        // `create` truncates whatever a previous attempt left behind
        let mut file = File::create(path).await?;
        let mut stream = opened.stream;
        let mut written = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(interrupted()),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk?;
            file.write_all(&chunk).await?;

            let len = chunk.len() as u64;
            written += len;
            sink.on_progress(&state.advance(len));
        }
        file.flush().await?;

        if let Some(expected) = opened.size_hint
            && written < expected
        {
            return Err(SourceError::from(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended after {written} of {expected} bytes"),
            )));
        }
        Ok(written)
    }
}

fn interrupted() -> SourceError {
    SourceError::from(io::Error::new(
        io::ErrorKind::Interrupted,
        "transfer cancelled",
    ))
}
