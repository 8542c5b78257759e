//! Chunked stream transfers with bounded retries and per-job progress.

mod manager;
mod progress;
mod retry;

pub use manager::Downloader;
pub use progress::{
    NoopProgress, NoopProgressFactory, ProgressFactory, ProgressSink, ProgressState,
    ProgressUpdate,
};
pub use retry::{RetryAction, RetryError, RetryPolicy, retry_with_backoff};
