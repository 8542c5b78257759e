use std::sync::atomic::{AtomicU64, Ordering};

use crate::media::{Locator, StreamDescriptor, StreamKind};

const UNKNOWN_TOTAL: u64 = u64::MAX;

/// One progress notification, emitted once per received chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub kind: StreamKind,
    pub chunk_bytes: u64,
    /// Cumulative bytes, never decreasing and never above `total`
    pub downloaded: u64,
    pub total: Option<u64>,
}

impl ProgressUpdate {
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some(self.downloaded as f64 / total as f64),
            None => None,
        }
    }
}

/// Receives the progress of the streams of a single job.
///
/// Every job gets its own sink from a [`ProgressFactory`], so implementations
/// never see interleaved updates from different jobs.
pub trait ProgressSink: Send + Sync {
    fn on_start(&self, _descriptor: &StreamDescriptor, _total: Option<u64>) {}

    fn on_progress(&self, update: &ProgressUpdate);

    fn on_finish(&self, _kind: StreamKind, _success: bool) {}
}

/// Creates one sink per job.
pub trait ProgressFactory: Send + Sync {
    fn create(&self, index: usize, locator: &Locator) -> Box<dyn ProgressSink>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_progress(&self, _update: &ProgressUpdate) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressFactory;

impl ProgressFactory for NoopProgressFactory {
    fn create(&self, _index: usize, _locator: &Locator) -> Box<dyn ProgressSink> {
        Box::new(NoopProgress)
    }
}

/// Byte counters of one stream transfer.
///
/// A retry restarts `downloaded` from zero while the reported value stays at
/// its high-water mark, so sinks only ever see a non-decreasing sequence.
#[derive(Debug)]
pub struct ProgressState {
    kind: StreamKind,
    total: AtomicU64,
    downloaded: AtomicU64,
    reported: AtomicU64,
}

impl ProgressState {
    pub fn new(kind: StreamKind, total: Option<u64>) -> Self {
        Self {
            kind,
            total: AtomicU64::new(total.unwrap_or(UNKNOWN_TOTAL)),
            downloaded: AtomicU64::new(0),
            reported: AtomicU64::new(0),
        }
    }

    pub fn total(&self) -> Option<u64> {
        match self.total.load(Ordering::Relaxed) {
            UNKNOWN_TOTAL => None,
            total => Some(total),
        }
    }

    /// Adopt the transport's size when the catalog had none.
    pub fn set_total_if_unknown(&self, hint: Option<u64>) {
        if let Some(hint) = hint.filter(|h| *h != UNKNOWN_TOTAL) {
            let _ = self.total.compare_exchange(
                UNKNOWN_TOTAL,
                hint,
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
        }
    }

    /// Start a new attempt from byte zero.
    pub fn restart(&self) {
        self.downloaded.store(0, Ordering::Relaxed);
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    pub fn reported(&self) -> u64 {
        self.reported.load(Ordering::Relaxed)
    }

    /// Account for a received chunk and build the update to report.
    pub fn advance(&self, chunk_bytes: u64) -> ProgressUpdate {
        let downloaded = self
            .downloaded
            .fetch_add(chunk_bytes, Ordering::Relaxed)
            .saturating_add(chunk_bytes);
        let total = self.total();
        let bounded = total.map_or(downloaded, |t| downloaded.min(t));
        let previous = self.reported.fetch_max(bounded, Ordering::Relaxed);

        ProgressUpdate {
            kind: self.kind,
            chunk_bytes,
            downloaded: previous.max(bounded),
            total,
        }
    }
}
