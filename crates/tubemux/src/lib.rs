//! # tubemux engine
//!
//! Fetches remote videos as separate video-only and audio-only streams,
//! downloads both with per-job progress reporting and multiplexes them into a
//! single file without re-encoding.
//!
//! The engine is organised as a small pipeline:
//!
//! - [`source`]: resolves a locator into a stream catalog or a playlist
//! - [`selector`]: picks exactly one video and one audio stream
//! - [`download`]: chunked transfers with bounded retries and progress sinks
//! - [`merge`]: muxes the two elementary streams into the final file
//! - [`cleanup`]: best-effort removal of partial artifacts
//! - [`pipeline`]: the per-video job and the bounded playlist fan-out
//!
//! The network client and the multiplexer are reached only through the
//! [`SourceProvider`] and [`Muxer`] traits.

pub mod cleanup;
pub mod config;
pub mod download;
pub mod error;
pub mod media;
pub mod merge;
pub mod naming;
pub mod pipeline;
mod process;
pub mod selector;
pub mod source;

pub use cleanup::{CleanupHandler, CleanupSummary};
pub use config::EngineConfig;
pub use download::{
    Downloader, NoopProgress, NoopProgressFactory, ProgressFactory, ProgressSink, ProgressState,
    ProgressUpdate, RetryPolicy,
};
pub use error::{
    CleanupError, DownloadError, MergeError, MuxError, PipelineError, SelectionError, SourceError,
};
pub use media::{Locator, Playlist, ResolutionPolicy, StreamDescriptor, StreamKind, VideoCatalog};
pub use merge::{FfmpegMuxer, MediaMerger, Muxer};
pub use naming::OutputNames;
pub use pipeline::{DownloadJob, JobOutcome, JobStatus, JobStep, Pipeline, RunReport};
pub use selector::{SelectionConfig, StreamSelection, StreamSelector};
pub use source::{
    ByteStream, HttpFetcher, HttpFetcherConfig, OpenedStream, SourceProvider, YtDlpConfig,
    YtDlpProvider,
};
