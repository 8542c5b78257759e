use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;

use crate::media::StreamKind;

/// Errors raised while resolving a locator or transferring stream bytes.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("no such video or playlist: {locator}")]
    NotFound { locator: String },

    #[error("network error: {reason}")]
    Network { reason: String },

    #[error("HTTP request failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("failed to parse source response: {reason}")]
    Parse { reason: String },

    #[error("{tool} failed: {reason}")]
    Tool { tool: String, reason: String },
}

impl SourceError {
    pub fn not_found(locator: impl Into<String>) -> Self {
        Self::NotFound {
            locator: locator.into(),
        }
    }

    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network {
            reason: reason.into(),
        }
    }

    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    pub fn tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Whether a transfer that failed with this error is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::Parse { .. } | Self::Tool { .. } => false,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Http { source } => is_retryable_reqwest_error(source),
            Self::Io { source } => is_transient_io(source.kind()),
            Self::Network { .. } => true,
        }
    }
}

/// Interrupted or truncated transfers are worth another attempt. Local disk
/// failures (permissions, missing directory, full storage) are not.
fn is_transient_io(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind;
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::Interrupted
            | ErrorKind::TimedOut
            | ErrorKind::WouldBlock
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}

/// Retryable: connect, timeout, request, body read, and decode errors.
/// Non-retryable: redirect and builder errors.
pub fn is_retryable_reqwest_error(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() || e.is_decode()
}

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("no {kind} stream available matching {requirement}")]
    StreamNotAvailable {
        kind: StreamKind,
        requirement: String,
    },
}

impl SelectionError {
    pub fn not_available(kind: StreamKind, requirement: impl Into<String>) -> Self {
        Self::StreamNotAvailable {
            kind,
            requirement: requirement.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("download cancelled")]
    Cancelled,

    #[error("transfer of {path} failed after {attempts} attempt(s): {source}")]
    Failed {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: SourceError,
    },
}

/// Failures of the external multiplexer.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("muxer exited with {}: {stderr}", describe_exit(.code))]
    Failed { code: Option<i32>, stderr: String },

    #[error("muxer did not produce {path}")]
    MissingOutput { path: PathBuf },

    #[error("I/O error while muxing: {0}")]
    Io(#[from] std::io::Error),

    #[error("mux cancelled")]
    Cancelled,
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "signal".to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("mux failed: {0}")]
    Mux(#[from] MuxError),

    #[error("failed to {operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MergeError {
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Best-effort cleanup failure. Logged and swallowed, never escalated.
#[derive(Debug, thiserror::Error)]
#[error("failed to remove {path}: {source}")]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Job-level error that aborts a single video pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("resolve failed: {0}")]
    Resolve(#[from] SourceError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },

    #[error("job cancelled")]
    Cancelled,

    #[error("job task aborted: {reason}")]
    Aborted { reason: String },
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::Download(DownloadError::Cancelled)
                | Self::Merge(MergeError::Mux(MuxError::Cancelled))
        )
    }
}
