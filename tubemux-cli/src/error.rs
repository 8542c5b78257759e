use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Source error: {0}")]
    Source(#[from] tubemux_engine::SourceError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] tubemux_engine::PipelineError),
}

pub type Result<T> = std::result::Result<T, AppError>;
