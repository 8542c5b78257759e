//! Stream catalog resolution and byte transfer.
//!
//! [`SourceProvider`] is the seam between the pipeline and the network. The
//! bundled [`YtDlpProvider`] enumerates formats through `yt-dlp` and fetches
//! bytes over plain HTTP with [`HttpFetcher`].

mod http;
mod ytdlp;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::SourceError;
use crate::media::{Locator, Playlist, StreamDescriptor, VideoCatalog};

pub use http::{HttpFetcher, HttpFetcherConfig};
pub use ytdlp::{YtDlpConfig, YtDlpProvider};

/// Chunked payload of one stream.
pub type ByteStream = BoxStream<'static, Result<Bytes, SourceError>>;

/// An opened transfer: the byte stream plus the size the transport announced.
pub struct OpenedStream {
    pub stream: ByteStream,
    pub size_hint: Option<u64>,
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field("size_hint", &self.size_hint)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// List every stream available for a single video.
    async fn resolve(&self, locator: &Locator) -> Result<VideoCatalog, SourceError>;

    /// Expand a playlist into its video locators, in playlist order.
    async fn resolve_playlist(&self, locator: &Locator) -> Result<Playlist, SourceError>;

    /// Start transferring the bytes of one stream.
    async fn open_stream(&self, descriptor: &StreamDescriptor)
    -> Result<OpenedStream, SourceError>;
}
