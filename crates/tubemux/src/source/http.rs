use std::time::Duration;

use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use tracing::debug;

use super::OpenedStream;
use crate::config::DEFAULT_USER_AGENT;
use crate::error::SourceError;

/// HTTP client settings for stream transfers.
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    pub user_agent: String,
    /// Time allowed to establish the connection
    pub connect_timeout: Duration,
    /// Maximum silence between two chunks, zero disables it
    pub read_timeout: Duration,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
        }
    }
}

/// Streams remote payloads chunk by chunk.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpFetcherConfig) -> Result<Self, SourceError> {
        let mut builder = Client::builder()
            .pool_max_idle_per_host(5)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10));

        if !config.connect_timeout.is_zero() {
            builder = builder.connect_timeout(config.connect_timeout);
        }
        if !config.read_timeout.is_zero() {
            builder = builder.read_timeout(config.read_timeout);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Issue a GET and hand back the body as a chunk stream.
    pub async fn open(&self, url: &str) -> Result<OpenedStream, SourceError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                status,
                url: url.to_string(),
            });
        }

        let size_hint = response.content_length();
        debug!(url = %url, size = ?size_hint, "Opened stream");

        let stream = response.bytes_stream().map_err(SourceError::from).boxed();
        Ok(OpenedStream { stream, size_hint })
    }
}
