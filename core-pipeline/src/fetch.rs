//! Origin content fetching

use async_trait::async_trait;
use futures::TryStreamExt;
use std::time::Duration;
use tracing::debug;

use core_store::ByteStream;

use crate::error::{PipelineError, Result};

/// A streaming read of origin content.
pub struct OriginContent {
    /// Declared length, when the origin reports one.
    pub content_length: Option<u64>,
    pub stream: ByteStream,
}

/// Seam between the pipeline and the outside network.
///
/// Implementations must fail fast on a non-success response; retry policy is
/// deliberately not part of this contract.
#[async_trait]
pub trait OriginFetcher: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<OriginContent>;
}

/// Reqwest-based origin fetcher
///
/// Provides streaming downloads with connection pooling and TLS by default.
pub struct HttpOriginFetcher {
    client: reqwest::Client,
}

impl HttpOriginFetcher {
    /// Create a fetcher with the default request timeout.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(300))
    }

    /// Create a fetcher with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent("offline-vault-core/0.1.0")
            .build()
            .expect("Failed to build HTTP client");

        Self { client }
    }

    /// Create a fetcher over a preconfigured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpOriginFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OriginFetcher for HttpOriginFetcher {
    async fn fetch(&self, location: &str) -> Result<OriginContent> {
        let response = self
            .client
            .get(location)
            .send()
            .await
            .map_err(|e| PipelineError::UpstreamFetch(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::UpstreamFetch(format!(
                "origin returned status {}",
                status
            )));
        }

        let content_length = response.content_length();
        debug!(?content_length, "origin fetch started");

        let stream = response.bytes_stream().map_err(std::io::Error::other);

        Ok(OriginContent {
            content_length,
            stream: Box::pin(stream),
        })
    }
}
