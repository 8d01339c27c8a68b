use crate::config::FetchConfig;
use crate::types::{Result, SourceError, SourceType};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Shared HTTP client for all adapters.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self { client })
    }

    /// GET `url` and decode the body as JSON.
    ///
    /// Non-2xx statuses and transport failures become
    /// [`SourceError::Upstream`], undecodable bodies
    /// [`SourceError::MalformedResponse`]. If `cancel` fires first the
    /// request future is dropped, which aborts the connection.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        source_type: SourceType,
        url: Url,
        cancel: &CancellationToken,
    ) -> std::result::Result<T, SourceError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("{} request cancelled", source_type);
                Err(SourceError::Cancelled)
            }
            result = self.fetch_json(source_type, url) => result,
        }
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        source_type: SourceType,
        url: Url,
    ) -> std::result::Result<T, SourceError> {
        let start_time = Instant::now();
        debug!("Fetching {} page: {}", source_type, url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SourceError::network(source_type, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::status(source_type, status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::network(source_type, e.to_string()))?;

        debug!(
            "Fetched {} ({} bytes in {}ms)",
            url,
            body.len(),
            start_time.elapsed().as_millis()
        );

        serde_json::from_str(&body).map_err(|e| SourceError::malformed(source_type, e.to_string()))
    }
}
