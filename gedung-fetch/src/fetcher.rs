use crate::error::{FetchError, Result};
use crate::result::{FetchOutcome, FetchedImage};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Downloads one image per call. No retries.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: Client,
    timeout: Duration,
}

impl ImageFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("Gedung/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(timeout)
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        match self.try_fetch(url).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(url = %url, timeout = e.is_timeout(), "Fetch failed: {}", e);
                FetchOutcome::Failed(e)
            }
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::HttpError(err)
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<FetchOutcome> {
        let parsed =
            Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;

        debug!("Fetching {}", parsed);
        let start = Instant::now();
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(url = %url, status = status.as_u16(), "Download rejected");
            return Ok(FetchOutcome::DownloadError {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response_time = start.elapsed();
        let image = image::load_from_memory(&body)?;

        debug!(
            url = %url,
            bytes = body.len(),
            width = image.width(),
            height = image.height(),
            elapsed_ms = response_time.as_millis() as u64,
            "Image decoded"
        );

        Ok(FetchOutcome::Image(FetchedImage {
            url: url.to_string(),
            image,
            content_length: body.len(),
            response_time,
        }))
    }
}
