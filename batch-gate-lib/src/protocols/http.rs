//! HTTP GET work units.
//!
//! `HttpFetcher` owns one shared `reqwest::Client` and turns request targets
//! into [`WorkUnit`]s. Transport concerns (timeouts, redirects, TLS) belong to
//! the client here, never to the gate.

use crate::error::BatchGateError;
use crate::types::WorkUnit;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Response summary of a successful GET.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse {
    /// The URL that was requested
    pub url: String,

    /// HTTP status code (always 2xx for a successful unit)
    pub status: u16,

    /// Size of the response body in bytes
    pub body_bytes: usize,

    /// Time from sending the request until the body was read
    pub elapsed: Duration,
}

/// Client that performs GET requests for batch work units.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    /// Shared HTTP client, cloned cheaply into every unit
    http_client: reqwest::Client,
    /// Timeout applied to each request
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher with the default 5 second request timeout.
    pub fn new() -> Result<Self, BatchGateError> {
        Self::with_timeout(Duration::from_secs(5))
    }

    /// Create a fetcher with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, BatchGateError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("batch-gate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                BatchGateError::network_with_source("Failed to create HTTP client", e.to_string())
            })?;

        Ok(Self {
            http_client,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `url` and read the body.
    ///
    /// # Errors
    ///
    /// - `HttpStatus` for any non-2xx status
    /// - `Timeout` when the request exceeds the configured timeout
    /// - `NetworkError` for connection and transport failures
    pub async fn fetch(&self, url: &str) -> Result<FetchResponse, BatchGateError> {
        let start_time = Instant::now();

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_error(url, e))?;

        let status = response.status();
        debug!(url, status = status.as_u16(), "response received");
        if !status.is_success() {
            return Err(BatchGateError::http_status(url, status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.map_error(url, e))?;

        Ok(FetchResponse {
            url: url.to_string(),
            status: status.as_u16(),
            body_bytes: body.len(),
            elapsed: start_time.elapsed(),
        })
    }

    /// Work unit that fetches `url` once admitted.
    pub fn unit<U: Into<String>>(&self, url: U) -> WorkUnit<FetchResponse> {
        let url = url.into();
        let fetcher = self.clone();
        WorkUnit::new(url.clone(), async move { fetcher.fetch(&url).await })
    }

    /// One work unit per target, in order.
    pub fn units(&self, urls: &[String]) -> Vec<WorkUnit<FetchResponse>> {
        urls.iter().map(|url| self.unit(url.as_str())).collect()
    }

    fn map_error(&self, url: &str, err: reqwest::Error) -> BatchGateError {
        if err.is_timeout() {
            BatchGateError::timeout(format!("GET {}", url), self.timeout)
        } else {
            BatchGateError::from(err)
        }
    }
}
