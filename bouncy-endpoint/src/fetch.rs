//! Outbound HTTP GETs: signing certificates and subscription confirmations.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{error, info};

use crate::error::FetchError;

/// A completed HTTP exchange. Non-2xx statuses are still responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded lossily as UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Something that can perform a single blocking-style GET.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

/// `reqwest`-backed fetcher with a per-request timeout.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        info!(
            url = url,
            timeout_seconds = self.timeout.as_secs_f64(),
            "http_fetch_starting"
        );

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!(url = url, error = %e, "http_fetch_timeout");
                } else {
                    error!(url = url, error = %e, "http_fetch_error");
                }
                FetchError {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            error!(url = url, status_code = status, error = %e, "http_fetch_body_error");
            FetchError {
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;

        info!(
            url = url,
            status_code = status,
            body_length = body.len(),
            "http_fetch_complete"
        );

        Ok(FetchResponse {
            status,
            body: body.to_vec(),
        })
    }
}
