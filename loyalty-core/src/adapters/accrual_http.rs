//! Accrual authority HTTP client
//!
//! Talks to the external accrual service:
//! - `GET {base}/api/orders/{number}`
//! - 200 with `{"order", "status", "accrual"?}`
//! - 204 when the order is not registered there
//! - 429 with a `Retry-After` header (seconds) when throttled

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};

use crate::domain::result::{Error, Result};
use crate::domain::AccrualReport;
use crate::ports::AccrualAuthority;

/// Per-request timeout when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Back-off used when a 429 carries no usable `Retry-After`
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// HTTP client for the accrual authority
#[derive(Debug, Clone)]
pub struct HttpAccrualClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpAccrualClient {
    /// Create a client for the authority at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(Error::Config("accrual system address is empty".into()));
        }
        let base_url = if base_url.contains("://") {
            base_url.to_string()
        } else {
            format!("http://{base_url}")
        };

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_request_error(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::authority(format!("request timed out after {:?}", self.timeout))
        } else if error.is_connect() {
            Error::authority(format!("unable to connect to {}", self.base_url))
        } else {
            Error::authority(format!("request failed: {error}"))
        }
    }
}

/// Seconds from a `Retry-After` header. HTTP-date values fall back to the
/// default.
fn retry_after(response: &Response) -> Duration {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

#[async_trait]
impl AccrualAuthority for HttpAccrualClient {
    async fn order_status(&self, order_id: &str) -> Result<Option<AccrualReport>> {
        let url = format!("{}/api/orders/{}", self.base_url, order_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        match response.status() {
            StatusCode::OK => {
                let report: AccrualReport = response.json().await.map_err(|e| {
                    Error::authority(format!("invalid response for order {order_id}: {e}"))
                })?;
                Ok(Some(report))
            }
            StatusCode::NO_CONTENT => Ok(None),
            StatusCode::TOO_MANY_REQUESTS => Err(Error::RateLimited {
                retry_after: retry_after(&response),
            }),
            status => Err(Error::authority(format!(
                "unexpected HTTP {} for order {}",
                status.as_u16(),
                order_id
            ))),
        }
    }
}
