use std::time::Duration;

use prospector_core::error::AppError;
use prospector_core::traits::Fetcher;
use reqwest::{Client, StatusCode};

pub const USER_AGENT: &str = "ProspectResearchBot/1.0";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP fetcher using reqwest.
///
/// Downloads raw HTML with the bot User-Agent and a per-request timeout.
/// Status codes map onto [`AppError`] so the retry policy can tell transient
/// failures (5xx, 429, timeouts, connection errors) from permanent ones.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }
}

/// Map a reqwest transport error onto [`AppError`].
pub(crate) fn transport_error(e: reqwest::Error, timeout_secs: u64) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(timeout_secs)
    } else if e.is_connect() {
        AppError::NetworkError(format!("Connection failed: {e}"))
    } else {
        AppError::HttpError(e.to_string())
    }
}

/// Map a non-success status onto [`AppError`].
pub(crate) fn status_error(status: StatusCode, url: &str) -> AppError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        AppError::RateLimitExceeded
    } else {
        AppError::HttpError(format!("HTTP {} for {url}", status.as_u16()))
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, url));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))
    }
}
