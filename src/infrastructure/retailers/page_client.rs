//! HTTP page client shared by the retailer fetchers

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::shared::errors::{AppError, FetchError};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Thin wrapper over `reqwest::Client` that maps transport outcomes onto `FetchError`
#[derive(Clone)]
pub struct PageClient {
    http: Client,
}

impl PageClient {
    /// Create new page client with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http })
    }

    /// GET a product page and return its body
    pub async fn get_page(&self, url: &str) -> Result<String, FetchError> {
        debug!(url, "fetching product page");

        let response = self.http.get(url).send().await.map_err(map_transport_error)?;
        let status = response.status();
        if let Some(err) = classify_status(status) {
            return Err(err);
        }

        response.text().await.map_err(map_transport_error)
    }
}

fn map_transport_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::NetworkError(err.to_string())
    }
}

/// Map a non-success HTTP status onto the fetch error taxonomy
pub fn classify_status(status: StatusCode) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => FetchError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => FetchError::Timeout,
        other => FetchError::NetworkError(format!("HTTP {}", other)),
    })
}
