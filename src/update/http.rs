//! Shared HTTP client for the release index and asset downloads.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, error};

use crate::constants::{CONNECT_TIMEOUT, DEFAULT_API_BASE, DEFAULT_REQUEST_TIMEOUT_SECS, USER_AGENT};
use crate::core::{Result, UpdateError};

/// Environment variable holding an optional GitHub token.
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// A configured client plus the timeouts every request is held to.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    api_base: String,
    token: Option<String>,
    request_timeout: Duration,
}

impl HttpClient {
    /// Build a client for the index at `api_base`.
    ///
    /// The bearer token is read from `GITHUB_TOKEN` and only ever sent to `api_base`.
    pub fn new(api_base: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| UpdateError::transport("building HTTP client", e))?;

        let token = std::env::var(GITHUB_TOKEN_ENV).ok().filter(|t| !t.trim().is_empty());

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
            request_timeout,
        })
    }

    /// Client for the public GitHub API with default timeouts.
    pub fn github() -> Result<Self> {
        Self::new(DEFAULT_API_BASE, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Bound on a single request and on the wait for each body chunk.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// A GET request, authorized when it targets the index.
    pub fn get(&self, url: &str) -> RequestBuilder {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            if url.starts_with(&self.api_base) {
                request = request.bearer_auth(token);
            }
        }
        request
    }

    /// Send a request under the request timeout.
    ///
    /// Connection failures and timeouts become [`UpdateError::Transport`].
    pub async fn send(&self, request: RequestBuilder, operation: &str) -> Result<Response> {
        match tokio::time::timeout(self.request_timeout, request.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(UpdateError::transport(operation, e)),
            Err(_) => Err(UpdateError::transport(
                operation,
                format!("request timed out after {:?}", self.request_timeout),
            )),
        }
    }

    /// GET a JSON document from the index.
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        subject: &str,
    ) -> Result<T> {
        let operation = format!("querying {subject}");
        let response = self
            .send(self.get(url).header("Accept", "application/vnd.github+json"), &operation)
            .await?;
        let response = check_status(response, subject, &operation)?;

        let body = tokio::time::timeout(self.request_timeout, response.bytes())
            .await
            .map_err(|_| UpdateError::transport(&operation, "timed out reading response"))?
            .map_err(|e| UpdateError::transport(&operation, e))?;

        serde_json::from_slice(&body).map_err(|e| {
            error!(url, error = %e, "Malformed release index response");
            UpdateError::transport(&operation, format!("malformed response: {e}"))
        })
    }

    /// GET a small text document such as a checksum manifest.
    pub async fn get_text(&self, url: &str, subject: &str) -> Result<String> {
        let operation = format!("downloading {subject}");
        let response = self.send(self.get(url), &operation).await?;
        let response = check_status(response, subject, &operation)?;
        tokio::time::timeout(self.request_timeout, response.text())
            .await
            .map_err(|_| UpdateError::transport(&operation, "timed out reading response"))?
            .map_err(|e| UpdateError::transport(&operation, e))
    }
}

/// Map a response status onto the error taxonomy.
///
/// 404 and 410 mean the thing does not exist and are never retried; every other
/// failure status (5xx, 429, rate-limited 403) is transient.
pub fn check_status(response: Response, subject: &str, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    debug!(status = %status, subject, "Unsuccessful response");
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(UpdateError::not_found(subject)),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            let reset = response
                .headers()
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .map(|v| format!(" (rate limit resets at {v})"))
                .unwrap_or_default();
            Err(UpdateError::transport(operation, format!("HTTP {status}{reset}")))
        }
        _ => Err(UpdateError::transport(operation, format!("HTTP {status}"))),
    }
}
