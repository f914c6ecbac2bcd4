//! The single HTTP seam of the pipeline
//!
//! Everything above this module talks to the network through [`HttpGet`]:
//! one GET returning a JSON body plus the response headers. [`AzureHttp`] is
//! the reqwest-backed implementation; tests substitute in-memory mocks.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER};

use crate::config::AzureConfig;
use crate::error::{Error, Result};

/// Body and headers of one successful GET.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub body: serde_json::Value,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
}

impl HttpResponse {
    pub fn new(body: serde_json::Value) -> Self {
        Self {
            body,
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Performs one HTTP GET.
#[async_trait]
pub trait HttpGet: Send + Sync {
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse>;
}

/// Azure DevOps REST client using a personal access token.
pub struct AzureHttp {
    http_client: reqwest::Client,
    token: String,
    max_retries: usize,
}

impl AzureHttp {
    /// Create a client from configuration.
    ///
    /// Returns an error if no token is configured.
    pub fn new(config: &AzureConfig) -> Result<Self> {
        let token = config
            .resolved_token()
            .ok_or_else(|| Error::Config("azure.token is required".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            token,
            max_retries: config.max_retries,
        })
    }

    async fn get_once(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse> {
        let response = self
            .http_client
            .get(url)
            .query(query)
            .basic_auth("", Some(&self.token))
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            let body = match retry_after {
                Some(secs) => format!("{} (retry after {}s)", error_text, secs),
                None => error_text,
            };
            return Err(Error::Api {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.json::<serde_json::Value>().await?;

        Ok(HttpResponse { body, headers })
    }
}

#[async_trait]
impl HttpGet for AzureHttp {
    /// GET with retries for throttling and transient failures, backing off
    /// exponentially from 500ms up to 30s.
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse> {
        let mut delay = Duration::from_millis(500);
        let mut attempt = 0;

        loop {
            match self.get_once(url, query).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.max_retries && is_retryable_error(&e) => {
                    attempt += 1;
                    tracing::warn!(
                        url,
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "Transient error, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Throttling (429), server errors and network timeouts are worth retrying.
fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Api { status, .. } => *status == 429 || *status >= 500,
        Error::Http(e) => e.is_timeout() || e.is_connect(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_token() {
        let config = AzureConfig {
            token: Some(String::new()),
            ..Default::default()
        };
        // Empty tokens are treated as missing unless the env var supplies one
        if std::env::var(crate::config::TOKEN_ENV_VAR).is_err() {
            assert!(AzureHttp::new(&config).is_err());
        }
    }

    #[test]
    fn test_client_with_token() {
        let config = AzureConfig {
            host: Some("https://dev.azure.com/".to_string()),
            token: Some("pat".to_string()),
            ..Default::default()
        };
        assert!(AzureHttp::new(&config).is_ok());
    }

    #[test]
    fn test_is_retryable_error() {
        let api = |status| Error::Api {
            status,
            url: "https://dev.azure.com/x".to_string(),
            body: String::new(),
        };
        assert!(is_retryable_error(&api(429)));
        assert!(is_retryable_error(&api(503)));
        assert!(!is_retryable_error(&api(401)));
        assert!(!is_retryable_error(&api(404)));
        assert!(!is_retryable_error(&Error::Config("x".to_string())));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = HttpResponse::new(serde_json::json!({ "value": [] }))
            .with_header("X-MS-ContinuationToken", "abc");
        assert_eq!(response.header("x-ms-continuationtoken"), Some("abc"));
        assert_eq!(response.header("X-Ms-Continuationtoken"), Some("abc"));
        assert_eq!(response.header("etag"), None);
    }
}
