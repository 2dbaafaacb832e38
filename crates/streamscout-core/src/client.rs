//! HTTP client with per-request timeout, manual redirects and optional retries
//!
//! Every provider talks to the outside world through [`HttpClient`], so
//! timeouts, status mapping and redirect handling are the same everywhere.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::debug;

use crate::error::{ProviderError, Result};
use crate::types::Headers;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Retry delays stop doubling after this many attempts
const MAX_BACKOFF_SHIFT: u32 = 10;

/// Configuration for the HTTP client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Per-request timeout in milliseconds (default: 10000)
    pub timeout_ms: u64,
    /// Retry attempts for transient errors (default: 0)
    pub max_retries: u32,
    /// Maximum redirect hops followed per request (default: 5)
    pub max_redirects: usize,
    /// User-Agent sent with every request
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_retries: 0,
            max_redirects: 5,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Body of a fetched page together with the URL it was finally served from
#[derive(Debug, Clone)]
pub struct Fetched {
    pub url: String,
    pub body: String,
}

/// HTTP client wrapper shared by all providers
///
/// Handles:
/// - Per-request timeout (a timed out fetch surfaces as `Timeout`)
/// - Manual redirect following with a hop limit
/// - Status mapping (429, 404, other non-2xx)
/// - Optional retries with exponential backoff for transient errors
pub struct HttpClient {
    client: reqwest::Client,
    max_retries: u32,
    max_redirects: usize,
}

impl HttpClient {
    /// Create a new client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.as_str())
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .default_headers({
                let mut headers = HeaderMap::new();
                headers.insert(
                    reqwest::header::ACCEPT_LANGUAGE,
                    HeaderValue::from_static("en-US,en;q=0.9"),
                );
                headers
            })
            .build()
            .map_err(ProviderError::HttpError)?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            max_redirects: config.max_redirects,
        })
    }

    /// Fetch a page as text, following redirects
    ///
    /// # Errors
    /// - `Timeout` - the request exceeded the configured timeout
    /// - `RateLimited` / `NotFound` / `Status` - non-success responses
    /// - `HttpError` - connection or protocol errors
    pub async fn get_text(&self, url: &str, headers: &Headers) -> Result<String> {
        Ok(self.fetch(url, headers).await?.body)
    }

    /// Fetch a page and report the final URL after redirects
    pub async fn fetch(&self, url: &str, headers: &Headers) -> Result<Fetched> {
        let mut last_error: Option<ProviderError> = None;
        let mut attempt = 0;

        while attempt <= self.max_retries {
            match self.do_fetch(url, headers).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) => {
                    if Self::is_retryable(&e) && attempt < self.max_retries {
                        sleep(Self::backoff(attempt)).await;
                        last_error = Some(e);
                        attempt += 1;
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        Err(last_error.unwrap_or(ProviderError::RateLimited))
    }

    /// Fetch and deserialize a JSON document
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, headers: &Headers) -> Result<T> {
        let body = self.get_text(url, headers).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// POST a JSON body and deserialize the JSON answer
    pub async fn post_json<B, T>(&self, url: &str, headers: &Headers, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_string(body)?;
        let text = self
            .send_body(url, headers, "application/json", payload)
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// POST an url-encoded form and return the body as text
    pub async fn post_form(&self, url: &str, headers: &Headers, form: &[(&str, &str)]) -> Result<String> {
        let payload = form
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        self.send_body(url, headers, "application/x-www-form-urlencoded", payload)
            .await
    }

    /// Follow redirects and return the URL the resource is finally served from
    pub async fn final_url(&self, url: &str, headers: &Headers) -> Result<String> {
        let mut current = url.to_string();
        for _ in 0..self.max_redirects {
            match self.redirect_location(&current, headers).await? {
                Some(next) => current = next,
                None => return Ok(current),
            }
        }
        Ok(current)
    }

    /// Perform a single request without following redirects
    ///
    /// Returns the absolute `Location` target of a redirect response,
    /// or `None` when the server answered directly.
    pub async fn redirect_location(&self, url: &str, headers: &Headers) -> Result<Option<String>> {
        let response = self.send(Method::GET, url, headers, None).await?;
        let status = response.status();
        if status.is_redirection() {
            return Ok(response
                .headers()
                .get(LOCATION)
                .and_then(|loc| loc.to_str().ok())
                .map(|loc| join_url(url, loc)));
        }
        Self::check_status(status, url)?;
        Ok(None)
    }

    /// Perform a single fetch attempt with manual redirect following
    async fn do_fetch(&self, url: &str, headers: &Headers) -> Result<Fetched> {
        let mut current_url = url.to_string();

        for _ in 0..=self.max_redirects {
            let response = self.send(Method::GET, &current_url, headers, None).await?;
            let status = response.status();

            if status.is_redirection() {
                if let Some(location) = response.headers().get(LOCATION)
                    && let Ok(loc_str) = location.to_str()
                {
                    let next = join_url(&current_url, loc_str);
                    debug!(from = %current_url, to = %next, "following redirect");
                    current_url = next;
                    continue;
                }
                // No usable Location header, return the body as-is
            } else {
                Self::check_status(status, &current_url)?;
            }

            let body = response
                .text()
                .await
                .map_err(|e| Self::map_send_error(&current_url, e))?;
            return Ok(Fetched {
                url: current_url,
                body,
            });
        }

        Err(ProviderError::ParseError(format!(
            "Too many redirects starting at {url}"
        )))
    }

    async fn send_body(&self, url: &str, headers: &Headers, content_type: &str, body: String) -> Result<String> {
        let mut headers = headers.clone();
        headers
            .entry("Content-Type".to_string())
            .or_insert_with(|| content_type.to_string());

        let response = self.send(Method::POST, url, &headers, Some(body)).await?;
        Self::check_status(response.status(), url)?;
        response
            .text()
            .await
            .map_err(|e| Self::map_send_error(url, e))
    }

    async fn send(&self, method: Method, url: &str, headers: &Headers, body: Option<String>) -> Result<reqwest::Response> {
        let mut request = self.client.request(method, url);
        for (name, value) in headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                request = request.header(name, value);
            }
        }
        if let Some(body) = body {
            request = request.body(body);
        }
        request
            .send()
            .await
            .map_err(|e| Self::map_send_error(url, e))
    }

    fn check_status(status: StatusCode, url: &str) -> Result<()> {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(())
    }

    fn map_send_error(url: &str, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(url.to_string())
        } else {
            ProviderError::HttpError(e)
        }
    }

    /// Exponential backoff: 250ms, 500ms, 1s ... up to 256s
    fn backoff(attempt: u32) -> Duration {
        Duration::from_millis(250u64.saturating_mul(1u64 << attempt.min(MAX_BACKOFF_SHIFT)))
    }

    /// Check if an error is retryable
    fn is_retryable(error: &ProviderError) -> bool {
        match error {
            ProviderError::RateLimited | ProviderError::Timeout(_) => true,
            ProviderError::Status { status, .. } => *status >= 500,
            ProviderError::HttpError(e) => e.is_connect(),
            _ => false,
        }
    }
}

/// Resolves a possibly relative `target` against `base`
pub fn join_url(base: &str, target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        return target.to_string();
    }
    url::Url::parse(base)
        .and_then(|b| b.join(target))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| target.to_string())
}

/// Scheme and host of a URL, e.g. `https://example.com`
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

/// Lowercased hostname of a URL
pub fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .host_str()
        .map(|h| h.to_lowercase())
}
