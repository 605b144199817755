//! HTTP client trait and implementations.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderName, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
};
use reqwest::StatusCode;

use crate::error::FetchError;

use super::cache::{CacheStats, CachedResponse, DiskCache};
use super::rate_limiter::RateLimiter;

/// Trait for HTTP clients, enabling mockability in tests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch a UTF-8 body (JSON documents).
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;

    /// Fetch a binary body (sprites).
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        (**self).fetch_text(url).await
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        (**self).fetch_bytes(url).await
    }
}

/// Configuration for CachingClient.
#[derive(Clone)]
pub struct CachingClientBuilder {
    cache_dir: Option<PathBuf>,
    rate_limit_ms: u64,
    offline: bool,
    timeout: Duration,
    user_agent: String,
}

impl Default for CachingClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CachingClientBuilder {
    /// Defaults: no cache, 100ms between requests to one host, 30s timeout.
    pub fn new() -> Self {
        Self {
            cache_dir: None,
            rate_limit_ms: 100,
            offline: false,
            timeout: Duration::from_secs(30),
            user_agent: concat!("pokedex/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Set the cache directory. None disables caching.
    pub fn cache_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.cache_dir = dir;
        self
    }

    /// Set the rate limit delay in milliseconds. 0 disables rate limiting.
    pub fn rate_limit_ms(mut self, ms: u64) -> Self {
        self.rate_limit_ms = ms;
        self
    }

    /// When true, serve only from the cache and never touch the network.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn build(self) -> Result<CachingClient, reqwest::Error> {
        let inner = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()?;

        Ok(CachingClient {
            inner,
            cache: self.cache_dir.map(DiskCache::new),
            rate_limiter: RateLimiter::new(Duration::from_millis(self.rate_limit_ms)),
            offline: self.offline,
        })
    }
}

/// Production HTTP client with caching, rate limiting, and ETag support.
pub struct CachingClient {
    /// reqwest client, shared connection pool.
    inner: reqwest::Client,
    cache: Option<DiskCache>,
    rate_limiter: RateLimiter,
    offline: bool,
}

impl CachingClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        CachingClientBuilder::new().build()
    }

    pub fn builder() -> CachingClientBuilder {
        CachingClientBuilder::new()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    pub fn is_cached(&self, url: &str) -> bool {
        self.cache
            .as_ref()
            .map(|c| c.is_cached(url))
            .unwrap_or(false)
    }

    /// Issue a GET, optionally conditional on a cached copy.
    async fn send(
        &self,
        url: &reqwest::Url,
        cached: Option<&CachedResponse>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        if let Some(host) = url.host_str() {
            self.rate_limiter.wait(host).await;
        }

        let mut request = self.inner.get(url.clone());
        if let Some(cached) = cached {
            if let Some(etag) = &cached.metadata.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &cached.metadata.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }
        request.send().await
    }

    /// Read a successful response body and store it in the cache.
    async fn store(&self, url: &str, response: reqwest::Response) -> Result<Vec<u8>, FetchError> {
        let headers = response.headers().clone();
        let bytes = response.bytes().await?.to_vec();

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(
                url,
                &bytes,
                header_string(&headers, CONTENT_TYPE),
                header_string(&headers, ETAG),
                header_string(&headers, LAST_MODIFIED),
            ) {
                tracing::warn!(url, error = %e, "failed to write http cache entry");
            }
        }

        Ok(bytes)
    }

    async fn fetch_with_cache(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;

        let cached = self.cache.as_ref().and_then(|c| c.get(url));

        if self.offline {
            return match cached {
                Some(cached) => {
                    tracing::debug!(url, "cache hit (offline mode)");
                    Ok(cached.data)
                }
                None => {
                    tracing::debug!(url, "cache miss (offline mode, network disabled)");
                    Err(FetchError::NotCached(url.to_string()))
                }
            };
        }

        if let Some(cached) = cached {
            tracing::debug!(url, "network: validating cached response");
            return match self.send(&parsed, Some(&cached)).await {
                Ok(response) if response.status() == StatusCode::NOT_MODIFIED => {
                    tracing::debug!(url, "cache valid (304 Not Modified)");
                    Ok(cached.data)
                }
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(url, status = %response.status(), "network: cache refreshed");
                    self.store(url, response).await
                }
                Ok(response) => {
                    tracing::debug!(url, status = %response.status(), "network: request failed");
                    Err(FetchError::UnexpectedStatus {
                        url: url.to_string(),
                        status: response.status().as_u16(),
                    })
                }
                Err(e) => {
                    tracing::warn!(url, error = %e, "network error, serving stale cached response");
                    Ok(cached.data)
                }
            };
        }

        tracing::debug!(url, "network: fetching (not cached)");
        let response = self.send(&parsed, None).await?;

        if !response.status().is_success() {
            tracing::debug!(url, status = %response.status(), "network: request failed");
            return Err(FetchError::UnexpectedStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        tracing::debug!(url, status = %response.status(), "network: fetched successfully");
        self.store(url, response).await
    }
}

fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

#[async_trait]
impl HttpClient for CachingClient {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let bytes = self.fetch_with_cache(url).await?;
        String::from_utf8(bytes)
            .map_err(|e| FetchError::InvalidEncoding(format!("Invalid UTF-8 in response: {}", e)))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetch_with_cache(url).await
    }
}

/// Mock response for testing.
#[derive(Clone)]
pub enum MockResponse {
    Text(String),
    Bytes(Vec<u8>),
    /// Non-success HTTP status.
    Status(u16),
    /// Transport-level failure.
    Error(String),
    /// Never completes; for exercising timeouts and cancellation.
    Hang,
}

/// Mock HTTP client for testing.
///
/// Records every requested URL so tests can assert on what was (not) fetched.
#[derive(Default)]
pub struct MockClient {
    responses: HashMap<String, MockResponse>,
    requests: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, url: &str, response: MockResponse) -> Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    pub fn with_json(self, url: &str, json: &serde_json::Value) -> Self {
        self.with_response(url, MockResponse::Text(json.to_string()))
    }

    pub fn with_text(self, url: &str, text: &str) -> Self {
        self.with_response(url, MockResponse::Text(text.to_string()))
    }

    pub fn with_bytes(self, url: &str, bytes: Vec<u8>) -> Self {
        self.with_response(url, MockResponse::Bytes(bytes))
    }

    pub fn with_status(self, url: &str, status: u16) -> Self {
        self.with_response(url, MockResponse::Status(status))
    }

    pub fn with_error(self, url: &str, error: &str) -> Self {
        self.with_response(url, MockResponse::Error(error.to_string()))
    }

    pub fn with_hang(self, url: &str) -> Self {
        self.with_response(url, MockResponse::Hang)
    }

    /// All URLs requested so far, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|u| *u == url).count()
    }

    async fn respond(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }

        match self.responses.get(url) {
            Some(MockResponse::Text(text)) => Ok(text.as_bytes().to_vec()),
            Some(MockResponse::Bytes(bytes)) => Ok(bytes.clone()),
            Some(MockResponse::Status(status)) => Err(FetchError::UnexpectedStatus {
                url: url.to_string(),
                status: *status,
            }),
            Some(MockResponse::Error(e)) => Err(FetchError::Transport(e.clone())),
            Some(MockResponse::Hang) => std::future::pending().await,
            None => Err(FetchError::InvalidUrl(format!(
                "No mock response for URL: {}",
                url
            ))),
        }
    }
}

#[async_trait]
impl HttpClient for MockClient {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let bytes = self.respond(url).await?;
        String::from_utf8(bytes).map_err(|e| FetchError::InvalidEncoding(e.to_string()))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.respond(url).await
    }
}
