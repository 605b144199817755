//! HTTP plumbing shared by every resolver.
//!
//! All catalog requests go through an `HttpClient` so the pipeline can run
//! against the real API (with disk caching and per-host pacing) or against
//! canned fixtures in tests.

mod cache;
mod client;
mod rate_limiter;

pub use cache::{CacheMetadata, CacheStats, CachedResponse, DiskCache};
pub use client::{CachingClient, CachingClientBuilder, HttpClient, MockClient, MockResponse};
pub use rate_limiter::RateLimiter;

/// Convert a URL to a filesystem-safe slug.
/// e.g., "https://pokeapi.co/api/v2/pokemon/25/" -> "pokeapi-co_api_v2_pokemon_25"
pub fn slugify_url(url: &str) -> String {
    let parsed = match url::Url::parse(url) {
        Ok(p) => p,
        Err(_) => return sanitize_for_filesystem(url),
    };

    let host = parsed
        .host_str()
        .unwrap_or("unknown")
        .trim_start_matches("www.");
    let host = match parsed.port() {
        Some(port) => format!("{}-{}", host, port),
        None => host.to_string(),
    };

    let path = parsed
        .path()
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    let combined = if path.is_empty() {
        host
    } else {
        format!("{}_{}", host, path)
    };

    sanitize_for_filesystem(&combined)
}

fn sanitize_for_filesystem(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else if c == '.' || c == '/' {
                '-'
            } else {
                '_'
            }
        })
        .take(200)
        .collect()
}
