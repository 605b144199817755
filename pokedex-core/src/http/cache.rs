//! Disk-based HTTP response cache with ETag support.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::slugify_url;

const RESPONSE_FILE: &str = "response.bin";
const METADATA_FILE: &str = "metadata.json";

/// Disk-based HTTP response cache.
///
/// Each URL gets its own directory under the cache root:
/// `{cache_dir}/{url_slug}/response.bin` plus `metadata.json`.
pub struct DiskCache {
    cache_dir: PathBuf,
}

/// Metadata stored alongside cached responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub url: String,
    pub content_type: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// A cached successful response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub data: Vec<u8>,
    pub metadata: CacheMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
}

impl DiskCache {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Get the default cache directory: ~/.pokedex/http-cache
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".pokedex").join("http-cache"))
            .unwrap_or_else(|| PathBuf::from("data/http-cache"))
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    fn url_dir(&self, url: &str) -> PathBuf {
        self.cache_dir.join(slugify_url(url))
    }

    pub fn is_cached(&self, url: &str) -> bool {
        let dir = self.url_dir(url);
        dir.join(RESPONSE_FILE).exists() && dir.join(METADATA_FILE).exists()
    }

    /// Get cached response if it exists and belongs to this exact URL.
    pub fn get(&self, url: &str) -> Option<CachedResponse> {
        let dir = self.url_dir(url);
        let metadata_str = fs::read_to_string(dir.join(METADATA_FILE)).ok()?;
        let metadata: CacheMetadata = serde_json::from_str(&metadata_str).ok()?;

        // Slugs are lossy; never serve another URL's body.
        if metadata.url != url {
            return None;
        }

        let data = fs::read(dir.join(RESPONSE_FILE)).ok()?;
        Some(CachedResponse { data, metadata })
    }

    /// Save a successful response to the cache.
    pub fn put(
        &self,
        url: &str,
        data: &[u8],
        content_type: Option<String>,
        etag: Option<String>,
        last_modified: Option<String>,
    ) -> io::Result<()> {
        let dir = self.url_dir(url);
        fs::create_dir_all(&dir)?;

        let metadata = CacheMetadata {
            url: url.to_string(),
            content_type,
            fetched_at: Utc::now(),
            etag,
            last_modified,
        };
        let metadata_json = serde_json::to_string_pretty(&metadata).map_err(io::Error::other)?;

        fs::write(dir.join(RESPONSE_FILE), data)?;
        fs::write(dir.join(METADATA_FILE), metadata_json)?;
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();

        let Ok(entries) = fs::read_dir(&self.cache_dir) else {
            return stats;
        };

        for entry in entries.filter_map(|e| e.ok()) {
            let response = entry.path().join(RESPONSE_FILE);
            if let Ok(meta) = fs::metadata(&response) {
                stats.entries += 1;
                stats.bytes += meta.len();
            }
        }

        stats
    }

    /// Clear all cached responses.
    pub fn clear(&self) -> io::Result<()> {
        if self.cache_dir.exists() {
            fs::remove_dir_all(&self.cache_dir)?;
        }
        Ok(())
    }
}
