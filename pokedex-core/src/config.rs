//! Run configuration: defaults, environment overlay and validation.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::DiskCache;

/// Default catalog API root.
pub const DEFAULT_API_URL: &str = "http://pokeapi.co/api/v2";

/// Default output file.
pub const DEFAULT_OUTPUT: &str = "./data/pokedex.json";

/// Region label written into every record.
pub const DEFAULT_REGION: &str = "Kanto";

pub const DEFAULT_MIN: u32 = 1;
pub const DEFAULT_MAX: u32 = 151;
pub const DEFAULT_PAD: usize = 3;
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RATE_LIMIT_MS: u64 = 100;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidEnvVar { var: String, value: String },

    #[error("min must be at least 1")]
    ZeroMin,

    #[error("min ({min}) must not exceed max ({max})")]
    InvertedRange { min: u32, max: u32 },

    #[error("pad must be at least 1")]
    ZeroPad,

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
}

/// What the pipeline does when one entity fails to enrich.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the run on the first failure; nothing is written.
    FailFast,
    /// Drop the failed entity, keep going, report it at the end.
    #[default]
    SkipAndContinue,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::FailFast => "fail-fast",
            FailurePolicy::SkipAndContinue => "skip",
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail-fast" | "fail_fast" => Ok(FailurePolicy::FailFast),
            "skip" | "skip-and-continue" | "skip_and_continue" => {
                Ok(FailurePolicy::SkipAndContinue)
            }
            _ => Err(format!(
                "Unknown failure policy: {}. Valid policies: skip, fail-fast",
                s
            )),
        }
    }
}

/// Configuration for one pokedex build.
#[derive(Debug, Clone)]
pub struct PokedexConfig {
    /// Catalog API root, e.g. "http://pokeapi.co/api/v2" (no trailing slash).
    pub api_url: String,
    /// First entity ID, inclusive.
    pub min: u32,
    /// Last entity ID, inclusive.
    pub max: u32,
    /// Width of the zero-padded dataset keys.
    pub pad: usize,
    /// Where the dataset is written.
    pub output: PathBuf,
    /// Maximum number of entities enriched at once.
    pub concurrency: usize,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Minimum delay between requests to the same host. 0 disables pacing.
    pub rate_limit_ms: u64,
    pub on_failure: FailurePolicy,
    pub region: String,
    /// Pretty-print the dataset instead of writing compact JSON.
    pub pretty: bool,
    /// HTTP cache directory. None disables caching.
    pub cache_dir: Option<PathBuf>,
    /// Serve from the HTTP cache only, never touching the network.
    pub offline: bool,
}

impl Default for PokedexConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            min: DEFAULT_MIN,
            max: DEFAULT_MAX,
            pad: DEFAULT_PAD,
            output: PathBuf::from(DEFAULT_OUTPUT),
            concurrency: DEFAULT_CONCURRENCY,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            on_failure: FailurePolicy::default(),
            region: DEFAULT_REGION.to_string(),
            pretty: false,
            cache_dir: Some(DiskCache::default_dir()),
            offline: false,
        }
    }
}

impl PokedexConfig {
    /// Load configuration from environment variables on top of the defaults.
    ///
    /// Optional:
    /// - `POKEDEX_API_URL`: API root (default: "http://pokeapi.co/api/v2")
    /// - `POKEDEX_MIN` / `POKEDEX_MAX`: ID range (default: 1..=151)
    /// - `POKEDEX_PAD`: key width (default: 3)
    /// - `POKEDEX_OUTPUT`: output file (default: "./data/pokedex.json")
    /// - `POKEDEX_CONCURRENCY`: worker count (default: 4)
    /// - `POKEDEX_TIMEOUT_SECS`: per-request timeout (default: 30)
    /// - `POKEDEX_RATE_LIMIT_MS`: per-host delay (default: 100)
    /// - `POKEDEX_ON_FAILURE`: "skip" or "fail-fast" (default: skip)
    /// - `POKEDEX_REGION`: region label (default: "Kanto")
    /// - `POKEDEX_HTTP_CACHE`: "none" to disable, "disk" (default), or a path
    /// - `POKEDEX_OFFLINE`: "true" to serve only from the cache
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("POKEDEX_API_URL") {
            config.api_url = url;
        }
        if let Some(v) = parse_var(&lookup, "POKEDEX_MIN")? {
            config.min = v;
        }
        if let Some(v) = parse_var(&lookup, "POKEDEX_MAX")? {
            config.max = v;
        }
        if let Some(v) = parse_var(&lookup, "POKEDEX_PAD")? {
            config.pad = v;
        }
        if let Some(path) = lookup("POKEDEX_OUTPUT") {
            config.output = PathBuf::from(path);
        }
        if let Some(v) = parse_var(&lookup, "POKEDEX_CONCURRENCY")? {
            config.concurrency = v;
        }
        if let Some(secs) = parse_var(&lookup, "POKEDEX_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(v) = parse_var(&lookup, "POKEDEX_RATE_LIMIT_MS")? {
            config.rate_limit_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "POKEDEX_ON_FAILURE")? {
            config.on_failure = v;
        }
        if let Some(region) = lookup("POKEDEX_REGION") {
            config.region = region;
        }
        config.cache_dir = match lookup("POKEDEX_HTTP_CACHE") {
            Some(val) if val == "none" => None,
            Some(val) if val == "disk" => Some(DiskCache::default_dir()),
            Some(path) => Some(PathBuf::from(path)),
            None => config.cache_dir,
        };
        config.offline = lookup("POKEDEX_OFFLINE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        config.api_url = normalize_api_url(&config.api_url);
        Ok(config)
    }

    /// Check the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min == 0 {
            return Err(ConfigError::ZeroMin);
        }
        if self.min > self.max {
            return Err(ConfigError::InvertedRange {
                min: self.min,
                max: self.max,
            });
        }
        if self.pad == 0 {
            return Err(ConfigError::ZeroPad);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }

    /// Number of IDs in the configured range.
    pub fn total(&self) -> usize {
        if self.min > self.max {
            0
        } else {
            (self.max - self.min) as usize + 1
        }
    }

    /// Path of the run manifest written next to the dataset.
    /// e.g. "data/pokedex.json" -> "data/pokedex.manifest.json"
    pub fn manifest_path(&self) -> PathBuf {
        let stem = self
            .output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pokedex".to_string());
        self.output.with_file_name(format!("{}.manifest.json", stem))
    }
}

/// Strip trailing slashes so path joins never produce "//".
pub fn normalize_api_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn parse_var<F, T>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                value,
            }),
    }
}
