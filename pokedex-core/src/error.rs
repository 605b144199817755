use std::path::PathBuf;

use thiserror::Error;

use crate::enrich::EnrichStage;

/// Transport-level failure of a single HTTP call.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Connection-level failure raised outside reqwest, e.g. by a stub client.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Invalid response encoding: {0}")]
    InvalidEncoding(String),

    #[error("URL not cached and offline mode is set: {0}")]
    NotCached(String),
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Failed to fetch image: {0}")]
    Fetch(#[from] FetchError),

    #[error("Image too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Unsupported image payload: {0}")]
    UnsupportedFormat(String),
}

/// Failure while enriching a single entity.
#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("catalog fetch failed: {0}")]
    Catalog(#[source] FetchError),

    #[error("image encoding failed: {0}")]
    Image(#[from] ImageError),

    #[error("area encounter fetch failed: {0}")]
    Encounters(#[source] FetchError),

    #[error("evolution chain fetch failed: {0}")]
    ChainFetch(#[source] FetchError),

    #[error("malformed {resource} response: {detail}")]
    MalformedResponse {
        stage: EnrichStage,
        resource: &'static str,
        detail: String,
    },
}

impl EnrichError {
    pub fn malformed(
        stage: EnrichStage,
        resource: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        EnrichError::MalformedResponse {
            stage,
            resource,
            detail: detail.into(),
        }
    }

    /// The enrichment stage that produced this error.
    pub fn stage(&self) -> EnrichStage {
        match self {
            EnrichError::Catalog(_) => EnrichStage::FetchPokemon,
            EnrichError::Image(_) => EnrichStage::EncodeImage,
            EnrichError::Encounters(_) => EnrichStage::ResolveEncounters,
            EnrichError::ChainFetch(_) => EnrichStage::ResolveEvolutions,
            EnrichError::MalformedResponse { stage, .. } => *stage,
        }
    }
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid ID range: min {min} > max {max}")]
    InvalidRange { min: u32, max: u32 },

    #[error("Entity {id} failed at {stage}: {source}")]
    EntityFailed {
        id: u32,
        stage: EnrichStage,
        #[source]
        source: EnrichError,
    },

    #[error("Run cancelled after {finished} of {total} entities")]
    Cancelled { finished: usize, total: usize },

    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("Dataset incomplete: {records} records + {skipped} skipped != {total} IDs")]
    Incomplete {
        records: usize,
        skipped: usize,
        total: usize,
    },
}
