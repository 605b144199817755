pub mod catalog;
pub mod config;
pub mod dataset;
pub mod encounters;
pub mod enrich;
pub mod error;
pub mod evolution;
pub mod http;
pub mod image;
pub mod pipeline;
pub mod progress;
pub mod types;
pub mod writer;

pub use catalog::ApiEndpoints;
pub use config::{ConfigError, FailurePolicy, PokedexConfig};
pub use dataset::{pad_number, Dataset, EntityRecord, Evolution};
pub use enrich::{EnrichStage, Enricher};
pub use error::{EnrichError, FetchError, ImageError, PipelineError, WriteError};
pub use http::{
    CacheStats, CachingClient, CachingClientBuilder, DiskCache, HttpClient, MockClient,
    MockResponse,
};
pub use image::{encode_image, validate_image, ImageOutput, MAX_FILE_SIZE};
pub use pipeline::{run_pipeline, PipelineOutcome, RunOptions};
pub use progress::{ConsoleProgress, NoProgress, ProgressReporter, Tick};
pub use writer::{
    write_dataset, write_manifest, ManifestConfig, RunManifest, RunStatus, SkippedEntity,
};
