//! Dataset writer and run manifest.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{FailurePolicy, PokedexConfig};
use crate::dataset::Dataset;
use crate::enrich::EnrichStage;
use crate::error::WriteError;

/// Serialize the dataset and write it to `path` in one atomic step.
pub fn write_dataset(dataset: &Dataset, path: &Path, pretty: bool) -> Result<(), WriteError> {
    let json = if pretty {
        serde_json::to_vec_pretty(dataset)?
    } else {
        serde_json::to_vec(dataset)?
    };
    write_atomic(path, &json)
}

/// Write to a sibling temp file, then rename over the target so a reader
/// never observes a half-written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), WriteError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| WriteError::Io { path, source }
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let temp_path = temp_path_for(path);
    fs::write(&temp_path, contents).map_err(io_err(&temp_path))?;

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(WriteError::Io {
            path: path.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// ============================================================================
// Run manifest
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithSkips,
    Failed,
    Cancelled,
}

/// One ID dropped under skip-and-continue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntity {
    pub id: u32,
    pub stage: EnrichStage,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    pub api_url: String,
    pub min: u32,
    pub max: u32,
    pub pad: usize,
    pub concurrency: usize,
    pub on_failure: FailurePolicy,
    pub region: String,
}

impl From<&PokedexConfig> for ManifestConfig {
    fn from(config: &PokedexConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            min: config.min,
            max: config.max,
            pad: config.pad,
            concurrency: config.concurrency,
            on_failure: config.on_failure,
            region: config.region.clone(),
        }
    }
}

/// Summary of one run, written next to the dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub config: ManifestConfig,
    pub status: RunStatus,
    pub total: usize,
    pub completed: usize,
    pub skipped: Vec<SkippedEntity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub output: String,
}

pub fn write_manifest(manifest: &RunManifest, path: &Path) -> Result<(), WriteError> {
    let json = serde_json::to_vec_pretty(manifest)?;
    write_atomic(path, &json)
}
