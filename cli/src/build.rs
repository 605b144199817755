//! `pokedex build`: configure, run the pipeline, write the dataset and manifest.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, ValueEnum};
use pokedex_core::config::normalize_api_url;
use pokedex_core::{
    run_pipeline, write_dataset, write_manifest, ApiEndpoints, CachingClient, ConsoleProgress,
    Enricher, FailurePolicy, ManifestConfig, NoProgress, PipelineError, PipelineOutcome,
    PokedexConfig, ProgressReporter, RunManifest, RunOptions, RunStatus,
};
use tokio_util::sync::CancellationToken;

/// Exit status when the dataset was written but some IDs were skipped.
const EXIT_SKIPPED: u8 = 2;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OnFailure {
    /// Drop the failing entity and keep going
    Skip,
    /// Abort the run on the first failure
    FailFast,
}

impl From<OnFailure> for FailurePolicy {
    fn from(value: OnFailure) -> Self {
        match value {
            OnFailure::Skip => FailurePolicy::SkipAndContinue,
            OnFailure::FailFast => FailurePolicy::FailFast,
        }
    }
}

/// Flags override `POKEDEX_*` environment variables, which override defaults.
#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Catalog API root (default: http://pokeapi.co/api/v2)
    #[arg(long)]
    pub api_url: Option<String>,

    /// First ID, inclusive (default: 1)
    #[arg(long)]
    pub min: Option<u32>,

    /// Last ID, inclusive (default: 151)
    #[arg(long)]
    pub max: Option<u32>,

    /// Width of the zero-padded keys (default: 3)
    #[arg(long)]
    pub pad: Option<usize>,

    /// Output file (default: ./data/pokedex.json)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Entities enriched at once (default: 4)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Per-request timeout in seconds (default: 30)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Minimum delay between requests to one host (default: 100)
    #[arg(long)]
    pub rate_limit_ms: Option<u64>,

    /// What to do when an entity fails (default: skip)
    #[arg(long, value_enum)]
    pub on_failure: Option<OnFailure>,

    /// Region label written into every record (default: Kanto)
    #[arg(long)]
    pub region: Option<String>,

    /// Pretty-print the dataset
    #[arg(long)]
    pub pretty: bool,

    /// Disable the HTTP cache
    #[arg(long, conflicts_with = "cache_dir")]
    pub no_cache: bool,

    /// HTTP cache directory (default: ~/.pokedex/http-cache)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Serve every request from the HTTP cache
    #[arg(long)]
    pub offline: bool,

    /// No progress output, warnings only
    #[arg(short, long)]
    pub quiet: bool,
}

impl BuildArgs {
    fn apply(&self, config: &mut PokedexConfig) {
        if let Some(url) = &self.api_url {
            config.api_url = normalize_api_url(url);
        }
        if let Some(min) = self.min {
            config.min = min;
        }
        if let Some(max) = self.max {
            config.max = max;
        }
        if let Some(pad) = self.pad {
            config.pad = pad;
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout = std::time::Duration::from_secs(secs);
        }
        if let Some(ms) = self.rate_limit_ms {
            config.rate_limit_ms = ms;
        }
        if let Some(policy) = self.on_failure {
            config.on_failure = policy.into();
        }
        if let Some(region) = &self.region {
            config.region = region.clone();
        }
        if self.no_cache {
            config.cache_dir = None;
        } else if let Some(dir) = &self.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
        config.pretty |= self.pretty;
        config.offline |= self.offline;
    }
}

pub async fn run(args: BuildArgs) -> Result<ExitCode> {
    let mut config = PokedexConfig::from_env().context("Failed to read POKEDEX_* environment")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let client = CachingClient::builder()
        .cache_dir(config.cache_dir.clone())
        .rate_limit_ms(config.rate_limit_ms)
        .offline(config.offline)
        .timeout(config.timeout)
        .build()
        .context("Failed to build HTTP client")?;
    let enricher = Arc::new(Enricher::new(
        client,
        ApiEndpoints::new(&config.api_url),
        config.region.clone(),
    ));

    let progress: Box<dyn ProgressReporter> = if args.quiet {
        Box::new(NoProgress)
    } else {
        Box::new(ConsoleProgress::new(config.pad))
    };

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let manifest = new_manifest(&config);
    tracing::info!(
        run_id = %manifest.run_id,
        api_url = %config.api_url,
        output = %config.output.display(),
        "Building pokedex"
    );

    let result = run_pipeline(
        enricher,
        &RunOptions::from(&config),
        progress.as_ref(),
        &cancel,
    )
    .await;

    finish_run(result, manifest, &config, &mut std::io::stdout().lock())
}

fn new_manifest(config: &PokedexConfig) -> RunManifest {
    let started = Utc::now();
    RunManifest {
        run_id: started.format("%Y-%m-%d_%H-%M-%S").to_string(),
        started_at: started.to_rfc3339(),
        completed_at: None,
        config: ManifestConfig::from(config),
        status: RunStatus::Running,
        total: config.total(),
        completed: 0,
        skipped: Vec::new(),
        error: None,
        output: config.output.display().to_string(),
    }
}

/// Turn a pipeline result into files on disk and an exit code.
///
/// The manifest is written for every outcome. The dataset is written only
/// when the pipeline succeeded, and its path is printed to `out`.
fn finish_run(
    result: Result<PipelineOutcome, PipelineError>,
    mut manifest: RunManifest,
    config: &PokedexConfig,
    out: &mut impl Write,
) -> Result<ExitCode> {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            manifest.status = status_for(&e);
            if let PipelineError::Cancelled { finished, .. } = &e {
                manifest.completed = *finished;
            }
            manifest.error = Some(e.to_string());
            finish_manifest(&mut manifest, config);
            return Err(anyhow::Error::new(e).context("Pokedex build failed"));
        }
    };

    manifest.completed = outcome.dataset.len();
    manifest.skipped = outcome.skipped.clone();

    if let Err(e) = write_dataset(&outcome.dataset, &config.output, config.pretty) {
        manifest.status = RunStatus::Failed;
        manifest.error = Some(e.to_string());
        finish_manifest(&mut manifest, config);
        return Err(anyhow::Error::new(e).context("Failed to write dataset"));
    }

    manifest.status = if outcome.is_complete() {
        RunStatus::Completed
    } else {
        RunStatus::CompletedWithSkips
    };
    finish_manifest(&mut manifest, config);

    writeln!(out, "{}", config.output.display()).context("Failed to print output path")?;

    if outcome.is_complete() {
        return Ok(ExitCode::SUCCESS);
    }

    eprintln!();
    eprintln!(
        "Skipped {} of {} entities:",
        outcome.skipped.len(),
        manifest.total
    );
    for skipped in &outcome.skipped {
        eprintln!("  #{} at {}: {}", skipped.id, skipped.stage, skipped.error);
    }
    Ok(ExitCode::from(EXIT_SKIPPED))
}

fn status_for(error: &PipelineError) -> RunStatus {
    match error {
        PipelineError::Cancelled { .. } => RunStatus::Cancelled,
        _ => RunStatus::Failed,
    }
}

/// Stamp the completion time and write the manifest. A manifest that cannot
/// be written is logged, never fatal.
fn finish_manifest(manifest: &mut RunManifest, config: &PokedexConfig) {
    manifest.completed_at = Some(Utc::now().to_rfc3339());
    let path = config.manifest_path();
    if let Err(e) = write_manifest(manifest, &path) {
        tracing::warn!(path = %path.display(), error = %e, "Failed to write run manifest");
    }
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        tracing::warn!("Received Ctrl-C, cancelling run");
        cancel.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pokedex_core::{Dataset, EnrichError, EnrichStage, EntityRecord, FetchError, SkippedEntity};
    use serde_json::json;

    fn config_in(dir: &std::path::Path) -> PokedexConfig {
        PokedexConfig {
            output: dir.join("data").join("pokedex.json"),
            min: 1,
            max: 2,
            ..Default::default()
        }
    }

    fn record(id: u32, name: &str) -> EntityRecord {
        EntityRecord {
            id,
            name: name.to_string(),
            image: String::new(),
            order: id as i64,
            abilities: json!([]),
            stats: json!([]),
            types: json!([]),
            weight: 10,
            height: 5,
            region: "Kanto".to_string(),
            evolutions: vec![],
            locations: vec![],
        }
    }

    fn outcome(records: Vec<EntityRecord>, skipped: Vec<SkippedEntity>) -> PipelineOutcome {
        let mut dataset = Dataset::new(3);
        for r in records {
            dataset.insert(r);
        }
        PipelineOutcome { dataset, skipped }
    }

    fn read_manifest(config: &PokedexConfig) -> serde_json::Value {
        let content = std::fs::read_to_string(config.manifest_path()).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[test]
    fn test_finish_complete_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let mut out = Vec::new();

        let code = finish_run(
            Ok(outcome(vec![record(1, "bulbasaur"), record(2, "ivysaur")], vec![])),
            new_manifest(&config),
            &config,
            &mut out,
        )
        .unwrap();

        assert_eq!(code, ExitCode::SUCCESS);
        assert!(config.output.exists());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("{}\n", config.output.display())
        );

        let manifest = read_manifest(&config);
        assert_eq!(manifest["status"], "completed");
        assert_eq!(manifest["completed"], 2);
        assert!(manifest["completed_at"].is_string());
        assert!(manifest.get("error").is_none());
    }

    #[test]
    fn test_finish_run_with_skips_exits_two() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let mut out = Vec::new();
        let skipped = SkippedEntity {
            id: 2,
            stage: EnrichStage::EncodeImage,
            error: "Unexpected status 404".to_string(),
        };

        let code = finish_run(
            Ok(outcome(vec![record(1, "bulbasaur")], vec![skipped])),
            new_manifest(&config),
            &config,
            &mut out,
        )
        .unwrap();

        assert_eq!(code, ExitCode::from(EXIT_SKIPPED));
        assert!(config.output.exists());
        assert!(!out.is_empty());

        let manifest = read_manifest(&config);
        assert_eq!(manifest["status"], "completed_with_skips");
        assert_eq!(manifest["completed"], 1);
        assert_eq!(manifest["skipped"][0]["id"], 2);
        assert_eq!(manifest["skipped"][0]["stage"], "encode_image");
    }

    #[test]
    fn test_finish_failed_run_writes_manifest_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let mut out = Vec::new();
        let failure = PipelineError::EntityFailed {
            id: 2,
            stage: EnrichStage::FetchPokemon,
            source: EnrichError::Catalog(FetchError::Transport("connection reset".to_string())),
        };

        let err = finish_run(Err(failure), new_manifest(&config), &config, &mut out).unwrap_err();

        assert!(format!("{:#}", err).contains("Pokedex build failed"));
        assert!(!config.output.exists());
        assert!(out.is_empty());

        let manifest = read_manifest(&config);
        assert_eq!(manifest["status"], "failed");
        assert!(manifest["error"]
            .as_str()
            .unwrap()
            .starts_with("Entity 2 failed"));
    }

    #[test]
    fn test_finish_cancelled_run_records_progress() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let mut out = Vec::new();

        let result = finish_run(
            Err(PipelineError::Cancelled {
                finished: 1,
                total: 2,
            }),
            new_manifest(&config),
            &config,
            &mut out,
        );

        assert!(result.is_err());
        assert!(!config.output.exists());
        assert!(out.is_empty());

        let manifest = read_manifest(&config);
        assert_eq!(manifest["status"], "cancelled");
        assert_eq!(manifest["completed"], 1);
        assert_eq!(manifest["total"], 2);
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = PokedexConfig::default();
        let args = BuildArgs {
            api_url: Some("http://localhost:8000/api/v2/".to_string()),
            min: Some(10),
            max: Some(12),
            on_failure: Some(OnFailure::FailFast),
            no_cache: true,
            pretty: true,
            ..Default::default()
        };

        args.apply(&mut config);

        assert_eq!(config.api_url, "http://localhost:8000/api/v2");
        assert_eq!((config.min, config.max), (10, 12));
        assert_eq!(config.on_failure, FailurePolicy::FailFast);
        assert!(config.cache_dir.is_none());
        assert!(config.pretty);
        // Untouched fields keep their values
        assert_eq!(config.pad, 3);
        assert_eq!(config.region, "Kanto");
    }

    #[test]
    fn test_unset_flags_leave_env_values() {
        let mut config = PokedexConfig {
            offline: true,
            cache_dir: Some(PathBuf::from("/tmp/env-cache")),
            ..Default::default()
        };

        BuildArgs::default().apply(&mut config);

        assert!(config.offline);
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/env-cache")));
    }

    #[test]
    fn test_status_for_error() {
        assert_eq!(
            status_for(&PipelineError::Cancelled {
                finished: 1,
                total: 3
            }),
            RunStatus::Cancelled
        );
        assert_eq!(
            status_for(&PipelineError::InvalidRange { min: 2, max: 1 }),
            RunStatus::Failed
        );
    }
}
