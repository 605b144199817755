//! Pipeline driver: enriches every ID in the range and assembles the dataset.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use crate::config::{FailurePolicy, PokedexConfig};
use crate::dataset::{Dataset, EntityRecord};
use crate::enrich::Enricher;
use crate::error::{EnrichError, PipelineError};
use crate::http::HttpClient;
use crate::progress::{ProgressReporter, Tick};
use crate::writer::SkippedEntity;

/// The subset of configuration the driver needs.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub min: u32,
    pub max: u32,
    pub pad: usize,
    pub concurrency: usize,
    pub on_failure: FailurePolicy,
}

impl RunOptions {
    pub fn total(&self) -> usize {
        if self.min > self.max {
            0
        } else {
            (self.max - self.min) as usize + 1
        }
    }
}

impl From<&PokedexConfig> for RunOptions {
    fn from(config: &PokedexConfig) -> Self {
        Self {
            min: config.min,
            max: config.max,
            pad: config.pad,
            concurrency: config.concurrency,
            on_failure: config.on_failure,
        }
    }
}

/// A finished run: the assembled dataset plus every ID that was dropped.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub dataset: Dataset,
    pub skipped: Vec<SkippedEntity>,
}

impl PipelineOutcome {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

type WorkerResult = (u32, Result<EntityRecord, EnrichError>);

/// Enrich every ID in `[min, max]` with at most `concurrency` IDs in flight.
///
/// IDs are dispatched in increasing order; the dataset is keyed by ID so the
/// output does not depend on completion order. Results are consumed only
/// here, which makes this loop the sole owner of the dataset and the only
/// caller of `progress`.
pub async fn run_pipeline<C>(
    enricher: Arc<Enricher<C>>,
    options: &RunOptions,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<PipelineOutcome, PipelineError>
where
    C: HttpClient + 'static,
{
    if options.min == 0 || options.min > options.max {
        return Err(PipelineError::InvalidRange {
            min: options.min,
            max: options.max,
        });
    }

    let total = options.total();
    let concurrency = options.concurrency.max(1);
    progress.set_total(total);

    tracing::info!(
        min = options.min,
        max = options.max,
        concurrency,
        policy = options.on_failure.as_str(),
        "Starting pipeline run"
    );

    let result = drive(enricher, options, concurrency, total, progress, cancel).await;
    progress.finish();

    match &result {
        Ok(outcome) => tracing::info!(
            records = outcome.dataset.len(),
            skipped = outcome.skipped.len(),
            "Pipeline run complete"
        ),
        Err(e) => tracing::warn!(error = %e, "Pipeline run stopped"),
    }
    result
}

async fn drive<C>(
    enricher: Arc<Enricher<C>>,
    options: &RunOptions,
    concurrency: usize,
    total: usize,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<PipelineOutcome, PipelineError>
where
    C: HttpClient + 'static,
{
    let mut dataset = Dataset::new(options.pad);
    let mut skipped = Vec::new();
    let mut finished = 0usize;
    let mut pending = options.min..=options.max;
    let mut tasks: JoinSet<WorkerResult> = JoinSet::new();

    loop {
        while tasks.len() < concurrency && !cancel.is_cancelled() {
            let Some(id) = pending.next() else {
                break;
            };
            let enricher = Arc::clone(&enricher);
            tasks.spawn(
                async move { (id, enricher.enrich(id).await) }
                    .instrument(info_span!("enrich_entity", id)),
            );
        }

        if tasks.is_empty() {
            break;
        }

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tasks.shutdown().await;
                return Err(PipelineError::Cancelled { finished, total });
            }
            joined = tasks.join_next() => joined,
        };

        // JoinSet is non-empty, so join_next always yields
        let Some(joined) = joined else {
            break;
        };
        let (id, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                tasks.shutdown().await;
                return Err(PipelineError::Worker(e));
            }
        };
        finished += 1;

        match result {
            Ok(record) => {
                progress.tick(id, Tick::Completed { name: &record.name });
                dataset.insert(record);
            }
            Err(error) => {
                let stage = error.stage();
                match options.on_failure {
                    FailurePolicy::FailFast => {
                        tracing::error!(id, stage = %stage, error = %error, "Entity failed, aborting run");
                        tasks.shutdown().await;
                        return Err(PipelineError::EntityFailed {
                            id,
                            stage,
                            source: error,
                        });
                    }
                    FailurePolicy::SkipAndContinue => {
                        let reason = error.to_string();
                        tracing::warn!(id, stage = %stage, error = %reason, "Skipping entity");
                        progress.tick(id, Tick::Skipped { reason: &reason });
                        skipped.push(SkippedEntity {
                            id,
                            stage,
                            error: reason,
                        });
                    }
                }
            }
        }
    }

    if finished < total {
        // Only cancellation stops dispatch before the range is exhausted
        return Err(PipelineError::Cancelled { finished, total });
    }

    if dataset.len() + skipped.len() != total {
        return Err(PipelineError::Incomplete {
            records: dataset.len(),
            skipped: skipped.len(),
            total,
        });
    }

    skipped.sort_by_key(|s: &SkippedEntity| s.id);
    Ok(PipelineOutcome { dataset, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ApiEndpoints;
    use crate::enrich::EnrichStage;
    use crate::error::FetchError;
    use crate::http::MockClient;
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const ROOT: &str = "http://stub.test/api/v2";

    fn stub_api(ids: std::ops::RangeInclusive<u32>) -> MockClient {
        let mut client = MockClient::new();
        for id in ids {
            client = client
                .with_json(
                    &format!("{}/pokemon/{}", ROOT, id),
                    &json!({
                        "id": id,
                        "name": format!("mon-{}", id),
                        "order": id,
                        "abilities": [],
                        "stats": [],
                        "types": [],
                        "weight": 10 * id,
                        "height": id,
                        "sprites": {"front_default": null},
                        "location_area_encounters": format!("/api/v2/pokemon/{}/encounters", id),
                        "species": {"name": format!("mon-{}", id), "url": format!("{}/pokemon-species/{}/", ROOT, id)}
                    }),
                )
                .with_json(&format!("{}/pokemon/{}/encounters", ROOT, id), &json!([]))
                .with_json(
                    &format!("{}/pokemon-species/{}", ROOT, id),
                    &json!({"evolution_chain": {"url": format!("{}/evolution-chain/{}/", ROOT, id)}}),
                )
                .with_json(
                    &format!("{}/evolution-chain/{}/", ROOT, id),
                    &json!({"chain": {
                        "species": {"name": format!("mon-{}", id), "url": format!("{}/pokemon-species/{}/", ROOT, id)},
                        "evolves_to": []
                    }}),
                );
        }
        client
    }

    fn enricher<C: HttpClient>(client: C) -> Arc<Enricher<C>> {
        Arc::new(Enricher::new(client, ApiEndpoints::new(ROOT), "Kanto"))
    }

    fn options(min: u32, max: u32, concurrency: usize, on_failure: FailurePolicy) -> RunOptions {
        RunOptions {
            min,
            max,
            pad: 3,
            concurrency,
            on_failure,
        }
    }

    /// Records every tick; optionally cancels a token after the first one.
    #[derive(Default)]
    struct RecordingProgress {
        total: AtomicUsize,
        ticks: Mutex<Vec<(u32, bool)>>,
        cancel_on_tick: Option<CancellationToken>,
    }

    impl ProgressReporter for RecordingProgress {
        fn set_total(&self, total: usize) {
            self.total.store(total, Ordering::SeqCst);
        }

        fn tick(&self, id: u32, tick: Tick<'_>) {
            let completed = matches!(tick, Tick::Completed { .. });
            self.ticks.lock().unwrap().push((id, completed));
            if let Some(token) = &self.cancel_on_tick {
                token.cancel();
            }
        }
    }

    /// Tracks the peak number of requests in flight at once.
    struct CountingClient {
        inner: MockClient,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CountingClient {
        fn new(inner: MockClient) -> Self {
            Self {
                inner,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl HttpClient for CountingClient {
        async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            let result = self.inner.fetch_text(url).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.inner.fetch_bytes(url).await
        }
    }

    #[tokio::test]
    async fn test_sequential_run() {
        let progress = RecordingProgress::default();
        let outcome = run_pipeline(
            enricher(stub_api(1..=3)),
            &options(1, 3, 1, FailurePolicy::SkipAndContinue),
            &progress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(outcome.is_complete());
        assert_eq!(
            outcome.dataset.keys().collect::<Vec<_>>(),
            vec!["001", "002", "003"]
        );
        assert_eq!(progress.total.load(Ordering::SeqCst), 3);
        assert_eq!(
            *progress.ticks.lock().unwrap(),
            vec![(1, true), (2, true), (3, true)]
        );
    }

    #[tokio::test]
    async fn test_concurrent_run_matches_sequential() {
        let cancel = CancellationToken::new();
        let sequential = run_pipeline(
            enricher(stub_api(1..=12)),
            &options(1, 12, 1, FailurePolicy::SkipAndContinue),
            &NoProgress,
            &cancel,
        )
        .await
        .unwrap();
        let concurrent = run_pipeline(
            enricher(stub_api(1..=12)),
            &options(1, 12, 5, FailurePolicy::SkipAndContinue),
            &NoProgress,
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(
            serde_json::to_string(&sequential.dataset).unwrap(),
            serde_json::to_string(&concurrent.dataset).unwrap()
        );
    }

    #[tokio::test]
    async fn test_concurrency_bound() {
        for limit in [1, 3] {
            let enricher = enricher(CountingClient::new(stub_api(1..=9)));
            run_pipeline(
                Arc::clone(&enricher),
                &options(1, 9, limit, FailurePolicy::SkipAndContinue),
                &NoProgress,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

            // Each entity makes one text request at a time
            let peak = enricher.client().peak.load(Ordering::SeqCst);
            assert!(peak <= limit, "peak {} exceeded limit {}", peak, limit);
        }
    }

    #[tokio::test]
    async fn test_skip_and_continue() {
        let client = stub_api(1..=3).with_status(&format!("{}/pokemon/2/encounters", ROOT), 500);
        let progress = RecordingProgress::default();

        let outcome = run_pipeline(
            enricher(client),
            &options(1, 3, 2, FailurePolicy::SkipAndContinue),
            &progress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(!outcome.is_complete());
        assert!(outcome.dataset.contains(1));
        assert!(!outcome.dataset.contains(2));
        assert!(outcome.dataset.contains(3));
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].id, 2);
        assert_eq!(outcome.skipped[0].stage, EnrichStage::ResolveEncounters);
        assert_eq!(progress.ticks.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_fail_fast() {
        let client = stub_api(1..=3).with_status(&format!("{}/pokemon/2", ROOT), 404);

        let err = run_pipeline(
            enricher(client),
            &options(1, 3, 1, FailurePolicy::FailFast),
            &NoProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        match err {
            PipelineError::EntityFailed { id, stage, source } => {
                assert_eq!(id, 2);
                assert_eq!(stage, EnrichStage::FetchPokemon);
                assert!(matches!(source, EnrichError::Catalog(_)));
            }
            other => panic!("expected EntityFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_range() {
        let err = run_pipeline(
            enricher(MockClient::new()),
            &options(5, 4, 1, FailurePolicy::SkipAndContinue),
            &NoProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRange { min: 5, max: 4 }));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let enricher = enricher(stub_api(1..=3));

        let err = run_pipeline(
            Arc::clone(&enricher),
            &options(1, 3, 2, FailurePolicy::SkipAndContinue),
            &NoProgress,
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Cancelled {
                finished: 0,
                total: 3
            }
        ));
        assert!(enricher.client().requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_work() {
        let cancel = CancellationToken::new();
        let progress = RecordingProgress {
            cancel_on_tick: Some(cancel.clone()),
            ..Default::default()
        };
        // Entity 2 never finishes; cancelling after entity 1 must not wait on it
        let client = stub_api(1..=3).with_hang(&format!("{}/pokemon/2", ROOT));

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            run_pipeline(
                enricher(client),
                &options(1, 3, 2, FailurePolicy::SkipAndContinue),
                &progress,
                &cancel,
            ),
        )
        .await
        .expect("cancellation should not hang")
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Cancelled {
                finished: 1,
                total: 3
            }
        ));
    }
}
