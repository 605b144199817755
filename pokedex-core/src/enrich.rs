//! Entity enricher: runs the four dependent stages for one ID.

use std::fmt;
use std::future::Future;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::catalog::{fetch_pokemon, ApiEndpoints};
use crate::dataset::EntityRecord;
use crate::encounters::resolve_area_encounters;
use crate::error::EnrichError;
use crate::evolution::resolve_evolutions;
use crate::http::HttpClient;
use crate::image::{encode_image, ImageOutput};

/// Enrichment stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichStage {
    FetchPokemon,
    EncodeImage,
    ResolveEncounters,
    ResolveEvolutions,
}

impl EnrichStage {
    pub const ALL: &'static [EnrichStage] = &[
        EnrichStage::FetchPokemon,
        EnrichStage::EncodeImage,
        EnrichStage::ResolveEncounters,
        EnrichStage::ResolveEvolutions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichStage::FetchPokemon => "fetch_pokemon",
            EnrichStage::EncodeImage => "encode_image",
            EnrichStage::ResolveEncounters => "resolve_encounters",
            EnrichStage::ResolveEvolutions => "resolve_evolutions",
        }
    }
}

impl fmt::Display for EnrichStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds one `EntityRecord` per ID from the catalog API.
///
/// The HTTP client is injected so the CLI can use `CachingClient` and tests
/// can use `MockClient`.
pub struct Enricher<C: HttpClient> {
    client: C,
    endpoints: ApiEndpoints,
    region: String,
    image_output: ImageOutput,
}

impl<C: HttpClient> Enricher<C> {
    pub fn new(client: C, endpoints: ApiEndpoints, region: impl Into<String>) -> Self {
        Self {
            client,
            endpoints,
            region: region.into(),
            image_output: ImageOutput::default(),
        }
    }

    pub fn with_image_output(mut self, output: ImageOutput) -> Self {
        self.image_output = output;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn endpoints(&self) -> &ApiEndpoints {
        &self.endpoints
    }

    /// Run base fetch -> image -> encounters -> evolutions for `id`.
    ///
    /// The first failing stage ends enrichment for this ID; no partial
    /// record is ever returned.
    pub async fn enrich(&self, id: u32) -> Result<EntityRecord, EnrichError> {
        let pokemon = run_stage(
            id,
            EnrichStage::FetchPokemon,
            fetch_pokemon(&self.client, &self.endpoints, id),
        )
        .await?;

        let image = run_stage(
            id,
            EnrichStage::EncodeImage,
            async {
                encode_image(
                    &self.client,
                    &self.endpoints,
                    pokemon.sprites.front_default.as_deref(),
                    self.image_output,
                )
                .await
                .map_err(EnrichError::from)
            },
        )
        .await?;

        let locations = run_stage(
            id,
            EnrichStage::ResolveEncounters,
            resolve_area_encounters(
                &self.client,
                &self.endpoints,
                &pokemon.location_area_encounters,
            ),
        )
        .await?;

        let evolutions = run_stage(
            id,
            EnrichStage::ResolveEvolutions,
            resolve_evolutions(&self.client, &self.endpoints, pokemon.id),
        )
        .await?;

        Ok(EntityRecord {
            id: pokemon.id,
            name: pokemon.name,
            image,
            order: pokemon.order,
            abilities: pokemon.abilities,
            stats: pokemon.stats,
            types: pokemon.types,
            weight: pokemon.weight,
            height: pokemon.height,
            region: self.region.clone(),
            evolutions,
            locations,
        })
    }
}

/// Run one stage inside its own span, logging how long it took.
async fn run_stage<T, F>(id: u32, stage: EnrichStage, fut: F) -> Result<T, EnrichError>
where
    F: Future<Output = Result<T, EnrichError>>,
{
    let start = Instant::now();
    let result = fut
        .instrument(info_span!("enrich_stage", id, stage = %stage))
        .await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match &result {
        Ok(_) => tracing::debug!(id, stage = %stage, duration_ms, "stage complete"),
        Err(e) => tracing::debug!(id, stage = %stage, duration_ms, error = %e, "stage failed"),
    }

    result
}
