//! Area-encounter resolver.

use crate::catalog::{fetch_json, ApiEndpoints};
use crate::enrich::EnrichStage;
use crate::error::EnrichError;
use crate::http::HttpClient;
use crate::types::AreaEncounter;

/// Fetch the encounter list behind `reference` and flatten it to location
/// area names, in response order. An empty list resolves to an empty vec.
pub async fn resolve_area_encounters<C: HttpClient + ?Sized>(
    client: &C,
    endpoints: &ApiEndpoints,
    reference: &str,
) -> Result<Vec<String>, EnrichError> {
    let url = endpoints.rebase(reference);
    let encounters: Vec<AreaEncounter> = fetch_json(
        client,
        &url,
        EnrichStage::ResolveEncounters,
        "encounters",
        EnrichError::Encounters,
    )
    .await?;

    Ok(encounters
        .into_iter()
        .map(|encounter| encounter.location_area.name)
        .collect())
}
