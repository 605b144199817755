//! Evolution-chain resolver.
//!
//! The species record points at an evolution-chain resource; the chain is a
//! tree of `ChainLink`s rooted at the base form. We flatten it by repeatedly
//! taking the last branch at each level, which yields one linear line of
//! descendants in the order they are reached.

use crate::catalog::{fetch_json, ApiEndpoints};
use crate::dataset::Evolution;
use crate::enrich::EnrichStage;
use crate::error::EnrichError;
use crate::http::HttpClient;
use crate::types::{ChainLink, EvolutionChain, PokemonSpecies};

/// Resolve the flattened evolution line for entity `id`.
pub async fn resolve_evolutions<C: HttpClient + ?Sized>(
    client: &C,
    endpoints: &ApiEndpoints,
    id: u32,
) -> Result<Vec<Evolution>, EnrichError> {
    let species: PokemonSpecies = fetch_json(
        client,
        &endpoints.species(id),
        EnrichStage::ResolveEvolutions,
        "species",
        EnrichError::ChainFetch,
    )
    .await?;

    let chain_url = endpoints
        .resolve(&species.evolution_chain.url)
        .map_err(EnrichError::ChainFetch)?;
    let chain: EvolutionChain = fetch_json(
        client,
        &chain_url,
        EnrichStage::ResolveEvolutions,
        "evolution_chain",
        EnrichError::ChainFetch,
    )
    .await?;

    flatten_chain(chain.chain)
}

/// Walk from the root's descendants down the last branch at each level.
///
/// The root itself is not included. Consumes the tree, so every iteration
/// moves one level deeper and the walk ends at the first leaf.
pub fn flatten_chain(root: ChainLink) -> Result<Vec<Evolution>, EnrichError> {
    let mut evolutions = Vec::new();
    let mut current = root.evolves_to.into_iter().last();

    while let Some(link) = current {
        evolutions.push(Evolution {
            id: species_id(&link.species.url)?,
            name: link.species.name,
        });
        current = link.evolves_to.into_iter().last();
    }

    Ok(evolutions)
}

/// Extract the numeric ID from a species URL such as
/// "https://pokeapi.co/api/v2/pokemon-species/2/".
pub fn species_id(url: &str) -> Result<u32, EnrichError> {
    url.rsplit('/')
        .find(|segment| !segment.is_empty())
        .and_then(|segment| segment.parse().ok())
        .ok_or_else(|| {
            EnrichError::malformed(
                EnrichStage::ResolveEvolutions,
                "evolution_chain",
                format!("no species id in {}", url),
            )
        })
}
