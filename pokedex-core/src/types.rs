//! Shapes of the catalog API responses we consume.
//!
//! Only the fields the pipeline reads are declared; everything else in the
//! payload is ignored. A missing declared field fails deserialization, which
//! the resolvers surface as a malformed response.

use serde::Deserialize;
use serde_json::Value as JsonValue;

/// `{ "name": ..., "url": ... }` reference used throughout the API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamedResource {
    pub name: String,
    pub url: String,
}

/// `GET /pokemon/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct Pokemon {
    pub id: u32,
    pub name: String,
    pub order: i64,
    pub abilities: JsonValue,
    pub stats: JsonValue,
    pub types: JsonValue,
    pub weight: u32,
    pub height: u32,
    pub sprites: Sprites,
    /// Reference to the encounter list, e.g. "/api/v2/pokemon/1/encounters".
    pub location_area_encounters: String,
    pub species: NamedResource,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sprites {
    #[serde(default)]
    pub front_default: Option<String>,
}

/// One element of `GET /pokemon/{id}/encounters`.
#[derive(Debug, Clone, Deserialize)]
pub struct AreaEncounter {
    pub location_area: NamedResource,
}

/// `GET /pokemon-species/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct PokemonSpecies {
    pub evolution_chain: ApiReference,
}

/// Unnamed `{ "url": ... }` reference.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiReference {
    pub url: String,
}

/// `GET /evolution-chain/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct EvolutionChain {
    pub chain: ChainLink,
}

/// A node of the evolution tree.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainLink {
    pub species: NamedResource,
    #[serde(default)]
    pub evolves_to: Vec<ChainLink>,
}
