//! Catalog client: endpoint construction and the base `/pokemon/{id}` fetch.

use serde::de::DeserializeOwned;

use crate::enrich::EnrichStage;
use crate::error::{EnrichError, FetchError};
use crate::http::HttpClient;
use crate::types::Pokemon;

/// Path prefix the catalog puts in front of every resource reference.
const API_VERSION_PATH: &str = "/api/v2";

/// Builds URLs against a configured API root such as "http://pokeapi.co/api/v2".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    root: String,
    /// Path part of the root ("/api/v2"), used to rebase references.
    version_path: String,
}

impl ApiEndpoints {
    pub fn new(root: &str) -> Self {
        let root = root.trim_end_matches('/').to_string();
        let version_path = url::Url::parse(&root)
            .map(|u| u.path().trim_end_matches('/').to_string())
            .unwrap_or_default();
        Self { root, version_path }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn pokemon(&self, id: u32) -> String {
        format!("{}/pokemon/{}", self.root, id)
    }

    pub fn species(&self, id: u32) -> String {
        format!("{}/pokemon-species/{}", self.root, id)
    }

    /// Rebase a reference returned by the API onto the configured root.
    ///
    /// Everything up to and including the version path is dropped, so both
    /// "/api/v2/pokemon/1/encounters" and
    /// "https://pokeapi.co/api/v2/pokemon/1/encounters" become
    /// "{root}/pokemon/1/encounters". The catalog's own "/api/v2" prefix is
    /// stripped even when the root is mounted elsewhere (or at no path).
    pub fn rebase(&self, reference: &str) -> String {
        let rest = [self.version_path.as_str(), API_VERSION_PATH]
            .into_iter()
            .filter(|prefix| !prefix.is_empty())
            .find_map(|prefix| {
                reference
                    .find(prefix)
                    .map(|pos| &reference[pos + prefix.len()..])
            });

        let rest = match rest {
            Some(rest) => rest,
            None if is_absolute(reference) => return reference.to_string(),
            None => reference,
        };

        if rest.starts_with('/') {
            format!("{}{}", self.root, rest)
        } else {
            format!("{}/{}", self.root, rest)
        }
    }

    /// Resolve a link that is normally absolute (evolution chains, sprites).
    /// Relative links are resolved against the root.
    pub fn resolve(&self, link: &str) -> Result<String, FetchError> {
        if is_absolute(link) {
            return Ok(link.to_string());
        }
        let base = url::Url::parse(&format!("{}/", self.root))
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", self.root, e)))?;
        base.join(link)
            .map(String::from)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", link, e)))
    }
}

fn is_absolute(link: &str) -> bool {
    link.starts_with("http://") || link.starts_with("https://")
}

/// Fetch `url` and deserialize the body, mapping transport failures with
/// `on_fetch` and shape mismatches to `MalformedResponse`.
pub async fn fetch_json<C, T, F>(
    client: &C,
    url: &str,
    stage: EnrichStage,
    resource: &'static str,
    on_fetch: F,
) -> Result<T, EnrichError>
where
    C: HttpClient + ?Sized,
    T: DeserializeOwned,
    F: FnOnce(FetchError) -> EnrichError,
{
    let body = client.fetch_text(url).await.map_err(on_fetch)?;
    serde_json::from_str(&body)
        .map_err(|e| EnrichError::malformed(stage, resource, format!("{} ({})", e, url)))
}

/// Fetch the base record for one entity.
pub async fn fetch_pokemon<C: HttpClient + ?Sized>(
    client: &C,
    endpoints: &ApiEndpoints,
    id: u32,
) -> Result<Pokemon, EnrichError> {
    let url = endpoints.pokemon(id);
    let pokemon: Pokemon = fetch_json(
        client,
        &url,
        EnrichStage::FetchPokemon,
        "pokemon",
        EnrichError::Catalog,
    )
    .await?;

    if pokemon.id != id {
        return Err(EnrichError::malformed(
            EnrichStage::FetchPokemon,
            "pokemon",
            format!("requested id {} but response has id {}", id, pokemon.id),
        ));
    }

    Ok(pokemon)
}
