use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use urlencoding::encode;

use super::AnimeProvider;
use crate::episodes::sort_episodes;
use crate::transport::{BodyMode, HttpTransport, Request, Transport};
use crate::types::{EpisodeSource, ShowSearchResult, Translation};

pub mod decoder;
pub mod extract;
pub mod resolve;

pub use resolve::ResolveOptions;

pub const ALLANIME_API_URL: &str = "https://api.allanime.day/api";
pub const ALLANIME_BASE_URL: &str = "https://allanime.day";
pub const ALLANIME_REFERER: &str = "https://allmanga.to";

const SEARCH_LIMIT: u32 = 40;
const LIST_TIMEOUT: Duration = Duration::from_secs(10);
const SOURCES_TIMEOUT: Duration = Duration::from_secs(12);

pub struct AllAnimeClient<T = HttpTransport> {
    transport: T,
    options: ResolveOptions,
}

impl AllAnimeClient<HttpTransport> {
    pub fn new() -> Result<Self> {
        Ok(Self::with_transport(HttpTransport::new()?))
    }
}

impl<T: Transport> AllAnimeClient<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            options: ResolveOptions::default(),
        }
    }

    pub fn probe_direct_sources(mut self, enabled: bool) -> Self {
        self.options.probe_direct = enabled;
        self
    }

    fn query_url(query: &str, variables: &Value) -> String {
        format!(
            "{ALLANIME_API_URL}?query={}&variables={}",
            encode(query),
            encode(&variables.to_string())
        )
    }

    async fn query_json<D: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
        timeout: Duration,
    ) -> Result<Option<D>> {
        let url = Self::query_url(query, &variables);
        debug!("AllAnime query {url}");
        let request = Request::get(&url)
            .header("Referer", ALLANIME_REFERER)
            .mode(BodyMode::Json)
            .timeout(timeout);
        let value = self
            .transport
            .request(request)
            .await?
            .into_json(&url)?;
        let envelope =
            serde_json::from_value::<GraphQlEnvelope<D>>(value).unwrap_or_else(|err| {
                warn!("unexpected AllAnime response shape: {err}");
                GraphQlEnvelope::default()
            });
        Ok(Self::extract_data(envelope))
    }

    /// Returns the episode sources response untouched; the `sourceUrls`
    /// field is not reliably valid JSON.
    pub async fn fetch_sources_raw(
        &self,
        show_id: &str,
        translation: Translation,
        episode: &str,
    ) -> Result<String> {
        let variables = serde_json::json!({
            "showId": show_id,
            "translationType": translation.as_str(),
            "episodeString": episode
        });
        let url = Self::query_url(EPISODE_SOURCES_QUERY, &variables);
        debug!("AllAnime sources {url}");
        let request = Request::get(&url)
            .header("Referer", ALLANIME_REFERER)
            .mode(BodyMode::Text)
            .timeout(SOURCES_TIMEOUT);
        let text = self
            .transport
            .request(request)
            .await
            .with_context(|| format!("failed to fetch sources for {show_id} episode {episode}"))?
            .into_text(&url)?;
        debug!("AllAnime sources raw length {}", text.len());
        Ok(text)
    }

    fn extract_data<D>(envelope: GraphQlEnvelope<D>) -> Option<D> {
        if let Some(errors) = envelope.errors.filter(|errors| !errors.is_empty()) {
            let joined = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            warn!("AllAnime API error: {joined}");
        }
        envelope.data
    }
}

impl<T: Transport> AnimeProvider for AllAnimeClient<T> {
    async fn search_shows(
        &self,
        query: &str,
        translation: Translation,
    ) -> Result<Vec<ShowSearchResult>> {
        let variables = serde_json::json!({
            "search": {
                "allowAdult": false,
                "allowUnknown": false,
                "query": query,
            },
            "limit": SEARCH_LIMIT,
            "page": 1,
            "translationType": translation.as_str(),
            "countryOrigin": "ALL"
        });
        let payload: Option<SearchPayload> = self
            .query_json(SEARCH_SHOWS_QUERY, variables, LIST_TIMEOUT)
            .await
            .with_context(|| format!("search for \"{query}\" failed"))?;
        let edges = payload
            .and_then(|payload| payload.shows)
            .and_then(|shows| shows.edges)
            .unwrap_or_default();
        Ok(edges
            .iter()
            .filter_map(|edge| {
                let result = search_result(edge, translation);
                if result.is_none() {
                    debug!("skipping search edge without _id: {edge}");
                }
                result
            })
            .collect())
    }

    async fn list_episodes(&self, show_id: &str, translation: Translation) -> Result<Vec<String>> {
        let variables = serde_json::json!({ "showId": show_id });
        let payload: Option<ShowDetailPayload> = self
            .query_json(SHOW_DETAIL_QUERY, variables, LIST_TIMEOUT)
            .await
            .with_context(|| format!("failed to list episodes for {show_id}"))?;
        let raw = payload
            .and_then(|payload| payload.show)
            .and_then(|show| show.available_episodes_detail)
            .and_then(|mut detail| detail.get_mut(translation.as_str()).map(Value::take))
            .and_then(|episodes| match episodes {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default();
        Ok(sort_episodes(raw.into_iter().filter_map(episode_label).collect()))
    }

    async fn resolve_sources(
        &self,
        show_id: &str,
        translation: Translation,
        episode: &str,
    ) -> Result<Vec<EpisodeSource>> {
        let raw = self.fetch_sources_raw(show_id, translation, episode).await?;
        let candidates = extract::extract_providers(&raw);
        Ok(resolve::resolve_candidates(&self.transport, candidates, self.options).await)
    }
}

/// Maps one search edge on its own; only a missing `_id` drops it.
fn search_result(edge: &Value, translation: Translation) -> Option<ShowSearchResult> {
    let id = edge
        .get("_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())?;
    let name = edge.get("name").and_then(Value::as_str).unwrap_or_default();
    let count = edge
        .get("availableEpisodes")
        .and_then(|available| available.get(translation.as_str()))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    Some(ShowSearchResult {
        id: id.to_string(),
        name: name.to_string(),
        episode_count_label: format!("{}: {count}", translation.as_str()),
    })
}

/// Episode identifiers arrive as strings or bare numbers.
fn episode_label(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

// --- GraphQL Structs ---

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

impl<T> Default for GraphQlEnvelope<T> {
    fn default() -> Self {
        Self {
            data: None,
            errors: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    #[serde(default)]
    shows: Option<SearchShows>,
}

#[derive(Debug, Deserialize)]
struct SearchShows {
    #[serde(default)]
    edges: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct ShowDetailPayload {
    #[serde(default)]
    show: Option<ShowDetail>,
}

#[derive(Debug, Deserialize)]
struct ShowDetail {
    #[serde(rename = "availableEpisodesDetail")]
    #[serde(default)]
    available_episodes_detail: Option<Value>,
}

// --- Queries ---

const SEARCH_SHOWS_QUERY: &str = "query( $search: SearchInput $limit: Int $page: Int $translationType: VaildTranslationTypeEnumType $countryOrigin: VaildCountryOriginEnumType ) { shows( search: $search limit: $limit page: $page translationType: $translationType countryOrigin: $countryOrigin ) { edges { _id name availableEpisodes __typename } }}";

const SHOW_DETAIL_QUERY: &str =
    "query ($showId: String!) { show( _id: $showId ) { _id availableEpisodesDetail }}";

const EPISODE_SOURCES_QUERY: &str = "query ($showId: String!, $translationType: VaildTranslationTypeEnumType!, $episodeString: String!) { episode( showId: $showId translationType: $translationType episodeString: $episodeString ) { episodeString sourceUrls }}";
