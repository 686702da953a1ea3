use crate::types::{EpisodeSource, ShowSearchResult, Translation};
use anyhow::Result;

pub mod allanime;
pub mod mal;

pub trait AnimeProvider {
    async fn search_shows(
        &self,
        query: &str,
        translation: Translation,
    ) -> Result<Vec<ShowSearchResult>>;
    async fn list_episodes(&self, show_id: &str, translation: Translation) -> Result<Vec<String>>;
    /// An empty list means no source is currently available; only transport
    /// exhaustion is reported as an error.
    async fn resolve_sources(
        &self,
        show_id: &str,
        translation: Translation,
        episode: &str,
    ) -> Result<Vec<EpisodeSource>>;
}
