use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use clap::ValueEnum;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const MAL_API_URL: &str = "https://api.myanimelist.net/v2";
const MAL_CLIENT_ID_HEADER: &str = "X-MAL-CLIENT-ID";
const MAL_TIMEOUT: Duration = Duration::from_secs(10);

const RANKING_FIELDS: &str = "id,title,main_picture,mean,media_type";
const SEASONAL_FIELDS: &str = "id,title,main_picture,media_type";
const DETAIL_FIELDS: &str = "id,title,main_picture,synopsis,start_date,end_date,mean,rank,popularity,media_type,num_episodes,status,genres,broadcast";

pub const DEFAULT_RANKING_LIMIT: u32 = 20;
pub const DEFAULT_SEASONAL_LIMIT: u32 = 24;

#[derive(Debug, Error)]
pub enum MalError {
    #[error("MAL client id not configured (set mal.client_id or ANIMESRC_MAL__CLIENT_ID)")]
    Unconfigured,

    #[error("MAL HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("MAL request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MalConfig {
    pub client_id: Option<String>,
}

impl MalConfig {
    fn client_id(&self) -> Result<&str, MalError> {
        self.client_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(MalError::Unconfigured)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RankingType {
    All,
    Airing,
    Upcoming,
    Tv,
    Ova,
    Movie,
    Special,
    Bypopularity,
    Favorite,
}

impl RankingType {
    pub fn as_str(self) -> &'static str {
        match self {
            RankingType::All => "all",
            RankingType::Airing => "airing",
            RankingType::Upcoming => "upcoming",
            RankingType::Tv => "tv",
            RankingType::Ova => "ova",
            RankingType::Movie => "movie",
            RankingType::Special => "special",
            RankingType::Bypopularity => "bypopularity",
            RankingType::Favorite => "favorite",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeasonName {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl SeasonName {
    pub fn as_str(self) -> &'static str {
        match self {
            SeasonName::Winter => "winter",
            SeasonName::Spring => "spring",
            SeasonName::Summer => "summer",
            SeasonName::Fall => "fall",
        }
    }
}

impl fmt::Display for SeasonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Season containing `now` (UTC): Jan-Feb winter, Mar-May spring,
/// Jun-Aug summer, Sep-Dec fall.
pub fn current_season(now: DateTime<Utc>) -> (i32, SeasonName) {
    let season = match now.month() {
        1..=2 => SeasonName::Winter,
        3..=5 => SeasonName::Spring,
        6..=8 => SeasonName::Summer,
        _ => SeasonName::Fall,
    };
    (now.year(), season)
}

#[derive(Debug, Clone, Deserialize)]
pub struct MalPicture {
    pub medium: Option<String>,
    pub large: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MalNode {
    pub id: u64,
    pub title: String,
    pub main_picture: Option<MalPicture>,
    pub mean: Option<f64>,
    pub media_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MalRank {
    pub rank: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MalRankingItem {
    pub node: MalNode,
    pub ranking: MalRank,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MalSeasonalItem {
    pub node: MalNode,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MalPaging {
    pub next: Option<String>,
    pub previous: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MalList<T> {
    pub data: Vec<T>,
    pub paging: Option<MalPaging>,
}

impl<T> MalList<T> {
    pub fn next_page(&self) -> Option<&str> {
        self.paging.as_ref()?.next.as_deref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MalGenre {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MalBroadcast {
    pub day_of_week: Option<String>,
    pub start_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MalAnimeDetails {
    #[serde(flatten)]
    pub node: MalNode,
    pub synopsis: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub rank: Option<u32>,
    pub popularity: Option<u32>,
    pub num_episodes: Option<u32>,
    pub status: Option<String>,
    #[serde(default)]
    pub genres: Vec<MalGenre>,
    pub broadcast: Option<MalBroadcast>,
}

pub struct MalClient {
    client: Client,
    config: MalConfig,
}

impl MalClient {
    pub fn new(config: MalConfig) -> Result<Self, MalError> {
        let client = Client::builder()
            .user_agent(concat!("animesrc/", env!("CARGO_PKG_VERSION")))
            .timeout(MAL_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn is_configured(&self) -> bool {
        self.config.client_id().is_ok()
    }

    pub async fn anime_ranking(
        &self,
        ranking_type: RankingType,
        limit: u32,
    ) -> Result<MalList<MalRankingItem>, MalError> {
        let limit = limit.to_string();
        self.get(
            "/anime/ranking",
            &[
                ("ranking_type", ranking_type.as_str()),
                ("limit", limit.as_str()),
                ("fields", RANKING_FIELDS),
            ],
        )
        .await
    }

    pub async fn seasonal_anime(
        &self,
        year: i32,
        season: SeasonName,
        limit: u32,
    ) -> Result<MalList<MalSeasonalItem>, MalError> {
        let limit = limit.to_string();
        self.get(
            &format!("/anime/season/{year}/{season}"),
            &[("limit", limit.as_str()), ("fields", SEASONAL_FIELDS)],
        )
        .await
    }

    pub async fn anime_details(&self, id: u64) -> Result<MalAnimeDetails, MalError> {
        self.get(&format!("/anime/{id}"), &[("fields", DETAIL_FIELDS)])
            .await
    }

    /// Follows an absolute paging URL such as [`MalList::next_page`].
    pub async fn get_absolute<T: DeserializeOwned>(&self, url: &str) -> Result<T, MalError> {
        self.send(url, &[]).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, MalError> {
        self.send(&format!("{MAL_API_URL}{path}"), query).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, MalError> {
        let client_id = self.config.client_id()?;
        debug!("MAL GET {url}");
        let response = self
            .client
            .get(url)
            .query(query)
            .header(MAL_CLIENT_ID_HEADER, client_id)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MalError::Http { status, body });
        }
        Ok(response.json().await?)
    }
}
