//! Metadata resolution: content id → canonical title, year and air dates
//!
//! Backed by TMDB for numeric ids, Cinemeta for IMDb ids and per-episode air
//! dates, ARM for TMDB → IMDb fallbacks and AniList for anime lookups.

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::client::HttpClient;
use crate::endpoints::Endpoints;
use crate::error::{ProviderError, Result};
use crate::types::{ContentId, Headers, MediaInfo, MediaRequest, MediaType, headers};

#[derive(Debug, Deserialize)]
struct TmdbDetails {
    title: Option<String>,
    name: Option<String>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    imdb_id: Option<String>,
    external_ids: Option<TmdbExternalIds>,
}

#[derive(Debug, Deserialize)]
struct TmdbExternalIds {
    imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CinemetaResponse {
    meta: Option<CinemetaMeta>,
}

#[derive(Debug, Deserialize)]
struct CinemetaMeta {
    name: Option<String>,
    released: Option<String>,
    #[serde(rename = "releaseInfo")]
    release_info: Option<String>,
    #[serde(default)]
    videos: Vec<CinemetaVideo>,
}

#[derive(Debug, Clone, Deserialize)]
struct CinemetaVideo {
    season: Option<u32>,
    episode: Option<u32>,
    name: Option<String>,
    released: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArmEntry {
    imdb: Option<String>,
}

/// Release date of one episode (or a movie) as listed by Cinemeta
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AirInfo {
    /// `YYYY-MM-DD`
    pub date: Option<String>,
    pub title: Option<String>,
    /// 1-based position among the season's episodes released the same day
    pub day_index: u32,
}

impl Default for AirInfo {
    fn default() -> Self {
        Self {
            date: None,
            title: None,
            day_index: 1,
        }
    }
}

/// Partial date as AniList reports it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct FuzzyDate {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AniListTitle {
    pub romaji: Option<String>,
    pub english: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamingEpisode {
    pub title: Option<String>,
}

/// One AniList media entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AniListMedia {
    pub id: u64,
    pub format: Option<String>,
    #[serde(default)]
    pub title: AniListTitle,
    #[serde(default)]
    pub start_date: FuzzyDate,
    #[serde(default)]
    pub end_date: FuzzyDate,
    pub episodes: Option<u32>,
    #[serde(default)]
    pub streaming_episodes: Vec<StreamingEpisode>,
}

impl AniListMedia {
    /// English title, falling back to romaji
    pub fn display_title(&self) -> Option<&str> {
        self.title
            .english
            .as_deref()
            .or(self.title.romaji.as_deref())
    }

    /// Movies, specials and single-episode entries
    pub fn is_single(&self) -> bool {
        matches!(self.format.as_deref(), Some("MOVIE") | Some("SPECIAL")) || self.episodes == Some(1)
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PageData {
    page: Option<MediaPage>,
}

#[derive(Debug, Deserialize)]
struct MediaPage {
    #[serde(default)]
    media: Vec<AniListMedia>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MediaData {
    media: Option<AniListMedia>,
}

const MEDIA_FIELDS: &str = "id type format title{romaji english} startDate{year month day} endDate{year month day} episodes streamingEpisodes{title}";

/// First `YYYY-MM-DD` prefix of an ISO timestamp
fn date_part(value: &str) -> Option<String> {
    let date = value.split('T').next()?.trim();
    date.get(..10).map(str::to_string)
}

fn year_of(date: Option<&str>) -> Option<i32> {
    date?.get(..4)?.parse().ok()
}

/// Metadata lookups bound to one HTTP client and endpoint set
#[derive(Clone, Copy)]
pub struct MetadataClient<'a> {
    http: &'a HttpClient,
    endpoints: &'a Endpoints,
}

impl<'a> MetadataClient<'a> {
    pub fn new(http: &'a HttpClient, endpoints: &'a Endpoints) -> Self {
        Self { http, endpoints }
    }

    fn json_headers() -> Headers {
        headers([("Accept", "application/json")])
    }

    /// Resolves a request's id to title, year and IMDb id
    ///
    /// # Errors
    /// - `InvalidId` - the answer carries no title
    /// - network and parse errors of the underlying service
    pub async fn resolve(&self, request: &MediaRequest) -> Result<MediaInfo> {
        match &request.id {
            ContentId::Tmdb(id) => self.tmdb(*id, request.media_type).await,
            ContentId::Imdb(imdb) => self.cinemeta(imdb, request.media_type).await,
            ContentId::AniList(id) => self.anilist_info(*id).await,
            ContentId::Mal(mal) => {
                let media = self.anilist_by_mal(*mal).await?;
                self.anilist_info(media.id).await
            }
        }
    }

    async fn tmdb(&self, id: u64, media_type: MediaType) -> Result<MediaInfo> {
        let url = format!(
            "{}/{}/{}?api_key={}&append_to_response=external_ids",
            self.endpoints.tmdb_base,
            media_type.as_str(),
            id,
            self.endpoints.tmdb_api_key
        );
        let details: TmdbDetails = self.http.get_json(&url, &Self::json_headers()).await?;

        let (title, date) = match media_type {
            MediaType::Movie => (details.title, details.release_date),
            MediaType::Tv => (details.name, details.first_air_date),
        };
        let title = title
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ProviderError::InvalidId(format!("TMDB {id} has no title")))?;
        let imdb_id = details
            .external_ids
            .and_then(|e| e.imdb_id)
            .or(details.imdb_id)
            .filter(|i| !i.is_empty());
        let release_date = date.as_deref().and_then(date_part);

        debug!(id, title = %title, "resolved TMDB metadata");
        Ok(MediaInfo {
            title,
            year: year_of(release_date.as_deref()),
            imdb_id,
            release_date,
        })
    }

    async fn cinemeta_meta(&self, imdb: &str, media_type: MediaType) -> Result<CinemetaMeta> {
        let kind = match media_type {
            MediaType::Movie => "movie",
            MediaType::Tv => "series",
        };
        let url = format!("{}/meta/{}/{}.json", self.endpoints.cinemeta_base, kind, imdb);
        let response: CinemetaResponse = self.http.get_json(&url, &Self::json_headers()).await?;
        response
            .meta
            .ok_or_else(|| ProviderError::NotFound(format!("Cinemeta has no entry for {imdb}")))
    }

    async fn cinemeta(&self, imdb: &str, media_type: MediaType) -> Result<MediaInfo> {
        let meta = self.cinemeta_meta(imdb, media_type).await?;
        let title = meta
            .name
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ProviderError::InvalidId(format!("{imdb} has no title")))?;
        let release_date = meta.released.as_deref().and_then(date_part);
        let year = year_of(meta.release_info.as_deref()).or(year_of(release_date.as_deref()));

        Ok(MediaInfo {
            title,
            year,
            imdb_id: Some(imdb.to_string()),
            release_date,
        })
    }

    /// Air date, title and same-day index of an episode (or a movie)
    pub async fn episode_air_info(
        &self,
        imdb: &str,
        media_type: MediaType,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<AirInfo> {
        let meta = self.cinemeta_meta(imdb, media_type).await?;

        if media_type == MediaType::Movie {
            return Ok(AirInfo {
                date: meta.released.as_deref().and_then(date_part),
                title: meta.name,
                day_index: 1,
            });
        }

        let (Some(season), Some(episode)) = (season, episode) else {
            return Ok(AirInfo::default());
        };
        let Some(target) = meta
            .videos
            .iter()
            .find(|v| v.season == Some(season) && v.episode == Some(episode))
        else {
            return Ok(AirInfo::default());
        };
        let Some(date) = target.released.as_deref().and_then(date_part) else {
            return Ok(AirInfo::default());
        };

        let earlier_same_day = meta
            .videos
            .iter()
            .filter(|v| v.season == Some(season))
            .filter(|v| v.released.as_deref().and_then(date_part).as_deref() == Some(date.as_str()))
            .filter(|v| v.episode.is_some_and(|e| e < episode))
            .count() as u32;

        Ok(AirInfo {
            date: Some(date),
            title: target.name.clone(),
            day_index: earlier_same_day + 1,
        })
    }

    /// IMDb id of a TMDB entry through the ARM mapping service
    pub async fn arm_imdb(&self, tmdb_id: u64) -> Result<Option<String>> {
        let url = format!("{}/themoviedb?id={}", self.endpoints.arm_base, tmdb_id);
        let entries: Vec<ArmEntry> = self.http.get_json(&url, &Self::json_headers()).await?;
        Ok(entries.into_iter().find_map(|e| e.imdb).filter(|i| !i.is_empty()))
    }

    async fn anilist_query<T: serde::de::DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let body = json!({ "query": query, "variables": variables });
        let response: GraphQlResponse<T> = self
            .http
            .post_json(&self.endpoints.anilist_graphql, &Self::json_headers(), &body)
            .await?;
        response
            .data
            .ok_or_else(|| ProviderError::ParseError("AniList response without data".to_string()))
    }

    /// Anime entries matching a title search, in AniList relevance order
    pub async fn anilist_search(&self, title: &str) -> Result<Vec<AniListMedia>> {
        let query = format!(
            "query($search:String){{Page(perPage:20){{media(search:$search,type:ANIME){{{MEDIA_FIELDS}}}}}}}"
        );
        let data: PageData = self.anilist_query(&query, json!({ "search": title })).await?;
        Ok(data.page.map(|p| p.media).unwrap_or_default())
    }

    /// AniList entry by AniList id
    pub async fn anilist_by_id(&self, id: u64) -> Result<AniListMedia> {
        let query = format!("query($id:Int){{Media(id:$id,type:ANIME){{{MEDIA_FIELDS}}}}}");
        let data: MediaData = self.anilist_query(&query, json!({ "id": id })).await?;
        data.media
            .ok_or_else(|| ProviderError::NotFound(format!("anilist:{id}")))
    }

    /// AniList entry for a MyAnimeList id
    pub async fn anilist_by_mal(&self, mal: u64) -> Result<AniListMedia> {
        let query = format!("query($id:Int){{Media(idMal:$id,type:ANIME){{{MEDIA_FIELDS}}}}}");
        let data: MediaData = self.anilist_query(&query, json!({ "id": mal })).await?;
        data.media
            .ok_or_else(|| ProviderError::NotFound(format!("mal:{mal}")))
    }

    async fn anilist_info(&self, id: u64) -> Result<MediaInfo> {
        let media = self.anilist_by_id(id).await?;
        let title = media
            .display_title()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::InvalidId(format!("anilist:{id} has no title")))?;
        let release_date = match (media.start_date.year, media.start_date.month, media.start_date.day) {
            (Some(y), Some(m), Some(d)) => Some(format!("{y:04}-{m:02}-{d:02}")),
            _ => None,
        };
        Ok(MediaInfo {
            title,
            year: media.start_date.year,
            imdb_id: None,
            release_date,
        })
    }
}
