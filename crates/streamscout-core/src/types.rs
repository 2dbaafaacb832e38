//! Core data types for stream aggregation
//!
//! Contains the request, candidate and stream shapes shared by every provider.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Request headers that must travel with a stream to make it playable
pub type Headers = BTreeMap<String, String>;

/// Builds a [`Headers`] map from literal pairs
pub fn headers<const N: usize>(pairs: [(&str, &str); N]) -> Headers {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Closed set of stream qualities, ordered by [`Quality::rank`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "4K")]
    Uhd4k,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "240p")]
    P240,
    Unknown,
    Auto,
}

impl Quality {
    /// Fixed rank table used for every quality sort
    pub fn rank(self) -> u8 {
        match self {
            Quality::Uhd4k => 7,
            Quality::P1440 => 6,
            Quality::P1080 => 5,
            Quality::P720 => 4,
            Quality::P480 => 3,
            Quality::P360 => 2,
            Quality::P240 => 1,
            Quality::Unknown | Quality::Auto => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Uhd4k => "4K",
            Quality::P1440 => "1440p",
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::P480 => "480p",
            Quality::P360 => "360p",
            Quality::P240 => "240p",
            Quality::Unknown => "Unknown",
            Quality::Auto => "Auto",
        }
    }

    pub fn is_known(self) -> bool {
        self.rank() > 0
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subtitle track attached to a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtitle {
    /// Language label or code (e.g., "English", "eng")
    pub language: String,

    /// Subtitle file URL
    pub url: String,

    /// Whether the player should select this track by default
    #[serde(rename = "default")]
    pub is_default: bool,
}

/// A playable stream, the output unit of every provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    /// Display label: provider, server, sub/dub type and quality
    pub name: String,

    /// Media title, with an `SxxEyy` suffix for episodes
    pub title: String,

    /// Playable resource URL (direct file, HLS manifest or variant)
    pub url: String,

    pub quality: Quality,

    /// Human-readable size or "Unknown"
    pub size: String,

    /// Headers required to play `url`
    #[serde(default)]
    pub headers: Headers,

    #[serde(default)]
    pub subtitles: Vec<Subtitle>,

    /// Identifier of the provider that produced the stream
    pub provider: String,
}

/// A single search-result entry before match scoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub title: String,

    /// Site-relative or absolute URL of the result page
    pub url: String,

    pub year: Option<i32>,

    pub episode_count: Option<u32>,
}

impl SearchCandidate {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            year: None,
            episode_count: None,
        }
    }

    pub fn with_year(mut self, year: Option<i32>) -> Self {
        self.year = year;
        self
    }
}

/// Kind of media being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }
}

impl FromStr for MediaType {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "movie" => Ok(MediaType::Movie),
            "tv" | "series" => Ok(MediaType::Tv),
            other => Err(ProviderError::InvalidId(format!("unknown media type '{other}'"))),
        }
    }
}

/// Content identifier as passed by the host application
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentId {
    Tmdb(u64),
    Imdb(String),
    AniList(u64),
    Mal(u64),
}

impl FromStr for ContentId {
    type Err = ProviderError;

    /// Accepts `"603"`, `"tt0133093"`, `"anilist:21"`, `"mal:21"` and `"tmdb:603"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parse_num = |v: &str| {
            v.trim()
                .parse::<u64>()
                .map_err(|_| ProviderError::InvalidId(s.to_string()))
        };

        if let Some(rest) = s.strip_prefix("anilist:") {
            return Ok(ContentId::AniList(parse_num(rest)?));
        }
        if let Some(rest) = s.strip_prefix("mal:") {
            return Ok(ContentId::Mal(parse_num(rest)?));
        }
        if let Some(rest) = s.strip_prefix("tmdb:") {
            return Ok(ContentId::Tmdb(parse_num(rest)?));
        }
        if s.starts_with("tt") && s.len() > 2 && s[2..].chars().all(|c| c.is_ascii_digit()) {
            return Ok(ContentId::Imdb(s.to_string()));
        }
        Ok(ContentId::Tmdb(parse_num(s)?))
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentId::Tmdb(id) => write!(f, "{id}"),
            ContentId::Imdb(id) => f.write_str(id),
            ContentId::AniList(id) => write!(f, "anilist:{id}"),
            ContentId::Mal(id) => write!(f, "mal:{id}"),
        }
    }
}

/// One `getStreams(id, mediaType, season, episode)` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRequest {
    pub id: ContentId,
    pub media_type: MediaType,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl MediaRequest {
    pub fn movie(id: ContentId) -> Self {
        Self {
            id,
            media_type: MediaType::Movie,
            season: None,
            episode: None,
        }
    }

    pub fn episode(id: ContentId, season: u32, episode: u32) -> Self {
        Self {
            id,
            media_type: MediaType::Tv,
            season: Some(season),
            episode: Some(episode),
        }
    }

    pub fn is_tv(&self) -> bool {
        self.media_type == MediaType::Tv
    }

    /// TMDB id, if the request carries one
    pub fn tmdb_id(&self) -> Option<u64> {
        match self.id {
            ContentId::Tmdb(id) => Some(id),
            _ => None,
        }
    }

    /// `SxxEyy` suffix for episode requests
    pub fn episode_tag(&self) -> Option<String> {
        match (self.media_type, self.season, self.episode) {
            (MediaType::Tv, Some(s), Some(e)) => Some(format!("S{s:02}E{e:02}")),
            _ => None,
        }
    }
}

/// Canonical metadata produced by the resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub title: String,
    pub year: Option<i32>,
    pub imdb_id: Option<String>,

    /// Release or first-air date as `YYYY-MM-DD`
    pub release_date: Option<String>,
}

impl MediaInfo {
    /// Human-readable title for a stream of this media
    pub fn display_title(&self, request: &MediaRequest) -> String {
        match request.episode_tag() {
            Some(tag) => format!("{} {}", self.title, tag),
            None => self.title.clone(),
        }
    }
}
