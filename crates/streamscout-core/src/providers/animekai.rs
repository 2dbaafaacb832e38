//! AnimeKai: AniList entry by air date, site token from the enc-dec
//! database, servers decrypted through the middleware
//!
//! `anilist:` and `mal:` ids name the entry directly. TMDB and IMDb ids are
//! pinned to an AniList entry by comparing the episode's air date with each
//! candidate's airing window.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use serde::Deserialize;
use tracing::debug;

use super::{Provider, ProviderContext};
use crate::client::USER_AGENT;
use crate::error::{ProviderError, Result};
use crate::metadata::{AirInfo, AniListMedia, FuzzyDate};
use crate::parser::quality::quality_from_url;
use crate::pipeline::{Stage, require, run_stage};
use crate::playlist::resolve_playlist;
use crate::pool::run_bounded_flat;
use crate::types::{ContentId, Headers, MediaRequest, MediaType, Quality, Stream, Subtitle, headers};

const ID: &str = "animekai";
const SERVER_CONCURRENCY: usize = 4;

/// Slack in days around an entry's start and end dates
const DATE_SLACK: u64 = 2;

const VIDEO_ACCEPT: &str = "video/webm,video/ogg,video/*;q=0.9,application/ogg;q=0.7,audio/*;q=0.6,*/*;q=0.5";

pub struct AnimeKai;

/// Episode pinned to an AniList entry
#[derive(Debug, Clone, PartialEq, Eq)]
struct EpisodeMatch {
    anilist_id: u64,
    episode: u32,
    /// Title of the episode, tried when the database lacks its number
    title: Option<String>,
}

#[derive(Debug, Clone)]
struct AirDate {
    show_title: String,
    date: NaiveDate,
    episode_title: Option<String>,
    day_index: u32,
}

#[derive(Debug, Deserialize)]
struct DbEntry {
    info: Option<DbInfo>,
    /// season → episode number → episode
    #[serde(default)]
    episodes: BTreeMap<String, BTreeMap<String, DbEpisode>>,
}

#[derive(Debug, Deserialize)]
struct DbInfo {
    title_en: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DbEpisode {
    token: Option<String>,
    title: Option<String>,
}

/// `{ "result": … }` answer of the site's AJAX endpoints
#[derive(Debug, Deserialize)]
struct AjaxResult {
    result: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServerEntry {
    lid: Option<String>,
    name: Option<String>,
    title: Option<String>,
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Embed {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MegaMedia {
    #[serde(default)]
    sources: Vec<MegaSource>,
    #[serde(default)]
    tracks: Vec<MegaTrack>,
}

#[derive(Debug, Deserialize)]
struct MegaSource {
    file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MegaTrack {
    kind: Option<String>,
    file: Option<String>,
    label: Option<String>,
    #[serde(default)]
    default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Server {
    /// `sub`, `softsub`, `dub`, …
    kind: String,
    name: String,
    lid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Source {
    url: String,
    quality: Quality,
    kind: String,
    server: String,
}

#[derive(Debug, Default)]
struct ServerMedia {
    sources: Vec<Source>,
    subtitles: Vec<Subtitle>,
}

/// Lowercase ASCII letters and digits only
fn squash(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn titles_overlap(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.get(..10)?, "%Y-%m-%d").ok()
}

/// Calendar date where an overlong day rolls into the next month
fn lenient_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)?.checked_add_days(Days::new(u64::from(day.max(1)) - 1))
}

fn full_date(date: &FuzzyDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year?, date.month?, date.day?)
}

/// Whether the entry was airing on `target`
///
/// Movies and specials must start within the slack of the date. Series
/// must have started by then and, once finished, not ended before it.
fn airs_on(media: &AniListMedia, target: NaiveDate) -> bool {
    let Some(start) = full_date(&media.start_date) else {
        return false;
    };
    if media.is_single() {
        return (target - start).num_days().unsigned_abs() <= DATE_SLACK;
    }
    if start.checked_sub_days(Days::new(DATE_SLACK)).is_none_or(|earliest| target < earliest) {
        return false;
    }
    let Some(year) = media.end_date.year else {
        return true;
    };
    let end = &media.end_date;
    lenient_date(year, end.month.unwrap_or(12), end.day.unwrap_or(31))
        .and_then(|end| end.checked_add_days(Days::new(DATE_SLACK)))
        .is_some_and(|latest| target <= latest)
}

/// First candidate airing on the date, with the episode number to ask for
///
/// The same-day index stands in for the episode of single entries; a
/// matching streaming-episode title overrides both.
fn match_by_date(candidates: &[AniListMedia], air: &AirDate, requested: Option<u32>) -> Option<EpisodeMatch> {
    let media = candidates.iter().find(|m| airs_on(m, air.date))?;

    let mut episode = match requested {
        Some(episode) if !media.is_single() => episode,
        _ => air.day_index.max(1),
    };
    if media.streaming_episodes.len() > 1
        && let Some(target) = air.episode_title.as_deref().map(squash)
        && let Some(index) = media
            .streaming_episodes
            .iter()
            .position(|ep| titles_overlap(&squash(ep.title.as_deref().unwrap_or_default()), &target))
    {
        episode = index as u32 + 1;
    }

    Some(EpisodeMatch {
        anilist_id: media.id,
        episode,
        title: air.episode_title.clone(),
    })
}

fn in_numeric_order(season: &BTreeMap<String, DbEpisode>) -> Vec<(&String, &DbEpisode)> {
    let mut episodes: Vec<_> = season.iter().collect();
    episodes.sort_by_key(|(key, _)| key.parse::<u32>().unwrap_or(u32::MAX));
    episodes
}

/// Token and episode key: by number across seasons, else by title
fn find_token(entry: &DbEntry, episode: u32, title: Option<&str>) -> Option<(String, String)> {
    let wanted = episode.to_string();
    if let Some(token) = entry
        .episodes
        .values()
        .find_map(|season| season.get(&wanted)?.token.clone())
    {
        return Some((token, wanted));
    }

    let target = squash(title?);
    entry
        .episodes
        .values()
        .flat_map(in_numeric_order)
        .find_map(|(key, ep)| {
            let listed = squash(ep.title.as_deref()?);
            if titles_overlap(&listed, &target) {
                Some((ep.token.clone()?, key.clone()))
            } else {
                None
            }
        })
}

fn server_label(key: &str, entry: &ServerEntry) -> String {
    [&entry.name, &entry.title, &entry.label]
        .into_iter()
        .flatten()
        .find(|name| !name.trim().is_empty())
        .map(|name| name.trim().to_string())
        .unwrap_or_else(|| {
            if key.parse::<u64>().is_ok() {
                format!("Server {key}")
            } else {
                key.to_string()
            }
        })
}

/// Flattens `type → key → entry` into servers that carry a link id
fn servers(listing: BTreeMap<String, BTreeMap<String, ServerEntry>>) -> Vec<Server> {
    listing
        .into_iter()
        .flat_map(|(kind, entries)| {
            entries.into_iter().filter_map(move |(key, entry)| {
                let lid = entry.lid.clone().filter(|l| !l.is_empty())?;
                Some(Server {
                    kind: kind.clone(),
                    name: server_label(&key, &entry),
                    lid,
                })
            })
        })
        .collect()
}

fn type_label(kind: &str) -> &str {
    match kind {
        "sub" => "Hard Sub",
        "softsub" => "Soft Sub",
        "dub" => "Dub & S-Sub",
        "" => "Raw",
        other => other,
    }
}

fn stream_headers() -> Headers {
    headers([
        ("User-Agent", USER_AGENT),
        ("Accept", VIDEO_ACCEPT),
        ("Accept-Language", "en-US,en;q=0.9"),
        ("Accept-Encoding", "identity"),
    ])
}

/// Streams of every source, first occurrence of a URL wins
fn format_streams(sources: Vec<Source>, subtitles: &[Subtitle], title: &str) -> Vec<Stream> {
    let stream_headers = stream_headers();
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|source| seen.insert(source.url.clone()))
        .map(|source| {
            let quality = if source.quality.is_known() {
                source.quality
            } else {
                Quality::Auto
            };
            Stream {
                name: format!(
                    "AnimeKai | {} | [{}] - {}",
                    source.server,
                    type_label(&source.kind),
                    quality
                ),
                title: title.to_string(),
                url: source.url,
                quality,
                size: "Unknown".to_string(),
                headers: stream_headers.clone(),
                subtitles: subtitles.to_vec(),
                provider: ID.to_string(),
            }
        })
        .collect()
}

impl AnimeKai {
    fn ajax_headers() -> Headers {
        headers([("User-Agent", USER_AGENT)])
    }

    /// Show title and air date of the requested movie or episode
    async fn air_date(ctx: &ProviderContext, request: &MediaRequest) -> Result<AirDate> {
        let metadata = ctx.metadata();
        let info = metadata.resolve(request).await?;

        let imdb = match (&request.id, info.imdb_id.clone()) {
            (_, Some(imdb)) => imdb,
            (ContentId::Tmdb(id), None) => metadata
                .arm_imdb(*id)
                .await?
                .ok_or_else(|| ProviderError::NotFound(format!("IMDb id for TMDB {id}")))?,
            (other, None) => return Err(ProviderError::InvalidId(other.to_string())),
        };

        let air = metadata
            .episode_air_info(&imdb, request.media_type, request.season, request.episode)
            .await
            .unwrap_or_else(|e| {
                debug!(provider = ID, imdb = %imdb, error = %e, "no air info");
                AirInfo::default()
            });
        let date = match request.media_type {
            MediaType::Movie => info.release_date.clone().or(air.date),
            MediaType::Tv => air.date,
        };
        let date = date
            .as_deref()
            .and_then(parse_date)
            .ok_or_else(|| ProviderError::NotFound(format!("air date of {}", request.id)))?;

        Ok(AirDate {
            show_title: info.title,
            date,
            episode_title: air.title,
            day_index: air.day_index,
        })
    }

    async fn pin_episode(ctx: &ProviderContext, request: &MediaRequest) -> Result<EpisodeMatch> {
        let episode = request.episode.unwrap_or(1);
        match &request.id {
            ContentId::AniList(id) => Ok(EpisodeMatch {
                anilist_id: *id,
                episode,
                title: None,
            }),
            ContentId::Mal(mal) => {
                let media = run_stage(ID, Stage::Resolve, ctx.metadata().anilist_by_mal(*mal)).await?;
                Ok(EpisodeMatch {
                    anilist_id: media.id,
                    episode,
                    title: None,
                })
            }
            ContentId::Tmdb(_) | ContentId::Imdb(_) => {
                let air = run_stage(ID, Stage::Resolve, Self::air_date(ctx, request)).await?;
                let candidates =
                    run_stage(ID, Stage::Search, ctx.metadata().anilist_search(&air.show_title)).await?;
                let requested = request.episode.filter(|_| request.is_tv());
                require(
                    match_by_date(&candidates, &air, requested),
                    Stage::Select,
                    ProviderError::NoMatch(format!("{} airing {}", air.show_title, air.date)),
                )
            }
        }
    }

    async fn lookup_db(ctx: &ProviderContext, anilist_id: u64) -> Result<DbEntry> {
        let url = format!("{}/find?anilist_id={anilist_id}", ctx.endpoints.enc_dec_db);
        let entries: Vec<DbEntry> = ctx.http.get_json(&url, &Headers::new()).await?;
        entries
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound(format!("anilist:{anilist_id} in token database")))
    }

    async fn list_servers(ctx: &ProviderContext, token: &str) -> Result<Vec<Server>> {
        let codec = ctx.codec();
        let encrypted = codec.enc_kai(token).await?;
        let url = format!(
            "{}/links/list?token={}&_={}",
            ctx.endpoints.animekai_ajax,
            urlencoding::encode(token),
            urlencoding::encode(&encrypted)
        );
        let listing: AjaxResult = ctx.http.get_json(&url, &Self::ajax_headers()).await?;
        let html = listing
            .result
            .ok_or_else(|| ProviderError::ParseError("links/list without result".to_string()))?;

        let parsed: BTreeMap<String, BTreeMap<String, ServerEntry>> = codec.parse_html(&html).await?;
        Ok(servers(parsed))
    }

    /// Sources and captions behind one server
    async fn fetch_server(ctx: &ProviderContext, server: &Server) -> Result<Vec<ServerMedia>> {
        let codec = ctx.codec();
        let encrypted = codec.enc_kai(&server.lid).await?;
        let url = format!(
            "{}/links/view?id={}&_={}",
            ctx.endpoints.animekai_ajax,
            urlencoding::encode(&server.lid),
            urlencoding::encode(&encrypted)
        );
        let view: AjaxResult = ctx.http.get_json(&url, &Self::ajax_headers()).await?;
        let payload = view
            .result
            .ok_or_else(|| ProviderError::ParseError("links/view without result".to_string()))?;

        let embed: Embed = codec.dec_kai(&payload).await?;
        let Some(embed_url) = embed.url.filter(|u| !u.is_empty()) else {
            return Ok(Vec::new());
        };
        let media: AjaxResult = ctx
            .http
            .get_json(&embed_url.replace("/e/", "/media/"), &Self::ajax_headers())
            .await?;
        let encrypted = media
            .result
            .ok_or_else(|| ProviderError::ParseError(format!("{embed_url} without media")))?;
        let mega: MegaMedia = codec.dec_mega(&encrypted).await?;

        let sources = mega
            .sources
            .into_iter()
            .filter_map(|s| s.file.filter(|f| !f.is_empty()))
            .map(|url| Source {
                quality: quality_from_url(&url),
                url,
                kind: server.kind.clone(),
                server: server.name.clone(),
            })
            .collect();
        let subtitles = mega
            .tracks
            .into_iter()
            .filter(|t| t.kind.as_deref() == Some("captions"))
            .filter_map(|t| {
                Some(Subtitle {
                    language: t.label.unwrap_or_else(|| "Unknown".to_string()),
                    url: t.file.filter(|f| !f.is_empty())?,
                    is_default: t.default,
                })
            })
            .collect();

        Ok(vec![ServerMedia { sources, subtitles }])
    }

    /// Direct files as they are, playlists expanded into their variants
    async fn expand(ctx: &ProviderContext, sources: Vec<Source>) -> Vec<Source> {
        let (playlists, direct): (Vec<Source>, Vec<Source>) =
            sources.into_iter().partition(|s| s.url.contains(".m3u8"));

        let fetch_headers = Self::ajax_headers();
        let fetch_headers = &fetch_headers;
        let tasks = playlists.iter().map(|source| {
            (source.url.clone(), async move {
                let resolution = run_stage(ID, Stage::Hls, async {
                    Ok::<_, ProviderError>(resolve_playlist(&ctx.http, &source.url, fetch_headers).await)
                })
                .await?;
                Ok::<_, ProviderError>(resolution
                    .variants
                    .into_iter()
                    .map(|variant| Source {
                        url: variant.url,
                        quality: variant.quality,
                        kind: source.kind.clone(),
                        server: source.server.clone(),
                    })
                    .collect::<Vec<_>>())
            })
        });
        let resolved = run_bounded_flat(tasks, SERVER_CONCURRENCY, None).await;

        direct.into_iter().chain(resolved).collect()
    }
}

#[async_trait]
impl Provider for AnimeKai {
    fn id(&self) -> &'static str {
        ID
    }

    fn display_name(&self) -> &'static str {
        "AnimeKai"
    }

    async fn fetch_streams(&self, ctx: &ProviderContext, request: &MediaRequest) -> Result<Vec<Stream>> {
        let pinned = Self::pin_episode(ctx, request).await?;
        debug!(provider = ID, anilist = pinned.anilist_id, episode = pinned.episode, "episode pinned");

        let entry = run_stage(ID, Stage::Extract, Self::lookup_db(ctx, pinned.anilist_id)).await?;
        let (token, episode_key) = require(
            find_token(&entry, pinned.episode, pinned.title.as_deref()),
            Stage::Extract,
            ProviderError::NoToken(format!("episode {} of anilist:{}", pinned.episode, pinned.anilist_id)),
        )?;

        let servers = run_stage(ID, Stage::Extract, Self::list_servers(ctx, &token)).await?;
        debug!(provider = ID, count = servers.len(), "servers listed");

        let tasks = servers
            .iter()
            .map(|server| (format!("{} {}", server.kind, server.name), Self::fetch_server(ctx, server)));
        let media = run_bounded_flat(tasks, SERVER_CONCURRENCY, None).await;

        let mut sources = Vec::new();
        let mut subtitles = Vec::new();
        for server_media in media {
            sources.extend(server_media.sources);
            subtitles.extend(server_media.subtitles);
        }
        let sources = Self::expand(ctx, sources).await;

        let show = entry
            .info
            .and_then(|info| info.title_en)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Anime".to_string());
        Ok(format_streams(sources, &subtitles, &format!("{show} E{episode_key}")))
    }
}
