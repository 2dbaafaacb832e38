//! Vixsrc: TMDB-keyed embed page → master playlist, plus English subtitles

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::Html;
use serde::Deserialize;
use tracing::debug;

use super::{Provider, ProviderContext, hls_streams};
use crate::client::USER_AGENT;
use crate::error::{ProviderError, Result};
use crate::parser::{cached_regex, selector};
use crate::pipeline::{Stage, require, run_stage};
use crate::playlist::resolve_playlist;
use crate::types::{Headers, MediaRequest, Quality, Stream, Subtitle, headers};

const ID: &str = "vixsrc";

/// Subtitle encodings in order of preference
const ENCODINGS: &[&[&str]] = &[&["ASCII", "UTF-8"], &["CP1252"], &["CP1250"], &["CP850"]];

pub struct Vixsrc;

#[derive(Debug, Deserialize)]
struct SubtitleTrack {
    #[serde(default)]
    display: String,
    #[serde(default)]
    encoding: String,
    #[serde(default)]
    url: String,
}

fn capture(cell: &'static OnceLock<Option<Regex>>, pattern: &str, text: &str) -> Option<String> {
    cached_regex(cell, pattern)?
        .captures(text)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

/// Playlist URL assembled from `window.masterPlaylist`
fn master_playlist(html: &str) -> Option<String> {
    static URL: OnceLock<Option<Regex>> = OnceLock::new();
    static TOKEN: OnceLock<Option<Regex>> = OnceLock::new();
    static EXPIRES: OnceLock<Option<Regex>> = OnceLock::new();

    if !html.contains("window.masterPlaylist") {
        return None;
    }
    let url = capture(&URL, r#"url:\s*['"]([^'"]+)['"]"#, html)?;
    let token = capture(&TOKEN, r#"['"]?token['"]?\s*:\s*['"]([^'"]+)['"]"#, html)?;
    let expires = capture(&EXPIRES, r#"['"]?expires['"]?\s*:\s*['"]([^'"]+)['"]"#, html)?;

    let joiner = if url.contains("?b=1") { '&' } else { '?' };
    Some(format!("{url}{joiner}token={token}&expires={expires}&h=1&lang=en"))
}

fn script_playlist(html: &str) -> Option<String> {
    static STREAM: OnceLock<Option<Regex>> = OnceLock::new();

    let scripts = selector("script").ok()?;
    let re = cached_regex(&STREAM, r#"['"]?(https?://[^'"\s]+(?:\.m3u8|playlist)[^'"\s]*)"#)?;
    let document = Html::parse_document(html);
    document
        .select(&scripts)
        .map(|script| script.text().collect::<String>())
        .find_map(|code| re.captures(&code)?.get(1).map(|m| m.as_str().to_string()))
}

/// Master playlist of an embed page: `window.masterPlaylist`, else a bare
/// `.m3u8` URL, else a playlist URL inside a script
fn find_playlist(html: &str) -> Option<String> {
    static BARE: OnceLock<Option<Regex>> = OnceLock::new();

    master_playlist(html)
        .or_else(|| capture(&BARE, r#"(https?://[^'"\s]+\.m3u8[^'"\s]*)"#, html))
        .or_else(|| script_playlist(html))
}

/// Best English track by encoding preference
fn pick_subtitle(tracks: &[SubtitleTrack]) -> Option<Subtitle> {
    ENCODINGS.iter().find_map(|accepted| {
        tracks
            .iter()
            .filter(|t| !t.url.is_empty() && t.display.contains("English"))
            .find(|t| accepted.contains(&t.encoding.as_str()))
            .map(|t| Subtitle {
                language: "English".to_string(),
                url: t.url.clone(),
                is_default: true,
            })
    })
}

impl Vixsrc {
    fn page_url(base: &str, tmdb_id: u64, request: &MediaRequest) -> String {
        match (request.is_tv(), request.season, request.episode) {
            (true, Some(s), Some(e)) => format!("{base}/tv/{tmdb_id}/{s}/{e}"),
            _ => format!("{base}/movie/{tmdb_id}"),
        }
    }

    /// English subtitle for the request; failures only cost the subtitle
    async fn subtitle(ctx: &ProviderContext, tmdb_id: u64, request: &MediaRequest) -> Option<Subtitle> {
        let mut url = format!("{}/search?id={tmdb_id}", ctx.endpoints.subtitles_api);
        if let (true, Some(s), Some(e)) = (request.is_tv(), request.season, request.episode) {
            url.push_str(&format!("&season={s}&episode={e}"));
        }
        match ctx.http.get_json::<Vec<SubtitleTrack>>(&url, &Headers::new()).await {
            Ok(tracks) => pick_subtitle(&tracks),
            Err(e) => {
                debug!(provider = ID, error = %e, "subtitle lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl Provider for Vixsrc {
    fn id(&self) -> &'static str {
        ID
    }

    fn display_name(&self) -> &'static str {
        "Vixsrc"
    }

    async fn fetch_streams(&self, ctx: &ProviderContext, request: &MediaRequest) -> Result<Vec<Stream>> {
        let tmdb_id = require(
            request.tmdb_id(),
            Stage::Resolve,
            ProviderError::InvalidId(format!("{} is not a TMDB id", request.id)),
        )?;
        let info = run_stage(ID, Stage::Resolve, ctx.metadata().resolve(request)).await?;

        let base = ctx.endpoints.vixsrc_base.trim_end_matches('/');
        let page_url = Self::page_url(base, tmdb_id, request);
        let page = run_stage(
            ID,
            Stage::Extract,
            ctx.http.get_text(
                &page_url,
                &headers([(
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                )]),
            ),
        )
        .await?;
        let playlist = require(
            find_playlist(&page),
            Stage::Extract,
            ProviderError::ElementNotFound(format!("master playlist on {page_url}")),
        )?;
        debug!(provider = ID, playlist = %playlist, "found master playlist");

        let stream_headers = headers([("Referer", base), ("User-Agent", USER_AGENT)]);
        let resolution = run_stage(ID, Stage::Hls, async {
            Ok::<_, ProviderError>(resolve_playlist(&ctx.http, &playlist, &stream_headers).await)
        })
        .await?;
        let subtitles = Self::subtitle(ctx, tmdb_id, request).await.into_iter().collect();

        let base_stream = Stream {
            name: String::new(),
            title: info.display_title(request),
            url: playlist,
            quality: Quality::Auto,
            size: "Unknown".to_string(),
            headers: stream_headers,
            subtitles,
            provider: ID.to_string(),
        };
        Ok(hls_streams(resolution, base_stream, |quality| format!("Vixsrc | {quality}")))
    }
}
