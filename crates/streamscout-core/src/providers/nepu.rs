//! Nepu: AJAX search, `data-embed` id, embed POST, HLS playlist

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::{Provider, ProviderContext, hls_streams};
use crate::client::USER_AGENT;
use crate::error::{ProviderError, Result};
use crate::matching::select_best;
use crate::parser::cached_regex;
use crate::parser::search::year_from_title;
use crate::pipeline::{Stage, require, run_stage};
use crate::playlist::resolve_playlist;
use crate::types::{Headers, MediaInfo, MediaRequest, Quality, SearchCandidate, Stream, headers};

const ID: &str = "nepu";

pub struct Nepu;

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Post>,
}

#[derive(Debug, Deserialize)]
struct Post {
    url: Option<String>,
    name: Option<String>,
}

/// `The Dark Knight!` → `the-dark-knight`
fn slug(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ')
        .collect::<String>()
        .trim()
        .replace(' ', "-")
}

/// Picks the post whose path carries the expected slug, falling back to
/// title scoring
fn pick_post(posts: &[Post], info: &MediaInfo, request: &MediaRequest) -> Option<String> {
    let prefix = if request.is_tv() { "/serie/" } else { "/movie/" };
    let expected = format!("{prefix}{}", slug(&info.title));

    if let Some(url) = posts
        .iter()
        .filter_map(|post| post.url.as_deref())
        .find(|url| url.contains(&expected))
    {
        return Some(url.to_string());
    }

    let candidates: Vec<SearchCandidate> = posts
        .iter()
        .filter_map(|post| {
            let url = post.url.as_deref()?;
            let name = post.name.as_deref()?;
            Some(SearchCandidate::new(name, url).with_year(year_from_title(name)))
        })
        .filter(|candidate| candidate.url.contains(prefix))
        .collect();
    let season = request.season.filter(|_| request.is_tv());
    select_best(&candidates, &info.title, info.year, season).map(|c| c.url.clone())
}

fn embed_id(html: &str) -> Option<String> {
    static EMBED: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&EMBED, r#"data-embed="([^"]+)""#)?
        .captures(html)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

fn playlist_url(embed: &str) -> Option<String> {
    static M3U8: OnceLock<Option<Regex>> = OnceLock::new();
    let embed = embed.replace("\\/", "/");
    cached_regex(&M3U8, r#"(https?://[^"]+\.m3u8)"#)?
        .captures(&embed)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

impl Nepu {
    fn ajax_headers(base: &str) -> Headers {
        let referer = format!("{base}/");
        headers([
            ("User-Agent", USER_AGENT),
            ("X-Requested-With", "XMLHttpRequest"),
            ("Referer", referer.as_str()),
        ])
    }

    async fn search(ctx: &ProviderContext, base: &str, title: &str) -> Result<Vec<Post>> {
        let url = format!("{base}/ajax/posts?q={}", urlencoding::encode(title));
        let response: SearchResponse = ctx.http.get_json(&url, &Self::ajax_headers(base)).await?;
        debug!(provider = ID, title, count = response.data.len(), "search results");
        Ok(response.data)
    }

    /// Playlist URL behind the page's embed id
    async fn extract(ctx: &ProviderContext, base: &str, page_url: &str) -> Result<String> {
        let ajax = Self::ajax_headers(base);
        let page = ctx.http.get_text(page_url, &ajax).await?;
        let id = embed_id(&page)
            .ok_or_else(|| ProviderError::ElementNotFound(format!("data-embed on {page_url}")))?;

        let embed = ctx
            .http
            .post_form(&format!("{base}/ajax/embed"), &ajax, &[("id", id.as_str())])
            .await?;
        playlist_url(&embed)
            .ok_or_else(|| ProviderError::ElementNotFound(format!("playlist for embed {id}")))
    }
}

#[async_trait]
impl Provider for Nepu {
    fn id(&self) -> &'static str {
        ID
    }

    fn display_name(&self) -> &'static str {
        "Nepu"
    }

    async fn fetch_streams(&self, ctx: &ProviderContext, request: &MediaRequest) -> Result<Vec<Stream>> {
        let base = ctx.endpoints.nepu_base.trim_end_matches('/');
        let info = run_stage(ID, Stage::Resolve, ctx.metadata().resolve(request)).await?;

        let posts = run_stage(ID, Stage::Search, Self::search(ctx, base, &info.title)).await?;
        let post = require(
            pick_post(&posts, &info, request),
            Stage::Select,
            ProviderError::NoMatch(info.title.clone()),
        )?;

        let mut page_url = if post.starts_with("http") {
            post
        } else {
            format!("{base}{post}")
        };
        if let (true, Some(season), Some(episode)) = (request.is_tv(), request.season, request.episode) {
            page_url = format!("{}/season/{season}/episode/{episode}", page_url.trim_end_matches('/'));
        }
        let playlist = run_stage(ID, Stage::Extract, Self::extract(ctx, base, &page_url)).await?;

        let referer = format!("{base}/");
        let stream_headers = headers([("User-Agent", USER_AGENT), ("Referer", referer.as_str())]);
        let resolution = run_stage(ID, Stage::Hls, async {
            Ok::<_, ProviderError>(resolve_playlist(&ctx.http, &playlist, &stream_headers).await)
        })
        .await?;

        let base_stream = Stream {
            name: String::new(),
            title: info.display_title(request),
            url: playlist,
            quality: Quality::Auto,
            size: "Unknown".to_string(),
            headers: stream_headers,
            subtitles: Vec::new(),
            provider: ID.to_string(),
        };
        Ok(hls_streams(resolution, base_stream, |quality| format!("Nepu | {quality}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpClient;
    use crate::endpoints::Endpoints;
    use crate::providers::get_streams;
    use crate::types::ContentId;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn post(url: &str, name: &str) -> Post {
        Post {
            url: Some(url.to_string()),
            name: Some(name.to_string()),
        }
    }

    fn info(title: &str, year: Option<i32>) -> MediaInfo {
        MediaInfo {
            title: title.to_string(),
            year,
            imdb_id: None,
            release_date: None,
        }
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("The Dark Knight!"), "the-dark-knight");
        assert_eq!(slug("Spider-Man: No Way Home"), "spiderman-no-way-home");
    }

    #[test]
    fn test_pick_post_prefers_slug() {
        let posts = vec![
            post("/serie/dark-2017", "Dark"),
            post("/movie/dark-2005", "Dark"),
        ];
        let movie = MediaRequest::movie(ContentId::Tmdb(1));
        assert_eq!(
            pick_post(&posts, &info("Dark", Some(2005)), &movie).as_deref(),
            Some("/movie/dark-2005")
        );
        let tv = MediaRequest::episode(ContentId::Tmdb(1), 1, 1);
        assert_eq!(
            pick_post(&posts, &info("Dark", Some(2017)), &tv).as_deref(),
            Some("/serie/dark-2017")
        );
    }

    #[test]
    fn test_pick_post_falls_back_to_scoring() {
        let posts = vec![
            post("/movie/amelie-2001", "Amélie (2001)"),
            post("/movie/other-1999", "Something Else (1999)"),
        ];
        let movie = MediaRequest::movie(ContentId::Tmdb(1));
        assert_eq!(
            pick_post(&posts, &info("Amélie", Some(2001)), &movie).as_deref(),
            Some("/movie/amelie-2001")
        );
        assert_eq!(pick_post(&[], &info("Amélie", None), &movie), None);
    }

    #[test]
    fn test_embed_and_playlist_extraction() {
        assert_eq!(embed_id(r#"<div class="player" data-embed="x9Yz"></div>"#).as_deref(), Some("x9Yz"));
        assert_eq!(embed_id("<div></div>"), None);
        assert_eq!(
            playlist_url(r#"{"file":"https:\/\/cdn.example\/v\/master.m3u8"}"#).as_deref(),
            Some("https://cdn.example/v/master.m3u8")
        );
    }

    #[tokio::test]
    async fn test_fetch_streams_for_episode() {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(path("/tmdb/3/tv/70523"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"name":"Dark","first_air_date":"2017-12-01"}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(path("/nepu/ajax/posts"))
            .and(query_param("q", "Dark"))
            .and(header("X-Requested-With", "XMLHttpRequest"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"data":[{"url":"/movie/dark-2005","name":"Dark"},{"url":"/serie/dark-2017","name":"Dark"}]}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(path("/nepu/serie/dark-2017/season/1/episode/2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"<div data-embed="emb42"></div>"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/nepu/ajax/embed"))
            .and(body_string("id=emb42"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<script>player.load("{base}/hls/master.m3u8")</script>"#
            )))
            .mount(&server)
            .await;
        Mock::given(path("/hls/master.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=1280x720\n720/index.m3u8\n\
                 #EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080\n1080/index.m3u8\n",
            ))
            .mount(&server)
            .await;

        let ctx = ProviderContext::new(HttpClient::new().unwrap(), Endpoints::rooted_at(&base));
        let request = MediaRequest::episode(ContentId::Tmdb(70523), 1, 2);
        let streams = get_streams(&Nepu, &ctx, &request).await;

        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].name, "Nepu | 1080p");
        assert_eq!(streams[0].url, format!("{base}/hls/1080/index.m3u8"));
        assert_eq!(streams[1].quality, Quality::P720);
        assert_eq!(streams[0].title, "Dark S01E02");
        assert_eq!(streams[0].headers["Referer"], format!("{base}/nepu/"));
    }
}
