//! HDHub4u: search index → post page → hoster links
//!
//! Movie posts list quality anchors in their headings. Series posts list one
//! heading per episode (links in the heading and in the siblings up to the
//! next `<hr>`), plus season "pack" links that lead through the shortener
//! chain to a page listing every episode.

use std::collections::HashSet;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::debug;

use super::{Provider, ProviderContext};
use crate::client::{USER_AGENT, join_url};
use crate::error::{ProviderError, Result};
use crate::hosters::{HostedLink, follow_redirect};
use crate::matching::select_best;
use crate::parser::quality::format_bytes;
use crate::parser::search::parse_search_hits;
use crate::parser::{cached_regex, clean_text, extract_links, selector};
use crate::pipeline::{Stage, require, run_stage};
use crate::pool::run_bounded_flat;
use crate::types::{Headers, MediaInfo, MediaRequest, SearchCandidate, Stream, headers};

const ID: &str = "hdhub4u";

/// Key of the site in the mirror-domain list
const DOMAIN_KEY: &str = "HDHUB4u";

/// Hoster resolutions (and pack pages) in flight at once
const LINK_CONCURRENCY: usize = 4;

pub struct HdHub4u;

/// Download links scraped from one post
#[derive(Debug, Clone, PartialEq, Eq)]
enum PostPage {
    Movie(Vec<String>),
    Series {
        /// `(episode, url)` in document order
        episodes: Vec<(u32, String)>,
        /// Season pack links, each hiding an episode list
        packs: Vec<String>,
    },
}

fn site_headers(domain: &str) -> Headers {
    let referer = format!("{domain}/");
    headers([
        ("User-Agent", USER_AGENT),
        ("Cookie", "xla=s4t"),
        ("Referer", referer.as_str()),
    ])
}

fn search_query(title: &str, request: &MediaRequest) -> String {
    match request.season {
        Some(season) if request.is_tv() => format!("{title} Season {season}"),
        _ => title.to_string(),
    }
}

fn is_match(cell: &'static OnceLock<Option<Regex>>, pattern: &str, text: &str) -> bool {
    cached_regex(cell, pattern).is_some_and(|re| re.is_match(text))
}

fn episode_number(cell: &'static OnceLock<Option<Regex>>, pattern: &str, text: &str) -> Option<u32> {
    let caps = cached_regex(cell, pattern)?.captures(text)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

fn href_of(el: ElementRef<'_>, base_url: &str) -> Option<String> {
    el.value()
        .attr("href")
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(|href| join_url(base_url, href))
}

/// Splits a post page into movie links or per-episode links
///
/// Only links [`extract_links`] accepts as followable are kept; the heading
/// selectors decide which of them belong to the post.
fn parse_post(html: &str, base_url: &str) -> Result<PostPage> {
    static MOVIE_QUALITY: OnceLock<Option<Regex>> = OnceLock::new();
    static PACK_QUALITY: OnceLock<Option<Regex>> = OnceLock::new();
    static EPISODE: OnceLock<Option<Regex>> = OnceLock::new();

    let document = Html::parse_document(html);
    let page_type = selector("h1.page-title span")?;
    let anchors = selector("a")?;
    let linked = selector("a[href]")?;

    let ordered = extract_links(html, base_url);
    let followable: HashSet<&str> = ordered.iter().map(String::as_str).collect();
    let href = |a: ElementRef<'_>| href_of(a, base_url).filter(|link| followable.contains(link.as_str()));

    let kind = clean_text(document.select(&page_type).flat_map(|el| el.text()));
    if kind.to_lowercase().contains("movie") {
        let headings = selector("h3 a, h4 a")?;
        let body = selector(".page-body > div a")?;

        let quality_links = document
            .select(&headings)
            .filter(|a| {
                is_match(&MOVIE_QUALITY, r"(?i)480|720|1080|2160|4K", &clean_text(a.text()))
            })
            .filter_map(href);
        let player_links = document
            .select(&body)
            .filter_map(href)
            .filter(|link| link.contains("hdstream4u") || link.contains("hubstream"));

        let picked: HashSet<String> = quality_links.chain(player_links).collect();
        let links = ordered
            .iter()
            .filter(|link| picked.contains(*link))
            .cloned()
            .collect();
        return Ok(PostPage::Movie(links));
    }

    let headings = selector("h3, h4")?;
    let mut episodes = Vec::new();
    let mut packs = Vec::new();

    for heading in document.select(&headings) {
        let links: Vec<String> = heading.select(&anchors).filter_map(href).collect();

        let is_pack = heading
            .select(&anchors)
            .any(|a| is_match(&PACK_QUALITY, r"(?i)1080|720|4K|2160", &clean_text(a.text())));
        if is_pack {
            packs.extend(links);
            continue;
        }

        let text = clean_text(heading.text());
        let Some(episode) = episode_number(&EPISODE, r"(?i)(?:EPiSODE\s*(\d+)|E(\d+))", &text)
        else {
            continue;
        };
        episodes.extend(links.into_iter().map(|link| (episode, link)));

        let block = heading
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .take_while(|el| el.value().name() != "hr");
        for sibling in block {
            episodes.extend(
                sibling
                    .select(&linked)
                    .filter_map(href)
                    .map(|link| (episode, link)),
            );
        }
    }

    Ok(PostPage::Series { episodes, packs })
}

/// `(episode, url)` pairs listed on a season pack page
fn parse_pack(html: &str, base_url: &str) -> Vec<(u32, String)> {
    static EPISODE: OnceLock<Option<Regex>> = OnceLock::new();

    let Ok(anchors) = selector("h5 a, h4 a, h3 a") else {
        return Vec::new();
    };
    let followable: HashSet<String> = extract_links(html, base_url).into_iter().collect();
    let document = Html::parse_document(html);
    document
        .select(&anchors)
        .filter_map(|a| {
            let episode = episode_number(&EPISODE, r"(?i)Episode\s*(\d+)", &clean_text(a.text()))?;
            let link = href_of(a, base_url).filter(|link| followable.contains(link))?;
            Some((episode, link))
        })
        .collect()
}

/// Drops archives and repeated URLs, keeping the first occurrence
fn keep_playable(links: Vec<HostedLink>) -> Vec<HostedLink> {
    let mut seen = HashSet::new();
    links
        .into_iter()
        .filter(|link| !link.url.is_empty() && !link.url.contains(".zip"))
        .filter(|link| {
            !link
                .file_name
                .as_deref()
                .is_some_and(|name| name.to_lowercase().contains(".zip"))
        })
        .filter(|link| seen.insert(link.url.clone()))
        .collect()
}

fn to_stream(link: HostedLink, info: &MediaInfo, request: &MediaRequest, site: &Headers) -> Stream {
    let title = match request.episode_tag() {
        Some(tag) => format!("{} {tag}", info.title),
        None => link
            .file_name
            .clone()
            .filter(|name| !name.is_empty() && name != "Unknown")
            .unwrap_or_else(|| info.title.clone()),
    };
    let mut stream_headers = site.clone();
    stream_headers.extend(link.headers.clone());

    Stream {
        name: format!("HDHub4u {}", link.server_name()),
        title,
        quality: link.quality,
        size: format_bytes(link.size),
        headers: stream_headers,
        subtitles: Vec::new(),
        provider: ID.to_string(),
        url: link.url,
    }
}

impl HdHub4u {
    async fn search(
        ctx: &ProviderContext,
        domain: &str,
        query: &str,
    ) -> Result<Vec<SearchCandidate>> {
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let url = format!(
            "{}/collections/post/documents/search?q={}&query_by=post_title,category&query_by_weights=4,2&sort_by=sort_by_date:desc&limit=15&highlight_fields=none&use_cache=true&page=1&analytics_tag={today}",
            ctx.endpoints.hdhub4u_search,
            urlencoding::encode(query)
        );
        let body = ctx.http.get_text(&url, &site_headers(domain)).await?;
        let candidates = parse_search_hits(&body, domain)?;
        debug!(provider = ID, query, count = candidates.len(), "search results");
        Ok(candidates)
    }

    /// Episode links hidden behind a season pack link
    async fn pack_links(ctx: &ProviderContext, domain: &str, pack: &str) -> Result<Vec<(u32, String)>> {
        let page_url = follow_redirect(&ctx.http, pack)
            .await
            .ok_or_else(|| ProviderError::ElementNotFound(format!("pack target of {pack}")))?;
        let fetched = ctx.http.fetch(&page_url, &site_headers(domain)).await?;
        Ok(parse_pack(&fetched.body, &fetched.url))
    }

    /// Links to hand to the hosters; `episode` of `None` keeps every episode
    async fn post_links(
        ctx: &ProviderContext,
        domain: &str,
        post_url: &str,
        episode: Option<u32>,
        is_tv: bool,
    ) -> Result<Vec<String>> {
        let page = ctx.http.get_text(post_url, &site_headers(domain)).await?;

        let mut links = match parse_post(&page, post_url)? {
            PostPage::Movie(_) if is_tv => Vec::new(),
            PostPage::Movie(links) => links,
            PostPage::Series { episodes, packs } => {
                let tasks = packs.iter().map(|pack| {
                    (pack.clone(), Self::pack_links(ctx, domain, pack))
                });
                let from_packs = run_bounded_flat(tasks, LINK_CONCURRENCY, None).await;
                episodes
                    .into_iter()
                    .chain(from_packs)
                    .filter(|(number, _)| episode.is_none_or(|wanted| *number == wanted))
                    .map(|(_, link)| link)
                    .collect()
            }
        };

        let mut seen = HashSet::new();
        links.retain(|link| seen.insert(link.clone()));
        if links.is_empty() {
            return Err(ProviderError::ElementNotFound(format!("download links on {post_url}")));
        }
        Ok(links)
    }

    async fn resolve_links(ctx: &ProviderContext, links: &[String], referer: &str) -> Vec<HostedLink> {
        let hosters = ctx.hosters();
        let tasks = links.iter().map(|link| {
            (link.clone(), async move {
                Ok::<_, ProviderError>(hosters.resolve(link, referer).await)
            })
        });
        keep_playable(run_bounded_flat(tasks, LINK_CONCURRENCY, None).await)
    }
}

#[async_trait]
impl Provider for HdHub4u {
    fn id(&self) -> &'static str {
        ID
    }

    fn display_name(&self) -> &'static str {
        "HDHub4u"
    }

    async fn fetch_streams(&self, ctx: &ProviderContext, request: &MediaRequest) -> Result<Vec<Stream>> {
        let domain = ctx
            .domains
            .current(&ctx.http, DOMAIN_KEY, &ctx.endpoints.hdhub4u_default)
            .await;
        let info = run_stage(ID, Stage::Resolve, ctx.metadata().resolve(request)).await?;

        let query = search_query(&info.title, request);
        let candidates = run_stage(ID, Stage::Search, Self::search(ctx, &domain, &query)).await?;
        let season = request.season.filter(|_| request.is_tv());
        let selected = require(
            select_best(&candidates, &info.title, info.year, season),
            Stage::Select,
            ProviderError::NoMatch(query.clone()),
        )?;
        debug!(provider = ID, title = %selected.title, url = %selected.url, "selected post");

        let episode = request.episode.filter(|_| request.is_tv());
        let links = run_stage(
            ID,
            Stage::Extract,
            Self::post_links(ctx, &domain, &selected.url, episode, request.is_tv()),
        )
        .await?;
        let hosted = Self::resolve_links(ctx, &links, &selected.url).await;

        let site = site_headers(&domain);
        Ok(hosted
            .into_iter()
            .map(|link| to_stream(link, &info, request, &site))
            .collect())
    }
}
