//! Single-page embed hosters
//!
//! Each rule fetches one player page (two for Dood) and pulls the media URL
//! out of inline script, unpacking `eval(function(p,a,c,k,e,d)…)` blobs first
//! where the host uses them.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use super::{HostedLink, HosterResolver, referer_headers};
use crate::client::{join_url, origin_of};
use crate::error::{ProviderError, Result};
use crate::parser::links::{extract_m3u8, extract_mp4, unpack_packed};
use crate::parser::quality::quality_from_url;
use crate::parser::redirect::{decode_base64, window_location};
use crate::parser::cached_regex;
use crate::types::{Headers, Quality, headers};

fn capture(cell: &'static OnceLock<Option<Regex>>, pattern: &str, text: &str) -> Option<String> {
    cached_regex(cell, pattern)?
        .captures(text)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

fn with_scheme(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url.to_string()
    }
}

/// `Referer: {origin}/` for links served by the player's own CDN
fn origin_referer(url: &str) -> Headers {
    origin_of(url)
        .map(|origin| headers([("Referer", format!("{origin}/").as_str())]))
        .unwrap_or_default()
}

/// HLS or MP4 URL in a player page, packed or not
fn embedded_media(page: &str) -> Option<String> {
    let unpacked = unpack_packed(page);
    extract_m3u8(&unpacked).or_else(|| extract_mp4(&unpacked))
}

fn missing(what: &str, url: &str) -> ProviderError {
    ProviderError::ElementNotFound(format!("{what} on {url}"))
}

/// Pixeldrain download endpoint for a share link; needs no request
pub(super) fn pixeldrain(link: &str) -> HostedLink {
    static FILE_ID: OnceLock<Option<Regex>> = OnceLock::new();

    if link.contains("?download") {
        return HostedLink::new("Pixeldrain", link, Quality::Unknown);
    }
    let id = capture(&FILE_ID, r"(?:file|u)/([A-Za-z0-9]+)", link).or_else(|| {
        link.trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
    });

    match (origin_of(link), id) {
        (Some(origin), Some(id)) => HostedLink::new(
            "Pixeldrain",
            format!("{origin}/api/file/{id}?download"),
            Quality::Unknown,
        ),
        _ => HostedLink::new("Pixeldrain", link, Quality::Unknown),
    }
}

/// `//streamtape.com/get_video…` target, preferring the `videolink` assignment
fn streamtape_target(page: &str) -> Option<String> {
    static ASSIGNMENT: OnceLock<Option<Regex>> = OnceLock::new();
    static GET_VIDEO: OnceLock<Option<Regex>> = OnceLock::new();
    const GET_VIDEO_PATTERN: &str = r"'(//streamtape\.com/get_video[^']+)'";

    capture(
        &ASSIGNMENT,
        r"document\.getElementById\('videolink'\)\.innerHTML = (.*?);",
        page,
    )
    .and_then(|assignment| capture(&GET_VIDEO, GET_VIDEO_PATTERN, &assignment))
    .or_else(|| capture(&GET_VIDEO, GET_VIDEO_PATTERN, page))
    .map(|path| format!("https:{path}"))
}

fn mixdrop_target(page: &str) -> Option<String> {
    static WURL: OnceLock<Option<Regex>> = OnceLock::new();
    let unpacked = unpack_packed(page);
    capture(&WURL, r#"wurl\s*=\s*"([^"]+)""#, &unpacked)
        .map(|url| with_scheme(&url))
        .or_else(|| embedded_media(page))
}

fn voe_target(page: &str) -> Option<String> {
    static HLS: OnceLock<Option<Regex>> = OnceLock::new();
    let hls = capture(&HLS, r#"['"]hls['"]\s*:\s*['"]([^'"]+)['"]"#, page).and_then(|value| {
        if value.starts_with("http") {
            Some(value)
        } else {
            decode_base64(&value).and_then(|bytes| String::from_utf8(bytes).ok())
        }
    });
    hls.or_else(|| embedded_media(page))
}

fn mp4upload_target(page: &str) -> Option<String> {
    static SRC: OnceLock<Option<Regex>> = OnceLock::new();
    capture(&SRC, r#"src:\s*"([^"]+\.mp4[^"]*)""#, page).or_else(|| extract_mp4(page))
}

impl HosterResolver<'_> {
    pub(super) async fn streamtape(&self, url: &str) -> Result<HostedLink> {
        let mut page_url = url::Url::parse(url).map_err(|_| ProviderError::InvalidUrl(url.to_string()))?;
        if page_url.host_str().is_some_and(|h| h.contains("streamtape")) {
            page_url
                .set_host(Some("streamtape.com"))
                .map_err(|_| ProviderError::InvalidUrl(url.to_string()))?;
        }

        let page = self.http.get_text(page_url.as_str(), &Headers::new()).await?;
        let target = streamtape_target(&page).ok_or_else(|| missing("streamtape video link", url))?;
        Ok(HostedLink::new("StreamTape", target, Quality::P720))
    }

    pub(super) async fn mixdrop(&self, url: &str) -> Result<HostedLink> {
        let embed = url.replacen("/f/", "/e/", 1);
        let page = self.http.get_text(&embed, &referer_headers(&embed)).await?;
        let target = mixdrop_target(&page).ok_or_else(|| missing("mixdrop source", url))?;
        Ok(HostedLink::new("Mixdrop", target.as_str(), quality_from_url(&target))
            .with_headers(origin_referer(&embed)))
    }

    /// Dood hands out a `pass_md5` path whose answer is the URL prefix; the
    /// token is the last segment of that path
    pub(super) async fn dood(&self, url: &str) -> Result<HostedLink> {
        static PASS_MD5: OnceLock<Option<Regex>> = OnceLock::new();

        let embed = url.replacen("/d/", "/e/", 1);
        let fetched = self.http.fetch(&embed, &referer_headers(&embed)).await?;
        let pass_path = cached_regex(&PASS_MD5, r#"/pass_md5/[^'"\s]+"#)
            .and_then(|re| re.find(&fetched.body))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| missing("dood pass_md5", url))?;

        let prefix = self
            .http
            .get_text(&join_url(&fetched.url, &pass_path), &referer_headers(&fetched.url))
            .await?;
        let token = pass_path.rsplit('/').next().unwrap_or_default();
        let target = format!("{}{token}?token={token}", prefix.trim());
        debug!(url, "dood link built");

        Ok(HostedLink::new("DoodStream", target, Quality::Unknown)
            .with_headers(origin_referer(&fetched.url)))
    }

    pub(super) async fn voe(&self, url: &str) -> Result<HostedLink> {
        let mut fetched = self.http.fetch(url, &Headers::new()).await?;
        let mut target = voe_target(&fetched.body);

        if target.is_none()
            && let Some(next) = window_location(&fetched.body)
        {
            let next = join_url(&fetched.url, &next);
            fetched = self.http.fetch(&next, &referer_headers(url)).await?;
            target = voe_target(&fetched.body);
        }

        let target = target.ok_or_else(|| missing("voe source", url))?;
        Ok(HostedLink::new("Voe", target.as_str(), quality_from_url(&target))
            .with_headers(origin_referer(&fetched.url)))
    }

    pub(super) async fn mp4upload(&self, url: &str) -> Result<HostedLink> {
        let page = self.http.get_text(url, &referer_headers(url)).await?;
        let target = mp4upload_target(&page).ok_or_else(|| missing("mp4upload source", url))?;
        Ok(HostedLink::new("Mp4Upload", target.as_str(), quality_from_url(&target))
            .with_headers(origin_referer(url)))
    }

    pub(super) async fn streamsb(&self, url: &str) -> Result<HostedLink> {
        let page = self.http.get_text(url, &referer_headers(url)).await?;
        let target = embedded_media(&page).ok_or_else(|| missing("streamsb source", url))?;
        Ok(HostedLink::new("StreamSB", target.as_str(), quality_from_url(&target))
            .with_headers(origin_referer(url)))
    }
}
