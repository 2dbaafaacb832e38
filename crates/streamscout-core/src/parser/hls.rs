//! HLS playlist parsing
//!
//! Line-oriented parser for master playlists: `#EXT-X-STREAM-INF` variants
//! and `#EXT-X-MEDIA` subtitle renditions.

use crate::client::join_url;
use crate::types::{Quality, Subtitle};

use super::quality::{quality_from_bandwidth, quality_from_height, quality_from_url};

/// One variant stream of a master playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// Absolute variant URL
    pub url: String,
    pub quality: Quality,
    pub bandwidth: Option<u64>,
    pub resolution_height: Option<u32>,
}

/// What a fetched playlist turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKind {
    /// Contains `#EXT-X-STREAM-INF` entries
    Master,
    /// A plain media playlist with segments
    Media,
    /// Not a playlist at all
    Invalid,
}

pub fn playlist_kind(text: &str) -> PlaylistKind {
    let text = text.trim_start_matches('\u{feff}').trim_start();
    if text.contains("#EXT-X-STREAM-INF") {
        PlaylistKind::Master
    } else if text.starts_with("#EXTM3U") || text.contains("#EXTINF") {
        PlaylistKind::Media
    } else {
        PlaylistKind::Invalid
    }
}

/// Resolves a variant or rendition URI against the playlist URL
pub fn resolve_url(url: &str, base_url: &str) -> String {
    join_url(base_url, url.trim())
}

/// Parses an HLS attribute list (`KEY=VALUE,KEY="quoted, value"`)
///
/// Keys are returned as written, values without surrounding quotes.
pub fn parse_attributes(list: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in list.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                push_attribute(&mut attrs, &current);
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    push_attribute(&mut attrs, &current);
    attrs
}

fn push_attribute(attrs: &mut Vec<(String, String)>, raw: &str) {
    if let Some((key, value)) = raw.split_once('=') {
        let key = key.trim();
        if key.is_empty() {
            return;
        }
        attrs.push((key.to_string(), value.trim().trim_matches('"').to_string()));
    }
}

fn attribute<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Parses every `#EXT-X-STREAM-INF` variant of a master playlist
///
/// Quality comes from `RESOLUTION` when present, otherwise from `BANDWIDTH`,
/// otherwise from the variant URL. The result is sorted by quality rank,
/// highest first; equal ranks keep playlist order.
pub fn parse_master(text: &str, base_url: &str) -> Vec<Variant> {
    let mut variants = Vec::new();
    let mut pending: Option<Vec<(String, String)>> = None;

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            pending = Some(parse_attributes(rest));
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        let Some(attrs) = pending.take() else {
            continue;
        };

        let url = resolve_url(line, base_url);
        let bandwidth = attribute(&attrs, "BANDWIDTH").and_then(|b| b.parse::<u64>().ok());
        let resolution_height = attribute(&attrs, "RESOLUTION")
            .and_then(|r| r.split_once(['x', 'X']))
            .and_then(|(_, h)| h.parse::<u32>().ok());

        let quality = match (resolution_height, bandwidth) {
            (Some(height), _) => quality_from_height(height),
            (None, Some(bw)) => quality_from_bandwidth(bw),
            (None, None) => quality_from_url(&url),
        };

        variants.push(Variant {
            url,
            quality,
            bandwidth,
            resolution_height,
        });
    }

    variants.sort_by(|a, b| b.quality.rank().cmp(&a.quality.rank()));
    variants
}

/// Extracts subtitle renditions (`#EXT-X-MEDIA:TYPE=SUBTITLES`)
pub fn parse_subtitle_media(text: &str, base_url: &str) -> Vec<Subtitle> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("#EXT-X-MEDIA:"))
        .map(parse_attributes)
        .filter(|attrs| {
            attribute(attrs, "TYPE").is_some_and(|t| t.eq_ignore_ascii_case("SUBTITLES"))
        })
        .filter_map(|attrs| {
            let uri = attribute(&attrs, "URI")?;
            let language = attribute(&attrs, "NAME")
                .or_else(|| attribute(&attrs, "LANGUAGE"))
                .unwrap_or("Unknown");
            Some(Subtitle {
                language: language.to_string(),
                url: resolve_url(uri, base_url),
                is_default: attribute(&attrs, "DEFAULT").is_some_and(|d| d.eq_ignore_ascii_case("YES")),
            })
        })
        .collect()
}
