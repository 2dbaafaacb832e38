//! Pure parsers for scraped pages, playlists and obfuscated payloads
//!
//! Nothing in here touches the network, so every function can be tested
//! against inline fixtures.

use std::sync::OnceLock;

use regex::Regex;
use scraper::Selector;

use crate::error::{ProviderError, Result};

pub mod hls;
pub mod links;
pub mod quality;
pub mod redirect;
pub mod search;

pub use hls::{PlaylistKind, Variant, parse_master, parse_subtitle_media, playlist_kind};
pub use links::{extract_links, extract_m3u8, extract_mp4, select_links, unpack_packed};
pub use quality::{
    format_bytes, parse_size, quality_from_bandwidth, quality_from_height, quality_from_label,
    quality_from_url, size_to_bytes,
};
pub use redirect::{RedirectPayload, decode_or_original, decode_redirect_blob};
pub use search::{parse_search_hits, year_from_title};

/// Compiles `pattern` once and caches it in `cell`
///
/// Patterns are literals, so `None` only happens on a typo and every caller
/// treats it as "no match".
pub(crate) fn cached_regex(
    cell: &'static OnceLock<Option<Regex>>,
    pattern: &str,
) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// Parses a CSS selector, mapping failures to `ParseError`
pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| ProviderError::ParseError(format!("Invalid selector {css}: {e:?}")))
}

/// Collapses whitespace runs in element text
pub(crate) fn clean_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
