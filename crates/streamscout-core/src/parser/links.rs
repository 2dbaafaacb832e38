//! Candidate link extraction from scraped pages

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use scraper::Html;

use crate::client::join_url;

use super::{cached_regex, selector};

/// Hostname fragments of file hosters and link wrappers worth following
pub const HOST_MARKERS: &[&str] = &[
    "hubcloud",
    "hubcdn",
    "hubdrive",
    "hblinks",
    "hubstream",
    "pixeldrain",
    "streamtape",
    "mixdrop",
    "streamsb",
    "dood",
    "voe",
    "mp4upload",
    "hdstream4u",
    "gadgetsweb",
    "techyboy4u",
];

/// Attributes lazy-loading players keep their source in
const DATA_ATTRIBUTES: &[&str] = &["data-src", "data-url", "data-link", "data-embed"];

fn is_media_file(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    path.ends_with(".mp4") || path.ends_with(".mkv") || path.ends_with(".m3u8")
}

/// Shortener links carry their target id in the query
fn is_wrapped(url: &str) -> bool {
    url.contains("?id=")
}

fn is_known_host(url: &str) -> bool {
    let lower = url.to_lowercase();
    HOST_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Collects playable or followable URLs from a page
///
/// Picks up iframe `src`, anchors pointing at media files, known hosters or
/// `?id=` shorteners, and `data-*` player attributes. Relative URLs are resolved
/// against `base_url`; duplicates are dropped, document order kept.
pub fn extract_links(html: &str, base_url: &str) -> Vec<String> {
    let Ok(candidates) = selector("iframe[src], a[href], [data-src], [data-url], [data-link], [data-embed]") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let mut push = |raw: &str| {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') || raw.starts_with("javascript:") {
            return;
        }
        let url = join_url(base_url, raw);
        if (url.starts_with("http://") || url.starts_with("https://")) && seen.insert(url.clone()) {
            links.push(url);
        }
    };

    for element in document.select(&candidates) {
        let el = element.value();
        match el.name() {
            "iframe" => {
                if let Some(src) = el.attr("src") {
                    push(src);
                }
            }
            "a" => {
                if let Some(href) = el.attr("href")
                    && (is_media_file(href) || is_known_host(href) || is_wrapped(href))
                {
                    push(href);
                }
            }
            _ => {}
        }
        for attr in DATA_ATTRIBUTES {
            if let Some(value) = el.attr(attr) {
                push(value);
            }
        }
    }

    links
}

/// [`extract_links`] narrowed to the anchors matched by `css`
///
/// The selector decides which part of the page counts; the extractor decides
/// what is followable and how it resolves. Document order is kept.
pub fn select_links(html: &str, base_url: &str, css: &str) -> Vec<String> {
    let Ok(sel) = selector(css) else {
        return Vec::new();
    };
    let picked: HashSet<String> = Html::parse_document(html)
        .select(&sel)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| join_url(base_url, href.trim()))
        .collect();

    extract_links(html, base_url)
        .into_iter()
        .filter(|link| picked.contains(link))
        .collect()
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|re| {
        let caps = re.captures(text)?;
        let url = caps.get(1).or_else(|| caps.get(0))?.as_str();
        url::Url::parse(url).ok().map(|_| url.to_string())
    })
}

fn media_patterns(ext: &str) -> Vec<Regex> {
    [
        format!(r#"(?i)"file"\s*:\s*"([^"]+\.{ext}[^"]*)""#),
        format!(r#"(?i)'file'\s*:\s*'([^']+\.{ext}[^']*)'"#),
        format!(r#"(?i)source\s*:\s*['"]([^'"]+\.{ext}[^'"]*)['"]"#),
        format!(r#"(?i)src\s*=\s*['"]([^'"]+\.{ext}[^'"]*)['"]"#),
        format!(r#"(?i)https?://[^\s'"<>]+\.{ext}[^\s'"<>]*"#),
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
}

/// First absolute `.m3u8` URL found in a page or script
pub fn extract_m3u8(html: &str) -> Option<String> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    first_capture(PATTERNS.get_or_init(|| media_patterns("m3u8")), html)
}

/// First absolute `.mp4` URL found in a page or script
pub fn extract_mp4(html: &str) -> Option<String> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    first_capture(PATTERNS.get_or_init(|| media_patterns("mp4")), html)
}

fn digit_value(c: char) -> Option<u32> {
    match c {
        '0'..='9' => Some(c as u32 - '0' as u32),
        'a'..='z' => Some(c as u32 - 'a' as u32 + 10),
        'A'..='Z' => Some(c as u32 - 'A' as u32 + 36),
        _ => None,
    }
}

fn parse_radix(word: &str, radix: u32) -> Option<usize> {
    word.chars().try_fold(0usize, |acc, c| {
        let digit = digit_value(c).filter(|d| *d < radix)?;
        acc.checked_mul(radix as usize)?.checked_add(digit as usize)
    })
}

/// Unpacks a Dean Edwards `eval(function(p,a,c,k,e,d)…)` script
///
/// Returns the input unchanged when it is not packed.
pub fn unpack_packed(js: &str) -> String {
    static PACKED: OnceLock<Option<Regex>> = OnceLock::new();
    static WORD: OnceLock<Option<Regex>> = OnceLock::new();

    let (Some(packed), Some(word)) = (
        cached_regex(&PACKED, r"(?s)\}\('(.+)',\s*(\d+),\s*(\d+),\s*'([^']*)'\.split\('\|'\)"),
        cached_regex(&WORD, r"\b\w+\b"),
    ) else {
        return js.to_string();
    };
    let Some(caps) = packed.captures(js) else {
        return js.to_string();
    };

    let payload = caps.get(1).map_or("", |m| m.as_str());
    let radix = caps
        .get(2)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|r| (2..=62).contains(r))
        .unwrap_or(36);
    let keywords: Vec<&str> = caps.get(4).map_or("", |m| m.as_str()).split('|').collect();

    word.replace_all(payload, |c: &regex::Captures| {
        let w = &c[0];
        parse_radix(w, radix)
            .and_then(|i| keywords.get(i))
            .filter(|k| !k.is_empty())
            .map_or_else(|| w.to_string(), |k| k.to_string())
    })
    .replace("\\'", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_links_collects_supported_sources() {
        let html = r#"
            <html><body>
                <iframe src="/embed/123"></iframe>
                <a href="https://hubcloud.one/drive/abc">HubCloud</a>
                <a href="/files/movie.mp4">Direct</a>
                <a href="https://example.com/about">About</a>
                <div class="player" data-src="https://cdn.example.com/live/index.m3u8?t=1"></div>
                <a href="https://hubcloud.one/drive/abc">Duplicate</a>
                <a href="javascript:void(0)" data-link="//pixeldrain.com/u/xyz">Pixel</a>
            </body></html>
        "#;

        let links = extract_links(html, "https://site.example/movie/page");
        assert_eq!(
            links,
            vec![
                "https://site.example/embed/123",
                "https://hubcloud.one/drive/abc",
                "https://site.example/files/movie.mp4",
                "https://cdn.example.com/live/index.m3u8?t=1",
                "https://pixeldrain.com/u/xyz",
            ]
        );
    }

    #[test]
    fn test_extract_links_accepts_mkv_and_shorteners() {
        let html = r#"
            <a href="/files/Show.S01E01.mkv">Episode</a>
            <a href="https://short.example/?id=abc">Wrapped</a>
            <a href="https://short.example/about">About</a>
        "#;
        assert_eq!(
            extract_links(html, "https://site.example/post/"),
            vec![
                "https://site.example/files/Show.S01E01.mkv",
                "https://short.example/?id=abc",
            ]
        );
    }

    #[test]
    fn test_select_links_narrows_to_selector() {
        let html = r#"
            <div class="sidebar"><a href="https://hubcloud.one/drive/ad">Ad</a></div>
            <div class="entry">
                <a href="https://pixeldrain.com/u/one">One</a>
                <a href="https://example.com/about">About</a>
                <a href="/files/two.mp4">Two</a>
                <a href="https://pixeldrain.com/u/one">Again</a>
            </div>
        "#;
        assert_eq!(
            select_links(html, "https://site.example/", "div.entry a"),
            vec!["https://pixeldrain.com/u/one", "https://site.example/files/two.mp4"]
        );
        assert!(select_links(html, "https://site.example/", "div.missing a").is_empty());
    }

    #[test]
    fn test_extract_links_empty_page() {
        assert!(extract_links("<html></html>", "https://a.com").is_empty());
    }

    #[test]
    fn test_extract_m3u8_prefers_player_config() {
        let html = r#"jwplayer().setup({"file":"https://cdn.x/master.m3u8?token=1"}); var b = "https://cdn.y/other.m3u8";"#;
        assert_eq!(
            extract_m3u8(html),
            Some("https://cdn.x/master.m3u8?token=1".to_string())
        );
    }

    #[test]
    fn test_extract_mp4_bare_url() {
        let html = "<p>Mirror: https://cdn.z/video.mp4</p>";
        assert_eq!(extract_mp4(html), Some("https://cdn.z/video.mp4".to_string()));
        assert_eq!(extract_mp4("<p>no video</p>"), None);
    }

    #[test]
    fn test_unpack_packed() {
        let packed = r"eval(function(p,a,c,k,e,d){return p}('0 1=\'2://3.4/5.6\';',7,7,'var|src|https|cdn|example|video|mp4'.split('|'),0,{}))";
        assert_eq!(unpack_packed(packed), "var src='https://cdn.example/video.mp4';");
    }

    #[test]
    fn test_unpack_plain_script_is_unchanged() {
        assert_eq!(unpack_packed("var a = 1;"), "var a = 1;");
    }

    #[test]
    fn test_parse_radix_base62() {
        assert_eq!(parse_radix("z", 62), Some(35));
        assert_eq!(parse_radix("Z", 62), Some(61));
        assert_eq!(parse_radix("10", 62), Some(62));
        assert_eq!(parse_radix("g", 16), None);
    }
}
