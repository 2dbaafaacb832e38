//! Search index response parser
//!
//! Parses the typesense-style JSON returned by the site search index and
//! turns every hit into a [`SearchCandidate`].

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::client::join_url;
use crate::error::Result;
use crate::types::SearchCandidate;

use super::cached_regex;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    document: HitDocument,
}

#[derive(Debug, Deserialize)]
struct HitDocument {
    #[serde(default)]
    post_title: String,
    #[serde(default)]
    permalink: String,
}

/// Release year from a post title
///
/// Prefers a parenthesized `(2019)`, then any standalone 4-digit number.
pub fn year_from_title(title: &str) -> Option<i32> {
    static YEAR: OnceLock<Option<Regex>> = OnceLock::new();
    let re = cached_regex(&YEAR, r"\((\d{4})\)|\b(\d{4})\b")?;

    let mut bare = None;
    for caps in re.captures_iter(title) {
        if let Some(paren) = caps.get(1) {
            return paren.as_str().parse().ok();
        }
        if bare.is_none() {
            bare = caps.get(2).and_then(|m| m.as_str().parse().ok());
        }
    }
    bare
}

/// Parses search hits into candidates
///
/// # Arguments
/// * `json` - Raw response body of the search index
/// * `base_url` - Site root that relative permalinks are resolved against
///
/// # Errors
/// Returns `ParseError` if the body is not the expected JSON shape
pub fn parse_search_hits(json: &str, base_url: &str) -> Result<Vec<SearchCandidate>> {
    let response: SearchResponse = serde_json::from_str(json)?;

    Ok(response
        .hits
        .into_iter()
        .map(|hit| hit.document)
        .filter(|doc| !doc.post_title.trim().is_empty() && !doc.permalink.trim().is_empty())
        .map(|doc| {
            let title = doc.post_title.trim().to_string();
            let year = year_from_title(&title);
            SearchCandidate::new(title, join_url(base_url, doc.permalink.trim())).with_year(year)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;

    #[test]
    fn test_parse_search_hits() {
        let json = r#"{
            "found": 2,
            "hits": [
                {"document": {"post_title": "Inception (2010) BluRay 1080p", "permalink": "/inception-2010/"}},
                {"document": {"post_title": "Inception Extras", "permalink": "https://other.example/extras/"}},
                {"document": {"post_title": "", "permalink": "/empty/"}}
            ]
        }"#;

        let results = parse_search_hits(json, "https://new3.hdhub4u.fo").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Inception (2010) BluRay 1080p");
        assert_eq!(results[0].url, "https://new3.hdhub4u.fo/inception-2010/");
        assert_eq!(results[0].year, Some(2010));
        assert_eq!(results[1].url, "https://other.example/extras/");
        assert_eq!(results[1].year, None);
    }

    #[test]
    fn test_parse_search_hits_no_hits() {
        let results = parse_search_hits(r#"{"found":0}"#, "https://a.com").unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_parse_search_hits_invalid_json() {
        let result = parse_search_hits("<html>blocked</html>", "https://a.com");
        assert!(matches!(result, Err(ProviderError::ParseError(_))));
    }

    #[test]
    fn test_year_from_title() {
        assert_eq!(year_from_title("Dune Part Two (2024) WEB-DL"), Some(2024));
        assert_eq!(year_from_title("Show 2019 Season 1"), Some(2019));
        assert_eq!(year_from_title("Blade Runner 2049 (2017)"), Some(2017));
        assert_eq!(year_from_title("Movie 1080p"), None);
    }
}
