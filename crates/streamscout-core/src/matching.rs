//! Search result scoring and best-match selection

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::parser::cached_regex;
use crate::types::SearchCandidate;

/// Minimum score a candidate must exceed to be accepted
pub const MATCH_THRESHOLD: f64 = 0.3;

/// Lowercases, drops articles and punctuation, collapses whitespace
pub fn normalize_title(title: &str) -> String {
    static ARTICLES: OnceLock<Option<Regex>> = OnceLock::new();
    static PUNCTUATION: OnceLock<Option<Regex>> = OnceLock::new();

    let lower = title.to_lowercase();
    let without_articles = match cached_regex(&ARTICLES, r"\b(?:the|a|an)\b") {
        Some(re) => re.replace_all(&lower, "").into_owned(),
        None => lower,
    };
    let spaced = without_articles.replace([':', '-', '_'], " ");
    let stripped = match cached_regex(&PUNCTUATION, r"[^\w\s]") {
        Some(re) => re.replace_all(&spaced, "").into_owned(),
        None => spaced,
    };
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Word-set similarity of a candidate title against the target title
///
/// 1.0 for identical normalized titles; otherwise Jaccard similarity,
/// minus 0.05 per candidate word missing from the target, plus 0.2 when
/// every target word appears in the candidate.
pub fn title_similarity(target: &str, candidate: &str) -> f64 {
    let norm_target = normalize_title(target);
    let norm_candidate = normalize_title(candidate);
    if norm_target == norm_candidate {
        return 1.0;
    }

    let target_words: Vec<&str> = norm_target.split_whitespace().collect();
    let candidate_words: Vec<&str> = norm_candidate.split_whitespace().collect();
    if target_words.is_empty() || candidate_words.is_empty() {
        return 0.0;
    }

    let target_set: HashSet<&str> = target_words.iter().copied().collect();
    let candidate_set: HashSet<&str> = candidate_words.iter().copied().collect();

    let intersection = target_words
        .iter()
        .filter(|w| candidate_set.contains(*w))
        .count();
    let union = target_set.union(&candidate_set).count();
    let extra_words = candidate_words
        .iter()
        .filter(|w| !target_set.contains(*w))
        .count();

    let mut score = intersection as f64 / union as f64 - extra_words as f64 * 0.05;
    if target_words.iter().all(|w| candidate_set.contains(w)) {
        score += 0.2;
    }
    score
}

fn mentions_season(title: &str, season: u32) -> bool {
    let pattern = format!(r"(?i)\bseason\s*0*{season}\b|\bs0*{season}(?:\b|e\d)");
    Regex::new(&pattern).is_ok_and(|re| re.is_match(title))
}

/// First season number spelled out in a title ("Season 3", "S03", "S03E01")
fn detected_season(title: &str) -> Option<u32> {
    static SEASON: OnceLock<Option<Regex>> = OnceLock::new();
    let re = cached_regex(&SEASON, r"(?i)\bseason\s*(\d+)|\bs(\d+)(?:\b|e\d)")?;
    let caps = re.captures(title)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

/// Full score of one candidate against the target
pub fn score_candidate(
    candidate: &SearchCandidate,
    title: &str,
    year: Option<i32>,
    season: Option<u32>,
) -> f64 {
    let mut score = title_similarity(title, &candidate.title);

    if let (Some(target), Some(found)) = (year, candidate.year) {
        match (target - found).abs() {
            0 => score += 0.2,
            1 => score += 0.1,
            diff if diff > 5 => score -= 0.3,
            _ => {}
        }
    }

    if let Some(season) = season.filter(|s| *s > 0) {
        if detected_season(&candidate.title).is_some_and(|found| found != season) {
            score -= 0.8;
        }
        if mentions_season(&candidate.title, season) {
            score += 0.5;
        } else {
            score -= 0.3;
        }
    }

    let lower = candidate.title.to_lowercase();
    if lower.contains("2160p") || lower.contains("4k") {
        score += 0.05;
    }

    score
}

/// Picks the highest scoring candidate above [`MATCH_THRESHOLD`]
///
/// `season` is only given for TV lookups. Ties keep the candidate seen
/// first.
pub fn select_best<'a>(
    candidates: &'a [SearchCandidate],
    title: &str,
    year: Option<i32>,
    season: Option<u32>,
) -> Option<&'a SearchCandidate> {
    let mut best: Option<(&SearchCandidate, f64)> = None;

    for candidate in candidates {
        let score = score_candidate(candidate, title, year, season);
        let best_score = best.map_or(0.0, |(_, s)| s);
        if score > best_score && score > MATCH_THRESHOLD {
            best = Some((candidate, score));
        }
    }

    if let Some((candidate, score)) = best {
        debug!(title = %candidate.title, score, "best title match");
    }
    best.map(|(candidate, _)| candidate)
}
