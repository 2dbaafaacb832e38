//! Quality and size inference
//!
//! Maps resolution heights, bitrates, URLs and free-form labels onto the
//! closed [`Quality`] set, and normalizes human-readable file sizes.

use std::sync::OnceLock;

use regex::Regex;

use super::cached_regex;
use crate::types::Quality;

/// Quality from a vertical resolution in pixels
pub fn quality_from_height(height: u32) -> Quality {
    match height {
        h if h >= 2160 => Quality::Uhd4k,
        h if h >= 1440 => Quality::P1440,
        h if h >= 1080 => Quality::P1080,
        h if h >= 720 => Quality::P720,
        h if h >= 480 => Quality::P480,
        h if h >= 360 => Quality::P360,
        _ => Quality::P240,
    }
}

/// Quality from an HLS `BANDWIDTH` value in bits per second
///
/// Thresholds in Mbps: 15 → 4K, 8 → 1440p, 5 → 1080p, 3 → 720p,
/// 1.5 → 480p, 0.8 → 360p, below that 240p. A value between two thresholds
/// takes the lower one, so 6 Mbps is 1080p.
pub fn quality_from_bandwidth(bandwidth: u64) -> Quality {
    let mbps = bandwidth as f64 / 1_000_000.0;
    if mbps >= 15.0 {
        Quality::Uhd4k
    } else if mbps >= 8.0 {
        Quality::P1440
    } else if mbps >= 5.0 {
        Quality::P1080
    } else if mbps >= 3.0 {
        Quality::P720
    } else if mbps >= 1.5 {
        Quality::P480
    } else if mbps >= 0.8 {
        Quality::P360
    } else {
        Quality::P240
    }
}

/// Infers quality from the text of a URL
///
/// Looks for explicit heights (`.1080p.`, `/720/`), then keywords
/// (`4k`, `fhd`, `hd`, `sd`), then `quality_NNN`, `res_NNN` and `WxH`.
pub fn quality_from_url(url: &str) -> Quality {
    static HEIGHTS: OnceLock<Vec<(Regex, Quality)>> = OnceLock::new();
    static NUMERIC: OnceLock<Vec<Regex>> = OnceLock::new();

    let heights = HEIGHTS.get_or_init(|| {
        [
            (r"(?i)[._/-]2160p?", Quality::Uhd4k),
            (r"(?i)[._/-]1440p?", Quality::P1440),
            (r"(?i)[._/-]1080p?", Quality::P1080),
            (r"(?i)[._/-]720p?", Quality::P720),
            (r"(?i)[._/-]480p?", Quality::P480),
            (r"(?i)[._/-]360p?", Quality::P360),
            (r"(?i)[._/-]240p?", Quality::P240),
            (r"(?i)\b(?:4k|uhd)\b", Quality::Uhd4k),
            (r"(?i)\b(?:fhd|1080)\b", Quality::P1080),
            (r"(?i)\b(?:hd|720)\b", Quality::P720),
            (r"(?i)\b(?:sd|480)\b", Quality::P480),
        ]
        .into_iter()
        .filter_map(|(p, q)| Regex::new(p).ok().map(|re| (re, q)))
        .collect()
    });
    let numeric = NUMERIC.get_or_init(|| {
        [
            r"(?i)quality[_-]?(\d{3,4})",
            r"(?i)res[_-]?(\d{3,4})",
            r"(?i)\d{3,4}x(\d{3,4})",
        ]
        .into_iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    });

    for (re, quality) in heights {
        if re.is_match(url) {
            return *quality;
        }
    }
    for re in numeric {
        if let Some(height) = re
            .captures(url)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            && (240..=4320).contains(&height)
        {
            return quality_from_height(height);
        }
    }
    Quality::Unknown
}

/// Normalizes a free-form quality label ("FHD", "2160p HDR", "720p")
pub fn quality_from_label(label: &str) -> Quality {
    static PATTERNS: OnceLock<Vec<(Regex, Quality)>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            (r"(?i)4k|2160p?|uhd", Quality::Uhd4k),
            (r"(?i)1440p?|2k|qhd", Quality::P1440),
            (r"(?i)1080p?|fhd|full\s*hd", Quality::P1080),
            (r"(?i)720p?|\bhd\b", Quality::P720),
            (r"(?i)480p?|\bsd\b", Quality::P480),
            (r"(?i)360p?", Quality::P360),
            (r"(?i)240p?", Quality::P240),
        ]
        .into_iter()
        .filter_map(|(p, q)| Regex::new(p).ok().map(|re| (re, q)))
        .collect()
    });

    patterns
        .iter()
        .find(|(re, _)| re.is_match(label))
        .map(|(_, q)| *q)
        .unwrap_or(Quality::Unknown)
}

fn size_regex() -> Option<&'static Regex> {
    static SIZE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&SIZE, r"(?i)(\d+(?:\.\d+)?)\s*(TB|GB|MB|KB)")
}

/// Normalizes "1.50GB" / "500 mb" into "1.5 GB" / "500 MB"
pub fn parse_size(text: &str) -> Option<String> {
    let caps = size_regex()?.captures(text)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str().to_uppercase();
    Some(format!("{} {}", value, unit))
}

/// Converts a size string ("1.5 GB") to bytes, 1024-based
pub fn size_to_bytes(text: &str) -> Option<u64> {
    let caps = size_regex()?.captures(text)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let multiplier: f64 = match caps.get(2)?.as_str().to_uppercase().as_str() {
        "TB" => 1024f64.powi(4),
        "GB" => 1024f64.powi(3),
        "MB" => 1024f64.powi(2),
        _ => 1024.0,
    };
    Some((value * multiplier) as u64)
}

/// Human-readable byte size, "Unknown" for missing or zero sizes
pub fn format_bytes(bytes: Option<u64>) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    let Some(bytes) = bytes.filter(|b| *b > 0) else {
        return "Unknown".to_string();
    };

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 10.0).round() / 10.0;
    format!("{} {}", rounded, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_quality_from_height_thresholds() {
        assert_eq!(quality_from_height(2160), Quality::Uhd4k);
        assert_eq!(quality_from_height(1600), Quality::P1440);
        assert_eq!(quality_from_height(1080), Quality::P1080);
        assert_eq!(quality_from_height(1079), Quality::P720);
        assert_eq!(quality_from_height(720), Quality::P720);
        assert_eq!(quality_from_height(480), Quality::P480);
        assert_eq!(quality_from_height(360), Quality::P360);
        assert_eq!(quality_from_height(144), Quality::P240);
    }

    #[test]
    fn test_quality_from_bandwidth_thresholds() {
        assert_eq!(quality_from_bandwidth(15_000_000), Quality::Uhd4k);
        assert_eq!(quality_from_bandwidth(8_000_000), Quality::P1440);
        assert_eq!(quality_from_bandwidth(6_000_000), Quality::P1080);
        assert_eq!(quality_from_bandwidth(3_000_000), Quality::P720);
        assert_eq!(quality_from_bandwidth(1_500_000), Quality::P480);
        assert_eq!(quality_from_bandwidth(900_000), Quality::P360);
        assert_eq!(quality_from_bandwidth(500_000), Quality::P240);
    }

    #[test]
    fn test_bandwidth_between_thresholds_takes_lower_tier() {
        assert_eq!(quality_from_bandwidth(6_000_000), Quality::P1080);
        assert_eq!(quality_from_bandwidth(7_999_999), Quality::P1080);
        assert_eq!(quality_from_bandwidth(14_999_999), Quality::P1440);
        assert_eq!(quality_from_bandwidth(4_999_999), Quality::P720);
    }

    #[test]
    fn test_quality_from_url() {
        assert_eq!(quality_from_url("https://cdn.x/movie.1080p.mkv"), Quality::P1080);
        assert_eq!(quality_from_url("https://cdn.x/hls/720/index.m3u8"), Quality::P720);
        assert_eq!(quality_from_url("https://cdn.x/Movie_2160p.mp4"), Quality::Uhd4k);
        assert_eq!(quality_from_url("https://cdn.x/v?quality_480"), Quality::P480);
        assert_eq!(quality_from_url("https://cdn.x/1920x1080/a.ts"), Quality::P1080);
        assert_eq!(quality_from_url("https://cdn.x/master.m3u8"), Quality::Unknown);
    }

    #[test]
    fn test_quality_from_label() {
        assert_eq!(quality_from_label("4K HDR"), Quality::Uhd4k);
        assert_eq!(quality_from_label("2160p"), Quality::Uhd4k);
        assert_eq!(quality_from_label("FHD"), Quality::P1080);
        assert_eq!(quality_from_label("1080p WEB-DL"), Quality::P1080);
        assert_eq!(quality_from_label("720p"), Quality::P720);
        assert_eq!(quality_from_label("480p"), Quality::P480);
        assert_eq!(quality_from_label("360"), Quality::P360);
        assert_eq!(quality_from_label("Server 1"), Quality::Unknown);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("Size: 1.50GB"), Some("1.5 GB".to_string()));
        assert_eq!(parse_size("500 mb"), Some("500 MB".to_string()));
        assert_eq!(parse_size("HD"), None);
    }

    #[test]
    fn test_size_to_bytes() {
        assert_eq!(size_to_bytes("1 KB"), Some(1024));
        assert_eq!(size_to_bytes("2 MB"), Some(2 * 1024 * 1024));
        assert_eq!(size_to_bytes("1.5 GB"), Some(1_610_612_736));
        assert_eq!(size_to_bytes("unknown"), None);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(None), "Unknown");
        assert_eq!(format_bytes(Some(0)), "Unknown");
        assert_eq!(format_bytes(Some(512)), "512 Bytes");
        assert_eq!(format_bytes(Some(1_610_612_736)), "1.5 GB");
        assert_eq!(format_bytes(Some(1024 * 1024)), "1 MB");
    }

    proptest! {
        #[test]
        fn prop_height_quality_is_monotonic(a in 0u32..5000, b in 0u32..5000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(quality_from_height(lo).rank() <= quality_from_height(hi).rank());
        }

        #[test]
        fn prop_bandwidth_quality_is_monotonic(a in 0u64..40_000_000, b in 0u64..40_000_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(quality_from_bandwidth(lo).rank() <= quality_from_bandwidth(hi).rank());
        }
    }
}
