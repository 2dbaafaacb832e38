//! Decoder for the obfuscated redirect chain used by link-shortener pages
//!
//! The landing page stores a blob split over `s('o', '…')` and
//! `ck('_wp_http_N', '…')` calls. Concatenated, the blob decodes as
//! base64 → base64 → ROT13 → base64 → JSON.

use std::sync::OnceLock;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use regex::Regex;
use serde::Deserialize;

use super::cached_regex;

/// Standard alphabet, padding optional on input (like `atob`)
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Where a decoded redirect blob points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectPayload {
    /// The final URL is embedded in the blob
    Direct(String),
    /// The final URL must be fetched from `{blog_url}?re={data}`
    Confirm { blog_url: String, data: String },
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    o: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    blog_url: Option<String>,
}

/// Concatenates every encoded token found in the page, in document order
pub fn collect_encoded_tokens(html: &str) -> String {
    static TOKENS: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = cached_regex(
        &TOKENS,
        r#"s\s*\(\s*['"]o['"]\s*,\s*['"]([A-Za-z0-9+/=]+)['"]|ck\s*\(\s*['"]_wp_http_\d+['"]\s*,\s*['"]([^'"]+)['"]"#,
    ) else {
        return String::new();
    };

    re.captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str())
        .collect()
}

/// Target of a `window.location.href = '…'` assignment
pub fn window_location(html: &str) -> Option<String> {
    static LOCATION: OnceLock<Option<Regex>> = OnceLock::new();
    let re = cached_regex(&LOCATION, r#"window\.location\.href\s*=\s*['"]([^'"]+)['"]"#)?;
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Decodes base64 the way browsers' `atob` does: whitespace ignored,
/// padding optional
pub fn decode_base64(input: &str) -> Option<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    LENIENT.decode(compact.as_bytes()).ok()
}

fn decode_base64_string(input: &str) -> Option<String> {
    decode_base64(input).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// ROT13 over ASCII letters, everything else untouched
pub fn rot13(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            'a'..='z' => (((c as u8 - b'a') + 13) % 26 + b'a') as char,
            'A'..='Z' => (((c as u8 - b'A') + 13) % 26 + b'A') as char,
            other => other,
        })
        .collect()
}

/// Decodes a concatenated token blob
///
/// Returns `None` for anything malformed: bad base64 at any layer, invalid
/// JSON, or a payload with neither `o` nor `data` + `blog_url`.
pub fn decode_redirect_blob(blob: &str) -> Option<RedirectPayload> {
    let layer1 = decode_base64_string(blob)?;
    let layer2 = decode_base64_string(&layer1)?;
    let json = decode_base64_string(&rot13(&layer2))?;
    let raw: RawPayload = serde_json::from_str(&json).ok()?;

    if let Some(url) = raw
        .o
        .as_deref()
        .and_then(decode_base64_string)
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
    {
        return Some(RedirectPayload::Direct(url));
    }

    let data = raw
        .data
        .as_deref()
        .and_then(decode_base64_string)
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())?;
    let blog_url = raw
        .blog_url
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())?;

    Some(RedirectPayload::Confirm { blog_url, data })
}

/// Direct target of a blob, or `original` when the blob does not decode
/// to one
pub fn decode_or_original(blob: &str, original: &str) -> String {
    match decode_redirect_blob(blob) {
        Some(RedirectPayload::Direct(url)) => url,
        _ => original.to_string(),
    }
}

#[cfg(test)]
pub(crate) fn encode_redirect_blob(json: &str) -> String {
    use base64::engine::general_purpose::STANDARD;

    let layer = STANDARD.encode(json);
    let layer = rot13(&layer);
    let layer = STANDARD.encode(layer);
    STANDARD.encode(layer)
}
