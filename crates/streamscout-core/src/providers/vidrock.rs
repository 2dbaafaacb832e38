//! VidRock: one JSON call keyed by an encoded TMDB id

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{Provider, ProviderContext};
use crate::client::USER_AGENT;
use crate::error::{ProviderError, Result};
use crate::parser::quality::quality_from_label;
use crate::pipeline::{Stage, require, run_stage};
use crate::types::{Headers, MediaRequest, Stream, headers};

const ID: &str = "vidrock";

pub struct VidRock;

#[derive(Debug, Deserialize)]
struct Source {
    url: Option<String>,
    resolution: Option<Value>,
}

/// Path key of a request: base64(base64(reverse("tmdb" or "tmdb-s-e")))
fn encode_id(tmdb_id: u64, request: &MediaRequest) -> String {
    let plain = match (request.is_tv(), request.season, request.episode) {
        (true, Some(season), Some(episode)) => format!("{tmdb_id}-{season}-{episode}"),
        _ => tmdb_id.to_string(),
    };
    let reversed: String = plain.chars().rev().collect();
    STANDARD.encode(STANDARD.encode(reversed))
}

/// Resolution label as sent (`1080`, `"720p"`, `"4K"`), with a `p` added to
/// bare numbers
fn resolution_label(resolution: Option<&Value>) -> String {
    match resolution {
        Some(Value::Number(n)) => format!("{n}p"),
        Some(Value::String(s)) if s.chars().all(|c| c.is_ascii_digit()) && !s.is_empty() => {
            format!("{s}p")
        }
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => "Unknown".to_string(),
    }
}

fn playable_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "null" {
        return None;
    }
    if raw.contains('%') {
        return Some(
            urlencoding::decode(raw)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| raw.to_string()),
        );
    }
    Some(raw.to_string())
}

fn parse_sources(body: &BTreeMap<String, Value>, title: &str, stream_headers: &Headers) -> Vec<Stream> {
    body.values()
        .filter_map(|value| serde_json::from_value::<Source>(value.clone()).ok())
        .filter_map(|source| {
            let url = playable_url(source.url.as_deref()?)?;
            let label = resolution_label(source.resolution.as_ref());
            let quality = quality_from_label(&label);
            Some(Stream {
                name: format!("VidRock | {label}"),
                title: title.to_string(),
                url,
                quality,
                size: "Unknown".to_string(),
                headers: stream_headers.clone(),
                subtitles: Vec::new(),
                provider: ID.to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl Provider for VidRock {
    fn id(&self) -> &'static str {
        ID
    }

    fn display_name(&self) -> &'static str {
        "VidRock"
    }

    async fn fetch_streams(&self, ctx: &ProviderContext, request: &MediaRequest) -> Result<Vec<Stream>> {
        let tmdb_id = require(
            request.tmdb_id(),
            Stage::Resolve,
            ProviderError::InvalidId(format!("{} is not a TMDB id", request.id)),
        )?;
        let base = ctx.endpoints.vidrock_base.trim_end_matches('/');
        let url = format!(
            "{base}/api/{}/{}",
            request.media_type.as_str(),
            encode_id(tmdb_id, request)
        );

        let stream_headers = headers([("User-Agent", USER_AGENT), ("Origin", base)]);
        let body: BTreeMap<String, Value> = run_stage(
            ID,
            Stage::Extract,
            ctx.http.get_json(&url, &stream_headers),
        )
        .await?;

        let title = match request.episode_tag() {
            Some(tag) => format!("VidRock Stream {tag}"),
            None => "VidRock Stream".to_string(),
        };
        let streams = parse_sources(&body, &title, &stream_headers);
        debug!(provider = ID, count = streams.len(), "sources listed");
        Ok(streams)
    }
}
