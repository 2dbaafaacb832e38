//! Hoster resolution
//!
//! Provider pages link to file hosters, link-list pages and shortener
//! wrappers. [`classify`] routes a URL to exactly one rule and
//! [`HosterResolver`] applies it, recursing through wrappers and link pages
//! until playable links come out.

mod hub;
mod hubcloud;
pub mod redirect;
mod simple;

use std::sync::OnceLock;

use futures::FutureExt;
use futures::future::BoxFuture;
use regex::Regex;
use tracing::debug;

use crate::client::{HttpClient, host_of};
use crate::error::{ProviderError, Result};
use crate::parser::cached_regex;
use crate::parser::quality::quality_from_url;
use crate::types::{Headers, Quality, headers};

pub use hubcloud::clean_release_tags;
pub use redirect::follow_redirect;

/// Nesting limit for wrapper → link page → hoster chains
pub const MAX_DEPTH: usize = 6;

/// Hosters with a dedicated resolution rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hoster {
    HubCloud,
    HubCdn,
    HubDrive,
    HbLinks,
    Pixeldrain,
    Streamtape,
    Mixdrop,
    StreamSb,
    Dood,
    Voe,
    Mp4Upload,
    HdStream4u,
}

/// What to do with a scraped URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostRoute {
    /// Shortener page hiding the target behind the obfuscated chain
    Redirect,
    Hoster(Hoster),
    /// Plain `.mp4` / `.mkv` file
    DirectFile,
    HlsMaster,
    Unsupported,
}

/// Hostname markers of link wrappers resolved through [`follow_redirect`]
const REDIRECT_HOSTS: &[&str] = &[
    "techyboy4u",
    "gadgetsweb.xyz",
    "cryptoinsights.site",
    "bloggingvector",
    "ampproject.org",
];

/// Hostname substring → rule, first match wins. `None` marks hosts that are
/// recognized but have no rule (their players need AES keys).
const DISPATCH: &[(&str, Option<Hoster>)] = &[
    ("hubcloud", Some(Hoster::HubCloud)),
    ("hubcdn", Some(Hoster::HubCdn)),
    ("hblinks", Some(Hoster::HbLinks)),
    ("hubstream.dad", Some(Hoster::HbLinks)),
    ("hubstream", None),
    ("vidstack", None),
    ("pixeldrain", Some(Hoster::Pixeldrain)),
    ("streamtape", Some(Hoster::Streamtape)),
    ("hdstream4u", Some(Hoster::HdStream4u)),
    ("hubdrive", Some(Hoster::HubDrive)),
    ("mixdrop", Some(Hoster::Mixdrop)),
    ("streamsb", Some(Hoster::StreamSb)),
    ("dood", Some(Hoster::Dood)),
    ("voe", Some(Hoster::Voe)),
    ("mp4upload", Some(Hoster::Mp4Upload)),
];

/// Routes a URL to its resolution rule
pub fn classify(url: &str) -> HostRoute {
    let Some(host) = host_of(url) else {
        return HostRoute::Unsupported;
    };

    if url.contains("?id=") || REDIRECT_HOSTS.iter().any(|marker| host.contains(marker)) {
        return HostRoute::Redirect;
    }

    if let Some((_, rule)) = DISPATCH.iter().find(|(marker, _)| host.contains(marker)) {
        return rule.map_or(HostRoute::Unsupported, HostRoute::Hoster);
    }

    let path = url::Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_default();
    if path.ends_with(".m3u8") {
        HostRoute::HlsMaster
    } else if path.ends_with(".mp4") || path.ends_with(".mkv") {
        HostRoute::DirectFile
    } else {
        HostRoute::Unsupported
    }
}

/// A playable link produced by a hoster rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedLink {
    /// Hoster and server label, e.g. `HubCloud - FSL [WEB-DL H264][1.4GB]`
    pub source: String,
    pub url: String,
    pub quality: Quality,
    /// File size in bytes, when the hoster page states one
    pub size: Option<u64>,
    /// Release name shown on the hoster page
    pub file_name: Option<String>,
    /// Headers the link needs beyond the provider's own
    pub headers: Headers,
}

impl HostedLink {
    pub fn new(source: impl Into<String>, url: impl Into<String>, quality: Quality) -> Self {
        Self {
            source: source.into(),
            url: url.into(),
            quality,
            size: None,
            file_name: None,
            headers: Headers::new(),
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Short server name for stream labels
    pub fn server_name(&self) -> String {
        extract_server_name(&self.source)
    }
}

/// Short server name from a link's source label
///
/// HubCloud labels yield the server after the dash ("FSL", "S3"), or
/// "Download" for the plain button; known hosters yield their own name;
/// anything else yields the first hostname label.
pub fn extract_server_name(source: &str) -> String {
    static HUBCLOUD: OnceLock<Option<Regex>> = OnceLock::new();

    if source.is_empty() {
        return "Unknown".to_string();
    }
    if source.starts_with("HubCloud") {
        return cached_regex(&HUBCLOUD, r"HubCloud(?:\s*-\s*([^\[\]]+))?")
            .and_then(|re| re.captures(source))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "Download".to_string());
    }
    for known in ["Pixeldrain", "StreamTape", "HubCdn", "HbLinks", "Hubstream"] {
        if source.starts_with(known) {
            return known.to_string();
        }
    }
    source
        .trim_start_matches("www.")
        .split('.')
        .next()
        .unwrap_or(source)
        .to_string()
}

fn referer_headers(referer: &str) -> Headers {
    headers([("Referer", referer)])
}

/// Applies hoster rules to scraped URLs
#[derive(Clone, Copy)]
pub struct HosterResolver<'a> {
    http: &'a HttpClient,
    max_depth: usize,
}

impl<'a> HosterResolver<'a> {
    pub fn new(http: &'a HttpClient) -> Self {
        Self {
            http,
            max_depth: MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolves `url` to playable links; an unknown host or any failure
    /// yields no links
    pub async fn resolve(&self, url: &str, referer: &str) -> Vec<HostedLink> {
        match self.try_resolve(url, referer).await {
            Ok(links) => links,
            Err(e) => {
                debug!(url, error = %e, "hoster produced no links");
                Vec::new()
            }
        }
    }

    /// Resolves `url` to playable links
    ///
    /// # Errors
    /// - `UnsupportedHost` - no rule for the URL's host
    /// - `ElementNotFound` - the hoster page lacks the expected element
    /// - `InvalidUrl` - the wrapper chain went deeper than the depth limit
    /// - network errors of the hoster pages
    pub async fn try_resolve(&self, url: &str, referer: &str) -> Result<Vec<HostedLink>> {
        self.resolve_at(url.to_string(), referer.to_string(), 0)
            .await
    }

    fn resolve_at(
        self,
        url: String,
        referer: String,
        depth: usize,
    ) -> BoxFuture<'a, Result<Vec<HostedLink>>> {
        async move {
            if depth > self.max_depth {
                return Err(ProviderError::InvalidUrl(format!(
                    "hoster chain deeper than {} at {url}",
                    self.max_depth
                )));
            }

            let route = classify(&url);
            debug!(url = %url, ?route, depth, "resolving hoster");

            match route {
                HostRoute::Redirect => {
                    let target = follow_redirect(self.http, &url)
                        .await
                        .filter(|target| *target != url)
                        .ok_or_else(|| {
                            ProviderError::ElementNotFound(format!("redirect target of {url}"))
                        })?;
                    self.resolve_at(target, url, depth + 1).await
                }
                HostRoute::Hoster(hoster) => self.apply(hoster, &url, &referer, depth).await,
                HostRoute::DirectFile | HostRoute::HlsMaster => {
                    let source = host_of(&url).unwrap_or_default();
                    Ok(vec![HostedLink::new(source, url.as_str(), quality_from_url(&url))])
                }
                HostRoute::Unsupported => Err(ProviderError::UnsupportedHost(
                    host_of(&url).unwrap_or(url),
                )),
            }
        }
        .boxed()
    }

    async fn apply(
        &self,
        hoster: Hoster,
        url: &str,
        referer: &str,
        depth: usize,
    ) -> Result<Vec<HostedLink>> {
        match hoster {
            Hoster::HubCloud => self.hubcloud(url, referer, depth).await,
            Hoster::HubCdn => self.hubcdn(url, referer).await.map(|link| vec![link]),
            Hoster::HubDrive => self.hubdrive(url, referer, depth).await,
            Hoster::HbLinks => self.hblinks(url, depth).await,
            Hoster::Pixeldrain => Ok(vec![simple::pixeldrain(url)]),
            Hoster::Streamtape => self.streamtape(url).await.map(|link| vec![link]),
            Hoster::Mixdrop => self.mixdrop(url).await.map(|link| vec![link]),
            Hoster::Dood => self.dood(url).await.map(|link| vec![link]),
            Hoster::Voe => self.voe(url).await.map(|link| vec![link]),
            Hoster::Mp4Upload => self.mp4upload(url).await.map(|link| vec![link]),
            Hoster::StreamSb => self.streamsb(url).await.map(|link| vec![link]),
            Hoster::HdStream4u => Ok(vec![HostedLink::new("HdStream4u", url, Quality::P1080)]),
        }
    }

    /// Resolves a nested link one level deeper, swallowing its failure
    async fn descend(&self, url: &str, referer: &str, depth: usize) -> Vec<HostedLink> {
        match self
            .resolve_at(url.to_string(), referer.to_string(), depth + 1)
            .await
        {
            Ok(links) => links,
            Err(e) => {
                debug!(url, error = %e, "nested link produced nothing");
                Vec::new()
            }
        }
    }
}
