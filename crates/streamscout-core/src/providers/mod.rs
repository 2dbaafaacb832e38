//! Stream providers
//!
//! One provider scrapes one site. Every provider implements [`Provider`];
//! the public contract wraps it in [`get_streams`], which never fails and
//! returns streams best quality first.

mod animekai;
mod hdhub4u;
mod nepu;
mod vidrock;
mod vixsrc;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::client::HttpClient;
use crate::codec::EncDecClient;
use crate::domain::DomainRegistry;
use crate::endpoints::Endpoints;
use crate::error::Result;
use crate::hosters::HosterResolver;
use crate::metadata::MetadataClient;
use crate::playlist::HlsResolution;
use crate::types::{MediaRequest, MediaType, Quality, Stream};

pub use animekai::AnimeKai;
pub use hdhub4u::HdHub4u;
pub use nepu::Nepu;
pub use vidrock::VidRock;
pub use vixsrc::Vixsrc;

/// Everything a provider needs to talk to the outside world
///
/// Owns the HTTP client, the endpoint table and the mirror-domain cache;
/// hands out borrowed helpers for metadata, middleware and hoster calls.
pub struct ProviderContext {
    pub http: HttpClient,
    pub endpoints: Endpoints,
    pub domains: DomainRegistry,
}

impl ProviderContext {
    pub fn new(http: HttpClient, endpoints: Endpoints) -> Self {
        let domains = DomainRegistry::new(endpoints.domains_url.clone());
        Self {
            http,
            endpoints,
            domains,
        }
    }

    pub fn metadata(&self) -> MetadataClient<'_> {
        MetadataClient::new(&self.http, &self.endpoints)
    }

    pub fn codec(&self) -> EncDecClient<'_> {
        EncDecClient::new(&self.http, &self.endpoints.enc_dec_api)
    }

    pub fn hosters(&self) -> HosterResolver<'_> {
        HosterResolver::new(&self.http)
    }
}

/// A single scraped site
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier, also the `provider` field of every stream
    fn id(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    fn supports(&self, _media_type: MediaType) -> bool {
        true
    }

    /// Runs the provider pipeline
    ///
    /// Errors keep their stage and cause so callers can tell a missing title
    /// from a network failure; [`get_streams`] collapses them.
    async fn fetch_streams(&self, ctx: &ProviderContext, request: &MediaRequest) -> Result<Vec<Stream>>;
}

/// Streams of one provider, best quality first; `[]` on any failure
pub async fn get_streams(
    provider: &dyn Provider,
    ctx: &ProviderContext,
    request: &MediaRequest,
) -> Vec<Stream> {
    if !provider.supports(request.media_type) {
        debug!(provider = provider.id(), media_type = request.media_type.as_str(), "media type not supported");
        return Vec::new();
    }

    match provider.fetch_streams(ctx, request).await {
        Ok(mut streams) => {
            sort_by_quality(&mut streams);
            info!(provider = provider.id(), count = streams.len(), "streams found");
            streams
        }
        Err(e) if e.is_not_found() => {
            info!(provider = provider.id(), reason = %e, "no streams");
            Vec::new()
        }
        Err(e) => {
            warn!(provider = provider.id(), error = %e, "provider failed");
            Vec::new()
        }
    }
}

/// Stable sort by quality rank, best first
pub fn sort_by_quality(streams: &mut [Stream]) {
    streams.sort_by_key(|s| std::cmp::Reverse(s.quality.rank()));
}

/// Every built-in provider
pub fn registry() -> Vec<Arc<dyn Provider>> {
    vec![
        Arc::new(HdHub4u),
        Arc::new(Vixsrc),
        Arc::new(VidRock),
        Arc::new(Nepu),
        Arc::new(AnimeKai),
    ]
}

/// Streams for every variant of a resolved playlist
///
/// `name` receives the variant quality, with an unknown quality shown as
/// `Auto`. The playlist's subtitle renditions join the base stream's own.
pub(crate) fn hls_streams(
    resolution: HlsResolution,
    mut base: Stream,
    name: impl Fn(Quality) -> String,
) -> Vec<Stream> {
    base.subtitles.extend(resolution.subtitles);
    resolution
        .variants
        .into_iter()
        .map(|variant| {
            let quality = if variant.quality.is_known() {
                variant.quality
            } else {
                Quality::Auto
            };
            Stream {
                name: name(quality),
                url: variant.url,
                quality,
                ..base.clone()
            }
        })
        .collect()
}
