//! Main entry point
//!
//! [`StreamScraper`] takes the loosely typed arguments a host application
//! passes (`"603"`, `"movie"`, season and episode numbers), validates them
//! and hands the request to the aggregator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aggregate::{AggregatorConfig, StreamAggregator, finalize};
use crate::client::{ClientConfig, HttpClient};
use crate::endpoints::Endpoints;
use crate::error::Result;
use crate::providers::{Provider, ProviderContext, get_streams};
use crate::types::{ContentId, MediaRequest, MediaType, Stream};

/// Everything configurable about a scraper
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub client: ClientConfig,
    pub endpoints: Endpoints,
    pub aggregator: AggregatorConfig,
}

/// Builds a request from host arguments
///
/// Season and episode only apply to TV requests.
///
/// # Errors
/// `InvalidId` for an unknown media type or an id that is neither a TMDB,
/// IMDb, `anilist:` nor `mal:` id.
pub fn parse_request(
    id: &str,
    media_type: &str,
    season: Option<u32>,
    episode: Option<u32>,
) -> Result<MediaRequest> {
    let id: ContentId = id.parse()?;
    let media_type: MediaType = media_type.parse()?;
    Ok(match media_type {
        MediaType::Movie => MediaRequest::movie(id),
        MediaType::Tv => MediaRequest {
            id,
            media_type,
            season,
            episode,
        },
    })
}

/// Multi-provider stream scraper
///
/// Owns the HTTP client, the endpoint table and the provider set. Every
/// lookup returns a possibly empty list; failures are logged, never raised.
pub struct StreamScraper {
    aggregator: StreamAggregator,
}

impl StreamScraper {
    /// Scraper over every built-in provider with default configuration
    ///
    /// # Errors
    /// Returns error if HTTP client initialization fails
    pub fn new() -> Result<Self> {
        Self::with_config(ScraperConfig::default())
    }

    /// # Errors
    /// Returns error if HTTP client initialization fails
    pub fn with_config(config: ScraperConfig) -> Result<Self> {
        let ctx = Self::context(&config)?;
        Ok(Self {
            aggregator: StreamAggregator::new(ctx, config.aggregator),
        })
    }

    /// Scraper over a custom provider set
    ///
    /// # Errors
    /// Returns error if HTTP client initialization fails
    pub fn with_providers(config: ScraperConfig, providers: Vec<Arc<dyn Provider>>) -> Result<Self> {
        let ctx = Self::context(&config)?;
        Ok(Self {
            aggregator: StreamAggregator::with_providers(ctx, providers, config.aggregator),
        })
    }

    fn context(config: &ScraperConfig) -> Result<ProviderContext> {
        let http = HttpClient::with_config(config.client.clone())?;
        Ok(ProviderContext::new(http, config.endpoints.clone()))
    }

    /// Ids of the providers that run on [`get_streams`](Self::get_streams), in run order
    pub fn providers(&self) -> Vec<&'static str> {
        self.aggregator.active_providers().iter().map(|p| p.id()).collect()
    }

    /// Streams from every enabled provider, deduplicated, best quality first
    ///
    /// # Example
    /// ```no_run
    /// # async fn example() -> streamscout_core::Result<()> {
    /// use streamscout_core::StreamScraper;
    /// let scraper = StreamScraper::new()?;
    /// for stream in scraper.get_streams("1399", "tv", Some(1), Some(1)).await {
    ///     println!("{} [{}] {}", stream.name, stream.quality, stream.url);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_streams(
        &self,
        id: &str,
        media_type: &str,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Vec<Stream> {
        match parse_request(id, media_type, season, episode) {
            Ok(request) => self.aggregator.aggregate(&request).await,
            Err(e) => {
                warn!(id, media_type, error = %e, "rejected request");
                Vec::new()
            }
        }
    }

    /// Streams from a single provider, under the same contract as
    /// [`get_streams`](Self::get_streams)
    ///
    /// Runs the provider even when the configuration disables it.
    pub async fn provider_streams(
        &self,
        provider_id: &str,
        id: &str,
        media_type: &str,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Vec<Stream> {
        let Some(provider) = self.aggregator.provider(provider_id) else {
            warn!(provider = provider_id, "unknown provider");
            return Vec::new();
        };
        let request = match parse_request(id, media_type, season, episode) {
            Ok(request) => request,
            Err(e) => {
                warn!(id, media_type, error = %e, "rejected request");
                return Vec::new();
            }
        };
        debug!(provider = provider_id, id = %request.id, "single provider lookup");
        finalize(get_streams(Arc::as_ref(provider), self.aggregator.context(), &request).await)
    }
}
