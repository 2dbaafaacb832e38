//! StreamScout Core Library
//!
//! Finds playable streams for a movie or episode across several scraped
//! sites and returns them as one ranked list.
//!
//! # Overview
//!
//! A lookup takes a content id (TMDB, IMDb, `anilist:` or `mal:`), a media
//! type and, for series, a season and episode. Every enabled provider then:
//! - resolves the id to a title, year and air date
//! - searches its site and picks the best-matching result
//! - extracts hoster links or embed payloads from the result page
//! - resolves hosters and HLS master playlists into playable URLs
//!
//! Providers run concurrently with bounded parallelism. Their results are
//! deduplicated by URL and sorted best quality first. A failing provider
//! only costs its own streams.
//!
//! # Example
//!
//! ```no_run
//! use streamscout_core::{Result, StreamScraper};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let scraper = StreamScraper::new()?;
//!
//!     // The Matrix by TMDB id
//!     for stream in scraper.get_streams("603", "movie", None, None).await {
//!         println!("{} [{}] {}", stream.name, stream.quality, stream.url);
//!     }
//!
//!     // One provider only, by IMDb id
//!     let streams = scraper
//!         .provider_streams("vixsrc", "tt0944947", "tv", Some(1), Some(1))
//!         .await;
//!     println!("{} streams from vixsrc", streams.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Stream headers
//!
//! Most hosters refuse requests without the right `Referer` or
//! `User-Agent`. Every [`Stream`] carries the headers a player must send
//! with it, and many URLs embed short-lived tokens. Do not cache them
//! long-term.

pub mod aggregate;
mod client;
pub mod codec;
pub mod domain;
pub mod endpoints;
mod error;
pub mod hosters;
pub mod matching;
pub mod metadata;
pub mod parser;
mod pipeline;
pub mod playlist;
pub mod pool;
pub mod providers;
mod scraper;
mod types;

// Re-export client types
pub use client::{ClientConfig, Fetched, HttpClient, USER_AGENT};

// Re-export error types
pub use error::{ProviderError, Result};
pub use pipeline::Stage;

// Re-export main scraper API
pub use aggregate::{AggregatorConfig, ProviderSetting, StreamAggregator};
pub use endpoints::Endpoints;
pub use providers::{Provider, ProviderContext};
pub use scraper::{ScraperConfig, StreamScraper, parse_request};

// Re-export data types
pub use types::{
    ContentId, Headers, MediaInfo, MediaRequest, MediaType, Quality, SearchCandidate, Stream,
    Subtitle,
};
