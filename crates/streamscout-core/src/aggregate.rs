//! Multi-provider aggregation
//!
//! Runs every enabled provider for one request with bounded parallelism,
//! then merges the results: first occurrence of a URL wins, best quality
//! first.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::pool::run_bounded_flat;
use crate::providers::{Provider, ProviderContext, get_streams, registry, sort_by_quality};
use crate::types::{MediaRequest, Stream};

/// Enable flag and priority of one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSetting {
    pub id: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Higher runs (and ranks among equal qualities) earlier
    #[serde(default)]
    pub priority: i32,
}

fn enabled_by_default() -> bool {
    true
}

/// Configuration for the aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Providers running at once (default: 4)
    pub concurrency: usize,
    /// Budget of one provider pipeline in milliseconds, 0 for none (default: 60000)
    pub provider_timeout_ms: u64,
    /// Per-provider overrides; unlisted providers run enabled at priority 0
    pub providers: Vec<ProviderSetting>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            provider_timeout_ms: 60_000,
            providers: Vec::new(),
        }
    }
}

impl AggregatorConfig {
    fn setting(&self, id: &str) -> Option<&ProviderSetting> {
        self.providers.iter().find(|s| s.id == id)
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.setting(id).is_none_or(|s| s.enabled)
    }

    pub fn priority(&self, id: &str) -> i32 {
        self.setting(id).map_or(0, |s| s.priority)
    }

    fn provider_timeout(&self) -> Option<Duration> {
        (self.provider_timeout_ms > 0).then(|| Duration::from_millis(self.provider_timeout_ms))
    }
}

/// Dedups by URL (first seen wins) and sorts best quality first
///
/// The sort is stable, so streams of equal quality keep provider order.
pub fn finalize(streams: Vec<Stream>) -> Vec<Stream> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Stream> = streams
        .into_iter()
        .filter(|stream| seen.insert(stream.url.clone()))
        .collect();
    sort_by_quality(&mut unique);
    unique
}

/// Runs a set of providers against one shared context
pub struct StreamAggregator {
    ctx: ProviderContext,
    providers: Vec<Arc<dyn Provider>>,
    config: AggregatorConfig,
}

impl StreamAggregator {
    /// Aggregator over every built-in provider
    pub fn new(ctx: ProviderContext, config: AggregatorConfig) -> Self {
        Self::with_providers(ctx, registry(), config)
    }

    pub fn with_providers(
        ctx: ProviderContext,
        providers: Vec<Arc<dyn Provider>>,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            ctx,
            providers,
            config,
        }
    }

    pub fn context(&self) -> &ProviderContext {
        &self.ctx
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Looks up a provider by id, enabled or not
    pub fn provider(&self, id: &str) -> Option<&Arc<dyn Provider>> {
        self.providers.iter().find(|p| p.id() == id)
    }

    /// Enabled providers, highest priority first, registry order among equals
    pub fn active_providers(&self) -> Vec<&Arc<dyn Provider>> {
        let mut active: Vec<&Arc<dyn Provider>> = self
            .providers
            .iter()
            .filter(|p| self.config.is_enabled(p.id()))
            .collect();
        active.sort_by_key(|p| std::cmp::Reverse(self.config.priority(p.id())));
        active
    }

    /// Streams from every enabled provider; never fails
    ///
    /// A provider that errors or exceeds its time budget contributes
    /// nothing and does not hold up the others.
    pub async fn aggregate(&self, request: &MediaRequest) -> Vec<Stream> {
        let providers = self.active_providers();
        debug!(
            id = %request.id,
            media_type = request.media_type.as_str(),
            providers = providers.len(),
            "aggregating"
        );

        let tasks = providers.iter().map(|provider| {
            (provider.id().to_string(), async move {
                Ok::<_, ProviderError>(get_streams(Arc::as_ref(provider), &self.ctx, request).await)
            })
        });
        let streams = run_bounded_flat(
            tasks,
            self.config.concurrency,
            self.config.provider_timeout(),
        )
        .await;

        let streams = finalize(streams);
        info!(id = %request.id, count = streams.len(), "aggregation finished");
        streams
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpClient;
    use crate::endpoints::Endpoints;
    use crate::error::Result;
    use crate::types::{ContentId, Quality};
    use async_trait::async_trait;

    struct Scripted {
        id: &'static str,
        outcome: std::result::Result<Vec<Stream>, &'static str>,
        delay_ms: u64,
    }

    impl Scripted {
        fn ok(id: &'static str, streams: Vec<Stream>) -> Arc<dyn Provider> {
            Arc::new(Self {
                id,
                outcome: Ok(streams),
                delay_ms: 0,
            })
        }

        fn failing(id: &'static str) -> Arc<dyn Provider> {
            Arc::new(Self {
                id,
                outcome: Err("site changed its markup"),
                delay_ms: 0,
            })
        }

        fn slow(id: &'static str, streams: Vec<Stream>, delay_ms: u64) -> Arc<dyn Provider> {
            Arc::new(Self {
                id,
                outcome: Ok(streams),
                delay_ms,
            })
        }
    }

    #[async_trait]
    impl Provider for Scripted {
        fn id(&self) -> &'static str {
            self.id
        }

        fn display_name(&self) -> &'static str {
            self.id
        }

        async fn fetch_streams(&self, _ctx: &ProviderContext, _request: &MediaRequest) -> Result<Vec<Stream>> {
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            match &self.outcome {
                Ok(streams) => Ok(streams.clone()),
                Err(reason) => Err(ProviderError::ParseError(reason.to_string())),
            }
        }
    }

    fn stream(provider: &str, url: &str, quality: Quality) -> Stream {
        Stream {
            name: format!("{provider} {quality}"),
            title: "Title".to_string(),
            url: url.to_string(),
            quality,
            size: "Unknown".to_string(),
            headers: Default::default(),
            subtitles: Vec::new(),
            provider: provider.to_string(),
        }
    }

    fn aggregator(providers: Vec<Arc<dyn Provider>>, config: AggregatorConfig) -> StreamAggregator {
        let ctx = ProviderContext::new(HttpClient::new().unwrap(), Endpoints::rooted_at("http://127.0.0.1:1"));
        StreamAggregator::with_providers(ctx, providers, config)
    }

    fn movie() -> MediaRequest {
        MediaRequest::movie(ContentId::Tmdb(603))
    }

    #[tokio::test]
    async fn test_aggregate_dedups_and_ranks() {
        let agg = aggregator(
            vec![
                Scripted::ok(
                    "a",
                    vec![stream("a", "https://x/720", Quality::P720), stream("a", "https://x/1080", Quality::P1080)],
                ),
                Scripted::failing("b"),
                Scripted::ok("c", vec![stream("c", "https://x/720", Quality::P720)]),
            ],
            AggregatorConfig::default(),
        );

        let streams = agg.aggregate(&movie()).await;
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].url, "https://x/1080");
        assert_eq!(streams[1].url, "https://x/720");
        assert_eq!(streams[1].provider, "a");
    }

    #[tokio::test]
    async fn test_disabled_and_prioritised_providers() {
        let config = AggregatorConfig {
            providers: vec![
                ProviderSetting {
                    id: "low".to_string(),
                    enabled: false,
                    priority: 0,
                },
                ProviderSetting {
                    id: "late".to_string(),
                    enabled: true,
                    priority: 10,
                },
            ],
            ..AggregatorConfig::default()
        };
        let agg = aggregator(
            vec![
                Scripted::ok("early", vec![stream("early", "https://e/1", Quality::P720)]),
                Scripted::ok("low", vec![stream("low", "https://l/1", Quality::Uhd4k)]),
                Scripted::ok("late", vec![stream("late", "https://p/1", Quality::P720)]),
            ],
            config,
        );

        let order: Vec<&str> = agg.active_providers().iter().map(|p| p.id()).collect();
        assert_eq!(order, vec!["late", "early"]);

        let streams = agg.aggregate(&movie()).await;
        let providers: Vec<&str> = streams.iter().map(|s| s.provider.as_str()).collect();
        assert_eq!(providers, vec!["late", "early"]);
        assert!(agg.provider("low").is_some());
    }

    #[tokio::test]
    async fn test_slow_provider_is_dropped() {
        let config = AggregatorConfig {
            provider_timeout_ms: 50,
            ..AggregatorConfig::default()
        };
        let agg = aggregator(
            vec![
                Scripted::slow("slow", vec![stream("slow", "https://s/1", Quality::Uhd4k)], 2_000),
                Scripted::ok("fast", vec![stream("fast", "https://f/1", Quality::P480)]),
            ],
            config,
        );

        let streams = agg.aggregate(&movie()).await;
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].provider, "fast");
    }

    #[test]
    fn test_finalize_is_stable() {
        let streams = finalize(vec![
            stream("a", "u1", Quality::Auto),
            stream("a", "u2", Quality::P720),
            stream("b", "u3", Quality::P720),
            stream("b", "u1", Quality::P1080),
            stream("c", "u4", Quality::Unknown),
        ]);
        let urls: Vec<&str> = streams.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["u2", "u3", "u1", "u4"]);
    }

    #[test]
    fn test_config_from_json() {
        let config: AggregatorConfig =
            serde_json::from_str(r#"{"providers":[{"id":"nepu","enabled":false},{"id":"vixsrc","priority":5}]}"#)
                .unwrap();
        assert_eq!(config.concurrency, 4);
        assert!(!config.is_enabled("nepu"));
        assert!(config.is_enabled("vixsrc"));
        assert!(config.is_enabled("vidrock"));
        assert_eq!(config.priority("vixsrc"), 5);
        assert_eq!(config.priority("vidrock"), 0);
    }
}
