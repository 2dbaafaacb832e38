//! Mirror-domain cache
//!
//! Scraped sites hop between mirror domains. A published JSON document maps
//! site keys (e.g. `"HDHUB4u"`) to the current domain; [`DomainRegistry`]
//! caches it for a fixed TTL. The registry is an explicit object handed to
//! providers through their context, not process-wide state.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::HttpClient;
use crate::types::Headers;

/// How long a fetched domain list stays fresh
pub const DOMAIN_TTL: Duration = Duration::from_secs(4 * 60 * 60);

#[derive(Debug, Default)]
struct DomainState {
    domains: HashMap<String, String>,
    last_refreshed: Option<Instant>,
}

/// Cache of current mirror domains keyed by site
#[derive(Debug)]
pub struct DomainRegistry {
    source_url: String,
    ttl: Duration,
    state: Mutex<DomainState>,
}

impl DomainRegistry {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self::with_ttl(source_url, DOMAIN_TTL)
    }

    pub fn with_ttl(source_url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            source_url: source_url.into(),
            ttl,
            state: Mutex::new(DomainState::default()),
        }
    }

    /// Current domain for `key`, refreshing the list first when it is stale
    ///
    /// Falls back to the last known domain, then to `default`. Never fails.
    pub async fn current(&self, client: &HttpClient, key: &str, default: &str) -> String {
        let mut state = self.state.lock().await;

        let stale = state
            .last_refreshed
            .is_none_or(|at| at.elapsed() >= self.ttl);
        if stale {
            self.refresh_locked(client, &mut state).await;
        }

        state
            .domains
            .get(key)
            .map(|d| d.trim_end_matches('/').to_string())
            .unwrap_or_else(|| default.trim_end_matches('/').to_string())
    }

    /// Forces a refresh of the domain list
    pub async fn refresh(&self, client: &HttpClient) {
        let mut state = self.state.lock().await;
        self.refresh_locked(client, &mut state).await;
    }

    async fn refresh_locked(&self, client: &HttpClient, state: &mut DomainState) {
        debug!(url = %self.source_url, "fetching mirror domains");
        match client
            .get_json::<HashMap<String, serde_json::Value>>(&self.source_url, &Headers::new())
            .await
        {
            Ok(map) => {
                for (key, value) in map {
                    let Some(domain) = value.as_str().filter(|d| !d.is_empty()) else {
                        continue;
                    };
                    if state.domains.get(&key).map(String::as_str) != Some(domain) {
                        info!(site = %key, domain, "mirror domain updated");
                    }
                    state.domains.insert(key, domain.to_string());
                }
                state.last_refreshed = Some(Instant::now());
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch mirror domains, keeping previous");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetches_once_within_ttl() {
        let server = MockServer::start().await;
        Mock::given(path("/domains.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"HDHUB4u": "https://new9.hdhub4u.fo/", "other": 5}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let registry = DomainRegistry::new(format!("{}/domains.json", server.uri()));

        for _ in 0..3 {
            let domain = registry.current(&client, "HDHUB4u", "https://fallback").await;
            assert_eq!(domain, "https://new9.hdhub4u.fo");
        }
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let server = MockServer::start().await;
        Mock::given(path("/domains.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"HDHUB4u": "https://a.fo"}"#))
            .expect(2)
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let registry =
            DomainRegistry::with_ttl(format!("{}/domains.json", server.uri()), Duration::ZERO);

        registry.current(&client, "HDHUB4u", "https://fallback").await;
        registry.current(&client, "HDHUB4u", "https://fallback").await;
    }

    #[tokio::test]
    async fn test_failure_keeps_default() {
        let server = MockServer::start().await;
        Mock::given(path("/domains.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let registry = DomainRegistry::new(format!("{}/domains.json", server.uri()));
        assert_eq!(
            registry.current(&client, "HDHUB4u", "https://new3.hdhub4u.fo/").await,
            "https://new3.hdhub4u.fo"
        );
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_domain() {
        let server = MockServer::start().await;
        Mock::given(path("/domains.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"HDHUB4u": "https://known.fo"}"#))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(path("/domains.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let registry =
            DomainRegistry::with_ttl(format!("{}/domains.json", server.uri()), Duration::ZERO);
        registry.current(&client, "HDHUB4u", "https://fallback").await;
        assert_eq!(
            registry.current(&client, "HDHUB4u", "https://fallback").await,
            "https://known.fo"
        );
    }
}
