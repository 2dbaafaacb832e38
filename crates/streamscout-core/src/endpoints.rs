//! Upstream base URLs
//!
//! Every collaborator the providers talk to is addressed through
//! [`Endpoints`], so a host application can point them at mirrors and tests
//! can point them at a local mock server.

use serde::{Deserialize, Serialize};

/// Base URLs and keys of every upstream service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// TMDB v3 API root
    pub tmdb_base: String,
    pub tmdb_api_key: String,
    /// Cinemeta (Stremio) metadata addon root
    pub cinemeta_base: String,
    /// AniList GraphQL endpoint
    pub anilist_graphql: String,
    /// ARM id-mapping service root
    pub arm_base: String,
    /// enc-dec middleware API root
    pub enc_dec_api: String,
    /// enc-dec AnimeKai token database root
    pub enc_dec_db: String,
    /// JSON document mapping site keys to their current mirror domain
    pub domains_url: String,
    /// HDHub4u mirror used until the domain list answers
    pub hdhub4u_default: String,
    /// HDHub4u search index root
    pub hdhub4u_search: String,
    pub vixsrc_base: String,
    /// Subtitle search API used by Vixsrc
    pub subtitles_api: String,
    pub vidrock_base: String,
    pub nepu_base: String,
    /// AnimeKai AJAX root
    pub animekai_ajax: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            tmdb_base: "https://api.themoviedb.org/3".to_string(),
            tmdb_api_key: "439c478a771f35c05022f9feabcca01c".to_string(),
            cinemeta_base: "https://v3-cinemeta.strem.io".to_string(),
            anilist_graphql: "https://graphql.anilist.co".to_string(),
            arm_base: "https://arm.haglund.dev/api/v2".to_string(),
            enc_dec_api: "https://enc-dec.app/api".to_string(),
            enc_dec_db: "https://enc-dec.app/db/kai".to_string(),
            domains_url:
                "https://raw.githubusercontent.com/phisher98/TVVVV/refs/heads/main/domains.json"
                    .to_string(),
            hdhub4u_default: "https://new3.hdhub4u.fo".to_string(),
            hdhub4u_search: "https://search.pingora.fyi".to_string(),
            vixsrc_base: "https://vixsrc.to".to_string(),
            subtitles_api: "https://sub.wyzie.ru".to_string(),
            vidrock_base: "https://vidrock.net".to_string(),
            nepu_base: "https://nepu.to".to_string(),
            animekai_ajax: "https://animekai.to/ajax".to_string(),
        }
    }
}

impl Endpoints {
    /// Points every endpoint at one base URL, each under its own path
    ///
    /// Intended for tests against a single mock server.
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        let at = |path: &str| format!("{base}{path}");
        Self {
            tmdb_base: at("/tmdb/3"),
            tmdb_api_key: "test-key".to_string(),
            cinemeta_base: at("/cinemeta"),
            anilist_graphql: at("/anilist"),
            arm_base: at("/arm"),
            enc_dec_api: at("/encdec/api"),
            enc_dec_db: at("/encdec/db/kai"),
            domains_url: at("/domains.json"),
            hdhub4u_default: at("/hdhub"),
            hdhub4u_search: at("/search"),
            vixsrc_base: at("/vixsrc"),
            subtitles_api: at("/subs"),
            vidrock_base: at("/vidrock"),
            nepu_base: at("/nepu"),
            animekai_ajax: at("/kai/ajax"),
        }
    }
}
