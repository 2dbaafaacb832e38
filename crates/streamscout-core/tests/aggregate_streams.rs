//! End-to-end lookups through the public API against a mock upstream

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use streamscout_core::providers::{HdHub4u, VidRock};
use streamscout_core::{Endpoints, Quality, ScraperConfig, StreamScraper};
use wiremock::matchers::{path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_hdhub4u(server: &MockServer) {
    let base = server.uri();
    Mock::given(path("/domains.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(format!(r#"{{"HDHUB4u":"{base}/mirror"}}"#)),
        )
        .mount(server)
        .await;
    Mock::given(path("/tmdb/3/movie/27205"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"title":"Inception","release_date":"2010-07-15","imdb_id":"tt1375666"}"#,
        ))
        .mount(server)
        .await;
    Mock::given(path("/search/collections/post/documents/search"))
        .and(query_param("q", "Inception"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"hits":[{"document":{"post_title":"Inception (2010) BluRay","permalink":"/inception-2010/"}}]}"#,
        ))
        .mount(server)
        .await;
    Mock::given(path("/inception-2010/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<h1 class="page-title"><span>Inception Movie</span></h1>
               <h3><a href="{base}/files/Inception.2010.1080p.mkv">1080p [2GB]</a></h3>"#
        )))
        .mount(server)
        .await;
}

async fn mount_vidrock(server: &MockServer) {
    let base = server.uri();
    let encoded = STANDARD.encode(STANDARD.encode("50272"));
    Mock::given(path(format!("/vidrock/api/movie/{encoded}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"{{
                "source1": {{"url": "{base}/files/Inception.2010.1080p.mkv", "resolution": 1080}},
                "source2": {{"url": "https://cdn.example/inception/720.m3u8", "resolution": "720"}}
            }}"#
        )))
        .mount(server)
        .await;
}

fn scraper(server: &MockServer) -> StreamScraper {
    let config = ScraperConfig {
        endpoints: Endpoints::rooted_at(&server.uri()),
        ..ScraperConfig::default()
    };
    StreamScraper::with_providers(config, vec![Arc::new(HdHub4u), Arc::new(VidRock)]).unwrap()
}

#[tokio::test]
async fn test_movie_lookup_merges_providers() {
    let server = MockServer::start().await;
    mount_hdhub4u(&server).await;
    mount_vidrock(&server).await;
    let base = server.uri();

    let streams = scraper(&server).get_streams("27205", "movie", None, None).await;

    assert_eq!(streams.len(), 2);
    assert_eq!(streams[0].url, format!("{base}/files/Inception.2010.1080p.mkv"));
    assert_eq!(streams[0].provider, "hdhub4u");
    assert_eq!(streams[0].quality, Quality::P1080);
    assert_eq!(streams[0].headers["Referer"], format!("{base}/mirror/"));
    assert_eq!(streams[1].provider, "vidrock");
    assert_eq!(streams[1].quality, Quality::P720);
}

#[tokio::test]
async fn test_one_broken_provider_does_not_hide_the_other() {
    let server = MockServer::start().await;
    mount_vidrock(&server).await;

    let streams = scraper(&server).get_streams("27205", "movie", None, None).await;

    let providers: Vec<&str> = streams.iter().map(|s| s.provider.as_str()).collect();
    assert_eq!(providers, vec!["vidrock", "vidrock"]);
    assert_eq!(streams[0].quality, Quality::P1080);
}

#[tokio::test]
async fn test_single_provider_and_bad_input() {
    let server = MockServer::start().await;
    mount_hdhub4u(&server).await;
    mount_vidrock(&server).await;
    let scraper = scraper(&server);

    let streams = scraper.provider_streams("vidrock", "27205", "movie", None, None).await;
    assert_eq!(streams.len(), 2);
    assert!(streams.iter().all(|s| s.provider == "vidrock"));

    assert!(scraper.get_streams("27205", "documentary", None, None).await.is_empty());
    assert!(scraper.get_streams("anilist:", "tv", Some(1), Some(1)).await.is_empty());
}

#[tokio::test]
async fn test_repeated_lookup_keeps_order_of_equal_quality_streams() {
    let server = MockServer::start().await;
    mount_hdhub4u(&server).await;
    let encoded = STANDARD.encode(STANDARD.encode("50272"));
    Mock::given(path(format!("/vidrock/api/movie/{encoded}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{
                "source1": {"url": "https://cdn.example/inception/a.mp4", "resolution": 1080},
                "source2": {"url": "https://cdn.example/inception/b.mp4", "resolution": "1080"}
            }"#,
        ))
        .mount(&server)
        .await;
    let scraper = scraper(&server);

    let first = scraper.get_streams("27205", "movie", None, None).await;
    let second = scraper.get_streams("27205", "movie", None, None).await;

    assert_eq!(first.len(), 3);
    assert!(first.iter().all(|s| s.quality == Quality::P1080));
    let providers: Vec<&str> = first.iter().map(|s| s.provider.as_str()).collect();
    assert_eq!(providers, vec!["hdhub4u", "vidrock", "vidrock"]);
    assert_eq!(first, second);
}
