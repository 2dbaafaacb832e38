//! Shortener pages: split token blobs, confirmation hops, `window.location`

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use streamscout_core::HttpClient;
use streamscout_core::hosters::follow_redirect;
use streamscout_core::parser::redirect::rot13;
use wiremock::matchers::{path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// base64 → ROT13 → base64 → base64, the inverse of the page decoder
fn blob(json: &str) -> String {
    let layer = rot13(&STANDARD.encode(json));
    STANDARD.encode(STANDARD.encode(layer))
}

/// Splits a blob over one `s('o', …)` and two `ck('_wp_http_N', …)` calls
fn shortener_page(blob: &str) -> String {
    let third = blob.len() / 3;
    format!(
        "<script>s('o','{}'); ck('_wp_http_1','{}'); ck('_wp_http_2','{}');</script>",
        &blob[..third],
        &blob[third..2 * third],
        &blob[2 * third..]
    )
}

#[tokio::test]
async fn test_confirmation_hop_after_window_location() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(path("/short/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<script>window.location.href = '/landing/abc';</script>",
        ))
        .mount(&server)
        .await;
    let payload = format!(
        r#"{{"data":"{}","blog_url":"{base}/blog"}}"#,
        STANDARD.encode("abc123")
    );
    Mock::given(path("/landing/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string(shortener_page(&blob(&payload))))
        .mount(&server)
        .await;
    Mock::given(path("/blog"))
        .and(query_param("re", "abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<html><body>\n  {base}/final/movie.mkv\n</body></html>"
        )))
        .mount(&server)
        .await;

    let http = HttpClient::new().unwrap();
    let target = follow_redirect(&http, &format!("{base}/short/abc")).await;
    assert_eq!(target, Some(format!("{base}/final/movie.mkv")));
}

#[tokio::test]
async fn test_direct_payload_and_dead_ends() {
    let server = MockServer::start().await;
    let base = server.uri();

    let payload = format!(r#"{{"o":"{}"}}"#, STANDARD.encode("https://cdn.example/direct.mp4"));
    Mock::given(path("/direct"))
        .respond_with(ResponseTemplate::new(200).set_body_string(shortener_page(&blob(&payload))))
        .mount(&server)
        .await;
    Mock::given(path("/garbage"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<script>s('o','bm90IGEgYmxvYg==');</script>"))
        .mount(&server)
        .await;
    Mock::given(path("/loop"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<script>window.location.href = '/loop';</script>",
        ))
        .mount(&server)
        .await;

    let http = HttpClient::new().unwrap();
    assert_eq!(
        follow_redirect(&http, &format!("{base}/direct")).await.as_deref(),
        Some("https://cdn.example/direct.mp4")
    );
    assert_eq!(follow_redirect(&http, &format!("{base}/garbage")).await, None);
    assert_eq!(follow_redirect(&http, &format!("{base}/loop")).await, None);
    assert_eq!(follow_redirect(&http, &format!("{base}/missing")).await, None);
}
