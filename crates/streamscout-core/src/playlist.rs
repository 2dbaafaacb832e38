//! HLS resolution: turns one playlist URL into concrete variant streams

use tracing::debug;

use crate::client::HttpClient;
use crate::parser::hls::{PlaylistKind, parse_master, parse_subtitle_media, playlist_kind};
use crate::parser::quality::quality_from_url;
use crate::types::{Headers, Quality, Subtitle};

/// A playable URL produced by the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVariant {
    pub url: String,
    pub quality: Quality,
}

/// Everything a playlist URL resolved to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HlsResolution {
    /// Variants, best quality first; never empty
    pub variants: Vec<ResolvedVariant>,
    pub subtitles: Vec<Subtitle>,
}

impl HlsResolution {
    fn single(url: &str, quality: Quality) -> Self {
        Self {
            variants: vec![ResolvedVariant {
                url: url.to_string(),
                quality,
            }],
            subtitles: Vec::new(),
        }
    }
}

/// Fetches `url` and expands it into variants
///
/// Never fails: a master playlist yields every variant (and its subtitle
/// renditions), a media playlist yields `url` itself with quality guessed
/// from the URL text, anything else yields `url` as a single `Unknown`.
pub async fn resolve_playlist(client: &HttpClient, url: &str, headers: &Headers) -> HlsResolution {
    let fetched = match client.fetch(url, headers).await {
        Ok(fetched) => fetched,
        Err(e) => {
            debug!(url, error = %e, "playlist fetch failed, keeping original url");
            return HlsResolution::single(url, Quality::Unknown);
        }
    };

    match playlist_kind(&fetched.body) {
        PlaylistKind::Master => {
            let variants: Vec<ResolvedVariant> = parse_master(&fetched.body, &fetched.url)
                .into_iter()
                .map(|v| ResolvedVariant {
                    url: v.url,
                    quality: v.quality,
                })
                .collect();
            if variants.is_empty() {
                return HlsResolution::single(url, Quality::Unknown);
            }
            debug!(url, variants = variants.len(), "resolved master playlist");
            HlsResolution {
                variants,
                subtitles: parse_subtitle_media(&fetched.body, &fetched.url),
            }
        }
        PlaylistKind::Media => HlsResolution::single(url, quality_from_url(url)),
        PlaylistKind::Invalid => HlsResolution::single(url, Quality::Unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_master_playlist_expands_to_variants() {
        let server = MockServer::start().await;
        let master = "#EXTM3U\n\
#EXT-X-MEDIA:TYPE=SUBTITLES,GROUP-ID=\"s\",NAME=\"English\",DEFAULT=YES,URI=\"subs/en.m3u8\"\n\
#EXT-X-STREAM-INF:BANDWIDTH=900000\nlow.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080\nhigh.m3u8\n";
        Mock::given(path("/hls/master.m3u8"))
            .and(header("Referer", "https://player.example/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(master))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let url = format!("{}/hls/master.m3u8", server.uri());
        let resolved = resolve_playlist(
            &client,
            &url,
            &crate::types::headers([("Referer", "https://player.example/")]),
        )
        .await;

        assert_eq!(resolved.variants.len(), 2);
        assert_eq!(resolved.variants[0].quality, Quality::P1080);
        assert_eq!(resolved.variants[0].url, format!("{}/hls/high.m3u8", server.uri()));
        assert_eq!(resolved.variants[1].quality, Quality::P360);
        assert_eq!(resolved.subtitles.len(), 1);
        assert!(resolved.subtitles[0].is_default);
    }

    #[tokio::test]
    async fn test_media_playlist_keeps_original_url() {
        let server = MockServer::start().await;
        Mock::given(path("/720/index.m3u8"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("#EXTM3U\n#EXTINF:6.0,\nseg0.ts\n"),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let url = format!("{}/720/index.m3u8", server.uri());
        let resolved = resolve_playlist(&client, &url, &Headers::new()).await;

        assert_eq!(
            resolved.variants,
            vec![ResolvedVariant {
                url: url.clone(),
                quality: Quality::P720
            }]
        );
    }

    #[tokio::test]
    async fn test_failed_fetch_falls_back_to_unknown() {
        let server = MockServer::start().await;
        Mock::given(path("/gone.m3u8"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let url = format!("{}/gone.m3u8", server.uri());
        let resolved = resolve_playlist(&client, &url, &Headers::new()).await;

        assert_eq!(resolved.variants.len(), 1);
        assert_eq!(resolved.variants[0].url, url);
        assert_eq!(resolved.variants[0].quality, Quality::Unknown);
    }

    #[tokio::test]
    async fn test_non_playlist_body_falls_back_to_unknown() {
        let server = MockServer::start().await;
        Mock::given(path("/fake.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let url = format!("{}/fake.m3u8", server.uri());
        let resolved = resolve_playlist(&client, &url, &Headers::new()).await;
        assert_eq!(resolved.variants[0].quality, Quality::Unknown);
    }
}
