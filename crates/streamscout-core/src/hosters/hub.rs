//! HubCdn, HbLinks and HubDrive, the smaller hosters of the HDHub4u family

use std::sync::OnceLock;

use futures::stream::{self, StreamExt};
use regex::Regex;
use scraper::Html;

use super::{HostedLink, HosterResolver, referer_headers};
use crate::client::join_url;
use crate::error::{ProviderError, Result};
use crate::parser::redirect::decode_base64;
use crate::parser::{cached_regex, select_links, selector};
use crate::types::Quality;

/// Listed links resolved at once on a link-list page
const LIST_CONCURRENCY: usize = 4;

/// Target hidden in a base64 `…link=<url>` parameter
fn after_last_link(encoded: &str) -> Option<String> {
    let decoded = String::from_utf8_lossy(&decode_base64(encoded)?).into_owned();
    let target = match decoded.rfind("link=") {
        Some(index) => &decoded[index + "link=".len()..],
        None => decoded.as_str(),
    };
    Some(target.trim().to_string()).filter(|t| !t.is_empty())
}

/// Media URL on a HubCdn page, from `r=` or a `reurl = '…?r=…'` script
fn hubcdn_target(html: &str) -> Option<String> {
    static PARAM: OnceLock<Option<Regex>> = OnceLock::new();
    static REURL: OnceLock<Option<Regex>> = OnceLock::new();

    if let Some(encoded) = cached_regex(&PARAM, r"r=([A-Za-z0-9+/=]+)")
        .and_then(|re| re.captures(html))
        .and_then(|caps| caps.get(1))
    {
        return after_last_link(encoded.as_str());
    }

    let reurl = cached_regex(&REURL, r#"reurl\s*=\s*["']([^"']+)["']"#)?
        .captures(html)?
        .get(1)?
        .as_str();
    let query = reurl.rsplit("?r=").next().unwrap_or(reurl);
    after_last_link(query)
}

fn hrefs(html: &str, css: &str, base_url: &str) -> Vec<String> {
    let Ok(sel) = selector(css) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    document
        .select(&sel)
        .filter_map(|el| el.value().attr("href"))
        .map(|href| join_url(base_url, href.trim()))
        .collect()
}

impl HosterResolver<'_> {
    pub(super) async fn hubcdn(&self, url: &str, referer: &str) -> Result<HostedLink> {
        let page = self.http.get_text(url, &referer_headers(referer)).await?;
        let target = hubcdn_target(&page)
            .ok_or_else(|| ProviderError::ElementNotFound(format!("hubcdn link on {url}")))?;
        Ok(HostedLink::new("HubCdn", target, Quality::P1080))
    }

    /// Link-list page; every listed link is resolved on its own
    pub(super) async fn hblinks(&self, url: &str, depth: usize) -> Result<Vec<HostedLink>> {
        let page = self.http.get_text(url, &referer_headers(url)).await?;
        let listed = select_links(&page, url, "h3 a, h5 a, div.entry-content p a");

        let pending: Vec<_> = listed
            .iter()
            .map(|link| self.descend(link, url, depth))
            .collect();
        let nested: Vec<Vec<HostedLink>> = stream::iter(pending)
            .buffered(LIST_CONCURRENCY)
            .collect()
            .await;
        Ok(nested
            .into_iter()
            .flatten()
            .map(|mut link| {
                link.source = format!("{} Hblinks", link.source);
                link
            })
            .collect())
    }

    pub(super) async fn hubdrive(
        &self,
        url: &str,
        referer: &str,
        depth: usize,
    ) -> Result<Vec<HostedLink>> {
        let page = self.http.get_text(url, &referer_headers(referer)).await?;
        let target = hrefs(&page, ".btn.btn-primary.btn-user.btn-success1.m-1", url)
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ElementNotFound(format!("hubdrive button on {url}")))?;
        self.resolve_at(target, url.to_string(), depth + 1).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpClient;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use wiremock::matchers::{header, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_hubcdn_target_from_param() {
        let encoded = STANDARD.encode("https://gate.example/?a=1&link=https://cdn.example/v/index.m3u8");
        let html = format!(r#"<a href="/dl/?r={encoded}">Play</a>"#);
        assert_eq!(
            hubcdn_target(&html).as_deref(),
            Some("https://cdn.example/v/index.m3u8")
        );
    }

    #[test]
    fn test_hubcdn_target_from_script() {
        let encoded = STANDARD.encode("link=https://cdn.example/v.mkv");
        let html = format!(r#"<script>var reurl = "https://hubcdn.fans/go?r={encoded}";</script>"#);
        assert_eq!(hubcdn_target(&html).as_deref(), Some("https://cdn.example/v.mkv"));
        assert_eq!(hubcdn_target("<p>nothing</p>"), None);
    }

    #[tokio::test]
    async fn test_hblinks_resolves_listed_links() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(path("/hb/post"))
            .and(header("Referer", format!("{base}/hb/post").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<div class="sidebar"><a href="https://pixeldrain.com/u/promo">Promo</a></div>
                   <h3><a href="https://pixeldrain.com/u/aaa">Pixel</a></h3>
                   <div class="entry-content"><p><a href="https://example.org/ad">Ad</a></p></div>
                   <h5><a href="https://cdn.example/Show.S01E01.720p.mkv">Direct</a></h5>
                   <h5><a href="https://pixeldrain.com/u/aaa">Pixel mirror</a></h5>"#,
            ))
            .mount(&server)
            .await;

        let http = HttpClient::new().unwrap();
        let links = HosterResolver::new(&http)
            .hblinks(&format!("{base}/hb/post"), 0)
            .await
            .unwrap();

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url, "https://pixeldrain.com/api/file/aaa?download");
        assert_eq!(links[0].source, "Pixeldrain Hblinks");
        assert_eq!(links[1].url, "https://cdn.example/Show.S01E01.720p.mkv");
        assert_eq!(links[1].quality, Quality::P720);
    }

    #[tokio::test]
    async fn test_hubdrive_follows_button() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(path("/file/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a class="btn btn-primary btn-user btn-success1 m-1" href="https://hdstream4u.com/file/xyz">Watch</a>"#,
            ))
            .mount(&server)
            .await;

        let http = HttpClient::new().unwrap();
        let links = HosterResolver::new(&http)
            .hubdrive(&format!("{base}/file/1"), "https://site.example/", 0)
            .await
            .unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].source, "HdStream4u");
        assert_eq!(links[0].quality, Quality::P1080);

        Mock::given(path("/file/2"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>gone</p>"))
            .mount(&server)
            .await;
        let err = HosterResolver::new(&http)
            .hubdrive(&format!("{base}/file/2"), "https://site.example/", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ElementNotFound(_)));
    }
}
