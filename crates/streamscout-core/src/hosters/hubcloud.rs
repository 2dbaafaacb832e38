//! HubCloud file cards
//!
//! A HubCloud link lands on a page that either is the file card or forwards
//! to it (through a `#download` anchor or an inline `var url = '…'`). The
//! card shows the release name, the size and one button per mirror.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use super::{HostedLink, HosterResolver, referer_headers, simple};
use crate::client::origin_of;
use crate::error::{ProviderError, Result};
use crate::parser::quality::{parse_size, quality_from_height, size_to_bytes};
use crate::parser::{cached_regex, clean_text, selector};
use crate::types::Quality;

/// Redirect hops followed behind a 10Gbps button
const TEN_GBPS_HOPS: usize = 5;

/// Mirror button kinds, decided by label text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Button {
    /// The href is the file itself; carries the source label
    Direct(&'static str),
    BuzzServer,
    TenGbps,
    Pixeldrain,
    /// Some other hoster, resolved through the dispatch table
    Generic,
    Skip,
}

fn classify_button(text: &str, href: &str) -> Button {
    let text = text.to_lowercase();

    if text.contains("download file")
        || text.contains("fsl server")
        || text.contains("s3 server")
        || text.contains("fslv2")
        || text.contains("mega server")
    {
        let label = if text.contains("fsl server") {
            "HubCloud - FSL"
        } else if text.contains("s3 server") {
            "HubCloud - S3"
        } else if text.contains("fslv2") {
            "HubCloud - FSLv2"
        } else if text.contains("mega server") {
            "HubCloud - Mega"
        } else {
            "HubCloud"
        };
        return Button::Direct(label);
    }
    if text.contains("buzzserver") {
        return Button::BuzzServer;
    }
    if text.contains("10gbps") {
        return Button::TenGbps;
    }
    if href.contains("pixeldra") {
        return Button::Pixeldrain;
    }
    if href.starts_with("http") && !href.contains("magnet:") {
        return Button::Generic;
    }
    Button::Skip
}

/// Where the landing page forwards to the file card, if anywhere
fn card_href(html: &str) -> Option<String> {
    static SCRIPT_URL: OnceLock<Option<Regex>> = OnceLock::new();

    let anchor = selector("#download").ok().and_then(|download| {
        let document = Html::parse_document(html);
        document
            .select(&download)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(str::to_string)
    });

    anchor
        .or_else(|| {
            cached_regex(&SCRIPT_URL, r"var url = '([^']*)'")?
                .captures(html)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })
        .filter(|href| !href.is_empty())
}

#[derive(Debug, Default)]
struct FileCard {
    size: String,
    header: String,
    /// `(href, label text)` of every `a.btn`, in page order
    buttons: Vec<(String, String)>,
}

impl FileCard {
    fn parse(html: &str) -> Result<Self> {
        let size_sel = selector("i#size")?;
        let header_sel = selector("div.card-header")?;
        let button_sel = selector("a.btn")?;
        let document = Html::parse_document(html);

        let text_of = |sel: &Selector| {
            document
                .select(sel)
                .next()
                .map(|el| clean_text(el.text()))
                .unwrap_or_default()
        };

        Ok(Self {
            size: text_of(&size_sel),
            header: text_of(&header_sel),
            buttons: document
                .select(&button_sel)
                .filter_map(|el| {
                    let href = el.value().attr("href")?;
                    Some((href.to_string(), clean_text(el.text())))
                })
                .collect(),
        })
    }

    /// Quality stated in the release name, 1080p when it states none
    fn quality(&self) -> Quality {
        static HEIGHT: OnceLock<Option<Regex>> = OnceLock::new();
        cached_regex(&HEIGHT, r"(\d{3,4})[pP]")
            .and_then(|re| re.captures(&self.header))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .map(quality_from_height)
            .unwrap_or(Quality::P1080)
    }

    /// `[release tags][size]` suffix appended to every source label
    fn label_extras(&self) -> String {
        let tags = clean_release_tags(&self.header);
        let mut extras = String::new();
        if !tags.is_empty() {
            extras.push_str(&format!("[{tags}]"));
        }
        if !self.size.is_empty() {
            let size = parse_size(&self.size).unwrap_or_else(|| self.size.clone());
            extras.push_str(&format!("[{size}]"));
        }
        extras
    }
}

/// Release tags worth showing from a file name (source, codec, audio, HDR,
/// streaming service), deduplicated in order of appearance
pub fn clean_release_tags(name: &str) -> String {
    static EXTENSION: OnceLock<Option<Regex>> = OnceLock::new();
    static NORMALIZE: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();

    const SOURCES: &[&str] = &[
        "WEB-DL", "WEBRIP", "BLURAY", "HDRIP", "DVDRIP", "HDTV", "CAM", "TS", "BRRIP", "BDRIP",
    ];
    const CODECS: &[&str] = &["H264", "H265", "X264", "X265", "HEVC", "AVC"];
    const AUDIO_PREFIXES: &[&str] = &["AAC", "AC3", "DTS", "MP3", "FLAC", "DD", "DDP", "EAC3"];
    const HDR: &[&str] = &["SDR", "HDR", "HDR10", "HDR10+"];

    let stem = match cached_regex(&EXTENSION, r"\.[a-zA-Z0-9]{2,4}$") {
        Some(re) => re.replace(name, "").into_owned(),
        None => name.to_string(),
    };
    let normalized = NORMALIZE
        .get_or_init(|| {
            [
                (r"(?i)WEB[-_. ]?DL", "WEB-DL"),
                (r"(?i)WEB[-_. ]?RIP", "WEBRIP"),
                (r"(?i)H[ .]?265", "H265"),
                (r"(?i)H[ .]?264", "H264"),
                (r"(?i)DDP[ .]?([0-9]\.[0-9])", "DDP$1"),
            ]
            .into_iter()
            .filter_map(|(p, r)| Regex::new(p).ok().map(|re| (re, r)))
            .collect()
        })
        .iter()
        .fold(stem, |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        });

    let mut seen = HashSet::new();
    normalized
        .split(|c: char| c.is_whitespace() || c == '_' || c == '.')
        .filter_map(|part| {
            let tag = part.to_uppercase();
            let keep = SOURCES.contains(&tag.as_str())
                || CODECS.contains(&tag.as_str())
                || AUDIO_PREFIXES.iter().any(|prefix| tag.starts_with(prefix))
                || tag == "ATMOS"
                || HDR.contains(&tag.as_str())
                || tag == "NF"
                || tag == "CR";
            if tag == "DV" || tag == "DOLBYVISION" {
                Some("DOLBYVISION".to_string())
            } else {
                keep.then_some(tag)
            }
        })
        .filter(|tag| seen.insert(tag.clone()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn labelled(label: &str, extras: &str) -> String {
    format!("{label} {extras}").trim_end().to_string()
}

impl HosterResolver<'_> {
    pub(super) async fn hubcloud(
        &self,
        url: &str,
        referer: &str,
        depth: usize,
    ) -> Result<Vec<HostedLink>> {
        let landing = url.replace("hubcloud.ink", "hubcloud.dad");
        let mut page = self
            .http
            .get_text(&landing, &referer_headers(referer))
            .await?;
        let mut card_url = landing.clone();

        if !landing.contains("hubcloud.php")
            && let Some(href) = card_href(&page)
        {
            let next = if href.starts_with("http") {
                href
            } else {
                let origin = origin_of(&landing)
                    .ok_or_else(|| ProviderError::InvalidUrl(landing.clone()))?;
                format!("{origin}/{}", href.trim_start_matches('/'))
            };
            debug!(from = %landing, to = %next, "following hubcloud card link");
            page = self.http.get_text(&next, &referer_headers(&landing)).await?;
            card_url = next;
        }

        let card = FileCard::parse(&page)?;
        if card.buttons.is_empty() {
            return Err(ProviderError::ElementNotFound(format!(
                "hubcloud buttons on {card_url}"
            )));
        }

        let quality = card.quality();
        let extras = card.label_extras();
        let size = size_to_bytes(&card.size);
        let file_name = Some(card.header.clone()).filter(|h| !h.is_empty());
        let card_link = |label: &str, url: String| HostedLink {
            size,
            file_name: file_name.clone(),
            ..HostedLink::new(labelled(label, &extras), url, quality)
        };

        let mut links = Vec::new();
        for (href, text) in &card.buttons {
            match classify_button(text, href) {
                Button::Direct(label) => links.push(card_link(label, href.clone())),
                Button::BuzzServer => {
                    let download = format!("{href}/download");
                    match self.http.final_url(&download, &referer_headers(href)).await {
                        Ok(target) if target != download => {
                            links.push(card_link("HubCloud - BuzzServer", target));
                        }
                        Ok(_) => {}
                        Err(e) => debug!(url = %download, error = %e, "buzzserver failed"),
                    }
                }
                Button::TenGbps => {
                    if let Some(target) = self.ten_gbps_target(href).await {
                        links.push(card_link("HubCloud - 10Gbps", target));
                    }
                }
                Button::Pixeldrain => {
                    let mut link = simple::pixeldrain(href);
                    link.source = labelled(&link.source, &extras);
                    link.size = size;
                    link.file_name = file_name.clone();
                    links.push(link);
                }
                Button::Generic => {
                    let nested = self.descend(href, &card_url, depth).await;
                    links.extend(nested.into_iter().map(|mut link| {
                        if !link.quality.is_known() {
                            link.quality = quality;
                        }
                        link
                    }));
                }
                Button::Skip => {}
            }
        }

        Ok(links)
    }

    /// Walks redirects behind a 10Gbps button until a `link=` target shows up
    async fn ten_gbps_target(&self, href: &str) -> Option<String> {
        let mut current = href.to_string();
        for _ in 0..TEN_GBPS_HOPS {
            let location = match self
                .http
                .redirect_location(&current, &crate::types::Headers::new())
                .await
            {
                Ok(Some(location)) => location,
                Ok(None) => return None,
                Err(e) => {
                    debug!(url = %current, error = %e, "10gbps hop failed");
                    return None;
                }
            };
            if let Some(index) = location.find("link=") {
                return Some(location[index + "link=".len()..].to_string());
            }
            current = location;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpClient;
    use wiremock::matchers::{header, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_classify_button() {
        assert_eq!(
            classify_button("Download [FSL Server]", "https://fsl.example/f"),
            Button::Direct("HubCloud - FSL")
        );
        assert_eq!(
            classify_button("Download File [1.4GB]", "https://a.example/f"),
            Button::Direct("HubCloud")
        );
        assert_eq!(
            classify_button("Download [FSLv2 Server]", "https://b.example/f"),
            Button::Direct("HubCloud - FSLv2")
        );
        assert_eq!(
            classify_button("Download [Mega Server]", "https://c.example/f"),
            Button::Direct("HubCloud - Mega")
        );
        assert_eq!(classify_button("BuzzServer", "https://buzz.example/x"), Button::BuzzServer);
        assert_eq!(classify_button("Download [10Gbps]", "https://g.example/x"), Button::TenGbps);
        assert_eq!(
            classify_button("PixelServer", "https://pixeldrain.dev/u/abc"),
            Button::Pixeldrain
        );
        assert_eq!(
            classify_button("Mirror", "https://streamtape.com/v/x"),
            Button::Generic
        );
        assert_eq!(classify_button("Torrent", "magnet:?xt=urn:btih:abc"), Button::Skip);
        assert_eq!(classify_button("Telegram", "/tg"), Button::Skip);
    }

    #[test]
    fn test_clean_release_tags() {
        assert_eq!(
            clean_release_tags("Movie.2024.1080p.WEB-DL.DDP5.1.Atmos.H.264.mkv"),
            "WEB-DL DDP5 ATMOS H264"
        );
        assert_eq!(
            clean_release_tags("Show S01E01 2160p NF WEBRip DV HDR10 x265 AAC"),
            "NF WEBRIP DOLBYVISION HDR10 X265 AAC"
        );
        assert_eq!(clean_release_tags("Plain Title"), "");
    }

    #[test]
    fn test_file_card_parse() {
        let html = r#"
            <div class="card-header"> Movie.2023.720p.BluRay.x264.mkv </div>
            <i id="size">1.4 GB</i>
            <a class="btn btn-success" href="https://fsl.example/f">Download [FSL Server]</a>
            <a class="btn">No link</a>
        "#;
        let card = FileCard::parse(html).unwrap();
        assert_eq!(card.header, "Movie.2023.720p.BluRay.x264.mkv");
        assert_eq!(card.size, "1.4 GB");
        assert_eq!(card.buttons.len(), 1);
        assert_eq!(card.quality(), Quality::P720);
        assert_eq!(card.label_extras(), "[BLURAY X264][1.4 GB]");

        assert_eq!(FileCard::default().quality(), Quality::P1080);

        let untidy = FileCard {
            size: "1.40GB".to_string(),
            ..FileCard::default()
        };
        assert_eq!(untidy.label_extras(), "[1.4 GB]");
        let odd = FileCard {
            size: "n/a".to_string(),
            ..FileCard::default()
        };
        assert_eq!(odd.label_extras(), "[n/a]");
    }

    #[test]
    fn test_card_href() {
        assert_eq!(
            card_href(r#"<a id="download" href="/drive/card?x=1">Go</a>"#).as_deref(),
            Some("/drive/card?x=1")
        );
        assert_eq!(
            card_href("<script>var url = 'https://hubcloud.dad/hubcloud.php?id=9';</script>")
                .as_deref(),
            Some("https://hubcloud.dad/hubcloud.php?id=9")
        );
        assert_eq!(card_href("<p>card</p>"), None);
    }

    #[tokio::test]
    async fn test_hubcloud_card_buttons() {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(path("/drive/abc"))
            .and(header("Referer", "https://site.example/post"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<a id="download" href="/hubcloud.php?id=abc">Generate</a>"#),
            )
            .mount(&server)
            .await;
        let card = format!(
            r#"<div class="card-header">Movie.2024.2160p.WEB-DL.H265.mkv</div>
            <i id="size">2.0 GB</i>
            <a class="btn" href="https://fsl.example/file.mkv">Download [FSL Server]</a>
            <a class="btn" href="{base}/buzz">BuzzServer</a>
            <a class="btn" href="{base}/fast">Download [10Gbps]</a>
            <a class="btn" href="https://pixeldrain.dev/u/pix1">Pixel</a>
            <a class="btn" href="magnet:?xt=urn:btih:1">Torrent</a>"#
        );
        Mock::given(path("/hubcloud.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string(card))
            .mount(&server)
            .await;
        Mock::given(path("/buzz/download"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "/files/buzz.mkv"),
            )
            .mount(&server)
            .await;
        Mock::given(path("/files/buzz.mkv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("video"))
            .mount(&server)
            .await;
        Mock::given(path("/fast"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/fast2"))
            .mount(&server)
            .await;
        Mock::given(path("/fast2"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", "https://gate.example/?link=https://ten.cdn/file.mkv"),
            )
            .mount(&server)
            .await;

        let http = HttpClient::new().unwrap();
        let resolver = HosterResolver::new(&http);
        let links = resolver
            .hubcloud(&format!("{base}/drive/abc"), "https://site.example/post", 0)
            .await
            .unwrap();

        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://fsl.example/file.mkv",
                format!("{base}/files/buzz.mkv").as_str(),
                "https://ten.cdn/file.mkv",
                "https://pixeldrain.dev/api/file/pix1?download",
            ]
        );
        assert_eq!(links[0].source, "HubCloud - FSL [WEB-DL H265][2 GB]");
        assert_eq!(links[0].quality, Quality::Uhd4k);
        assert_eq!(links[0].size, Some(2 * 1024 * 1024 * 1024));
        assert_eq!(links[1].server_name(), "BuzzServer");
        assert_eq!(links[2].server_name(), "10Gbps");
        assert_eq!(links[3].server_name(), "Pixeldrain");
        assert_eq!(links[3].quality, Quality::Unknown);
    }
}
