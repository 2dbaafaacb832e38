//! Network half of the obfuscated redirect chain

use scraper::Html;
use tracing::debug;

use crate::client::{HttpClient, join_url};
use crate::parser::redirect::{
    RedirectPayload, collect_encoded_tokens, decode_or_original, decode_redirect_blob, window_location,
};
use crate::parser::{clean_text, selector};
use crate::types::Headers;

/// `window.location.href` hops followed before giving up
const LOCATION_HOPS: usize = 1;

/// Follows a shortener page to the URL it hides
///
/// Decodes the token blob on the page; when the blob only carries a
/// confirmation id, asks `{blog_url}?re={data}` for the target. A page with
/// no tokens may forward once through `window.location.href`. Any failure,
/// including a blob that points back at the page itself, yields `None`.
pub async fn follow_redirect(http: &HttpClient, url: &str) -> Option<String> {
    let mut current = url.to_string();

    for _ in 0..=LOCATION_HOPS {
        let page = match http.get_text(&current, &Headers::new()).await {
            Ok(page) => page,
            Err(e) => {
                debug!(url = %current, error = %e, "redirect page fetch failed");
                return None;
            }
        };

        let blob = collect_encoded_tokens(&page);
        if blob.is_empty() {
            let next = window_location(&page)
                .map(|target| join_url(&current, &target))
                .filter(|target| *target != current && !target.contains(current.as_str()))?;
            debug!(from = %current, to = %next, "following window.location");
            current = next;
            continue;
        }

        if let Some(RedirectPayload::Confirm { blog_url, data }) = decode_redirect_blob(&blob) {
            let confirm = format!("{blog_url}?re={}", urlencoding::encode(&data));
            let body = http.get_text(&confirm, &Headers::new()).await.ok()?;
            return Some(body_text(&body)).filter(|target| !target.is_empty());
        }

        let target = decode_or_original(&blob, &current);
        if target == current {
            debug!(url = %current, "redirect blob has no usable target");
            return None;
        }
        return Some(target);
    }

    None
}

/// Visible text of a confirmation page, or the raw body when it has none
fn body_text(html: &str) -> String {
    let text = selector("body")
        .ok()
        .and_then(|body| {
            let document = Html::parse_document(html);
            document
                .select(&body)
                .next()
                .map(|el| clean_text(el.text()))
        })
        .unwrap_or_default();

    if text.is_empty() {
        html.trim().to_string()
    } else {
        text
    }
}
