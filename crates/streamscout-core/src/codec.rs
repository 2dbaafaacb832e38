//! Client for the enc-dec middleware
//!
//! The middleware is an opaque codec: it encrypts AnimeKai tokens, decrypts
//! embed payloads and turns server-list HTML into JSON. Every answer has the
//! shape `{ "result": … }`.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::client::{HttpClient, USER_AGENT};
use crate::error::{ProviderError, Result};
use crate::types::Headers;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
}

fn unwrap_result<T>(envelope: Envelope<T>, call: &str) -> Result<T> {
    envelope
        .result
        .ok_or_else(|| ProviderError::ParseError(format!("{call}: middleware returned no result")))
}

/// enc-dec calls bound to one HTTP client and API root
#[derive(Clone, Copy)]
pub struct EncDecClient<'a> {
    http: &'a HttpClient,
    api: &'a str,
}

impl<'a> EncDecClient<'a> {
    pub fn new(http: &'a HttpClient, api: &'a str) -> Self {
        Self { http, api }
    }

    /// Encrypts a token for the AnimeKai AJAX `_` parameter
    pub async fn enc_kai(&self, text: &str) -> Result<String> {
        let url = format!("{}/enc-kai?text={}", self.api, urlencoding::encode(text));
        let envelope: Envelope<String> = self.http.get_json(&url, &Headers::new()).await?;
        unwrap_result(envelope, "enc-kai")
    }

    /// Decrypts an AnimeKai embed payload
    pub async fn dec_kai<T: DeserializeOwned>(&self, text: &str) -> Result<T> {
        self.post("dec-kai", json!({ "text": text })).await
    }

    /// Parses server-list HTML into JSON
    pub async fn parse_html<T: DeserializeOwned>(&self, html: &str) -> Result<T> {
        self.post("parse-html", json!({ "text": html })).await
    }

    /// Decrypts a MegaUp media payload
    pub async fn dec_mega<T: DeserializeOwned>(&self, text: &str) -> Result<T> {
        self.post("dec-mega", json!({ "text": text, "agent": USER_AGENT }))
            .await
    }

    async fn post<T: DeserializeOwned>(&self, call: &str, body: serde_json::Value) -> Result<T> {
        let url = format!("{}/{}", self.api, call);
        let envelope: Envelope<T> = self.http.post_json(&url, &Headers::new(), &body).await?;
        unwrap_result(envelope, call)
    }
}
