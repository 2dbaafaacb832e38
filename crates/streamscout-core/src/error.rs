//! Error types for stream providers
//!
//! Every failure inside a provider pipeline is one of these variants. The
//! public `get_streams` contract collapses all of them to an empty list, but
//! inside the crate (and in tests) "no match" and "network failure" stay
//! distinguishable.

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::pipeline::Stage;

/// Error type for all provider operations
///
/// Implements Display for human-readable messages and Serialize
/// so a host application can forward it as a plain string.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Request exceeded the configured timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Failed to parse HTML or JSON content
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Expected HTML element was not found
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Invalid URL format
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Search produced no acceptable candidate
    #[error("No acceptable match for: {0}")]
    NoMatch(String),

    /// Database or episode lookup found no stream token
    #[error("No stream token: {0}")]
    NoToken(String),

    /// Hoster dispatch table has no rule for this URL
    #[error("Unsupported host: {0}")]
    UnsupportedHost(String),

    /// Invalid or unsupported content id
    #[error("Invalid media id: {0}")]
    InvalidId(String),

    /// Rate limited by server (HTTP 429)
    #[error("Rate limited - too many requests")]
    RateLimited,

    /// Resource not found on server (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// A pipeline stage failed
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Returns the innermost error, skipping stage wrappers
    pub fn root(&self) -> &ProviderError {
        match self {
            ProviderError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Stage the error was raised in, if it went through `run_stage`
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ProviderError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// True for transport-level failures (connect, timeout, bad status)
    pub fn is_network(&self) -> bool {
        matches!(
            self.root(),
            ProviderError::HttpError(_)
                | ProviderError::Status { .. }
                | ProviderError::Timeout(_)
                | ProviderError::RateLimited
                | ProviderError::NotFound(_)
        )
    }

    /// True when the pipeline ran fine but found nothing to play
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root(),
            ProviderError::NoMatch(_)
                | ProviderError::NoToken(_)
                | ProviderError::UnsupportedHost(_)
                | ProviderError::ElementNotFound(_)
        )
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::ParseError(e.to_string())
    }
}

impl Serialize for ProviderError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Result type alias for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;
