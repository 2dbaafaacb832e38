//! Uniform stage wrapper for provider pipelines
//!
//! A provider is a chain of stages (resolve, search, select, extract, hoster,
//! hls). Running each stage through [`run_stage`] gives every step the same
//! logging and the same error shape, so a test can assert which stage failed.

use std::fmt;
use std::future::Future;

use tracing::debug;

use crate::error::{ProviderError, Result};

/// Pipeline stage names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Resolve,
    Search,
    Select,
    Extract,
    Hoster,
    Hls,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Resolve => "resolve",
            Stage::Search => "search",
            Stage::Select => "select",
            Stage::Extract => "extract",
            Stage::Hoster => "hoster",
            Stage::Hls => "hls",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs one stage of a provider pipeline
///
/// Errors are wrapped in [`ProviderError::Stage`] unless they already carry
/// a stage (the innermost stage wins).
pub async fn run_stage<T, F>(provider: &str, stage: Stage, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match fut.await {
        Ok(value) => {
            debug!(provider, stage = stage.as_str(), "stage completed");
            Ok(value)
        }
        Err(err) => {
            debug!(provider, stage = stage.as_str(), error = %err, "stage failed");
            Err(wrap(stage, err))
        }
    }
}

/// Turns a sentinel `None` into a typed stage error
pub fn require<T>(value: Option<T>, stage: Stage, err: ProviderError) -> Result<T> {
    value.ok_or_else(|| wrap(stage, err))
}

fn wrap(stage: Stage, err: ProviderError) -> ProviderError {
    match err {
        already @ ProviderError::Stage { .. } => already,
        other => ProviderError::Stage {
            stage,
            source: Box::new(other),
        },
    }
}
