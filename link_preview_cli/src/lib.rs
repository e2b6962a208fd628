pub mod charset;
pub mod clock;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod outcome;
pub mod pipeline;
pub mod pool;
pub mod rate_limiter;
pub mod utils;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use config::{FetchBudget, PipelineConfig, PoolConfig, RatePolicy};
pub use error::{ErrorKind, FetchFailure, Rejection};
pub use outcome::{FetchOutcome, MemoryOutcomeSink, OutcomeSink, OutcomeStatus};
pub use pipeline::{ContentResponse, Pipeline, PreviewResponse};

/// Which tier of the extraction chain supplied the preview title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceTag {
    OpenGraph,
    TwitterCard,
    HtmlMeta,
    Heuristic,
    None,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub site_name: Option<String>,
    pub source_tag: SourceTag,
}

#[derive(Debug, Clone)]
pub struct PreviewRequest {
    pub url: String,
    pub caller_id: String,
    /// Replaces the configured fetch timeout for this request only.
    pub timeout: Option<Duration>,
}

impl PreviewRequest {
    pub fn new(url: impl Into<String>, caller_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            caller_id: caller_id.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
