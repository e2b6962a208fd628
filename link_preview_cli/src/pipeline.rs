use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{FetchBudget, PipelineConfig};
use crate::error::Rejection;
use crate::fetcher::{FetchedBody, Fetcher};
use crate::outcome::{FetchOutcome, OutcomeSink, PendingFetch};
use crate::pool::FetchPool;
use crate::rate_limiter::{Admission, RateLimiter};
use crate::{charset, extractor, Preview, PreviewRequest};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub preview: Preview,
    pub outcome: FetchOutcome,
}

/// Raw page retrieved under the preview budget, decoded to text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentResponse {
    /// 2xx status.
    pub success: bool,
    pub content: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub final_url: String,
    pub truncated: bool,
    pub outcome: FetchOutcome,
}

/// Rate check, bounded fetch, extraction. Every fetch that starts ends with
/// exactly one outcome handed to the sink.
pub struct Pipeline {
    limiter: Arc<RateLimiter>,
    fetcher: Fetcher,
    pool: FetchPool,
    sink: Arc<dyn OutcomeSink>,
    budget: FetchBudget,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig, sink: Arc<dyn OutcomeSink>) -> Result<Self, reqwest::Error> {
        Ok(Self::from_parts(
            Arc::new(RateLimiter::new(config.rate)),
            Fetcher::with_connect_timeout(config.budget.timeout)?,
            FetchPool::new(config.pool),
            sink,
            config.budget,
        ))
    }

    pub fn from_parts(
        limiter: Arc<RateLimiter>,
        fetcher: Fetcher,
        pool: FetchPool,
        sink: Arc<dyn OutcomeSink>,
        budget: FetchBudget,
    ) -> Self {
        Self {
            limiter,
            fetcher,
            pool,
            sink,
            budget,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn budget(&self) -> FetchBudget {
        self.budget
    }

    pub async fn preview(&self, request: &PreviewRequest) -> Result<PreviewResponse, Rejection> {
        let (body, pending) = self.fetch_gated(request).await?;

        let preview = extractor::extract(&body.bytes, body.content_type.as_deref(), &body.final_url);
        let outcome = pending.succeed(&body);
        info!(
            id = %outcome.id,
            url = %request.url,
            http_status = body.http_status,
            bytes = body.byte_size(),
            truncated = body.truncated,
            source = ?preview.source_tag,
            "preview ready"
        );

        Ok(PreviewResponse { preview, outcome })
    }

    /// Same gates and budget as `preview`, but hands back the decoded page
    /// instead of extracting from it.
    pub async fn fetch_content(&self, request: &PreviewRequest) -> Result<ContentResponse, Rejection> {
        let (body, pending) = self.fetch_gated(request).await?;
        let outcome = pending.succeed(&body);
        info!(
            id = %outcome.id,
            url = %request.url,
            http_status = body.http_status,
            bytes = body.byte_size(),
            "content fetched"
        );

        Ok(ContentResponse {
            success: body.is_success(),
            content: charset::decode(&body.bytes, body.content_type.as_deref()).into_owned(),
            status_code: body.http_status,
            content_type: body.content_type,
            final_url: body.final_url.to_string(),
            truncated: body.truncated,
            outcome,
        })
    }

    async fn fetch_gated(&self, request: &PreviewRequest) -> Result<(FetchedBody, PendingFetch), Rejection> {
        if let Admission::Denied { retry_after } = self.limiter.admit(&request.caller_id) {
            return Err(Rejection::RateLimited { retry_after });
        }

        let budget = match request.timeout {
            Some(timeout) => self.budget.with_timeout(timeout),
            None => self.budget,
        };

        // queue wait and fetch share one deadline
        let queued_at = Instant::now();
        let _permit = match tokio::time::timeout(budget.timeout, self.pool.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(rejection)) => {
                warn!(url = %request.url, caller = %request.caller_id, "fetch pool saturated");
                return Err(rejection);
            }
            Err(_) => {
                warn!(
                    url = %request.url,
                    caller = %request.caller_id,
                    timeout_ms = budget.timeout.as_millis() as u64,
                    "no fetch slot freed up in time"
                );
                return Err(Rejection::Overloaded);
            }
        };
        let budget = budget.with_timeout(budget.timeout.saturating_sub(queued_at.elapsed()));

        let pending = PendingFetch::begin(&request.url, self.sink.clone());
        debug!(id = %pending.id(), url = %request.url, caller = %request.caller_id, "fetch started");

        match self.fetcher.fetch(&request.url, &budget).await {
            Ok(body) => Ok((body, pending)),
            Err(failure) => {
                let outcome = pending.fail(&failure);
                warn!(
                    id = %outcome.id,
                    url = %request.url,
                    kind = %failure.kind(),
                    "fetch failed: {}",
                    failure
                );
                Err(failure.into())
            }
        }
    }
}
