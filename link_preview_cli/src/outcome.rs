//! Fetch outcome records and where they go once finished.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::{ErrorKind, FetchFailure};
use crate::fetcher::FetchedBody;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Pending,
    Success,
    Error,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Pending => "Pending",
            OutcomeStatus::Success => "Success",
            OutcomeStatus::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOutcome {
    pub id: Uuid,
    pub url: String,
    pub status: OutcomeStatus,
    pub http_status: Option<u16>,
    pub byte_size: Option<u64>,
    pub truncated: bool,
    /// Failure kind name, e.g. `Timeout`.
    pub error: Option<String>,
    pub detail: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl FetchOutcome {
    fn pending(url: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.to_string(),
            status: OutcomeStatus::Pending,
            http_status: None,
            byte_size: None,
            truncated: false,
            error: None,
            detail: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != OutcomeStatus::Pending
    }
}

/// Receives every finished outcome. Implementations must not block; anything
/// slow (a database write) belongs on a spawned task.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, outcome: &FetchOutcome);
}

/// An outcome that has started but not finished.
///
/// `succeed` and `fail` consume it, so a record can only leave `Pending` once.
/// If it is dropped while still pending, which happens when the surrounding
/// future is cancelled, it is finished as a `Timeout` error so nothing is
/// left dangling.
pub struct PendingFetch {
    outcome: FetchOutcome,
    sink: Arc<dyn OutcomeSink>,
    finished: bool,
}

impl PendingFetch {
    pub fn begin(url: &str, sink: Arc<dyn OutcomeSink>) -> Self {
        Self {
            outcome: FetchOutcome::pending(url),
            sink,
            finished: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.outcome.id
    }

    pub fn succeed(mut self, body: &FetchedBody) -> FetchOutcome {
        self.outcome.status = OutcomeStatus::Success;
        self.outcome.http_status = Some(body.http_status);
        self.outcome.byte_size = Some(body.byte_size());
        self.outcome.truncated = body.truncated;
        self.finish()
    }

    pub fn fail(mut self, failure: &FetchFailure) -> FetchOutcome {
        self.mark_error(failure.kind(), failure.to_string());
        self.finish()
    }

    fn mark_error(&mut self, kind: ErrorKind, detail: String) {
        self.outcome.status = OutcomeStatus::Error;
        self.outcome.error = Some(kind.as_str().to_string());
        self.outcome.detail = Some(detail);
    }

    fn finish(&mut self) -> FetchOutcome {
        let now = Utc::now();
        self.outcome.finished_at = Some(now.max(self.outcome.started_at));
        self.finished = true;
        self.sink.record(&self.outcome);
        self.outcome.clone()
    }
}

impl Drop for PendingFetch {
    fn drop(&mut self) {
        if !self.finished {
            self.mark_error(ErrorKind::Timeout, "cancelled before completion".to_string());
            self.finish();
        }
    }
}

/// Keeps the most recent outcomes in memory, dropping the oldest once
/// `capacity` is reached.
pub struct MemoryOutcomeSink {
    outcomes: DashMap<Uuid, FetchOutcome>,
    order: Mutex<VecDeque<Uuid>>,
    capacity: usize,
}

impl MemoryOutcomeSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            outcomes: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<FetchOutcome> {
        self.outcomes.get(id).map(|o| o.value().clone())
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    // oldest first
    pub fn recent(&self) -> Vec<FetchOutcome> {
        let order = self.order.lock().unwrap_or_else(|e| e.into_inner());
        order.iter().filter_map(|id| self.get(id)).collect()
    }
}

impl OutcomeSink for MemoryOutcomeSink {
    fn record(&self, outcome: &FetchOutcome) {
        let mut order = self.order.lock().unwrap_or_else(|e| e.into_inner());
        if self.outcomes.insert(outcome.id, outcome.clone()).is_none() {
            order.push_back(outcome.id);
        }
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                self.outcomes.remove(&oldest);
            }
        }
    }
}
