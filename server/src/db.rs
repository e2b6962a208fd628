use link_preview_cli::{FetchOutcome, OutcomeSink};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use std::sync::Arc;
use tracing::{error, warn};

const CREATE_OUTCOMES: &str = "CREATE TABLE IF NOT EXISTS fetch_outcomes (
    id CHAR(36) NOT NULL PRIMARY KEY,
    url TEXT NOT NULL,
    status VARCHAR(16) NOT NULL,
    http_status SMALLINT UNSIGNED NULL,
    byte_size BIGINT UNSIGNED NULL,
    truncated BOOLEAN NOT NULL,
    error VARCHAR(64) NULL,
    detail TEXT NULL,
    started_at DATETIME(6) NOT NULL,
    finished_at DATETIME(6) NULL
)";

pub async fn init_db(database_url: &str) -> Result<MySqlPool, sqlx::Error> {
    let pool = MySqlPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    sqlx::query(CREATE_OUTCOMES).execute(&pool).await?;
    Ok(pool)
}

async fn insert_outcome(pool: &MySqlPool, outcome: &FetchOutcome) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO fetch_outcomes
            (id, url, status, http_status, byte_size, truncated, error, detail, started_at, finished_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(outcome.id.to_string())
    .bind(&outcome.url)
    .bind(outcome.status.as_str())
    .bind(outcome.http_status)
    .bind(outcome.byte_size)
    .bind(outcome.truncated)
    .bind(&outcome.error)
    .bind(&outcome.detail)
    .bind(outcome.started_at)
    .bind(outcome.finished_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Writes finished outcomes to MySQL on a background task. A failed insert is
/// logged and dropped; it never holds up the request that produced it.
pub struct MySqlOutcomeSink {
    pool: MySqlPool,
}

impl MySqlOutcomeSink {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

impl OutcomeSink for MySqlOutcomeSink {
    fn record(&self, outcome: &FetchOutcome) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(id = %outcome.id, "no runtime, outcome not persisted");
            return;
        };
        let pool = self.pool.clone();
        let outcome = outcome.clone();
        runtime.spawn(async move {
            if let Err(e) = insert_outcome(&pool, &outcome).await {
                error!(id = %outcome.id, "failed to persist outcome: {}", e);
            }
        });
    }
}

pub struct FanoutSink {
    sinks: Vec<Arc<dyn OutcomeSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn OutcomeSink>>) -> Self {
        Self { sinks }
    }
}

impl OutcomeSink for FanoutSink {
    fn record(&self, outcome: &FetchOutcome) {
        for sink in &self.sinks {
            sink.record(outcome);
        }
    }
}
