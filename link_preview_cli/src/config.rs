use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_BYTES: usize = 2 * 1024 * 1024;
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchBudget {
    pub timeout: Duration,
    pub max_bytes: usize,
    pub max_redirects: usize,
}

impl Default for FetchBudget {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_bytes: DEFAULT_MAX_BYTES,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl FetchBudget {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Admission limit for one caller: at most `limit` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePolicy {
    pub limit: u32,
    pub window: Duration,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            limit: 60,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_concurrent: usize,
    pub max_queued: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 32,
            max_queued: 128,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub budget: FetchBudget,
    pub rate: RatePolicy,
    pub pool: PoolConfig,
    /// How many finished outcomes the in-memory record keeps.
    pub outcome_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            budget: FetchBudget::default(),
            rate: RatePolicy::default(),
            pool: PoolConfig::default(),
            outcome_capacity: 10_000,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = PipelineConfig::default();

        if let Some(ms) = read_u64("PREVIEW_TIMEOUT_MS")? {
            config.budget.timeout = Duration::from_millis(non_zero("PREVIEW_TIMEOUT_MS", ms)?);
        }
        if let Some(bytes) = read_u64("PREVIEW_MAX_BYTES")? {
            config.budget.max_bytes = non_zero("PREVIEW_MAX_BYTES", bytes)? as usize;
        }
        if let Some(hops) = read_u64("PREVIEW_MAX_REDIRECTS")? {
            config.budget.max_redirects = hops as usize;
        }
        if let Some(limit) = read_u64("RATE_LIMIT_MAX_REQUESTS")? {
            config.rate.limit = limit.min(u32::MAX as u64) as u32;
        }
        if let Some(secs) = read_u64("RATE_LIMIT_WINDOW_SECS")? {
            config.rate.window = Duration::from_secs(non_zero("RATE_LIMIT_WINDOW_SECS", secs)?);
        }
        if let Some(n) = read_u64("FETCH_POOL_MAX_CONCURRENT")? {
            config.pool.max_concurrent = non_zero("FETCH_POOL_MAX_CONCURRENT", n)? as usize;
        }
        if let Some(n) = read_u64("FETCH_POOL_MAX_QUEUED")? {
            config.pool.max_queued = n as usize;
        }
        if let Some(n) = read_u64("OUTCOME_CAPACITY")? {
            config.outcome_capacity = n as usize;
        }

        Ok(config)
    }
}

fn read_u64(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match env::var(name) {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(n) => Ok(Some(n)),
            Err(_) => Err(ConfigError::InvalidNumber { name, value }),
        },
        Err(_) => Ok(None),
    }
}

fn non_zero(name: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero(name))
    } else {
        Ok(value)
    }
}
