use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidUrl,
    RateLimited,
    Timeout,
    TooManyRedirects,
    UnsupportedContentType,
    NetworkError,
    Overloaded,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidUrl => "InvalidUrl",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::TooManyRedirects => "TooManyRedirects",
            ErrorKind::UnsupportedContentType => "UnsupportedContentType",
            ErrorKind::NetworkError => "NetworkError",
            ErrorKind::Overloaded => "Overloaded",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchFailure {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("more than {0} redirects")]
    TooManyRedirects(usize),

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("network error: {0}")]
    NetworkError(String),
}

impl FetchFailure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchFailure::InvalidUrl(_) => ErrorKind::InvalidUrl,
            FetchFailure::Timeout(_) => ErrorKind::Timeout,
            FetchFailure::TooManyRedirects(_) => ErrorKind::TooManyRedirects,
            FetchFailure::UnsupportedContentType(_) => ErrorKind::UnsupportedContentType,
            FetchFailure::NetworkError(_) => ErrorKind::NetworkError,
        }
    }
}

impl From<reqwest::Error> for FetchFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            FetchFailure::InvalidUrl(err.to_string())
        } else {
            FetchFailure::NetworkError(err.to_string())
        }
    }
}

/// Why the pipeline refused to produce a preview.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Rejection {
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("fetch pool is saturated")]
    Overloaded,

    #[error(transparent)]
    Fetch(#[from] FetchFailure),
}

impl Rejection {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Rejection::RateLimited { .. } => ErrorKind::RateLimited,
            Rejection::Overloaded => ErrorKind::Overloaded,
            Rejection::Fetch(failure) => failure.kind(),
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Rejection::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a non-negative integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}
