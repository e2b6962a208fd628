use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{redirect, Client, Response};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::{FetchBudget, DEFAULT_TIMEOUT};
use crate::error::FetchFailure;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; LinkPreviewBot/0.1)";

/// Raw result of a successful retrieval. Non-2xx responses land here too,
/// with their status in `http_status`.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub bytes: Vec<u8>,
    pub http_status: u16,
    pub content_type: Option<String>,
    pub final_url: Url,
    pub truncated: bool,
}

impl FetchedBody {
    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.http_status)
    }
}

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_connect_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_connect_timeout(connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder()
                .user_agent(USER_AGENT)
                .connect_timeout(connect_timeout)
                .redirect(redirect::Policy::none())
                .build()?,
        })
    }

    /// Retrieves `url` within `budget`. Connect, every redirect hop and the body
    /// all share one deadline.
    pub async fn fetch(&self, url: &str, budget: &FetchBudget) -> Result<FetchedBody, FetchFailure> {
        let url = parse_http_url(url)?;

        match tokio::time::timeout(budget.timeout, self.fetch_within(url, budget)).await {
            Ok(result) => result,
            Err(_) => Err(FetchFailure::Timeout(budget.timeout)),
        }
    }

    async fn fetch_within(&self, mut url: Url, budget: &FetchBudget) -> Result<FetchedBody, FetchFailure> {
        let mut hops = 0;

        let response = loop {
            debug!(url = %url, hops, "requesting");
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| classify(e, budget))?;

            let location = response
                .headers()
                .get(LOCATION)
                .map(|v| v.to_str().map(str::to_owned));
            let location = match (response.status().is_redirection(), location) {
                (true, Some(location)) => location,
                _ => break response,
            };

            hops += 1;
            if hops > budget.max_redirects {
                return Err(FetchFailure::TooManyRedirects(budget.max_redirects));
            }

            let location = location
                .map_err(|_| FetchFailure::InvalidUrl("redirect location is not valid ascii".into()))?;
            let next = url
                .join(&location)
                .map_err(|e| FetchFailure::InvalidUrl(format!("{}: {}", location, e)))?;
            url = require_http(next)?;
        };

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

        if let Some(ct) = content_type.as_deref() {
            if !is_html(ct) {
                return Err(FetchFailure::UnsupportedContentType(ct.to_string()));
            }
        }

        let http_status = response.status().as_u16();
        let (bytes, truncated) = read_capped(response, budget).await?;

        Ok(FetchedBody {
            bytes,
            http_status,
            content_type,
            final_url: url,
            truncated,
        })
    }
}

async fn read_capped(mut response: Response, budget: &FetchBudget) -> Result<(Vec<u8>, bool), FetchFailure> {
    let hint = response.content_length().unwrap_or(0) as usize;
    let mut out = Vec::with_capacity(hint.min(budget.max_bytes));
    let mut truncated = false;

    while let Some(chunk) = response.chunk().await.map_err(|e| classify(e, budget))? {
        let remaining = budget.max_bytes - out.len();
        if chunk.len() > remaining {
            out.extend_from_slice(&chunk[..remaining]);
            truncated = true;
            break;
        }
        out.extend_from_slice(&chunk);
    }

    Ok((out, truncated))
}

fn classify(err: reqwest::Error, budget: &FetchBudget) -> FetchFailure {
    if err.is_timeout() {
        FetchFailure::Timeout(budget.timeout)
    } else {
        FetchFailure::from(err)
    }
}

pub fn parse_http_url(raw: &str) -> Result<Url, FetchFailure> {
    let url = Url::parse(raw.trim()).map_err(|e| FetchFailure::InvalidUrl(format!("{}: {}", raw, e)))?;
    require_http(url)
}

fn require_http(url: Url) -> Result<Url, FetchFailure> {
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => Err(FetchFailure::InvalidUrl(format!("{} has no host", url))),
        other => Err(FetchFailure::InvalidUrl(format!("unsupported scheme {:?}", other))),
    }
}

fn is_html(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    mime.is_empty() || mime.eq_ignore_ascii_case("text/html")
}
