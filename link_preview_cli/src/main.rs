use clap::Parser;
use dotenv::dotenv;
use futures::stream::{self, StreamExt};
use link_preview_cli::{
    utils, MemoryOutcomeSink, Pipeline, PipelineConfig, PreviewRequest, RatePolicy, Rejection,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URLs to preview
    #[arg(required = true)]
    urls: Vec<String>,

    /// Number of concurrent previews
    #[arg(short, long, default_value_t = 5)]
    concurrent: usize,

    /// Fetch timeout per URL (milliseconds)
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    /// Maximum body bytes read per URL
    #[arg(long)]
    max_bytes: Option<usize>,

    /// Maximum redirects followed per URL
    #[arg(long)]
    max_redirects: Option<usize>,

    /// Caller identity used for rate limiting
    #[arg(long, default_value = "cli")]
    caller: String,

    /// Where to write the JSON results
    #[arg(short, long, default_value = "previews.json")]
    output: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let args = Args::parse();
    utils::init_logging(if args.verbose { "debug" } else { "info" });

    let mut config = PipelineConfig::from_env()?;
    if let Some(ms) = args.timeout_ms {
        config.budget.timeout = Duration::from_millis(ms);
    }
    if let Some(max_bytes) = args.max_bytes {
        config.budget.max_bytes = max_bytes;
    }
    if let Some(max_redirects) = args.max_redirects {
        config.budget.max_redirects = max_redirects;
    }
    config.pool.max_concurrent = args.concurrent.max(1);
    config.rate = batch_policy(config.rate, args.urls.len());

    let sink = Arc::new(MemoryOutcomeSink::new(config.outcome_capacity));
    let pipeline = Pipeline::new(&config, sink)?;

    let pipeline = &pipeline;
    let caller = args.caller.as_str();
    let results: Vec<serde_json::Value> = stream::iter(args.urls.iter())
        .map(move |url| {
            let request = PreviewRequest::new(url.as_str(), caller);
            async move { (request.url.clone(), pipeline.preview(&request).await) }
        })
        .buffer_unordered(args.concurrent.max(1))
        .map(|(url, result)| report(&url, result))
        .collect()
        .await;

    utils::save_json(&json!({ "previews": results }), &args.output)?;
    Ok(())
}

// one batch is one caller, so the window has to hold every url in it
fn batch_policy(policy: RatePolicy, urls: usize) -> RatePolicy {
    RatePolicy {
        limit: policy.limit.max(u32::try_from(urls).unwrap_or(u32::MAX)),
        ..policy
    }
}

fn report(url: &str, result: Result<link_preview_cli::PreviewResponse, Rejection>) -> serde_json::Value {
    match result {
        Ok(response) => {
            println!("✅ {} -> {} ({:?})", url, response.preview.title, response.preview.source_tag);
            json!({ "url": url, "preview": response.preview, "outcome": response.outcome })
        }
        Err(rejection) => {
            eprintln!("❌ {}: {}", url, rejection);
            json!({
                "url": url,
                "error": rejection.kind(),
                "message": rejection.to_string(),
                "retryAfterMs": rejection.retry_after().map(|d| d.as_millis() as u64),
            })
        }
    }
}
