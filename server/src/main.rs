mod db;
mod handlers;
mod middleware;
mod models;
mod routes;
mod state;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use link_preview_cli::{
    rate_limiter::RateLimiter, utils, MemoryOutcomeSink, OutcomeSink, Pipeline, PipelineConfig,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use db::{FanoutSink, MySqlOutcomeSink};
use state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    utils::init_logging("info");

    let config = PipelineConfig::from_env()?;
    let outcomes = Arc::new(MemoryOutcomeSink::new(config.outcome_capacity));

    let sink: Arc<dyn OutcomeSink> = match env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = db::init_db(&database_url).await?;
            info!("persisting fetch outcomes to MySQL");
            Arc::new(FanoutSink::new(vec![
                outcomes.clone() as Arc<dyn OutcomeSink>,
                Arc::new(MySqlOutcomeSink::new(pool)),
            ]))
        }
        Err(_) => {
            warn!("DATABASE_URL not set, fetch outcomes are kept in memory only");
            outcomes.clone()
        }
    };

    let pipeline = Arc::new(Pipeline::new(&config, sink)?);
    spawn_window_eviction(pipeline.limiter().clone(), config.rate.window);

    let admin_key = env::var("ADMIN_API_KEY").ok().filter(|k| !k.is_empty());
    if admin_key.is_none() {
        info!("ADMIN_API_KEY not set, rate limit administration disabled");
    }

    let mut app = routes::app(AppState::new(pipeline, outcomes, admin_key));
    if let Ok(client_url) = env::var("CLIENT_URL") {
        app = app.layer(cors(&client_url)?);
    }

    let addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!(
        "listening on {} (timeout {:?}, max bytes {}, {} req / {:?})",
        addr, config.budget.timeout, config.budget.max_bytes, config.rate.limit, config.rate.window
    );
    axum::serve(listener, app).await?;
    Ok(())
}

fn cors(client_url: &str) -> Result<CorsLayer, axum::http::header::InvalidHeaderValue> {
    Ok(CorsLayer::new()
        .allow_origin(client_url.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("x-api-key")]))
}

fn spawn_window_eviction(limiter: Arc<RateLimiter>, window: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(window.max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            limiter.evict_expired();
        }
    });
}
