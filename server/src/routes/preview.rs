use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};

use crate::handlers::preview_handler::{fetch_content, poll_outcome, preview_url};
use crate::middleware::caller_middleware::caller_middleware;

pub fn preview_routes() -> Router {
    Router::new()
        .route("/preview", post(preview_url))
        .route("/fetch", post(fetch_content))
        .route("/outcomes/{id}", get(poll_outcome))
        .layer(from_fn(caller_middleware))
}
