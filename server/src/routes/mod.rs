pub mod admin;
pub mod preview;

use axum::{routing::get, Extension, Router};

use crate::state::AppState;
use admin::admin_routes;
use preview::preview_routes;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api", preview_routes().merge(admin_routes()))
        .layer(Extension(state))
}
