use axum::{routing::get, Router};

use crate::handlers::rate_limit_handler::{clear_rate_limit, get_rate_limit, set_rate_limit};

pub fn admin_routes() -> Router {
    Router::new().route(
        "/rate-limits/{caller_id}",
        get(get_rate_limit).put(set_rate_limit).delete(clear_rate_limit),
    )
}
