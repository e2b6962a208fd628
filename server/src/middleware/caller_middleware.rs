use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::models::caller::Caller;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Resolves the caller from the `x-api-key` header and attaches it to the
/// request. Requests without a usable key stop here with 401.
pub async fn caller_middleware(mut req: Request<Body>, next: Next) -> Response {
    let key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_owned);

    let Some(id) = key else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized", "message": "missing x-api-key header" })),
        )
            .into_response();
    };

    req.extensions_mut().insert(Caller { id });
    next.run(req).await
}
