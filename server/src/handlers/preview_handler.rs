use axum::{
    extract::Path,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use link_preview_cli::{ErrorKind, PreviewRequest, Rejection};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use crate::models::caller::Caller;
use crate::state::AppState;

/// Upper bound on a caller-supplied timeout.
const MAX_TIMEOUT_OVERRIDE: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewPayload {
    pub url: String,
    pub timeout_ms: Option<u64>,
}

impl PreviewPayload {
    fn into_request(self, caller: Caller) -> PreviewRequest {
        let request = PreviewRequest::new(self.url, caller.id);
        match self.timeout_ms {
            Some(ms) => request.with_timeout(Duration::from_millis(ms.max(1)).min(MAX_TIMEOUT_OVERRIDE)),
            None => request,
        }
    }
}

/// POST /api/preview
pub async fn preview_url(
    Extension(state): Extension<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<PreviewPayload>,
) -> Response {
    match state.pipeline.preview(&payload.into_request(caller)).await {
        Ok(response) => (StatusCode::OK, Json(json!(response))).into_response(),
        Err(rejection) => rejection_response(&rejection),
    }
}

/// POST /api/fetch
pub async fn fetch_content(
    Extension(state): Extension<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<PreviewPayload>,
) -> Response {
    match state.pipeline.fetch_content(&payload.into_request(caller)).await {
        Ok(content) => (StatusCode::OK, Json(json!(content))).into_response(),
        Err(rejection) => rejection_response(&rejection),
    }
}

/// GET /api/outcomes/{id}
pub async fn poll_outcome(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.outcomes.get(&id) {
        Some(outcome) => (StatusCode::OK, Json(json!(outcome))),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "Outcome not found" }))),
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidUrl => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::TooManyRedirects
        | ErrorKind::UnsupportedContentType
        | ErrorKind::NetworkError => StatusCode::BAD_GATEWAY,
        ErrorKind::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn rejection_response(rejection: &Rejection) -> Response {
    let kind = rejection.kind();
    let retry_after = rejection.retry_after();
    let body = json!({
        "error": kind,
        "message": rejection.to_string(),
        "retryAfterMs": retry_after.map(|d| d.as_millis() as u64),
    });

    let mut response = (status_for(kind), Json(body)).into_response();
    if let Some(wait) = retry_after {
        let secs = wait.as_millis().div_ceil(1000).max(1);
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}
