use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use link_preview_cli::RatePolicy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

use crate::state::AppState;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRateLimitPayload {
    pub max_requests: u32,
    pub duration_in_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResponse {
    pub caller_id: String,
    pub max_requests: u32,
    pub duration_in_seconds: u64,
}

impl RateLimitResponse {
    fn new(caller_id: String, policy: RatePolicy) -> Self {
        Self {
            caller_id,
            max_requests: policy.limit,
            duration_in_seconds: policy.window.as_secs(),
        }
    }
}

type ApiError = (StatusCode, Json<Value>);

fn authorize_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.admin_key.as_deref() else {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "Rate limit administration is disabled" })),
        ));
    };

    let supplied = headers.get(ADMIN_KEY_HEADER).and_then(|v| v.to_str().ok());
    if supplied != Some(expected) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "Invalid admin key" })),
        ));
    }
    Ok(())
}

/// GET /api/rate-limits/{callerId}
pub async fn get_rate_limit(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path(caller_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    authorize_admin(&state, &headers)?;
    let policy = state.pipeline.limiter().policy_for(&caller_id);
    Ok((StatusCode::OK, Json(RateLimitResponse::new(caller_id, policy))))
}

/// PUT /api/rate-limits/{callerId}
pub async fn set_rate_limit(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path(caller_id): Path<String>,
    Json(payload): Json<SetRateLimitPayload>,
) -> Result<impl IntoResponse, ApiError> {
    authorize_admin(&state, &headers)?;

    if payload.duration_in_seconds == 0 {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "message": "durationInSeconds must be greater than zero" })),
        ));
    }

    let policy = RatePolicy {
        limit: payload.max_requests,
        window: Duration::from_secs(payload.duration_in_seconds),
    };
    state.pipeline.limiter().set_policy(&caller_id, policy);
    info!(
        caller = %caller_id,
        limit = policy.limit,
        window_secs = payload.duration_in_seconds,
        "rate limit configured"
    );

    Ok((StatusCode::OK, Json(RateLimitResponse::new(caller_id, policy))))
}

/// DELETE /api/rate-limits/{callerId}
pub async fn clear_rate_limit(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path(caller_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    authorize_admin(&state, &headers)?;
    let limiter = state.pipeline.limiter();
    limiter.clear_policy(&caller_id);
    let policy = limiter.policy_for(&caller_id);
    Ok((StatusCode::OK, Json(RateLimitResponse::new(caller_id, policy))))
}
