//! Request handlers for the rate limiter endpoints.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ratelimit::{Algorithm, RateLimiter, RateLimiterConfig, SharedStateBackend};

#[derive(Debug, Deserialize)]
struct KeyParams {
    key: String,
}

#[derive(Debug, Deserialize)]
struct ConfigParams {
    key: String,
    capacity: u64,
    #[serde(rename = "refillRate")]
    refill_rate: u64,
    #[serde(rename = "type")]
    algorithm: Algorithm,
}

/// Build the router for `limiter`.
///
/// Every handler shares the same limiter, so fallback state and runtime
/// configuration persist across requests for the life of the router.
pub fn router<B: SharedStateBackend + 'static>(limiter: Arc<RateLimiter<B>>) -> Router {
    Router::new()
        .route("/acquire", post(acquire::<B>))
        .route("/status", get(status::<B>))
        .route("/config", post(set_config::<B>))
        .route("/admin/all-status", get(all_status::<B>))
        .with_state(limiter)
}

fn missing_key() -> Response {
    warn!("Received rate limit request with empty key");
    (StatusCode::BAD_REQUEST, "key is required").into_response()
}

async fn acquire<B: SharedStateBackend + 'static>(
    State(limiter): State<Arc<RateLimiter<B>>>,
    Query(params): Query<KeyParams>,
) -> Response {
    if params.key.is_empty() {
        return missing_key();
    }

    if limiter.decide(&params.key).await {
        (StatusCode::OK, "Allowed").into_response()
    } else {
        (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response()
    }
}

async fn status<B: SharedStateBackend + 'static>(
    State(limiter): State<Arc<RateLimiter<B>>>,
    Query(params): Query<KeyParams>,
) -> Response {
    if params.key.is_empty() {
        return missing_key();
    }
    Json(limiter.status(&params.key).await).into_response()
}

async fn set_config<B: SharedStateBackend + 'static>(
    State(limiter): State<Arc<RateLimiter<B>>>,
    Query(params): Query<ConfigParams>,
) -> Response {
    if params.key.is_empty() {
        return missing_key();
    }

    let config = RateLimiterConfig::new(params.capacity, params.refill_rate, params.algorithm);
    match limiter.set_config(&params.key, config) {
        Ok(()) => {
            debug!(key = %params.key, "Config updated over HTTP");
            Json(limiter.config(&params.key)).into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

async fn all_status<B: SharedStateBackend + 'static>(
    State(limiter): State<Arc<RateLimiter<B>>>,
) -> Response {
    Json(limiter.all_statuses().await).into_response()
}
