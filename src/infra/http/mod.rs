//! HTTP surface: the edge middleware stack and the operator endpoints.
//!
//! Content routes are supplied by the caller; [`build_router`] wraps
//! them so every request, content or operator, passes through the same
//! gate.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use serde_json::{json, Value};

pub mod middleware;

pub use middleware::{EdgeSettings, EdgeState};

/// Assemble the full router: caller-provided content routes plus the
/// operator endpoints, wrapped in the edge stack.
///
/// Layer order matters: request context is attached first, responses
/// are logged around everything, and the gate runs innermost so its
/// rejections are logged too.
pub fn build_router(state: EdgeState, content: Router) -> Router {
    Router::new()
        .merge(content)
        .merge(ops_router(state.clone()))
        .route("/health", get(health))
        .layer(axum_middleware::from_fn_with_state(
            state,
            middleware::edge_gate,
        ))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

fn ops_router(state: EdgeState) -> Router {
    Router::new()
        .route("/admin/traffic", get(traffic_status))
        .route(
            "/admin/traffic-mode",
            post(enable_high_traffic).delete(disable_high_traffic),
        )
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Current load snapshot and the caching posture derived from it.
async fn traffic_status(State(state): State<EdgeState>) -> Json<Value> {
    let snapshot = state.monitor.metrics().await;
    let decision = state.strategy.decision().await;
    Json(json!({
        "traffic": snapshot,
        "strategy": decision,
    }))
}

async fn enable_high_traffic(State(state): State<EdgeState>) -> StatusCode {
    if state.strategy.enable_high_traffic_mode().await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn disable_high_traffic(State(state): State<EdgeState>) -> StatusCode {
    if state.strategy.disable_high_traffic_mode().await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
