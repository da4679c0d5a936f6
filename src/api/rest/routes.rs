//! Route definitions.

use crate::api::rest::correlation::{CorrelationHeader, propagate_correlation_id};
use crate::api::rest::handlers::{self, AppState};
use axum::Router;
use axum::http::HeaderName;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Builds the orchestrator router.
///
/// Every response, errors and unknown routes included, carries the
/// correlation id under `correlation_header`.
pub fn create_router(state: AppState, correlation_header: HeaderName) -> Router {
    Router::new()
        .route("/member/offer", post(handlers::post_member_offer))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(middleware::from_fn_with_state(
            CorrelationHeader(correlation_header),
            propagate_correlation_id,
        ))
        .layer(TraceLayer::new_for_http())
}
