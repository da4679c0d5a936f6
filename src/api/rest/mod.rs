//! # REST API
//!
//! # Endpoints
//!
//! - `POST /member/offer` - Decide the offer for a member transaction
//! - `GET /health` - Liveness probe
//!
//! # Usage
//!
//! ```ignore
//! use member_offer_orchestrator::api::rest::{AppState, create_router};
//!
//! let router = create_router(AppState::new(pipeline), correlation_header);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, router).await?;
//! ```

pub mod correlation;
pub mod handlers;
pub mod routes;

pub use handlers::{ApiError, AppState, ErrorDetail, ErrorResponse, HealthResponse};
pub use routes::create_router;
