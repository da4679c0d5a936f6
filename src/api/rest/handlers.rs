//! # REST Handlers
//!
//! Request handlers and the error envelope.
//!
//! Every error response has the shape
//!
//! ```json
//! { "error": { "code": "UPSTREAM_TIMEOUT", "message": "..." }, "correlationId": "..." }
//! ```
//!
//! with `fields` added for validation errors and `service` /
//! `upstreamStatus` added for upstream errors.

use crate::application::error::OrchestrationError;
use crate::application::services::OfferPipeline;
use crate::domain::entities::FieldError;
use crate::domain::value_objects::CorrelationId;
use axum::Json;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

/// Shared state for REST handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The offer pipeline.
    pub pipeline: Arc<OfferPipeline>,
}

impl AppState {
    /// Creates handler state around a pipeline.
    #[must_use]
    pub fn new(pipeline: OfferPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Health response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the process is serving.
    pub status: &'static str,
}

/// Error detail inside [`ErrorResponse`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    /// Machine-readable code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Field-level validation errors.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
    /// Upstream service that failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<&'static str>,
    /// HTTP status returned by the upstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
}

/// Error response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// The error.
    pub error: ErrorDetail,
    /// Correlation id of the failed request.
    pub correlation_id: CorrelationId,
}

/// An orchestration error bound to the request it failed.
#[derive(Debug)]
pub struct ApiError {
    error: OrchestrationError,
    correlation_id: CorrelationId,
}

impl ApiError {
    /// Binds an error to a correlation id.
    #[must_use]
    pub fn new(error: OrchestrationError, correlation_id: CorrelationId) -> Self {
        Self {
            error,
            correlation_id,
        }
    }

    fn body(&self) -> ErrorResponse {
        let upstream = self.error.upstream();
        ErrorResponse {
            error: ErrorDetail {
                code: self.error.kind().code(),
                message: self.error.to_string(),
                fields: self.error.fields().to_vec(),
                service: upstream.map(|e| e.service().as_str()),
                upstream_status: upstream.and_then(|e| e.status()),
            },
            correlation_id: self.correlation_id.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() && !matches!(self.error, OrchestrationError::Upstream(_)) {
            error!(correlation_id = %self.correlation_id, error = %self.error, "Request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

/// Decides the offer for one member transaction.
///
/// The body is taken as raw bytes so that a non-JSON body becomes a 400
/// with the standard envelope instead of an extractor rejection.
pub async fn post_member_offer(
    State(state): State<AppState>,
    correlation_id: Option<Extension<CorrelationId>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let correlation_id = correlation_id
        .map(|Extension(cid)| cid)
        .unwrap_or_else(CorrelationId::generate);

    let value: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
        ApiError::new(
            OrchestrationError::malformed_body(e.to_string()),
            correlation_id.clone(),
        )
    })?;

    let outcome = state
        .pipeline
        .run(value, &correlation_id)
        .await
        .map_err(|e| ApiError::new(e, correlation_id.clone()))?;

    Ok((StatusCode::OK, Json(outcome.decision)).into_response())
}

/// Liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
