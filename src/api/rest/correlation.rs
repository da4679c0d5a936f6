//! Correlation id middleware.
//!
//! Reads the correlation id from the configured header, or mints a UUIDv4
//! when it is missing, blank or not valid text. The id is stored as a
//! request extension, attached to a request span, and echoed on the
//! response.

use crate::domain::value_objects::CorrelationId;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{Instrument, info_span};

/// Header that carries the correlation id.
#[derive(Debug, Clone)]
pub struct CorrelationHeader(pub HeaderName);

/// Axum middleware that resolves and propagates the correlation id.
pub async fn propagate_correlation_id(
    State(header): State<CorrelationHeader>,
    mut request: Request,
    next: Next,
) -> Response {
    let incoming = request
        .headers()
        .get(&header.0)
        .and_then(|value| value.to_str().ok());
    let correlation_id = CorrelationId::from_caller_or_generate(incoming);
    request.extensions_mut().insert(correlation_id.clone());

    let span = info_span!(
        "request",
        correlation_id = %correlation_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
        response.headers_mut().insert(header.0, value);
    }
    response
}
