//! # Application Errors
//!
//! Error types for the offer pipeline.
//!
//! # Error Hierarchy
//!
//! ```text
//! OrchestrationError
//! ├── MalformedBody(String)        - Body is not JSON at all        (400)
//! ├── Validation { fields }        - Field-level validation failures (422)
//! ├── Upstream(UpstreamError)      - Timeout (504) or failure (502)
//! ├── DeadlineExceeded             - Request deadline elapsed        (504)
//! └── Internal(String)             - Invariant violation             (500)
//! ```
//!
//! A failed persistence write is not an error; it surfaces as a
//! [`PersistenceWarning`] on the pipeline outcome.
//!
//! # Examples
//!
//! ```
//! use member_offer_orchestrator::application::error::{ErrorKind, OrchestrationError};
//!
//! let err = OrchestrationError::internal("feature AVG_POINTS_BOUGHT is not finite");
//! assert_eq!(err.kind(), ErrorKind::Internal);
//! assert_eq!(err.status_code(), 500);
//! ```

use crate::domain::entities::FieldError;
use crate::domain::value_objects::MemberId;
use crate::infrastructure::upstream::error::UpstreamError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Machine-readable error category, one per HTTP mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Inbound request failed validation.
    Validation,
    /// An upstream timed out or the request deadline elapsed.
    UpstreamTimeout,
    /// An upstream answered with an error or an unusable payload.
    UpstreamFailure,
    /// The orchestrator itself broke an invariant.
    Internal,
}

impl ErrorKind {
    /// Returns the error code used in response bodies.
    #[inline]
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            Self::UpstreamFailure => "UPSTREAM_FAILURE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error type for the offer pipeline.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The request body is not valid JSON.
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    /// The request is JSON but fails validation.
    #[error("validation failed: {}", summarize(.fields))]
    Validation {
        /// One entry per offending field.
        fields: Vec<FieldError>,
    },

    /// An upstream call failed.
    #[error("{0}")]
    Upstream(#[from] UpstreamError),

    /// The overall request deadline elapsed before a decision was made.
    #[error("request deadline of {deadline_ms}ms exceeded")]
    DeadlineExceeded {
        /// Configured deadline in milliseconds.
        deadline_ms: u64,
    },

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestrationError {
    /// Creates a malformed body error.
    #[must_use]
    pub fn malformed_body(message: impl Into<String>) -> Self {
        Self::MalformedBody(message.into())
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(fields: Vec<FieldError>) -> Self {
        Self::Validation { fields }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the error category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedBody(_) | Self::Validation { .. } => ErrorKind::Validation,
            Self::Upstream(e) if e.is_timeout() => ErrorKind::UpstreamTimeout,
            Self::Upstream(_) => ErrorKind::UpstreamFailure,
            Self::DeadlineExceeded { .. } => ErrorKind::UpstreamTimeout,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MalformedBody(_) => 400,
            Self::Validation { .. } => 422,
            Self::Upstream(e) if e.is_timeout() => 504,
            Self::Upstream(_) => 502,
            Self::DeadlineExceeded { .. } => 504,
            Self::Internal(_) => 500,
        }
    }

    /// Returns the field errors of a validation failure.
    #[must_use]
    pub fn fields(&self) -> &[FieldError] {
        match self {
            Self::Validation { fields } => fields,
            _ => &[],
        }
    }

    /// Returns the upstream error, if this is one.
    #[must_use]
    pub fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            Self::Upstream(e) => Some(e),
            _ => None,
        }
    }
}

fn summarize(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// The current transaction could not be written back to the history store.
///
/// The offer decision still stands; this only records what went wrong.
#[derive(Debug, Clone, Error)]
#[error("failed to persist transaction for member {member_id}: {source}")]
pub struct PersistenceWarning {
    /// Member whose history was not updated.
    pub member_id: MemberId,
    /// Underlying upstream error.
    #[source]
    pub source: UpstreamError,
}

/// Result type for the offer pipeline.
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::domain::value_objects::CorrelationId;
    use crate::infrastructure::upstream::error::UpstreamService;

    #[test]
    fn validation_maps_to_422() {
        let err = OrchestrationError::validation(vec![
            FieldError::new("memberId", "is required"),
            FieldError::new("lastTransactionType", "unknown value"),
        ]);
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.status_code(), 422);
        assert_eq!(err.fields().len(), 2);
        assert!(err.to_string().contains("memberId"));
    }

    #[test]
    fn malformed_body_maps_to_400() {
        let err = OrchestrationError::malformed_body("expected value at line 1");
        assert_eq!(err.kind().code(), "VALIDATION_ERROR");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn upstream_timeout_maps_to_504() {
        let cid = CorrelationId::generate();
        let err: OrchestrationError =
            UpstreamError::timeout(UpstreamService::Prediction, "/ml/ats/predict", &cid, 3, "slow")
                .into();
        assert_eq!(err.kind(), ErrorKind::UpstreamTimeout);
        assert_eq!(err.status_code(), 504);
        assert!(err.upstream().is_some());
    }

    #[test]
    fn upstream_failure_maps_to_502() {
        let cid = CorrelationId::generate();
        let err: OrchestrationError = UpstreamError::failure(
            UpstreamService::OfferEngine,
            "/offer/assign",
            &cid,
            1,
            Some(400),
            "bad",
        )
        .into();
        assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn deadline_maps_to_timeout() {
        let err = OrchestrationError::DeadlineExceeded { deadline_ms: 100 };
        assert_eq!(err.kind(), ErrorKind::UpstreamTimeout);
        assert_eq!(err.status_code(), 504);
    }

    #[test]
    fn internal_maps_to_500() {
        let err = OrchestrationError::internal("boom");
        assert_eq!(err.kind().code(), "INTERNAL_ERROR");
        assert_eq!(err.status_code(), 500);
    }
}
