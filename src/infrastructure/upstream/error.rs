//! # Upstream Errors
//!
//! Error types for calls to the member-history store, the prediction
//! service and the offer engine.
//!
//! Every error carries enough context to correlate it with the logs of
//! both sides: the service, the endpoint, the correlation id and how many
//! attempts were made.
//!
//! # Examples
//!
//! ```
//! use member_offer_orchestrator::domain::value_objects::CorrelationId;
//! use member_offer_orchestrator::infrastructure::upstream::error::{UpstreamError, UpstreamService};
//!
//! let cid = CorrelationId::generate();
//! let error = UpstreamError::timeout(UpstreamService::Prediction, "/ml/ats/predict", &cid, 3, "timed out");
//! assert!(error.is_timeout());
//! assert_eq!(error.attempts(), 3);
//! ```

use crate::domain::value_objects::CorrelationId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The backend services the orchestrator talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpstreamService {
    /// Member transaction history store.
    MemberHistory,
    /// ATS and RESP prediction models.
    Prediction,
    /// Offer assignment engine.
    OfferEngine,
}

impl UpstreamService {
    /// Returns the name used in logs and error bodies.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MemberHistory => "member-history",
            Self::Prediction => "prediction",
            Self::OfferEngine => "offer-engine",
        }
    }
}

impl fmt::Display for UpstreamService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for upstream calls.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// The service did not answer in time or could not be reached.
    #[error("{service} timed out on {endpoint} after {attempts} attempt(s): {message}")]
    Timeout {
        /// Service that was called.
        service: UpstreamService,
        /// Path that was called.
        endpoint: String,
        /// Correlation id of the originating request.
        correlation_id: CorrelationId,
        /// Attempts made, including the first.
        attempts: u32,
        /// Error message.
        message: String,
    },

    /// The service answered with an error or an unusable payload.
    #[error("{service} failed on {endpoint} after {attempts} attempt(s): {message}")]
    Failure {
        /// Service that was called.
        service: UpstreamService,
        /// Path that was called.
        endpoint: String,
        /// Correlation id of the originating request.
        correlation_id: CorrelationId,
        /// Attempts made, including the first.
        attempts: u32,
        /// HTTP status returned by the service, if any.
        status: Option<u16>,
        /// Error message.
        message: String,
    },
}

impl UpstreamError {
    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(
        service: UpstreamService,
        endpoint: impl Into<String>,
        correlation_id: &CorrelationId,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        Self::Timeout {
            service,
            endpoint: endpoint.into(),
            correlation_id: correlation_id.clone(),
            attempts,
            message: message.into(),
        }
    }

    /// Creates a failure error.
    #[must_use]
    pub fn failure(
        service: UpstreamService,
        endpoint: impl Into<String>,
        correlation_id: &CorrelationId,
        attempts: u32,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::Failure {
            service,
            endpoint: endpoint.into(),
            correlation_id: correlation_id.clone(),
            attempts,
            status,
            message: message.into(),
        }
    }

    /// Returns true for timeouts and unreachable services.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns a short machine-readable kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Failure { .. } => "failure",
        }
    }

    /// Returns the service that failed.
    #[must_use]
    pub fn service(&self) -> UpstreamService {
        match self {
            Self::Timeout { service, .. } | Self::Failure { service, .. } => *service,
        }
    }

    /// Returns the endpoint path that failed.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Timeout { endpoint, .. } | Self::Failure { endpoint, .. } => endpoint,
        }
    }

    /// Returns the correlation id of the originating request.
    #[must_use]
    pub fn correlation_id(&self) -> &CorrelationId {
        match self {
            Self::Timeout { correlation_id, .. } | Self::Failure { correlation_id, .. } => {
                correlation_id
            }
        }
    }

    /// Returns how many attempts were made.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Timeout { attempts, .. } | Self::Failure { attempts, .. } => *attempts,
        }
    }

    /// Returns the upstream HTTP status, if one was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Timeout { .. } => None,
            Self::Failure { status, .. } => *status,
        }
    }
}

/// Result type for upstream calls.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn failure_carries_status() {
        let cid = CorrelationId::from_caller("req-1").unwrap();
        let error = UpstreamError::failure(
            UpstreamService::OfferEngine,
            "/offer/assign",
            &cid,
            1,
            Some(400),
            "bad request",
        );
        assert!(!error.is_timeout());
        assert_eq!(error.kind(), "failure");
        assert_eq!(error.status(), Some(400));
        assert_eq!(error.service(), UpstreamService::OfferEngine);
        assert_eq!(error.endpoint(), "/offer/assign");
        assert_eq!(error.correlation_id().as_str(), "req-1");
    }

    #[test]
    fn timeout_has_no_status() {
        let cid = CorrelationId::generate();
        let error = UpstreamError::timeout(
            UpstreamService::MemberHistory,
            "/members/A/history",
            &cid,
            3,
            "slow",
        );
        assert_eq!(error.status(), None);
        assert_eq!(error.attempts(), 3);
        assert!(error.to_string().contains("member-history"));
    }

    #[test]
    fn service_display() {
        assert_eq!(UpstreamService::Prediction.to_string(), "prediction");
        assert_eq!(UpstreamService::OfferEngine.as_str(), "offer-engine");
    }
}
