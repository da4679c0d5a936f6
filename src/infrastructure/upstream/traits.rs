//! # Upstream Ports
//!
//! Port definitions for the three backend services.
//!
//! The pipeline depends only on these traits, so tests can swap the HTTP
//! clients for in-memory fakes.
//!
//! # Examples
//!
//! ```ignore
//! use member_offer_orchestrator::infrastructure::upstream::traits::OfferEngine;
//!
//! struct AlwaysOfferA;
//!
//! #[async_trait::async_trait]
//! impl OfferEngine for AlwaysOfferA {
//!     // ... implement assign_offer
//! }
//! ```

use crate::domain::entities::{HistoryRecord, PredictionResult, TransactionRequest};
use crate::domain::services::FeatureVector;
use crate::domain::value_objects::{CorrelationId, MemberId, OfferId};
use crate::infrastructure::upstream::error::UpstreamResult;
use async_trait::async_trait;
use std::fmt;

/// Store of member transaction history.
///
/// # Errors
///
/// Methods return `UpstreamResult<T>`; an unknown member is not an error.
#[async_trait]
pub trait MemberHistoryStore: Send + Sync + fmt::Debug {
    /// Fetches the member's past transactions.
    ///
    /// # Errors
    ///
    /// - `UpstreamError::Timeout` - Store unreachable or too slow
    /// - `UpstreamError::Failure` - Error status or malformed payload
    async fn fetch_history(
        &self,
        member_id: &MemberId,
        correlation_id: &CorrelationId,
    ) -> UpstreamResult<HistoryRecord>;

    /// Appends a transaction to the member's history.
    ///
    /// # Errors
    ///
    /// - `UpstreamError::Timeout` - Store unreachable or too slow
    /// - `UpstreamError::Failure` - Store rejected the write
    async fn persist(
        &self,
        transaction: &TransactionRequest,
        correlation_id: &CorrelationId,
    ) -> UpstreamResult<()>;
}

/// The two prediction models.
#[async_trait]
pub trait PredictionService: Send + Sync + fmt::Debug {
    /// Predicts expected transaction volume.
    ///
    /// # Errors
    ///
    /// - `UpstreamError::Timeout` - Model unreachable or too slow
    /// - `UpstreamError::Failure` - Error status or missing prediction
    async fn predict_ats(
        &self,
        member_id: &MemberId,
        features: &FeatureVector,
        correlation_id: &CorrelationId,
    ) -> UpstreamResult<f64>;

    /// Predicts the probability of responding to an offer.
    ///
    /// # Errors
    ///
    /// - `UpstreamError::Timeout` - Model unreachable or too slow
    /// - `UpstreamError::Failure` - Error status or missing prediction
    async fn predict_resp(
        &self,
        member_id: &MemberId,
        features: &FeatureVector,
        correlation_id: &CorrelationId,
    ) -> UpstreamResult<f64>;
}

/// Offer selection.
#[async_trait]
pub trait OfferEngine: Send + Sync + fmt::Debug {
    /// Picks an offer from the two scores.
    ///
    /// # Errors
    ///
    /// - `UpstreamError::Timeout` - Engine unreachable or too slow
    /// - `UpstreamError::Failure` - Error status or missing offer
    async fn assign_offer(
        &self,
        member_id: &MemberId,
        prediction: &PredictionResult,
        correlation_id: &CorrelationId,
    ) -> UpstreamResult<OfferId>;
}
