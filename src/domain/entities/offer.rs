//! # Offer Decision
//!
//! Prediction scores and the offer chosen from them.

use crate::domain::value_objects::{MemberId, OfferId};
use serde::Serialize;

/// The two independent model scores for one member.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    /// Expected transaction volume (ATS model).
    pub expected_volume: f64,
    /// Probability of responding to an offer (RESP model).
    pub response_probability: f64,
}

impl PredictionResult {
    /// Creates a prediction pair.
    #[must_use]
    pub fn new(expected_volume: f64, response_probability: f64) -> Self {
        Self {
            expected_volume,
            response_probability,
        }
    }
}

/// The offer selected for a member.
///
/// Serializes to the public response shape `{"memberId", "offer"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferDecision {
    member_id: MemberId,
    offer: OfferId,
}

impl OfferDecision {
    /// Creates a decision.
    #[must_use]
    pub fn new(member_id: MemberId, offer: OfferId) -> Self {
        Self { member_id, offer }
    }

    /// Returns the member the offer was made for.
    #[inline]
    #[must_use]
    pub fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    /// Returns the offer.
    #[inline]
    #[must_use]
    pub fn offer(&self) -> &OfferId {
        &self.offer
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn decision_serializes_to_response_shape() {
        let decision = OfferDecision::new(
            MemberId::parse("A0F18FAA").unwrap(),
            OfferId::parse("OFFER_A").unwrap(),
        );
        let json = serde_json::to_string(&decision).unwrap();
        assert_eq!(json, r#"{"memberId":"A0F18FAA","offer":"OFFER_A"}"#);
    }
}
