//! # Offer Engine Client
//!
//! HTTP adapter for offer assignment.

use crate::domain::entities::PredictionResult;
use crate::domain::value_objects::{CorrelationId, MemberId, OfferId};
use crate::infrastructure::upstream::error::UpstreamResult;
use crate::infrastructure::upstream::http_client::ResilientHttpClient;
use crate::infrastructure::upstream::traits::OfferEngine;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Offer assignment endpoint.
pub const ASSIGN_PATH: &str = "/offer/assign";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssignRequest<'a> {
    member_id: &'a MemberId,
    ats_score: f64,
    resp_score: f64,
}

#[derive(Debug, Deserialize)]
struct AssignResponse {
    #[serde(default)]
    offer: Option<String>,
}

/// Offer engine over HTTP.
#[derive(Debug, Clone)]
pub struct HttpOfferEngine {
    http: ResilientHttpClient,
}

impl HttpOfferEngine {
    /// Wraps a client configured for the offer engine.
    #[must_use]
    pub fn new(http: ResilientHttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl OfferEngine for HttpOfferEngine {
    async fn assign_offer(
        &self,
        member_id: &MemberId,
        prediction: &PredictionResult,
        correlation_id: &CorrelationId,
    ) -> UpstreamResult<OfferId> {
        let body = AssignRequest {
            member_id,
            ats_score: prediction.expected_volume,
            resp_score: prediction.response_probability,
        };
        let response = self
            .http
            .post_json(ASSIGN_PATH, &body, correlation_id)
            .await?;

        let parsed: AssignResponse = response.json().map_err(|e| {
            self.http
                .malformed_payload(ASSIGN_PATH, correlation_id, &response, e.to_string())
        })?;

        parsed
            .offer
            .as_deref()
            .and_then(OfferId::parse)
            .ok_or_else(|| {
                self.http.malformed_payload(
                    ASSIGN_PATH,
                    correlation_id,
                    &response,
                    "missing or empty offer",
                )
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::infrastructure::upstream::error::UpstreamService;
    use crate::infrastructure::upstream::http_client::UpstreamClientConfig;
    use crate::infrastructure::upstream::retry::RetryPolicy;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine_for(server: &MockServer) -> HttpOfferEngine {
        let config = UpstreamClientConfig::new(server.uri()).with_retry(RetryPolicy::no_retry());
        HttpOfferEngine::new(
            ResilientHttpClient::new(UpstreamService::OfferEngine, config).unwrap(),
        )
    }

    #[tokio::test]
    async fn sends_both_scores() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ASSIGN_PATH))
            .and(body_json(json!({
                "memberId": "A0F18FAA",
                "atsScore": 1200.0,
                "respScore": 0.8
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"offer": "OFFER_A"})))
            .expect(1)
            .mount(&server)
            .await;

        let offer = engine_for(&server)
            .assign_offer(
                &MemberId::parse("A0F18FAA").unwrap(),
                &PredictionResult::new(1200.0, 0.8),
                &CorrelationId::generate(),
            )
            .await
            .unwrap();
        assert_eq!(offer.as_str(), "OFFER_A");
    }

    #[tokio::test]
    async fn empty_offer_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ASSIGN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"offer": "  "})))
            .mount(&server)
            .await;

        let error = engine_for(&server)
            .assign_offer(
                &MemberId::parse("A0F18FAA").unwrap(),
                &PredictionResult::new(1.0, 0.1),
                &CorrelationId::generate(),
            )
            .await
            .unwrap_err();
        assert_eq!(error.status(), Some(200));
        assert!(error.to_string().contains("missing or empty offer"));
    }
}
