//! # Prediction Client
//!
//! HTTP adapter for the ATS and RESP models. Both endpoints take the same
//! body, `{memberId, features}`, and answer `{"prediction": <number>}`.

use crate::domain::services::FeatureVector;
use crate::domain::value_objects::{CorrelationId, MemberId};
use crate::infrastructure::upstream::error::UpstreamResult;
use crate::infrastructure::upstream::http_client::ResilientHttpClient;
use crate::infrastructure::upstream::traits::PredictionService;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Expected-volume model endpoint.
pub const ATS_PATH: &str = "/ml/ats/predict";
/// Response-probability model endpoint.
pub const RESP_PATH: &str = "/ml/resp/predict";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictionRequest<'a> {
    member_id: &'a MemberId,
    features: &'a FeatureVector,
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    #[serde(default)]
    prediction: Option<Value>,
}

/// Prediction service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPredictionClient {
    http: ResilientHttpClient,
}

impl HttpPredictionClient {
    /// Wraps a client configured for the prediction service.
    #[must_use]
    pub fn new(http: ResilientHttpClient) -> Self {
        Self { http }
    }

    async fn predict(
        &self,
        path: &str,
        member_id: &MemberId,
        features: &FeatureVector,
        correlation_id: &CorrelationId,
    ) -> UpstreamResult<f64> {
        let body = PredictionRequest {
            member_id,
            features,
        };
        let response = self.http.post_json(path, &body, correlation_id).await?;

        let parsed: PredictionResponse = response.json().map_err(|e| {
            self.http
                .malformed_payload(path, correlation_id, &response, e.to_string())
        })?;

        match parsed.prediction.as_ref().and_then(Value::as_f64) {
            Some(value) if value.is_finite() => Ok(value),
            Some(value) => Err(self.http.malformed_payload(
                path,
                correlation_id,
                &response,
                format!("prediction is not finite ({})", value),
            )),
            None => Err(self.http.malformed_payload(
                path,
                correlation_id,
                &response,
                "missing numeric prediction",
            )),
        }
    }
}

#[async_trait]
impl PredictionService for HttpPredictionClient {
    async fn predict_ats(
        &self,
        member_id: &MemberId,
        features: &FeatureVector,
        correlation_id: &CorrelationId,
    ) -> UpstreamResult<f64> {
        self.predict(ATS_PATH, member_id, features, correlation_id)
            .await
    }

    async fn predict_resp(
        &self,
        member_id: &MemberId,
        features: &FeatureVector,
        correlation_id: &CorrelationId,
    ) -> UpstreamResult<f64> {
        self.predict(RESP_PATH, member_id, features, correlation_id)
            .await
    }
}
