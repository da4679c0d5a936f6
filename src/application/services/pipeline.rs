//! # Offer Pipeline
//!
//! Turns one member transaction into one offer decision.
//!
//! ```text
//! Validating → FetchingHistory → ComputingFeatures → Predicting
//!            → AssigningOffer → Persisting → Completed
//! ```
//!
//! Any failure between `FetchingHistory` and `AssigningOffer` moves the
//! request to `Failed` and skips everything after it, persistence included.
//! Persistence itself is best-effort: a failed write is logged and reported
//! on the [`PipelineOutcome`], never returned as an error.
//!
//! The two predictions run as separate tasks. The first definitive failure
//! aborts the sibling, and dropping the pipeline future (for example when
//! the request deadline elapses) aborts both.

use crate::application::error::{OrchestrationError, OrchestrationResult, PersistenceWarning};
use crate::domain::entities::{
    HistoryRecord, OfferDecision, PredictionResult, RawTransaction, TransactionRequest,
};
use crate::domain::services::{FeatureVector, compute_features};
use crate::domain::value_objects::{CorrelationId, MemberId};
use crate::infrastructure::upstream::error::UpstreamResult;
use crate::infrastructure::upstream::traits::{MemberHistoryStore, OfferEngine, PredictionService};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

/// Pipeline stage, used for logging and failure reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Checking the inbound transaction.
    Validating,
    /// Reading the member's history.
    FetchingHistory,
    /// Deriving model features.
    ComputingFeatures,
    /// Running ATS and RESP concurrently.
    Predicting,
    /// Asking the offer engine for a decision.
    AssigningOffer,
    /// Writing the transaction back to history.
    Persisting,
    /// Decision made.
    Completed,
    /// Terminal failure.
    Failed,
}

impl PipelineStage {
    /// Returns the stage name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::FetchingHistory => "fetching_history",
            Self::ComputingFeatures => "computing_features",
            Self::Predicting => "predicting",
            Self::AssigningOffer => "assigning_offer",
            Self::Persisting => "persisting",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline settings.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Deadline covering history fetch through offer assignment.
    pub request_deadline: Option<Duration>,
}

impl PipelineConfig {
    /// Sets the request deadline.
    #[must_use]
    pub fn with_request_deadline(mut self, deadline: Duration) -> Self {
        self.request_deadline = Some(deadline);
        self
    }
}

/// Everything the pipeline learned while serving one request.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// The decision returned to the caller.
    pub decision: OfferDecision,
    /// Number of raw history entries returned by the store.
    pub history_len: usize,
    /// Number of those entries that fed the features.
    pub valid_history_len: usize,
    /// Features sent to the models.
    pub features: FeatureVector,
    /// Model scores sent to the offer engine.
    pub prediction: PredictionResult,
    /// Set when the transaction could not be persisted.
    pub persistence_warning: Option<PersistenceWarning>,
    /// Wall-clock time spent in the pipeline.
    pub latency: Duration,
}

/// Result of steps 2 to 5.
struct Decided {
    history_len: usize,
    valid_history_len: usize,
    features: FeatureVector,
    prediction: PredictionResult,
    decision: OfferDecision,
}

/// Aborts the task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Orchestrates history, features, predictions, offer and persistence.
#[derive(Debug, Clone)]
pub struct OfferPipeline {
    history: Arc<dyn MemberHistoryStore>,
    predictions: Arc<dyn PredictionService>,
    offers: Arc<dyn OfferEngine>,
    config: PipelineConfig,
}

impl OfferPipeline {
    /// Creates a pipeline over the given ports.
    #[must_use]
    pub fn new(
        history: Arc<dyn MemberHistoryStore>,
        predictions: Arc<dyn PredictionService>,
        offers: Arc<dyn OfferEngine>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            history,
            predictions,
            offers,
            config,
        }
    }

    /// Returns the pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validates a raw JSON body into a transaction.
    ///
    /// No upstream is contacted.
    ///
    /// # Errors
    ///
    /// Returns `OrchestrationError::Validation` with one entry per bad field.
    pub fn validate(body: serde_json::Value) -> OrchestrationResult<TransactionRequest> {
        let raw = RawTransaction::from_json(body)
            .map_err(|e| OrchestrationError::validation(vec![e]))?;
        raw.validate()
            .into_result()
            .map_err(OrchestrationError::validation)
    }

    /// Runs the full pipeline on a raw JSON body.
    ///
    /// # Errors
    ///
    /// See [`OfferPipeline::execute`]; additionally returns
    /// `OrchestrationError::Validation` for an invalid body.
    pub async fn run(
        &self,
        body: serde_json::Value,
        correlation_id: &CorrelationId,
    ) -> OrchestrationResult<PipelineOutcome> {
        let started = Instant::now();
        let transaction = Self::validate(body).inspect_err(|e| {
            info!(
                stage = %PipelineStage::Validating,
                correlation_id = %correlation_id,
                error = %e,
                "Request rejected"
            );
        })?;
        log_stage(PipelineStage::Validating, started, correlation_id);
        self.execute(transaction, correlation_id).await
    }

    /// Runs the pipeline on an already validated transaction.
    ///
    /// # Errors
    ///
    /// - `OrchestrationError::Upstream` - history, prediction or offer call failed
    /// - `OrchestrationError::DeadlineExceeded` - request deadline elapsed
    /// - `OrchestrationError::Internal` - feature invariant violated or task lost
    pub async fn execute(
        &self,
        transaction: TransactionRequest,
        correlation_id: &CorrelationId,
    ) -> OrchestrationResult<PipelineOutcome> {
        let started = Instant::now();
        let member_id = transaction.member_id().clone();

        let decided = match self.config.request_deadline {
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.decide(&transaction, correlation_id))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(OrchestrationError::DeadlineExceeded {
                        deadline_ms: deadline.as_millis() as u64,
                    }),
                }
            }
            None => self.decide(&transaction, correlation_id).await,
        };

        let decided = match decided {
            Ok(decided) => decided,
            Err(e) => {
                warn!(
                    stage = %PipelineStage::Failed,
                    member_id = %member_id,
                    correlation_id = %correlation_id,
                    error_kind = %e.kind(),
                    error = %e,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "Offer pipeline failed"
                );
                return Err(e);
            }
        };

        let persistence_warning = self.persist(&transaction, correlation_id).await;
        let latency = started.elapsed();

        info!(
            stage = %PipelineStage::Completed,
            member_id = %member_id,
            correlation_id = %correlation_id,
            history_len = decided.history_len,
            valid_history_len = decided.valid_history_len,
            offer = %decided.decision.offer(),
            persisted = persistence_warning.is_none(),
            latency_ms = latency.as_millis() as u64,
            "Offer decided"
        );

        Ok(PipelineOutcome {
            decision: decided.decision,
            history_len: decided.history_len,
            valid_history_len: decided.valid_history_len,
            features: decided.features,
            prediction: decided.prediction,
            persistence_warning,
            latency,
        })
    }

    async fn decide(
        &self,
        transaction: &TransactionRequest,
        correlation_id: &CorrelationId,
    ) -> OrchestrationResult<Decided> {
        let member_id = transaction.member_id();

        let stage_started = Instant::now();
        let history = self.history.fetch_history(member_id, correlation_id).await?;
        log_stage(PipelineStage::FetchingHistory, stage_started, correlation_id);

        let stage_started = Instant::now();
        let features = Self::features_for(&history, transaction)?;
        log_stage(PipelineStage::ComputingFeatures, stage_started, correlation_id);

        let stage_started = Instant::now();
        let prediction = self.predict(member_id, features, correlation_id).await?;
        log_stage(PipelineStage::Predicting, stage_started, correlation_id);

        let stage_started = Instant::now();
        let offer = self
            .offers
            .assign_offer(member_id, &prediction, correlation_id)
            .await?;
        log_stage(PipelineStage::AssigningOffer, stage_started, correlation_id);

        Ok(Decided {
            history_len: history.len(),
            valid_history_len: history.valid_transactions().count(),
            features,
            prediction,
            decision: OfferDecision::new(member_id.clone(), offer),
        })
    }

    fn features_for(
        history: &HistoryRecord,
        transaction: &TransactionRequest,
    ) -> OrchestrationResult<FeatureVector> {
        let features = compute_features(history, transaction);
        features
            .check_invariants()
            .map_err(|e| OrchestrationError::internal(e.to_string()))?;
        Ok(features)
    }

    async fn predict(
        &self,
        member_id: &MemberId,
        features: FeatureVector,
        correlation_id: &CorrelationId,
    ) -> OrchestrationResult<PredictionResult> {
        let ats = {
            let predictions = Arc::clone(&self.predictions);
            let member_id = member_id.clone();
            let correlation_id = correlation_id.clone();
            AbortOnDrop(tokio::spawn(async move {
                predictions
                    .predict_ats(&member_id, &features, &correlation_id)
                    .await
            }))
        };
        let resp = {
            let predictions = Arc::clone(&self.predictions);
            let member_id = member_id.clone();
            let correlation_id = correlation_id.clone();
            AbortOnDrop(tokio::spawn(async move {
                predictions
                    .predict_resp(&member_id, &features, &correlation_id)
                    .await
            }))
        };

        join_predictions(ats, resp).await
    }

    async fn persist(
        &self,
        transaction: &TransactionRequest,
        correlation_id: &CorrelationId,
    ) -> Option<PersistenceWarning> {
        let started = Instant::now();
        match self.history.persist(transaction, correlation_id).await {
            Ok(()) => {
                log_stage(PipelineStage::Persisting, started, correlation_id);
                None
            }
            Err(source) => {
                let warning = PersistenceWarning {
                    member_id: transaction.member_id().clone(),
                    source,
                };
                warn!(
                    stage = %PipelineStage::Persisting,
                    correlation_id = %correlation_id,
                    latency_ms = started.elapsed().as_millis() as u64,
                    warning = %warning,
                    "Transaction not persisted"
                );
                Some(warning)
            }
        }
    }
}

/// Waits for both predictions, failing fast on the first error.
async fn join_predictions(
    mut ats: AbortOnDrop<UpstreamResult<f64>>,
    mut resp: AbortOnDrop<UpstreamResult<f64>>,
) -> OrchestrationResult<PredictionResult> {
    let mut ats_value = None;
    let mut resp_value = None;

    while ats_value.is_none() || resp_value.is_none() {
        tokio::select! {
            joined = &mut ats.0, if ats_value.is_none() => {
                ats_value = Some(flatten(joined)?);
            }
            joined = &mut resp.0, if resp_value.is_none() => {
                resp_value = Some(flatten(joined)?);
            }
        }
    }

    match (ats_value, resp_value) {
        (Some(expected_volume), Some(response_probability)) => Ok(PredictionResult::new(
            expected_volume,
            response_probability,
        )),
        _ => Err(OrchestrationError::internal("prediction results missing")),
    }
}

fn flatten(joined: Result<UpstreamResult<f64>, JoinError>) -> OrchestrationResult<f64> {
    match joined {
        Ok(result) => result.map_err(OrchestrationError::from),
        Err(e) => Err(OrchestrationError::internal(format!(
            "prediction task failed: {}",
            e
        ))),
    }
}

fn log_stage(stage: PipelineStage, started: Instant, correlation_id: &CorrelationId) {
    debug!(
        stage = %stage,
        latency_ms = started.elapsed().as_millis() as u64,
        correlation_id = %correlation_id,
        "Stage completed"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::application::error::ErrorKind;
    use crate::domain::value_objects::OfferId;
    use crate::infrastructure::upstream::error::{UpstreamError, UpstreamService};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct FakeHistory {
        entries: Vec<serde_json::Value>,
        fail_fetch: bool,
        fail_persist: bool,
        persisted: Mutex<Vec<TransactionRequest>>,
    }

    #[async_trait]
    impl MemberHistoryStore for FakeHistory {
        async fn fetch_history(
            &self,
            member_id: &MemberId,
            correlation_id: &CorrelationId,
        ) -> UpstreamResult<HistoryRecord> {
            if self.fail_fetch {
                return Err(UpstreamError::failure(
                    UpstreamService::MemberHistory,
                    "/members/x/history",
                    correlation_id,
                    1,
                    Some(500),
                    "boom",
                ));
            }
            Ok(HistoryRecord::from_entries(
                member_id.clone(),
                self.entries.clone(),
            ))
        }

        async fn persist(
            &self,
            transaction: &TransactionRequest,
            correlation_id: &CorrelationId,
        ) -> UpstreamResult<()> {
            if self.fail_persist {
                return Err(UpstreamError::timeout(
                    UpstreamService::MemberHistory,
                    "/members/x/history",
                    correlation_id,
                    3,
                    "down",
                ));
            }
            self.persisted.lock().unwrap().push(transaction.clone());
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FakePredictions {
        ats: Option<f64>,
        resp: Option<f64>,
        resp_delay: Duration,
        resp_calls_finished: Arc<AtomicUsize>,
    }

    impl FakePredictions {
        fn ok(ats: f64, resp: f64) -> Self {
            Self {
                ats: Some(ats),
                resp: Some(resp),
                resp_delay: Duration::ZERO,
                resp_calls_finished: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl PredictionService for FakePredictions {
        async fn predict_ats(
            &self,
            _member_id: &MemberId,
            _features: &FeatureVector,
            correlation_id: &CorrelationId,
        ) -> UpstreamResult<f64> {
            self.ats.ok_or_else(|| {
                UpstreamError::timeout(
                    UpstreamService::Prediction,
                    "/ml/ats/predict",
                    correlation_id,
                    3,
                    "timed out",
                )
            })
        }

        async fn predict_resp(
            &self,
            _member_id: &MemberId,
            _features: &FeatureVector,
            correlation_id: &CorrelationId,
        ) -> UpstreamResult<f64> {
            tokio::time::sleep(self.resp_delay).await;
            self.resp_calls_finished.fetch_add(1, Ordering::SeqCst);
            self.resp.ok_or_else(|| {
                UpstreamError::timeout(
                    UpstreamService::Prediction,
                    "/ml/resp/predict",
                    correlation_id,
                    3,
                    "timed out",
                )
            })
        }
    }

    #[derive(Debug, Default)]
    struct FakeOffers {
        calls: AtomicUsize,
        seen: Mutex<Option<PredictionResult>>,
    }

    #[async_trait]
    impl OfferEngine for FakeOffers {
        async fn assign_offer(
            &self,
            _member_id: &MemberId,
            prediction: &PredictionResult,
            _correlation_id: &CorrelationId,
        ) -> UpstreamResult<OfferId> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock().unwrap() = Some(*prediction);
            Ok(OfferId::parse("OFFER_A").unwrap())
        }
    }

    fn body() -> serde_json::Value {
        json!({
            "memberId": "A0F18FAA",
            "lastTransactionUtcTs": "2019-01-04T17:25:28+00:00",
            "lastTransactionType": "GIFT",
            "lastTransactionPointsBought": 500.0,
            "lastTransactionRevenueUsd": 2.5
        })
    }

    fn pipeline(
        history: Arc<FakeHistory>,
        predictions: Arc<FakePredictions>,
        offers: Arc<FakeOffers>,
    ) -> OfferPipeline {
        OfferPipeline::new(history, predictions, offers, PipelineConfig::default())
    }

    #[tokio::test]
    async fn happy_path_returns_offer_and_persists() {
        let history = Arc::new(FakeHistory::default());
        let offers = Arc::new(FakeOffers::default());
        let p = pipeline(
            Arc::clone(&history),
            Arc::new(FakePredictions::ok(1200.0, 0.8)),
            Arc::clone(&offers),
        );

        let outcome = p.run(body(), &CorrelationId::generate()).await.unwrap();

        assert_eq!(outcome.decision.member_id().as_str(), "A0F18FAA");
        assert_eq!(outcome.decision.offer().as_str(), "OFFER_A");
        assert_eq!(outcome.history_len, 0);
        assert_eq!(outcome.valid_history_len, 0);
        assert!(outcome.persistence_warning.is_none());
        assert_eq!(
            *offers.seen.lock().unwrap(),
            Some(PredictionResult::new(1200.0, 0.8))
        );
        assert_eq!(history.persisted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_body_makes_no_calls() {
        let offers = Arc::new(FakeOffers::default());
        let p = pipeline(
            Arc::new(FakeHistory {
                fail_fetch: true,
                ..FakeHistory::default()
            }),
            Arc::new(FakePredictions::ok(1.0, 1.0)),
            Arc::clone(&offers),
        );

        let err = p
            .run(json!({"memberId": ""}), &CorrelationId::generate())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.fields().iter().any(|f| f.field == "memberId"));
        assert_eq!(offers.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn history_failure_skips_everything_else() {
        let history = Arc::new(FakeHistory {
            fail_fetch: true,
            ..FakeHistory::default()
        });
        let offers = Arc::new(FakeOffers::default());
        let p = pipeline(
            Arc::clone(&history),
            Arc::new(FakePredictions::ok(1.0, 1.0)),
            Arc::clone(&offers),
        );

        let err = p.run(body(), &CorrelationId::generate()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
        assert_eq!(offers.calls.load(Ordering::SeqCst), 0);
        assert!(history.persisted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_prediction_never_reaches_offer_engine() {
        let history = Arc::new(FakeHistory::default());
        let offers = Arc::new(FakeOffers::default());
        let predictions = Arc::new(FakePredictions {
            ats: None,
            resp: Some(0.5),
            resp_delay: Duration::from_millis(300),
            resp_calls_finished: Arc::new(AtomicUsize::new(0)),
        });
        let finished = Arc::clone(&predictions.resp_calls_finished);
        let p = pipeline(Arc::clone(&history), predictions, Arc::clone(&offers));

        let err = p.run(body(), &CorrelationId::generate()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamTimeout);
        assert_eq!(err.status_code(), 504);
        assert_eq!(offers.calls.load(Ordering::SeqCst), 0);
        assert!(history.persisted.lock().unwrap().is_empty());

        // Sibling was aborted before it could finish.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn persistence_failure_is_only_a_warning() {
        let p = pipeline(
            Arc::new(FakeHistory {
                fail_persist: true,
                ..FakeHistory::default()
            }),
            Arc::new(FakePredictions::ok(10.0, 0.1)),
            Arc::new(FakeOffers::default()),
        );

        let outcome = p.run(body(), &CorrelationId::generate()).await.unwrap();
        assert_eq!(outcome.decision.offer().as_str(), "OFFER_A");
        let warning = outcome.persistence_warning.unwrap();
        assert!(warning.source.is_timeout());
    }

    #[tokio::test]
    async fn deadline_maps_to_timeout() {
        let offers = Arc::new(FakeOffers::default());
        let predictions = Arc::new(FakePredictions {
            ats: Some(1.0),
            resp: Some(1.0),
            resp_delay: Duration::from_secs(5),
            resp_calls_finished: Arc::new(AtomicUsize::new(0)),
        });
        let p = OfferPipeline::new(
            Arc::new(FakeHistory::default()),
            predictions,
            Arc::clone(&offers) as Arc<dyn OfferEngine>,
            PipelineConfig::default().with_request_deadline(Duration::from_millis(100)),
        );

        let err = p.run(body(), &CorrelationId::generate()).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::DeadlineExceeded { deadline_ms: 100 }
        ));
        assert_eq!(offers.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn history_feeds_features() {
        let history = Arc::new(FakeHistory {
            entries: vec![
                json!({
                    "memberId": "A0F18FAA",
                    "lastTransactionUtcTs": "2019-01-01 10:00:00",
                    "lastTransactionType": "BUY",
                    "lastTransactionPointsBought": 100.0,
                    "lastTransactionRevenueUsd": 1.5
                }),
                json!({ "lastTransactionType": "BOGUS" }),
            ],
            ..FakeHistory::default()
        });
        let p = pipeline(
            history,
            Arc::new(FakePredictions::ok(1.0, 1.0)),
            Arc::new(FakeOffers::default()),
        );

        let outcome = p.run(body(), &CorrelationId::generate()).await.unwrap();
        assert_eq!(outcome.history_len, 2);
        assert_eq!(outcome.valid_history_len, 1);
        assert_eq!(outcome.features.days_since_last_transaction, 3);
        assert!((outcome.features.pct_buy_transactions - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn stage_names() {
        assert_eq!(PipelineStage::FetchingHistory.to_string(), "fetching_history");
        assert_eq!(PipelineStage::Failed.as_str(), "failed");
    }
}
