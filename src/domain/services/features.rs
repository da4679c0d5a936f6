//! # Feature Computation
//!
//! Derives the model input vector from a member's history and the current
//! transaction.
//!
//! [`compute_features`] is pure: no I/O, no clock, no randomness. The only
//! notion of "now" is the current transaction's own timestamp, so two calls
//! with identical inputs always produce bit-identical vectors.
//!
//! # Examples
//!
//! ```
//! use member_offer_orchestrator::domain::entities::{HistoryRecord, TransactionRequest};
//! use member_offer_orchestrator::domain::services::features::compute_features;
//! use member_offer_orchestrator::domain::value_objects::TransactionType;
//!
//! let tx = TransactionRequest::try_new(
//!     "A0F18FAA", "2019-01-04T17:25:28+00:00", TransactionType::Gift, 500.0, 2.5,
//! ).unwrap();
//! let history = HistoryRecord::empty(tx.member_id().clone());
//!
//! let features = compute_features(&history, &tx);
//! assert_eq!(features.pct_gift_transactions, 1.0);
//! assert_eq!(features.days_since_last_transaction, 0);
//! ```

use crate::domain::entities::{HistoryRecord, TransactionRequest};
use crate::domain::value_objects::TransactionType;
use serde::Serialize;
use thiserror::Error;

/// Number of most recent transactions used by the `LAST_3_*` features.
pub const RECENT_WINDOW: usize = 3;

/// Tolerance used when checking that type percentages sum to one.
const PCT_SUM_TOLERANCE: f64 = 1e-9;

/// Model input features, serialized with the names the prediction service
/// expects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct FeatureVector {
    /// Mean points bought over history plus the current transaction.
    pub avg_points_bought: f64,
    /// Mean revenue over history plus the current transaction.
    pub avg_revenue_usd: f64,
    /// Mean points bought over the three most recent transactions.
    #[serde(rename = "LAST_3_TRANSACTIONS_AVG_POINTS_BOUGHT")]
    pub last_3_transactions_avg_points_bought: f64,
    /// Mean revenue over the three most recent transactions.
    #[serde(rename = "LAST_3_TRANSACTIONS_AVG_REVENUE_USD")]
    pub last_3_transactions_avg_revenue_usd: f64,
    /// Share of BUY transactions.
    pub pct_buy_transactions: f64,
    /// Share of GIFT transactions.
    pub pct_gift_transactions: f64,
    /// Share of REDEEM transactions.
    pub pct_redeem_transactions: f64,
    /// Calendar days between the latest past transaction and the current one.
    pub days_since_last_transaction: i64,
}

/// A computed vector broke one of its own invariants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureInvariantError {
    /// A feature is NaN or infinite.
    #[error("feature {name} is not finite ({value})")]
    NotFinite {
        /// Feature name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// A percentage lies outside `[0, 1]` or the shares do not sum to one.
    #[error("transaction type shares are inconsistent: {0}")]
    InconsistentShares(String),

    /// Recency went negative.
    #[error("days since last transaction is negative ({0})")]
    NegativeRecency(i64),
}

impl FeatureVector {
    /// Returns `(name, value)` pairs in wire order.
    #[must_use]
    pub fn named_values(&self) -> [(&'static str, f64); 8] {
        [
            ("AVG_POINTS_BOUGHT", self.avg_points_bought),
            ("AVG_REVENUE_USD", self.avg_revenue_usd),
            (
                "LAST_3_TRANSACTIONS_AVG_POINTS_BOUGHT",
                self.last_3_transactions_avg_points_bought,
            ),
            (
                "LAST_3_TRANSACTIONS_AVG_REVENUE_USD",
                self.last_3_transactions_avg_revenue_usd,
            ),
            ("PCT_BUY_TRANSACTIONS", self.pct_buy_transactions),
            ("PCT_GIFT_TRANSACTIONS", self.pct_gift_transactions),
            ("PCT_REDEEM_TRANSACTIONS", self.pct_redeem_transactions),
            (
                "DAYS_SINCE_LAST_TRANSACTION",
                self.days_since_last_transaction as f64,
            ),
        ]
    }

    /// Looks up a feature by its wire name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.named_values()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    /// Checks the vector's internal invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn check_invariants(&self) -> Result<(), FeatureInvariantError> {
        for (name, value) in self.named_values() {
            if !value.is_finite() {
                return Err(FeatureInvariantError::NotFinite { name, value });
            }
        }

        let shares = [
            self.pct_buy_transactions,
            self.pct_gift_transactions,
            self.pct_redeem_transactions,
        ];
        if shares.iter().any(|s| !(0.0..=1.0).contains(s)) {
            return Err(FeatureInvariantError::InconsistentShares(format!(
                "share outside [0, 1]: {:?}",
                shares
            )));
        }
        let total: f64 = shares.iter().sum();
        if (total - 1.0).abs() > PCT_SUM_TOLERANCE {
            return Err(FeatureInvariantError::InconsistentShares(format!(
                "shares sum to {}",
                total
            )));
        }

        if self.days_since_last_transaction < 0 {
            return Err(FeatureInvariantError::NegativeRecency(
                self.days_since_last_transaction,
            ));
        }

        Ok(())
    }
}

/// Computes the feature vector for `current` given the member's `history`.
///
/// Aggregates cover every well-formed history entry plus `current`;
/// malformed history entries are skipped. With an empty history the vector
/// describes `current` alone and recency is zero.
#[must_use]
pub fn compute_features(history: &HistoryRecord, current: &TransactionRequest) -> FeatureVector {
    let past: Vec<TransactionRequest> = history.valid_transactions().collect();

    let latest_past = past.iter().map(TransactionRequest::timestamp).max();
    let days_since_last_transaction = latest_past
        .map(|ts| current.timestamp().days_since(&ts).max(0))
        .unwrap_or(0);

    let mut all: Vec<&TransactionRequest> = past.iter().collect();
    all.push(current);

    let count = all.len() as f64;
    let mut total_points = 0.0;
    let mut total_revenue = 0.0;
    let mut buys = 0u32;
    let mut gifts = 0u32;
    let mut redeems = 0u32;

    for tx in &all {
        total_points += tx.points_bought();
        total_revenue += tx.revenue_usd();
        match tx.transaction_type() {
            TransactionType::Buy => buys += 1,
            TransactionType::Gift => gifts += 1,
            TransactionType::Redeem => redeems += 1,
        }
    }

    // Stable sort: ties keep history order, current last.
    let mut recent = all.clone();
    recent.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
    recent.truncate(RECENT_WINDOW);
    let recent_count = recent.len() as f64;
    let recent_points: f64 = recent.iter().map(|tx| tx.points_bought()).sum();
    let recent_revenue: f64 = recent.iter().map(|tx| tx.revenue_usd()).sum();

    FeatureVector {
        avg_points_bought: total_points / count,
        avg_revenue_usd: total_revenue / count,
        last_3_transactions_avg_points_bought: recent_points / recent_count,
        last_3_transactions_avg_revenue_usd: recent_revenue / recent_count,
        pct_buy_transactions: f64::from(buys) / count,
        pct_gift_transactions: f64::from(gifts) / count,
        pct_redeem_transactions: f64::from(redeems) / count,
        days_since_last_transaction,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::domain::value_objects::MemberId;
    use proptest::prelude::*;
    use serde_json::json;

    fn tx(ts: &str, ty: TransactionType, points: f64, revenue: f64) -> TransactionRequest {
        TransactionRequest::try_new("A0", ts, ty, points, revenue).unwrap()
    }

    fn history_of(entries: Vec<serde_json::Value>) -> HistoryRecord {
        HistoryRecord::from_entries(MemberId::parse("A0").unwrap(), entries)
    }

    fn entry(ts: &str, ty: &str, points: f64, revenue: f64) -> serde_json::Value {
        json!({
            "memberId": "A0",
            "lastTransactionUtcTs": ts,
            "lastTransactionType": ty,
            "lastTransactionPointsBought": points,
            "lastTransactionRevenueUsd": revenue
        })
    }

    #[test]
    fn aggregates_over_history_and_current() {
        let history = history_of(vec![
            entry("2019-01-01T00:00:00+00:00", "BUY", 100.0, 10.0),
            entry("2019-01-02T00:00:00+00:00", "GIFT", 200.0, 0.0),
            entry("2019-01-03T00:00:00+00:00", "REDEEM", -50.0, 0.0),
        ]);
        let current = tx("2019-01-04T00:00:00+00:00", TransactionType::Buy, 300.0, 30.0);

        let f = compute_features(&history, &current);

        assert_eq!(f.avg_points_bought, (100.0 + 200.0 - 50.0 + 300.0) / 4.0);
        assert_eq!(f.avg_revenue_usd, (10.0 + 0.0 + 0.0 + 30.0) / 4.0);
        assert_eq!(
            f.last_3_transactions_avg_points_bought,
            (200.0 - 50.0 + 300.0) / 3.0
        );
        assert_eq!(f.last_3_transactions_avg_revenue_usd, (0.0 + 0.0 + 30.0) / 3.0);
        assert_eq!(f.pct_buy_transactions, 2.0 / 4.0);
        assert_eq!(f.pct_gift_transactions, 1.0 / 4.0);
        assert_eq!(f.pct_redeem_transactions, 1.0 / 4.0);
        assert_eq!(f.days_since_last_transaction, 1);
        assert!(f.check_invariants().is_ok());
    }

    #[test]
    fn empty_history_yields_baseline_vector() {
        let current = tx("2019-01-04T17:25:28+00:00", TransactionType::Gift, 500.0, 2.5);
        let f = compute_features(&history_of(vec![]), &current);

        assert_eq!(f.avg_points_bought, 500.0);
        assert_eq!(f.avg_revenue_usd, 2.5);
        assert_eq!(f.last_3_transactions_avg_points_bought, 500.0);
        assert_eq!(f.pct_buy_transactions, 0.0);
        assert_eq!(f.pct_gift_transactions, 1.0);
        assert_eq!(f.pct_redeem_transactions, 0.0);
        assert_eq!(f.days_since_last_transaction, 0);
        assert!(f.check_invariants().is_ok());
    }

    #[test]
    fn unordered_history_is_sorted_for_recency() {
        let history = history_of(vec![
            entry("2019-01-03T00:00:00Z", "BUY", 30.0, 0.0),
            entry("2018-12-01T00:00:00Z", "BUY", 1000.0, 0.0),
            entry("2019-01-02T00:00:00Z", "BUY", 20.0, 0.0),
        ]);
        let current = tx("2019-01-10T00:00:00Z", TransactionType::Buy, 10.0, 0.0);
        let f = compute_features(&history, &current);

        assert_eq!(f.last_3_transactions_avg_points_bought, (10.0 + 30.0 + 20.0) / 3.0);
        assert_eq!(f.days_since_last_transaction, 7);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let history = history_of(vec![
            entry("2019-01-01T00:00:00Z", "BUY", 100.0, 1.0),
            json!({ "lastTransactionUtcTs": "garbage" }),
            json!(42),
            entry("2019-01-02T00:00:00Z", "TRANSFER", 5.0, 1.0),
        ]);
        let current = tx("2019-01-02T00:00:00Z", TransactionType::Gift, 300.0, 3.0);
        let f = compute_features(&history, &current);

        assert_eq!(f.avg_points_bought, 200.0);
        assert_eq!(f.pct_buy_transactions, 0.5);
        assert_eq!(f.days_since_last_transaction, 1);
    }

    #[test]
    fn history_after_current_saturates_recency_at_zero() {
        let history = history_of(vec![entry("2019-02-01T00:00:00Z", "BUY", 1.0, 1.0)]);
        let current = tx("2019-01-01T00:00:00Z", TransactionType::Buy, 1.0, 1.0);
        assert_eq!(compute_features(&history, &current).days_since_last_transaction, 0);
    }

    #[test]
    fn serializes_with_model_feature_names() {
        let current = tx("2019-01-04T17:25:28+00:00", TransactionType::Gift, 500.0, 2.5);
        let f = compute_features(&history_of(vec![]), &current);
        let v = serde_json::to_value(f).unwrap();
        let keys: Vec<&str> = v.as_object().unwrap().keys().map(String::as_str).collect();
        for (name, _) in f.named_values() {
            assert!(keys.contains(&name), "missing {}", name);
        }
        assert_eq!(v["DAYS_SINCE_LAST_TRANSACTION"], 0);
    }

    #[test]
    fn invariant_check_flags_non_finite() {
        let current = tx("2019-01-04T17:25:28+00:00", TransactionType::Gift, 500.0, 2.5);
        let mut f = compute_features(&history_of(vec![]), &current);
        f.avg_points_bought = f64::INFINITY;
        assert!(matches!(
            f.check_invariants(),
            Err(FeatureInvariantError::NotFinite { name: "AVG_POINTS_BOUGHT", .. })
        ));
    }

    #[test]
    fn get_by_name() {
        let current = tx("2019-01-04T17:25:28+00:00", TransactionType::Buy, 500.0, 2.5);
        let f = compute_features(&history_of(vec![]), &current);
        assert_eq!(f.get("PCT_BUY_TRANSACTIONS"), Some(1.0));
        assert_eq!(f.get("UNKNOWN"), None);
    }

    fn arb_entry() -> impl Strategy<Value = serde_json::Value> {
        (
            0i64..3_000,
            prop_oneof![Just("BUY"), Just("GIFT"), Just("REDEEM"), Just("BOGUS")],
            -1_000.0f64..10_000.0,
            0.0f64..500.0,
        )
            .prop_map(|(day, ty, points, revenue)| {
                let ts = chrono::DateTime::from_timestamp(1_500_000_000 + day * 86_400, 0)
                    .unwrap()
                    .to_rfc3339();
                entry(&ts, ty, points, revenue)
            })
    }

    proptest! {
        #[test]
        fn computation_is_deterministic(
            entries in proptest::collection::vec(arb_entry(), 0..20),
            points in 0.0f64..10_000.0,
            revenue in 0.0f64..500.0,
        ) {
            let history = history_of(entries);
            let current = tx("2024-06-01T12:00:00Z", TransactionType::Buy, points, revenue);

            let first = compute_features(&history, &current);
            let second = compute_features(&history, &current);

            for ((_, a), (_, b)) in first.named_values().iter().zip(second.named_values().iter()) {
                prop_assert_eq!(a.to_bits(), b.to_bits());
            }
            prop_assert!(first.check_invariants().is_ok());
        }
    }
}
