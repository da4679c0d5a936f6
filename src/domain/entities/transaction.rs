//! # Transaction Entity
//!
//! The member transaction that drives one orchestration request.
//!
//! Inbound JSON is first captured as a [`RawTransaction`], a loosely typed
//! mirror of the wire shape, and only then validated into an immutable
//! [`TransactionRequest`]. Keeping the two apart lets validation report every
//! bad field at once instead of stopping at the first deserializer error.
//!
//! # Examples
//!
//! ```
//! use member_offer_orchestrator::domain::entities::transaction::{RawTransaction, Validation};
//! use serde_json::json;
//!
//! let raw = RawTransaction::from_json(json!({
//!     "memberId": "A0F18FAA",
//!     "lastTransactionUtcTs": "2019-01-04T17:25:28+00:00",
//!     "lastTransactionType": "GIFT",
//!     "lastTransactionPointsBought": 500.0,
//!     "lastTransactionRevenueUsd": 2.5
//! }))
//! .unwrap();
//!
//! assert!(matches!(raw.validate(), Validation::Valid(_)));
//! ```

use crate::domain::value_objects::{MemberId, Timestamp, TransactionType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Wire name of the member ID field.
pub const FIELD_MEMBER_ID: &str = "memberId";
/// Wire name of the timestamp field.
pub const FIELD_TIMESTAMP: &str = "lastTransactionUtcTs";
/// Wire name of the transaction type field.
pub const FIELD_TYPE: &str = "lastTransactionType";
/// Wire name of the points field.
pub const FIELD_POINTS: &str = "lastTransactionPointsBought";
/// Wire name of the revenue field.
pub const FIELD_REVENUE: &str = "lastTransactionRevenueUsd";

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Wire name of the offending field.
    pub field: String,
    /// Human-readable reason.
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Outcome of validating untrusted input.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation<T> {
    /// Input passed every check.
    Valid(T),
    /// Input failed one or more checks; never empty.
    Invalid(Vec<FieldError>),
}

impl<T> Validation<T> {
    /// Converts into a `Result`, keeping the full error list.
    ///
    /// # Errors
    ///
    /// Returns the field errors when the input was invalid.
    pub fn into_result(self) -> Result<T, Vec<FieldError>> {
        match self {
            Self::Valid(value) => Ok(value),
            Self::Invalid(errors) => Err(errors),
        }
    }
}

/// Unvalidated wire form of a transaction.
///
/// Every field is optional and kept as raw JSON so that wrong types become
/// field errors rather than a rejected body. The revenue field also accepts
/// the `lastTransactionRevenueUSD` spelling used by CSV exports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    /// Member identifier.
    pub member_id: Option<Value>,
    /// Transaction timestamp.
    pub last_transaction_utc_ts: Option<Value>,
    /// Transaction category.
    pub last_transaction_type: Option<Value>,
    /// Points bought in the transaction.
    pub last_transaction_points_bought: Option<Value>,
    /// Revenue in USD.
    #[serde(alias = "lastTransactionRevenueUSD")]
    pub last_transaction_revenue_usd: Option<Value>,
}

/// How strictly a transaction is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strictness {
    /// Inbound requests: offset-bearing timestamps, non-negative amounts.
    Inbound,
    /// Stored history: naive timestamps as UTC, any finite amount.
    History,
}

impl RawTransaction {
    /// Captures a JSON value as a raw transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] on `body` when the value is not a JSON object.
    pub fn from_json(value: Value) -> Result<Self, FieldError> {
        if !value.is_object() {
            return Err(FieldError::new("body", "must be a JSON object"));
        }
        serde_json::from_value(value).map_err(|e| FieldError::new("body", e.to_string()))
    }

    /// Validates an inbound request.
    ///
    /// Requires a non-empty member ID that can stand as a URL path segment,
    /// a timezone-aware timestamp, a known transaction type and non-negative
    /// finite amounts.
    #[must_use]
    pub fn validate(&self) -> Validation<TransactionRequest> {
        let mut errors = Vec::new();
        let member_id = match self.member_id.as_ref() {
            Some(Value::String(s)) => match MemberId::parse(s) {
                Some(id) if matches!(id.as_str(), "." | "..") => {
                    errors.push(FieldError::new(FIELD_MEMBER_ID, "must not be '.' or '..'"));
                    None
                }
                Some(id) => Some(id),
                None => {
                    errors.push(FieldError::new(FIELD_MEMBER_ID, "must not be empty"));
                    None
                }
            },
            Some(_) => {
                errors.push(FieldError::new(FIELD_MEMBER_ID, "must be a string"));
                None
            }
            None => {
                errors.push(FieldError::new(FIELD_MEMBER_ID, "is required"));
                None
            }
        };
        self.finish(member_id, Strictness::Inbound, errors)
    }

    /// Validates an entry returned by the member-history store.
    ///
    /// Looser than [`validate`](Self::validate): amounts may be negative
    /// (redemptions are recorded that way), naive timestamps are read as UTC
    /// and a missing member ID is taken to be `owner`. An entry naming a
    /// different member is rejected.
    #[must_use]
    pub fn validate_history_entry(&self, owner: &MemberId) -> Validation<TransactionRequest> {
        let mut errors = Vec::new();
        let member_id = match self.member_id.as_ref() {
            None | Some(Value::Null) => Some(owner.clone()),
            Some(Value::String(s)) => match MemberId::parse(s) {
                Some(id) if &id == owner => Some(id),
                Some(_) => {
                    errors.push(FieldError::new(FIELD_MEMBER_ID, "belongs to another member"));
                    None
                }
                None => Some(owner.clone()),
            },
            Some(_) => {
                errors.push(FieldError::new(FIELD_MEMBER_ID, "must be a string"));
                None
            }
        };
        self.finish(member_id, Strictness::History, errors)
    }

    fn finish(
        &self,
        member_id: Option<MemberId>,
        strictness: Strictness,
        mut errors: Vec<FieldError>,
    ) -> Validation<TransactionRequest> {
        let timestamp = match self.last_transaction_utc_ts.as_ref() {
            Some(Value::String(s)) => {
                let parsed = match strictness {
                    Strictness::Inbound => Timestamp::parse_rfc3339(s),
                    Strictness::History => Timestamp::parse_lenient(s),
                };
                if parsed.is_none() {
                    let message = if Timestamp::parse_lenient(s).is_some() {
                        "must include a UTC offset or 'Z'"
                    } else {
                        "is not a valid timestamp"
                    };
                    errors.push(FieldError::new(FIELD_TIMESTAMP, message));
                }
                parsed
            }
            Some(Value::Null) | None => {
                errors.push(FieldError::new(FIELD_TIMESTAMP, "is required"));
                None
            }
            Some(_) => {
                errors.push(FieldError::new(FIELD_TIMESTAMP, "must be a string"));
                None
            }
        };

        let transaction_type = match self.last_transaction_type.as_ref() {
            Some(Value::String(s)) => match s.parse::<TransactionType>() {
                Ok(t) => Some(t),
                Err(_) => {
                    errors.push(FieldError::new(
                        FIELD_TYPE,
                        format!("must be one of BUY, GIFT, REDEEM (got '{}')", s),
                    ));
                    None
                }
            },
            Some(Value::Null) | None => {
                errors.push(FieldError::new(FIELD_TYPE, "is required"));
                None
            }
            Some(_) => {
                errors.push(FieldError::new(FIELD_TYPE, "must be a string"));
                None
            }
        };

        let points = check_amount(
            FIELD_POINTS,
            self.last_transaction_points_bought.as_ref(),
            strictness,
            &mut errors,
        );
        let revenue = check_amount(
            FIELD_REVENUE,
            self.last_transaction_revenue_usd.as_ref(),
            strictness,
            &mut errors,
        );

        match (member_id, timestamp, transaction_type, points, revenue) {
            (Some(member_id), Some(timestamp), Some(transaction_type), Some(points), Some(revenue))
                if errors.is_empty() =>
            {
                Validation::Valid(TransactionRequest {
                    member_id,
                    last_transaction_utc_ts: timestamp,
                    last_transaction_type: transaction_type,
                    last_transaction_points_bought: points,
                    last_transaction_revenue_usd: revenue,
                })
            }
            _ => Validation::Invalid(errors),
        }
    }
}

fn check_amount(
    field: &'static str,
    value: Option<&Value>,
    strictness: Strictness,
    errors: &mut Vec<FieldError>,
) -> Option<f64> {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().replace(',', "").parse::<f64>().ok(),
        Some(Value::Null) | None => {
            errors.push(FieldError::new(field, "is required"));
            return None;
        }
        Some(_) => None,
    };

    match parsed {
        Some(v) if !v.is_finite() => {
            errors.push(FieldError::new(field, "must be a finite number"));
            None
        }
        Some(v) if strictness == Strictness::Inbound && v < 0.0 => {
            errors.push(FieldError::new(field, "must not be negative"));
            None
        }
        Some(v) => Some(v),
        None => {
            errors.push(FieldError::new(field, "must be a number"));
            None
        }
    }
}

/// A validated member transaction.
///
/// # Invariants
///
/// - `member_id` is non-empty
/// - the timestamp is normalised to UTC
/// - amounts are finite (and non-negative for inbound requests)
///
/// Fields are private; the only way in is through validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    member_id: MemberId,
    last_transaction_utc_ts: Timestamp,
    last_transaction_type: TransactionType,
    last_transaction_points_bought: f64,
    last_transaction_revenue_usd: f64,
}

impl TransactionRequest {
    /// Builds and validates a transaction from typed parts.
    ///
    /// # Errors
    ///
    /// Returns the field errors produced by [`RawTransaction::validate`].
    pub fn try_new(
        member_id: &str,
        timestamp: &str,
        transaction_type: TransactionType,
        points_bought: f64,
        revenue_usd: f64,
    ) -> Result<Self, Vec<FieldError>> {
        let raw = RawTransaction {
            member_id: Some(Value::from(member_id)),
            last_transaction_utc_ts: Some(Value::from(timestamp)),
            last_transaction_type: Some(Value::from(transaction_type.as_str())),
            last_transaction_points_bought: Some(number_value(points_bought)),
            last_transaction_revenue_usd: Some(number_value(revenue_usd)),
        };
        raw.validate().into_result()
    }

    /// Returns the member ID.
    #[inline]
    #[must_use]
    pub fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    /// Returns the transaction timestamp.
    #[inline]
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.last_transaction_utc_ts
    }

    /// Returns the transaction type.
    #[inline]
    #[must_use]
    pub fn transaction_type(&self) -> TransactionType {
        self.last_transaction_type
    }

    /// Returns the points bought.
    #[inline]
    #[must_use]
    pub fn points_bought(&self) -> f64 {
        self.last_transaction_points_bought
    }

    /// Returns the revenue in USD.
    #[inline]
    #[must_use]
    pub fn revenue_usd(&self) -> f64 {
        self.last_transaction_revenue_usd
    }
}

fn number_value(v: f64) -> Value {
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}
