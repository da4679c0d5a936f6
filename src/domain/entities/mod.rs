//! # Domain Entities
//!
//! Request-scoped business concepts.
//!
//! ## Entities
//!
//! - [`TransactionRequest`]: validated member transaction, built from a [`RawTransaction`]
//! - [`HistoryRecord`]: a member's past transactions, borrowed from the history store
//! - [`PredictionResult`]: the two model scores
//! - [`OfferDecision`]: the offer chosen for a member

pub mod history;
pub mod offer;
pub mod transaction;

pub use history::HistoryRecord;
pub use offer::{OfferDecision, PredictionResult};
pub use transaction::{FieldError, RawTransaction, TransactionRequest, Validation};
