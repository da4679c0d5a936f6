//! # Value Objects
//!
//! Immutable types with validation and domain semantics.
//!
//! ## Identity Types
//!
//! - [`MemberId`], [`OfferId`]: non-empty string identifiers
//! - [`CorrelationId`]: per-request trace identifier
//!
//! ## Time
//!
//! - [`Timestamp`]: UTC instant with lenient parsing
//!
//! ## Domain Enums
//!
//! - [`TransactionType`]: BUY, GIFT or REDEEM

pub mod enums;
pub mod ids;
pub mod timestamp;

pub use enums::{ParseEnumError, TransactionType};
pub use ids::{CorrelationId, MemberId, OfferId};
pub use timestamp::Timestamp;
