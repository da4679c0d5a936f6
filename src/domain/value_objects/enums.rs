//! # Domain Enums
//!
//! Enumeration types for domain concepts.
//!
//! - [`TransactionType`] - Category of a member's loyalty transaction
//!
//! All enums implement `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`,
//! `Display`, `FromStr`, and Serde traits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of a loyalty transaction.
///
/// # Examples
///
/// ```
/// use member_offer_orchestrator::domain::value_objects::enums::TransactionType;
///
/// let gift: TransactionType = "gift".parse().unwrap();
/// assert_eq!(gift, TransactionType::Gift);
/// assert_eq!(gift.to_string(), "GIFT");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum TransactionType {
    /// Points purchased by the member.
    Buy = 0,
    /// Points gifted to or by the member.
    Gift = 1,
    /// Points redeemed against a reward.
    Redeem = 2,
}

impl TransactionType {
    /// Returns the wire representation.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Gift => "GIFT",
            Self::Redeem => "REDEEM",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "GIFT" => Ok(Self::Gift),
            "REDEEM" => Ok(Self::Redeem),
            _ => Err(ParseEnumError::InvalidValue(
                "TransactionType",
                s.to_string(),
            )),
        }
    }
}

/// Error type for parsing enum values from strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEnumError {
    /// The provided string value is not valid for the enum.
    InvalidValue(&'static str, String),
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue(enum_name, value) => {
                write!(f, "invalid {} value: '{}'", enum_name, value)
            }
        }
    }
}

impl std::error::Error for ParseEnumError {}
