//! # Timestamp Value Object
//!
//! UTC instant attached to every member transaction.
//!
//! Upstream stores are not consistent about how they write timestamps, so
//! [`Timestamp::parse_lenient`] accepts the handful of shapes seen in
//! practice and normalises all of them to UTC.
//!
//! # Examples
//!
//! ```
//! use member_offer_orchestrator::domain::value_objects::timestamp::Timestamp;
//!
//! let a = Timestamp::parse_lenient("2019-01-04T17:25:28+00:00").unwrap();
//! let b = Timestamp::parse_lenient("2019-01-04 17:25:28").unwrap();
//! assert_eq!(a, b);
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Naive formats interpreted as UTC.
const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// A UTC timestamp.
///
/// # Invariants
///
/// - Always in UTC timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Parses a timestamp that carries its own offset.
    ///
    /// Accepts RFC 3339 with any offset or a trailing `Z`, plus the doubled
    /// marker `Z+00:00`. Naive timestamps are rejected.
    #[must_use]
    pub fn parse_rfc3339(raw: &str) -> Option<Self> {
        let normalized = raw.trim().replace("Z+00:00", "+00:00");
        DateTime::parse_from_rfc3339(&normalized)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }

    /// Parses a timestamp, tolerating the formats upstream stores emit.
    ///
    /// Accepted inputs:
    /// - RFC 3339 with any offset (`2019-01-04T17:25:28+01:00`)
    /// - trailing `Z` (`2019-01-04T17:25:28Z`)
    /// - the doubled marker `Z+00:00`
    /// - naive `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DDTHH:MM:SS`, taken as UTC
    ///
    /// Returns `None` for blank or unparseable input.
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some(ts) = Self::parse_rfc3339(trimmed) {
            return Some(ts);
        }

        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
            .map(|naive| Self(naive.and_utc()))
    }

    /// Returns the calendar date in UTC.
    #[inline]
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }

    /// Returns whole calendar days from `earlier` to `self`.
    ///
    /// Negative when `earlier` is actually later.
    #[must_use]
    pub fn days_since(&self, earlier: &Self) -> i64 {
        (self.date() - earlier.date()).num_days()
    }

    /// Formats as RFC 3339 with a `+00:00` offset and second precision.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::AutoSi, false)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}
