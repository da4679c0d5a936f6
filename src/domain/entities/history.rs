//! # History Record
//!
//! A member's past transactions as returned by the member-history store.
//!
//! The store owns this data; the orchestrator only borrows it for the length
//! of one request. Entries are kept exactly as received and interpreted
//! lazily, so one bad row never invalidates the rest of the record.

use crate::domain::entities::transaction::{FieldError, RawTransaction, TransactionRequest};
use crate::domain::value_objects::MemberId;
use serde_json::Value;

/// Past transactions of one member.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    member_id: MemberId,
    entries: Vec<Value>,
}

impl HistoryRecord {
    /// Creates an empty history, used when the store has nothing for a member.
    #[must_use]
    pub fn empty(member_id: MemberId) -> Self {
        Self {
            member_id,
            entries: Vec::new(),
        }
    }

    /// Creates a history from raw store entries.
    #[must_use]
    pub fn from_entries(member_id: MemberId, entries: Vec<Value>) -> Self {
        Self { member_id, entries }
    }

    /// Returns the owning member.
    #[inline]
    #[must_use]
    pub fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    /// Returns the number of raw entries, including malformed ones.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store returned no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Interprets every entry, yielding either a transaction or the reasons
    /// it was rejected.
    pub fn entries(
        &self,
    ) -> impl Iterator<Item = Result<TransactionRequest, Vec<FieldError>>> + '_ {
        self.entries.iter().map(move |value| {
            RawTransaction::from_json(value.clone())
                .map_err(|e| vec![e])
                .and_then(|raw| raw.validate_history_entry(&self.member_id).into_result())
        })
    }

    /// Returns only the entries that are well formed.
    pub fn valid_transactions(&self) -> impl Iterator<Item = TransactionRequest> + '_ {
        self.entries().filter_map(Result::ok)
    }
}
