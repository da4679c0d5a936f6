//! # Member History Client
//!
//! HTTP adapter for the member-history store.

use crate::domain::entities::{HistoryRecord, TransactionRequest};
use crate::domain::value_objects::{CorrelationId, MemberId};
use crate::infrastructure::upstream::error::UpstreamResult;
use crate::infrastructure::upstream::http_client::ResilientHttpClient;
use crate::infrastructure::upstream::traits::MemberHistoryStore;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// Member-history store over HTTP.
///
/// - `GET /members/{id}/history`: 404 or an empty body means no history
/// - `POST /members/{id}/history`: any 2xx is accepted
#[derive(Debug, Clone)]
pub struct HttpMemberHistoryStore {
    http: ResilientHttpClient,
}

impl HttpMemberHistoryStore {
    /// Wraps a client configured for the history store.
    #[must_use]
    pub fn new(http: ResilientHttpClient) -> Self {
        Self { http }
    }

    /// The member id is percent-encoded as a single path segment.
    fn history_path(member_id: &MemberId) -> String {
        format!("/members/{}/history", urlencoding::encode(member_id.as_str()))
    }
}

#[async_trait]
impl MemberHistoryStore for HttpMemberHistoryStore {
    async fn fetch_history(
        &self,
        member_id: &MemberId,
        correlation_id: &CorrelationId,
    ) -> UpstreamResult<HistoryRecord> {
        let path = Self::history_path(member_id);
        let response = self.http.get(&path, correlation_id, true).await?;

        if response.is_not_found() || response.is_empty() {
            debug!(
                member_id = %member_id,
                correlation_id = %correlation_id,
                not_found = response.is_not_found(),
                "No history for member"
            );
            return Ok(HistoryRecord::empty(member_id.clone()));
        }

        match response.json::<Value>() {
            Ok(Value::Array(entries)) => {
                Ok(HistoryRecord::from_entries(member_id.clone(), entries))
            }
            Ok(other) => Err(self.http.malformed_payload(
                &path,
                correlation_id,
                &response,
                format!("expected a JSON array, got {}", json_kind(&other)),
            )),
            Err(e) => Err(self
                .http
                .malformed_payload(&path, correlation_id, &response, e.to_string())),
        }
    }

    async fn persist(
        &self,
        transaction: &TransactionRequest,
        correlation_id: &CorrelationId,
    ) -> UpstreamResult<()> {
        let path = Self::history_path(transaction.member_id());
        self.http
            .post_json(&path, transaction, correlation_id)
            .await
            .map(|_| ())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
