//! The transport collaborator contract.
//!
//! forceorm never opens sockets or manages sessions. It talks to the remote
//! object store through a [`Transport`], which issues the two query
//! endpoints and arbitrary follow-up requests on behalf of the core. Any
//! timeout, cancellation, or retry policy belongs to the implementation.

use async_trait::async_trait;
use forceorm_core::{ForceError, ForceResult};
use serde::{Deserialize, Serialize};

/// One raw record as it appears on the wire.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// The envelope key the remote store adds to every record.
pub const ATTRIBUTES_KEY: &str = "attributes";

/// The raw response to a follow-up request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// The HTTP status code.
    pub status: http::StatusCode,
    /// The response body.
    pub body: String,
}

impl TransportResponse {
    /// Creates a `200 OK` response with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: http::StatusCode::OK,
            body: body.into(),
        }
    }

    /// Decodes the body as a [`QueryPage`].
    ///
    /// A non-success status becomes [`ForceError::TransportFailure`]; a body
    /// that does not follow the pagination wire shape becomes
    /// [`ForceError::MalformedResponse`].
    pub fn into_page(self) -> ForceResult<QueryPage> {
        if !self.status.is_success() {
            return Err(ForceError::TransportFailure(format!(
                "remote store answered {}: {}",
                self.status, self.body
            )));
        }
        serde_json::from_str(&self.body)
            .map_err(|e| ForceError::MalformedResponse(format!("invalid page body: {e}")))
    }
}

/// One page of query results.
///
/// Wire shape: `{"records": [...], "done": bool, "nextRecordsUrl": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPage {
    /// The records on this page.
    #[serde(default)]
    pub records: Vec<RawRecord>,
    /// The server's terminal flag.
    pub done: bool,
    /// Path of the next page, present while `done` is `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_records_url: Option<String>,
    /// Total matching records, reported on the first page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
}

impl QueryPage {
    /// A terminal page holding `records`.
    pub fn last(records: Vec<RawRecord>) -> Self {
        Self {
            total_size: Some(records.len() as u64),
            records,
            done: true,
            next_records_url: None,
        }
    }

    /// A non-terminal page holding `records` and pointing at `cursor`.
    pub fn with_cursor(records: Vec<RawRecord>, cursor: impl Into<String>) -> Self {
        Self {
            records,
            done: false,
            next_records_url: Some(cursor.into()),
            total_size: None,
        }
    }
}

/// Which query endpoint a query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Live records only.
    Query,
    /// Live, archived, and soft-deleted records.
    QueryAll,
}

/// The network client used by forceorm.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The authenticated base URL continuation cursors are resolved against.
    fn instance_url(&self) -> &str;

    /// Issues an arbitrary request against an absolute URL.
    async fn request(&self, method: http::Method, url: &str) -> ForceResult<TransportResponse>;

    /// Runs `soql` against the standard query endpoint.
    async fn query(&self, soql: &str) -> ForceResult<QueryPage>;

    /// Runs `soql` against the endpoint that includes archived and deleted
    /// records.
    async fn query_all(&self, soql: &str) -> ForceResult<QueryPage>;

    /// Runs `soql` against `endpoint`.
    async fn query_endpoint(&self, endpoint: Endpoint, soql: &str) -> ForceResult<QueryPage> {
        match endpoint {
            Endpoint::Query => self.query(soql).await,
            Endpoint::QueryAll => self.query_all(soql).await,
        }
    }
}

/// Removes the `attributes` envelope from a raw record.
pub fn strip_attributes(mut record: RawRecord) -> RawRecord {
    record.remove(ATTRIBUTES_KEY);
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    // Transport must stay object-safe; the core only ever holds `dyn Transport`.
    fn _assert_object_safe(_: &dyn Transport) {}

    #[test]
    fn test_page_wire_shape() {
        let page: QueryPage = serde_json::from_str(
            r#"{"totalSize": 3, "done": false, "nextRecordsUrl": "/next1",
                "records": [{"Id": "a"}, {"Id": "b"}]}"#,
        )
        .unwrap();
        assert!(!page.done);
        assert_eq!(page.next_records_url.as_deref(), Some("/next1"));
        assert_eq!(page.total_size, Some(3));
        assert_eq!(page.records.len(), 2);
    }

    #[test]
    fn test_terminal_page_without_cursor() {
        let page: QueryPage = serde_json::from_str(r#"{"done": true, "records": []}"#).unwrap();
        assert!(page.done);
        assert!(page.next_records_url.is_none());
    }

    #[test]
    fn test_into_page_rejects_error_status() {
        let response = TransportResponse {
            status: http::StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".to_string(),
        };
        assert!(matches!(
            response.into_page(),
            Err(ForceError::TransportFailure(_))
        ));
    }

    #[test]
    fn test_into_page_rejects_malformed_body() {
        let response = TransportResponse::ok("<html>");
        assert!(matches!(
            response.into_page(),
            Err(ForceError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_strip_attributes() {
        let record: RawRecord = serde_json::from_str(
            r#"{"attributes": {"type": "Account"}, "Id": "001"}"#,
        )
        .unwrap();
        let stripped = strip_attributes(record);
        assert!(!stripped.contains_key(ATTRIBUTES_KEY));
        assert!(stripped.contains_key("Id"));
    }
}
