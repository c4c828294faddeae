//! A scripted, in-memory transport.
//!
//! [`MockTransport`] answers queries from routes registered up front. A
//! route matches when its needle occurs in the query text; the first match
//! in registration order wins and unmatched queries answer an empty terminal
//! page. Multi-page answers are chained through generated cursors, or
//! scripted cursor by cursor with [`MockTransport::on_follow_up`]. Every
//! call is logged so tests can count round trips.
//!
//! ## Example
//!
//! ```rust
//! use forceorm_test::{record, MockTransport};
//! use serde_json::json;
//!
//! let mock = MockTransport::new().respond(
//!     "FROM Account",
//!     vec![
//!         vec![record("Account", json!({"Id": "001A"}))],
//!         vec![record("Account", json!({"Id": "001B"}))],
//!     ],
//! );
//! assert_eq!(mock.call_count(), 0);
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use forceorm_core::{ForceError, ForceResult};
use forceorm_db::transport::{QueryPage, RawRecord, Transport, TransportResponse};

/// The default instance URL of a mock.
pub const MOCK_INSTANCE_URL: &str = "https://mock.my.example.com";

const QUERY_PATH: &str = "/services/data/v60.0/query";

/// Which transport entry point a call went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    /// The standard query endpoint.
    Query,
    /// The endpoint including archived and deleted records.
    QueryAll,
    /// A follow-up request.
    Request(http::Method),
}

/// One logged transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportCall {
    /// The entry point.
    pub kind: CallKind,
    /// The query text, or the URL of a follow-up request.
    pub target: String,
}

#[derive(Debug)]
enum Answer {
    Page(QueryPage),
    Failure(String),
}

#[derive(Debug, Default)]
struct MockState {
    routes: Vec<(String, Answer)>,
    follow_ups: HashMap<String, TransportResponse>,
    calls: Vec<TransportCall>,
    chains: usize,
}

/// An in-memory [`Transport`] driven by scripted routes.
#[derive(Debug)]
pub struct MockTransport {
    instance_url: String,
    state: Mutex<MockState>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a mock with no routes.
    pub fn new() -> Self {
        Self {
            instance_url: MOCK_INSTANCE_URL.to_string(),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Overrides the instance URL.
    #[must_use]
    pub fn with_instance_url(mut self, url: impl Into<String>) -> Self {
        self.instance_url = url.into();
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answers queries containing `needle` with `pages`, chained through
    /// generated cursors. No pages means one empty terminal page.
    #[must_use]
    pub fn respond(self, needle: &str, pages: Vec<Vec<RawRecord>>) -> Self {
        {
            let mut state = self.state();
            state.chains += 1;
            let chain = state.chains;
            let total = pages.iter().map(Vec::len).sum::<usize>() as u64;
            let count = pages.len();

            let mut first = None;
            for (index, records) in pages.into_iter().enumerate() {
                let page = if index + 1 == count {
                    QueryPage::last(records)
                } else {
                    QueryPage::with_cursor(records, format!("{QUERY_PATH}/01g{chain}-{}", index + 1))
                };
                if index == 0 {
                    first = Some(page);
                } else {
                    let url = format!("{}{QUERY_PATH}/01g{chain}-{index}", self.instance_url);
                    let body = serde_json::to_string(&page).unwrap_or_default();
                    state.follow_ups.insert(url, TransportResponse::ok(body));
                }
            }
            let mut first = first.unwrap_or_else(|| QueryPage::last(Vec::new()));
            first.total_size = Some(total);
            state.routes.push((needle.to_string(), Answer::Page(first)));
        }
        self
    }

    /// Answers queries containing `needle` with exactly `page`.
    #[must_use]
    pub fn on_query(self, needle: &str, page: QueryPage) -> Self {
        self.state()
            .routes
            .push((needle.to_string(), Answer::Page(page)));
        self
    }

    /// Answers the follow-up request for `cursor` with `page`.
    #[must_use]
    pub fn on_follow_up(self, cursor: &str, page: QueryPage) -> Self {
        let url = format!("{}{cursor}", self.instance_url);
        let body = serde_json::to_string(&page).unwrap_or_default();
        self.state()
            .follow_ups
            .insert(url, TransportResponse::ok(body));
        self
    }

    /// Answers the follow-up request for `cursor` with a raw response.
    #[must_use]
    pub fn on_follow_up_response(self, cursor: &str, response: TransportResponse) -> Self {
        let url = format!("{}{cursor}", self.instance_url);
        self.state().follow_ups.insert(url, response);
        self
    }

    /// Fails queries containing `needle` with a transport failure.
    #[must_use]
    pub fn fail_on(self, needle: &str, message: &str) -> Self {
        self.state()
            .routes
            .push((needle.to_string(), Answer::Failure(message.to_string())));
        self
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state().calls.clone()
    }

    /// The number of calls so far.
    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    /// The query text of every query call so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c.kind, CallKind::Query | CallKind::QueryAll))
            .map(|c| c.target.clone())
            .collect()
    }

    /// Clears the call log.
    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }

    fn answer(&self, kind: CallKind, soql: &str) -> ForceResult<QueryPage> {
        let mut state = self.state();
        state.calls.push(TransportCall {
            kind,
            target: soql.to_string(),
        });
        let answer = state
            .routes
            .iter()
            .find(|(needle, _)| soql.contains(needle.as_str()))
            .map(|(_, answer)| answer);
        match answer {
            Some(Answer::Page(page)) => Ok(page.clone()),
            Some(Answer::Failure(message)) => Err(ForceError::TransportFailure(message.clone())),
            None => Ok(QueryPage::last(Vec::new())),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn instance_url(&self) -> &str {
        &self.instance_url
    }

    async fn request(&self, method: http::Method, url: &str) -> ForceResult<TransportResponse> {
        let mut state = self.state();
        state.calls.push(TransportCall {
            kind: CallKind::Request(method),
            target: url.to_string(),
        });
        state
            .follow_ups
            .get(url)
            .cloned()
            .ok_or_else(|| ForceError::TransportFailure(format!("no route for {url}")))
    }

    async fn query(&self, soql: &str) -> ForceResult<QueryPage> {
        self.answer(CallKind::Query, soql)
    }

    async fn query_all(&self, soql: &str) -> ForceResult<QueryPage> {
        self.answer(CallKind::QueryAll, soql)
    }
}

/// Builds a raw record of `object` from a JSON object, adding the
/// `attributes` envelope the remote store sends.
pub fn record(object: &str, fields: serde_json::Value) -> RawRecord {
    let mut raw = RawRecord::new();
    let id = fields.get("Id").and_then(serde_json::Value::as_str).unwrap_or("");
    raw.insert(
        "attributes".to_string(),
        serde_json::json!({
            "type": object,
            "url": format!("/services/data/v60.0/sobjects/{object}/{id}"),
        }),
    );
    if let serde_json::Value::Object(map) = fields {
        raw.extend(map);
    }
    raw
}
