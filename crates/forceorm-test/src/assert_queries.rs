//! Query counting assertions.
//!
//! [`assert_num_queries`] counts the queries a [`MockTransport`] answers
//! during an async closure, follow-up page requests included, and asserts
//! the count matches. This is how tests pin eager loading to one query per
//! relation level instead of one per parent.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use forceorm_test::assert_queries::assert_num_queries;
//! use forceorm_test::fixtures;
//! use forceorm_test::MockTransport;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mock = Arc::new(MockTransport::new());
//! let conn = fixtures::connection(Arc::clone(&mock));
//!
//! assert_num_queries(&mock, 1, || async {
//!     conn.table("Account").run().await.unwrap();
//! })
//! .await;
//! # }
//! ```

use std::future::Future;

use crate::mock_transport::MockTransport;

/// Asserts that exactly `expected_count` transport calls are made during the
/// async closure.
///
/// Clears the call log of `transport` before running the closure.
///
/// # Panics
///
/// Panics if the number of calls does not match `expected_count`.
pub async fn assert_num_queries<F, Fut>(transport: &MockTransport, expected_count: usize, f: F)
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    transport.reset_calls();
    f().await;
    let actual = transport.call_count();
    assert_eq!(
        actual,
        expected_count,
        "Expected {expected_count} queries, but {actual} were executed: {:#?}",
        transport.calls()
    );
}

/// Asserts that at most `max_count` transport calls are made during the
/// async closure.
///
/// # Panics
///
/// Panics if more than `max_count` calls are made.
pub async fn assert_max_queries<F, Fut>(transport: &MockTransport, max_count: usize, f: F)
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    transport.reset_calls();
    f().await;
    let actual = transport.call_count();
    assert!(
        actual <= max_count,
        "Expected at most {max_count} queries, but {actual} were executed"
    );
}
