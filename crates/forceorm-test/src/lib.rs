//! # forceorm-test
//!
//! Test utilities for forceorm. Provides a scripted [`MockTransport`] that
//! stands in for the remote object store and logs every call, a
//! [`StaticSchema`] field-metadata provider, a set of sample objects with
//! relations of every kind, and [`assert_num_queries`] for catching N+1
//! query patterns.

pub mod assert_queries;
pub mod fixtures;
pub mod mock_transport;
pub mod static_schema;

pub use assert_queries::{assert_max_queries, assert_num_queries};
pub use mock_transport::{record, CallKind, MockTransport, TransportCall};
pub use static_schema::StaticSchema;
