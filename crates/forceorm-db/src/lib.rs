//! # forceorm-db
//!
//! Query compilation and eager loading over a paginated, cursor-based remote
//! object store. Application code describes queries and relations; this
//! crate renders them to the store's query language, drains every result
//! page, hydrates [`Record`](model::Record)s, and attaches related records
//! with one batched query per relation level.
//!
//! ## Architecture
//!
//! Leaf to root:
//!
//! - [`query::Grammar`] renders a [`query::QueryExpression`] to text.
//! - [`query::QueryBuilder`] accumulates the expression and runs it through
//!   the [`Transport`](transport::Transport), following continuation cursors
//!   with [`query::PageStream`].
//! - [`relations::Relation`] constrains a related query for one parent or a
//!   batch of parents and matches the results back.
//! - [`query::EagerLoadSpec`] and [`query::ObjectQuery`] plan and drive eager
//!   loading, including dotted paths such as `"Contacts.Cases"`.
//!
//! The network client and the field-metadata service are collaborators
//! behind the [`transport::Transport`] and [`schema::SchemaProvider`]
//! traits; a [`Connection`] bundles them with the
//! [`Settings`](forceorm_core::Settings).

// These clippy lints are intentionally allowed for the query crate:
// - doc_markdown: field and object names in docs are not code items
// - return_self_not_must_use: builder pattern methods are self-documenting
// - missing_const_for_fn: consuming builder methods stay non-const
// - option_if_let_else: match reads better for pending-error handling
// - cast_possible_truncation: record counts fit comfortably in u64/usize
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::future_not_send)]

pub mod connection;
pub mod model;
pub mod query;
pub mod relations;
pub mod schema;
pub mod transport;
pub mod value;

pub use connection::Connection;
pub use model::{Model, ObjectMeta, Record, RelationDef, RelationKind, RelationValue};
pub use query::{
    DateValue, Direction, EagerLoadSpec, Manager, ObjectQuery, Operator, QueryBuilder,
    Page, QueryExpression, QuerySet, Subquery, WhereClause,
};
pub use relations::{load_relation, Relation};
pub use schema::{FieldType, ObjectSchema, SchemaCache, SchemaProvider};
pub use transport::{Endpoint, QueryPage, RawRecord, Transport, TransportResponse};
pub use value::{FromValue, Value};
