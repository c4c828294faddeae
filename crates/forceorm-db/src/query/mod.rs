//! Query building, compilation, and execution.
//!
//! - [`expression`] - the [`QueryExpression`] AST and its clause types
//! - [`grammar`] - rendering an expression into query text
//! - [`builder`] - the fluent [`QueryBuilder`]
//! - [`pagination`] - following continuation cursors to the last page
//! - [`eager`] - relation-path parsing and batch eager loading
//! - [`object_query`] - [`ObjectQuery`], the record-producing query
//! - [`queryset`] - typed [`Manager`] and [`QuerySet`]

pub mod builder;
pub mod eager;
pub mod expression;
pub mod grammar;
pub mod object_query;
pub mod pagination;
pub mod queryset;

use std::future::Future;
use std::pin::Pin;

pub use builder::{QueryBuilder, Subquery};
pub use eager::{Constraint, EagerLoadSpec};
pub use expression::{
    DateValue, Direction, Operator, OrderBy, QueryExpression, SelectField, WhereClause,
};
pub use grammar::Grammar;
pub use object_query::{ObjectQuery, Page};
pub use pagination::PageStream;
pub use queryset::{Manager, QuerySet};

/// A boxed, sendable future; breaks the recursion between a query and the
/// eager loads it triggers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
