//! The fluent query builder.
//!
//! [`QueryBuilder`] accumulates a [`QueryExpression`] through consuming,
//! chainable methods. Clause methods append; `select`, `from`, `limit` and
//! `offset` overwrite. A builder compiles through its [`Grammar`] and runs
//! through the [`Transport`](crate::transport::Transport) of the
//! [`Connection`] it was created from.
//!
//! Mistakes detected while chaining, such as a sub-query that fails to
//! compile or an operator string that does not parse, are kept as the
//! builder's pending error. The first one wins and is returned by the next
//! call to [`QueryBuilder::to_query_text`] or any execution method.
//!
//! # Examples
//!
//! ```ignore
//! let text = conn
//!     .table("Account")
//!     .where_eq("Status", "Open")
//!     .order_by("Name")
//!     .limit(5)
//!     .to_query_text()?;
//! assert_eq!(text, "SELECT Id FROM Account WHERE Status = 'Open' ORDER BY Name ASC LIMIT 5");
//! ```

use std::sync::Arc;

use forceorm_core::logging::{query_span, QUERY_LOG_TARGET};
use forceorm_core::{ForceError, ForceResult};
use tracing::Instrument;

use super::expression::{
    DateValue, Direction, Operator, OrderBy, QueryExpression, SelectField, WhereClause,
};
use super::grammar::Grammar;
use super::pagination::PageStream;
use crate::connection::Connection;
use crate::schema::ObjectSchema;
use crate::transport::{Endpoint, QueryPage, RawRecord};
use crate::value::Value;

/// A sub-select argument: another builder, or literal SELECT text.
#[derive(Debug, Clone)]
pub enum Subquery {
    /// A builder, compiled when the clause is added.
    Builder(QueryBuilder),
    /// Query text used verbatim.
    Raw(String),
}

impl Subquery {
    /// Wraps literal query text, rejecting anything that is not a SELECT.
    pub fn raw(text: impl Into<String>) -> ForceResult<Self> {
        let text = text.into();
        validate_raw(&text)?;
        Ok(Self::Raw(text))
    }

    /// Compiles the sub-select to text.
    pub fn compile(&self) -> ForceResult<String> {
        match self {
            Self::Builder(builder) => builder.to_query_text(),
            Self::Raw(text) => {
                validate_raw(text)?;
                Ok(text.trim().to_string())
            }
        }
    }
}

impl From<QueryBuilder> for Subquery {
    fn from(builder: QueryBuilder) -> Self {
        Self::Builder(builder)
    }
}

impl From<&str> for Subquery {
    fn from(text: &str) -> Self {
        Self::Raw(text.to_string())
    }
}

impl From<String> for Subquery {
    fn from(text: String) -> Self {
        Self::Raw(text)
    }
}

fn validate_raw(text: &str) -> ForceResult<()> {
    let trimmed = text.trim_start();
    let is_select = trimmed
        .get(..7)
        .is_some_and(|head| head.eq_ignore_ascii_case("SELECT "));
    if is_select {
        Ok(())
    } else {
        Err(ForceError::InvalidSubqueryArgument(format!(
            "expected a SELECT statement, got {text:?}"
        )))
    }
}

/// A chainable query over one object type.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    connection: Connection,
    grammar: Grammar,
    expression: QueryExpression,
    pending_error: Option<ForceError>,
}

impl QueryBuilder {
    /// Creates an empty builder bound to `connection`.
    pub fn new(connection: &Connection) -> Self {
        Self {
            connection: connection.clone(),
            grammar: connection.grammar(),
            expression: QueryExpression::default(),
            pending_error: None,
        }
    }

    /// A fresh builder on the same connection.
    pub fn new_query(&self) -> Self {
        Self::new(&self.connection)
    }

    /// The connection this builder runs on.
    pub const fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The accumulated expression.
    pub const fn expression(&self) -> &QueryExpression {
        &self.expression
    }

    /// Consumes the builder, returning its expression.
    pub fn into_expression(self) -> QueryExpression {
        self.expression
    }

    /// The grammar this builder compiles with.
    pub const fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// The first error recorded while chaining, if any.
    pub const fn pending_error(&self) -> Option<&ForceError> {
        self.pending_error.as_ref()
    }

    /// The target object.
    pub fn object(&self) -> &str {
        &self.expression.from
    }

    /// Records `err` unless an earlier error is already pending.
    #[must_use]
    pub fn fail(mut self, err: ForceError) -> Self {
        if self.pending_error.is_none() {
            self.pending_error = Some(err);
        }
        self
    }

    fn absorb(self, sub: &Self) -> Self {
        match &sub.pending_error {
            Some(err) => self.fail(err.clone()),
            None => self,
        }
    }

    fn sub_builder(&self) -> Self {
        self.new_query().from(self.expression.from.clone())
    }

    /// Attaches the object's schema, used for literal formatting.
    #[must_use]
    pub fn with_schema(mut self, schema: Arc<ObjectSchema>) -> Self {
        self.grammar = self.grammar.with_schema(schema);
        self
    }

    // ── Selection and target ─────────────────────────────────────────

    /// Replaces the selected fields.
    #[must_use]
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expression.fields = fields
            .into_iter()
            .map(|f| SelectField::Field(f.into()))
            .collect();
        self
    }

    /// Appends one selected field.
    #[must_use]
    pub fn add_select(mut self, field: impl Into<String>) -> Self {
        self.expression.fields.push(SelectField::Field(field.into()));
        self
    }

    /// Appends `field` to an explicit selection that lacks it. An empty
    /// selection already covers every field and is left alone.
    #[must_use]
    pub fn ensure_selected(self, field: &str) -> Self {
        let covered = self.expression.fields.is_empty()
            || self.expression.fields.iter().any(
                |selected| matches!(selected, SelectField::Field(name) if name.eq_ignore_ascii_case(field)),
            );
        if covered {
            self
        } else {
            self.add_select(field)
        }
    }

    /// Appends a parenthesised sub-select built by `f`.
    #[must_use]
    pub fn add_select_sub<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        let sub = f(self.new_query());
        self = self.absorb(&sub);
        self.expression
            .fields
            .push(SelectField::Subquery(Box::new(sub.expression)));
        self
    }

    /// Sets the target object.
    #[must_use]
    pub fn from(mut self, object: impl Into<String>) -> Self {
        self.expression.from = object.into();
        self
    }

    // ── Where clauses ────────────────────────────────────────────────

    /// Adds `field = value`.
    #[must_use]
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_op(field, Operator::Eq, value)
    }

    /// Adds `field op value`, dispatching on the value.
    ///
    /// A null value becomes a null check (`!=` and every other operator but
    /// `=` check for not-null), a boolean becomes a boolean clause, a date or
    /// timestamp becomes a date clause, and a list compared with `IN` or
    /// `NOT IN` becomes a set clause.
    #[must_use]
    pub fn where_op(
        mut self,
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Self {
        let field = field.into();
        match value.into() {
            Value::Null if operator == Operator::Eq => self.where_null(field),
            Value::Null => self.where_not_null(field),
            Value::Bool(b) => self.where_boolean(field, operator, b),
            Value::List(values) if operator == Operator::In => self.where_in(field, values),
            Value::List(values) if operator == Operator::NotIn => {
                self.where_not_in(field, values)
            }
            value => match DateValue::from_value(&value) {
                Some(date) => self.where_date(field, operator, date),
                None => {
                    self.expression.wheres.push(WhereClause::Basic {
                        field,
                        operator,
                        value,
                    });
                    self
                }
            },
        }
    }

    /// Like [`where_op`](Self::where_op), parsing the operator from text.
    #[must_use]
    pub fn where_cmp(self, field: impl Into<String>, operator: &str, value: impl Into<Value>) -> Self {
        match operator.parse::<Operator>() {
            Ok(op) => self.where_op(field, op, value),
            Err(err) => self.fail(err),
        }
    }

    /// Adds one equality clause per pair.
    #[must_use]
    pub fn where_all<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (field, value) in pairs {
            self = self.where_eq(field, value);
        }
        self
    }

    /// Adds a parenthesised group of the clauses built by `f`.
    #[must_use]
    pub fn where_nested<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        let sub = f(self.sub_builder());
        self = self.absorb(&sub);
        self.expression.wheres.push(WhereClause::Nested {
            wheres: sub.expression.wheres,
        });
        self
    }

    /// Adds `field op (sub-select)`; the sub-select compiles with this query.
    #[must_use]
    pub fn where_sub<F>(mut self, field: impl Into<String>, operator: Operator, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        let sub = f(self.new_query());
        self = self.absorb(&sub);
        self.expression.wheres.push(WhereClause::Sub {
            field: field.into(),
            operator,
            query: Box::new(sub.expression),
        });
        self
    }

    /// Adds `field IN (values)`.
    #[must_use]
    pub fn where_in<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.expression.wheres.push(WhereClause::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Adds `field NOT IN (values)`.
    #[must_use]
    pub fn where_not_in<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.expression.wheres.push(WhereClause::NotIn {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Adds `field IN (sub-select)`, compiling the sub-select immediately.
    #[must_use]
    pub fn where_in_sub(self, field: impl Into<String>, subquery: impl Into<Subquery>) -> Self {
        self.push_in_sub(field.into(), &subquery.into(), false)
    }

    /// Adds `field NOT IN (sub-select)`, compiling the sub-select immediately.
    #[must_use]
    pub fn where_not_in_sub(self, field: impl Into<String>, subquery: impl Into<Subquery>) -> Self {
        self.push_in_sub(field.into(), &subquery.into(), true)
    }

    /// Adds `field IN (sub-select)` where `f` builds the sub-select.
    #[must_use]
    pub fn where_in_query<F>(self, field: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        let sub = f(self.new_query());
        self.where_in_sub(field, sub)
    }

    fn push_in_sub(mut self, field: String, subquery: &Subquery, not: bool) -> Self {
        match subquery.compile() {
            Ok(query) => {
                self.expression.wheres.push(if not {
                    WhereClause::NotInSub { field, query }
                } else {
                    WhereClause::InSub { field, query }
                });
                self
            }
            Err(err) => self.fail(err),
        }
    }

    /// Adds `field = null`.
    #[must_use]
    pub fn where_null(mut self, field: impl Into<String>) -> Self {
        self.expression.wheres.push(WhereClause::Null {
            field: field.into(),
        });
        self
    }

    /// Adds `field != null`.
    #[must_use]
    pub fn where_not_null(mut self, field: impl Into<String>) -> Self {
        self.expression.wheres.push(WhereClause::NotNull {
            field: field.into(),
        });
        self
    }

    /// Adds a date comparison.
    #[must_use]
    pub fn where_date(
        mut self,
        field: impl Into<String>,
        operator: Operator,
        date: impl Into<DateValue>,
    ) -> Self {
        self.expression.wheres.push(WhereClause::Date {
            field: field.into(),
            operator,
            date: date.into(),
        });
        self
    }

    /// Adds a boolean comparison.
    #[must_use]
    pub fn where_boolean(mut self, field: impl Into<String>, operator: Operator, value: bool) -> Self {
        self.expression.wheres.push(WhereClause::Boolean {
            field: field.into(),
            operator,
            value,
        });
        self
    }

    // ── Ordering and paging ──────────────────────────────────────────

    /// Orders ascending by `field`.
    #[must_use]
    pub fn order_by(self, field: impl Into<String>) -> Self {
        self.order_by_direction(field, Direction::Asc)
    }

    /// Orders descending by `field`.
    #[must_use]
    pub fn order_by_desc(self, field: impl Into<String>) -> Self {
        self.order_by_direction(field, Direction::Desc)
    }

    /// Orders by `field` in `direction`.
    #[must_use]
    pub fn order_by_direction(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.expression.orders.push(OrderBy {
            field: field.into(),
            direction,
            nulls_first: None,
        });
        self
    }

    /// Orders by `field`, placing nulls first or last.
    #[must_use]
    pub fn order_by_nulls(
        mut self,
        field: impl Into<String>,
        direction: Direction,
        nulls_first: bool,
    ) -> Self {
        self.expression.orders.push(OrderBy {
            field: field.into(),
            direction,
            nulls_first: Some(nulls_first),
        });
        self
    }

    /// Drops every ordering added so far.
    #[must_use]
    pub fn reorder(mut self) -> Self {
        self.expression.orders.clear();
        self
    }

    /// Sets the LIMIT.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.expression.limit = Some(limit);
        self
    }

    /// Alias for [`limit`](Self::limit).
    #[must_use]
    pub fn take(self, limit: usize) -> Self {
        self.limit(limit)
    }

    /// Sets the OFFSET.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.expression.offset = Some(offset);
        self
    }

    /// Alias for [`offset`](Self::offset).
    #[must_use]
    pub fn skip(self, offset: usize) -> Self {
        self.offset(offset)
    }

    /// Limits the query to page `page` (1-based) of `per_page` records.
    #[must_use]
    pub fn for_page(self, page: usize, per_page: usize) -> Self {
        self.offset(page.saturating_sub(1).saturating_mul(per_page)).limit(per_page)
    }

    /// Applies `f` only when `condition` holds.
    #[must_use]
    pub fn when<F>(self, condition: bool, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        if condition {
            f(self)
        } else {
            self
        }
    }

    // ── Compilation and execution ────────────────────────────────────

    /// Compiles the query, or returns the pending error.
    pub fn to_query_text(&self) -> ForceResult<String> {
        if let Some(err) = &self.pending_error {
            return Err(err.clone());
        }
        let text = self.grammar.compile_select(&self.expression)?;
        tracing::debug!(target: QUERY_LOG_TARGET, soql = %text, "compiled query");
        Ok(text)
    }

    /// Returns `true` when a top-level clause filters on an archive marker
    /// field, which routes execution to the include-archived endpoint.
    pub fn is_query_all(&self) -> bool {
        let settings = self.connection.settings();
        self.expression
            .wheres
            .iter()
            .filter_map(WhereClause::field)
            .any(|field| settings.is_archive_marker(field))
    }

    /// The endpoint this query runs against.
    pub fn endpoint(&self) -> Endpoint {
        if self.is_query_all() {
            Endpoint::QueryAll
        } else {
            Endpoint::Query
        }
    }

    /// Compiles and issues the query, returning a reader over its pages.
    pub async fn open_stream(&self) -> ForceResult<PageStream<'_>> {
        let soql = self.to_query_text()?;
        PageStream::open(
            self.connection.transport(),
            self.endpoint(),
            &soql,
            self.connection.settings().max_pages,
        )
        .await
    }

    /// Runs the query and drains every page into one sequence.
    pub async fn run(&self) -> ForceResult<Vec<RawRecord>> {
        async { self.open_stream().await?.collect_all().await }
            .instrument(query_span(self.object()))
            .await
    }

    /// Runs the query, handing each page to `consumer` as it arrives.
    ///
    /// Returning `false` from `consumer` stops draining. Returns the number
    /// of pages handed over.
    pub async fn run_chunked<F>(&self, mut consumer: F) -> ForceResult<usize>
    where
        F: FnMut(Vec<RawRecord>) -> bool + Send,
    {
        async {
            let mut stream = self.open_stream().await?;
            let mut pages = 0;
            while let Some(batch) = stream.next_page().await? {
                pages += 1;
                if !consumer(batch) {
                    break;
                }
            }
            Ok(pages)
        }
        .instrument(query_span(self.object()))
        .await
    }

    /// Runs the query and returns only the first page, without following
    /// the cursor.
    pub async fn run_first_page(&self) -> ForceResult<QueryPage> {
        let soql = self.to_query_text()?;
        self.connection
            .transport()
            .query_endpoint(self.endpoint(), &soql)
            .instrument(query_span(self.object()))
            .await
    }
}
