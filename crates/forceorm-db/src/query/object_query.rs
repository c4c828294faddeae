//! The record-level query.
//!
//! [`ObjectQuery`] pairs a [`QueryBuilder`] with the [`ObjectMeta`] of the
//! queried type and an [`EagerLoadSpec`]. It forwards the builder surface
//! explicitly and adds what needs object metadata: relation eager loading,
//! relation-existence filters, hydration into [`Record`]s, and primary-key
//! lookups.
//!
//! When nothing was selected, execution selects every field the object's
//! schema declares.

use std::sync::Arc;

use forceorm_core::logging::query_span;
use forceorm_core::ForceResult;
use tracing::Instrument;

use super::builder::{QueryBuilder, Subquery};
use super::eager::{self, EagerLoadSpec};
use super::expression::{DateValue, Direction, Operator};
use super::BoxFuture;
use crate::connection::Connection;
use crate::model::{ObjectMeta, Record};
use crate::relations;
use crate::schema::ObjectSchema;
use crate::transport::{strip_attributes, RawRecord};
use crate::value::Value;

/// One page of results from [`ObjectQuery::paginate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number.
    pub page: usize,
    pub per_page: usize,
    /// Whether at least one record follows this page.
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Converts every item, keeping the paging details.
    pub fn try_map<U, F>(self, f: F) -> ForceResult<Page<U>>
    where
        F: FnMut(T) -> ForceResult<U>,
    {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<ForceResult<_>>()?,
            page: self.page,
            per_page: self.per_page,
            has_more: self.has_more,
        })
    }
}

/// A query over one object type that produces hydrated records.
#[derive(Debug, Clone)]
pub struct ObjectQuery {
    meta: &'static ObjectMeta,
    builder: QueryBuilder,
    eager_load: EagerLoadSpec,
}

impl ObjectQuery {
    /// A query over every record of `meta`'s object type.
    pub fn new(connection: &Connection, meta: &'static ObjectMeta) -> Self {
        Self {
            meta,
            builder: connection.table(meta.object_name),
            eager_load: EagerLoadSpec::new(),
        }
    }

    /// The metadata of the queried type.
    pub const fn meta(&self) -> &'static ObjectMeta {
        self.meta
    }

    /// The underlying builder.
    pub const fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    /// Consumes the query, returning the underlying builder.
    pub fn into_builder(self) -> QueryBuilder {
        self.builder
    }

    /// The connection this query runs on.
    pub const fn connection(&self) -> &Connection {
        self.builder.connection()
    }

    /// The relations to load with the results.
    pub const fn eager_load(&self) -> &EagerLoadSpec {
        &self.eager_load
    }

    /// Applies `f` to the underlying builder.
    #[must_use]
    pub fn map_builder<F>(mut self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.builder = f(self.builder);
        self
    }

    // ── Forwarded builder surface ────────────────────────────────────

    /// See [`QueryBuilder::select`].
    #[must_use]
    pub fn select<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.map_builder(|b| b.select(fields))
    }

    /// See [`QueryBuilder::add_select`].
    #[must_use]
    pub fn add_select(self, field: impl Into<String>) -> Self {
        self.map_builder(|b| b.add_select(field))
    }

    /// See [`QueryBuilder::ensure_selected`].
    #[must_use]
    pub fn ensure_selected(self, field: &str) -> Self {
        self.map_builder(|b| b.ensure_selected(field))
    }

    /// See [`QueryBuilder::add_select_sub`].
    #[must_use]
    pub fn add_select_sub<F>(self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.map_builder(|b| b.add_select_sub(f))
    }

    /// See [`QueryBuilder::where_eq`].
    #[must_use]
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.map_builder(|b| b.where_eq(field, value))
    }

    /// See [`QueryBuilder::where_op`].
    #[must_use]
    pub fn where_op(
        self,
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Self {
        self.map_builder(|b| b.where_op(field, operator, value))
    }

    /// See [`QueryBuilder::where_cmp`].
    #[must_use]
    pub fn where_cmp(self, field: impl Into<String>, operator: &str, value: impl Into<Value>) -> Self {
        self.map_builder(|b| b.where_cmp(field, operator, value))
    }

    /// See [`QueryBuilder::where_all`].
    #[must_use]
    pub fn where_all<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.map_builder(|b| b.where_all(pairs))
    }

    /// See [`QueryBuilder::where_nested`].
    #[must_use]
    pub fn where_nested<F>(self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.map_builder(|b| b.where_nested(f))
    }

    /// See [`QueryBuilder::where_sub`].
    #[must_use]
    pub fn where_sub<F>(self, field: impl Into<String>, operator: Operator, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.map_builder(|b| b.where_sub(field, operator, f))
    }

    /// See [`QueryBuilder::where_in`].
    #[must_use]
    pub fn where_in<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.map_builder(|b| b.where_in(field, values))
    }

    /// See [`QueryBuilder::where_not_in`].
    #[must_use]
    pub fn where_not_in<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.map_builder(|b| b.where_not_in(field, values))
    }

    /// See [`QueryBuilder::where_in_sub`].
    #[must_use]
    pub fn where_in_sub(self, field: impl Into<String>, subquery: impl Into<Subquery>) -> Self {
        self.map_builder(|b| b.where_in_sub(field, subquery))
    }

    /// See [`QueryBuilder::where_not_in_sub`].
    #[must_use]
    pub fn where_not_in_sub(self, field: impl Into<String>, subquery: impl Into<Subquery>) -> Self {
        self.map_builder(|b| b.where_not_in_sub(field, subquery))
    }

    /// See [`QueryBuilder::where_in_query`].
    #[must_use]
    pub fn where_in_query<F>(self, field: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.map_builder(|b| b.where_in_query(field, f))
    }

    /// See [`QueryBuilder::where_null`].
    #[must_use]
    pub fn where_null(self, field: impl Into<String>) -> Self {
        self.map_builder(|b| b.where_null(field))
    }

    /// See [`QueryBuilder::where_not_null`].
    #[must_use]
    pub fn where_not_null(self, field: impl Into<String>) -> Self {
        self.map_builder(|b| b.where_not_null(field))
    }

    /// See [`QueryBuilder::where_date`].
    #[must_use]
    pub fn where_date(
        self,
        field: impl Into<String>,
        operator: Operator,
        date: impl Into<DateValue>,
    ) -> Self {
        self.map_builder(|b| b.where_date(field, operator, date))
    }

    /// See [`QueryBuilder::where_boolean`].
    #[must_use]
    pub fn where_boolean(self, field: impl Into<String>, operator: Operator, value: bool) -> Self {
        self.map_builder(|b| b.where_boolean(field, operator, value))
    }

    /// See [`QueryBuilder::order_by`].
    #[must_use]
    pub fn order_by(self, field: impl Into<String>) -> Self {
        self.map_builder(|b| b.order_by(field))
    }

    /// See [`QueryBuilder::order_by_desc`].
    #[must_use]
    pub fn order_by_desc(self, field: impl Into<String>) -> Self {
        self.map_builder(|b| b.order_by_desc(field))
    }

    /// See [`QueryBuilder::order_by_direction`].
    #[must_use]
    pub fn order_by_direction(self, field: impl Into<String>, direction: Direction) -> Self {
        self.map_builder(|b| b.order_by_direction(field, direction))
    }

    /// See [`QueryBuilder::order_by_nulls`].
    #[must_use]
    pub fn order_by_nulls(self, field: impl Into<String>, direction: Direction, nulls_first: bool) -> Self {
        self.map_builder(|b| b.order_by_nulls(field, direction, nulls_first))
    }

    /// See [`QueryBuilder::limit`].
    #[must_use]
    pub fn limit(self, limit: usize) -> Self {
        self.map_builder(|b| b.limit(limit))
    }

    /// See [`QueryBuilder::take`].
    #[must_use]
    pub fn take(self, limit: usize) -> Self {
        self.limit(limit)
    }

    /// See [`QueryBuilder::offset`].
    #[must_use]
    pub fn offset(self, offset: usize) -> Self {
        self.map_builder(|b| b.offset(offset))
    }

    /// See [`QueryBuilder::skip`].
    #[must_use]
    pub fn skip(self, offset: usize) -> Self {
        self.offset(offset)
    }

    /// See [`QueryBuilder::for_page`].
    #[must_use]
    pub fn for_page(self, page: usize, per_page: usize) -> Self {
        self.map_builder(|b| b.for_page(page, per_page))
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

    /// See [`QueryBuilder::to_query_text`].
    pub fn to_query_text(&self) -> ForceResult<String> {
        self.builder.to_query_text()
    }

    /// See [`QueryBuilder::is_query_all`].
    pub fn is_query_all(&self) -> bool {
        self.builder.is_query_all()
    }

    // ── Relations ────────────────────────────────────────────────────

    /// Eager-loads the relations named by `paths`; dotted paths load nested
    /// relations.
    #[must_use]
    pub fn with<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in paths {
            self.eager_load.add(path.as_ref(), None);
        }
        self
    }

    /// Eager-loads `path`, applying `constraint` to its query.
    #[must_use]
    pub fn with_constrained<F>(mut self, path: &str, constraint: F) -> Self
    where
        F: Fn(Self) -> Self + Send + Sync + 'static,
    {
        self.eager_load.add(path, Some(Arc::new(constraint)));
        self
    }

    /// Merges an already-parsed eager-load spec.
    #[must_use]
    pub fn with_spec(mut self, spec: EagerLoadSpec) -> Self {
        self.eager_load.merge(spec);
        self
    }

    /// Keeps only records with at least one `relation` record accepted by
    /// `constraint`.
    #[must_use]
    pub fn where_has<F>(self, relation: &str, constraint: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        match relations::existence_query(self.connection(), self.meta, relation, constraint) {
            Ok((field, subquery)) => self.where_in_sub(field, subquery),
            Err(err) => self.map_builder(|b| b.fail(err)),
        }
    }

    /// Keeps only records with at least one `relation` record.
    #[must_use]
    pub fn has(self, relation: &str) -> Self {
        self.where_has(relation, |q| q)
    }

    // ── Execution ────────────────────────────────────────────────────

    /// The builder as executed: schema attached for literal formatting, and
    /// every schema field selected when nothing else was.
    async fn prepared(&self) -> ForceResult<(Arc<ObjectSchema>, QueryBuilder)> {
        let schema = self.connection().schema_for(self.meta.object_name).await?;
        let mut builder = self.builder.clone().with_schema(Arc::clone(&schema));
        if builder.expression().fields.is_empty() && !schema.fields().is_empty() {
            builder = builder.select(schema.field_names());
        }
        Ok((schema, builder))
    }

    /// Runs the query, hydrates every record, and eager-loads relations.
    pub(crate) fn load(&self) -> BoxFuture<'_, ForceResult<Vec<Record>>> {
        Box::pin(async move {
            let (schema, builder) = self.prepared().await?;
            let raw = builder.run().await?;
            let mut records: Vec<Record> =
                raw.iter().map(|r| Record::hydrate(&schema, r)).collect();
            self.eager_load_relations(&mut records).await?;
            Ok(records)
        })
    }

    /// Every matching record, with relations loaded.
    pub async fn get(&self) -> ForceResult<Vec<Record>> {
        self.load().await
    }

    /// The first matching record.
    pub async fn first(&self) -> ForceResult<Option<Record>> {
        let query = self.clone().limit(1);
        Ok(query.load().await?.into_iter().next())
    }

    /// The record whose primary key is `id`.
    pub async fn find(&self, id: impl Into<Value>) -> ForceResult<Option<Record>> {
        self.clone().where_eq(self.meta.primary_key, id).first().await
    }

    /// Every matching row as returned by the remote store, minus the
    /// `attributes` envelope; no hydration or eager loading.
    pub async fn get_raw(&self) -> ForceResult<Vec<RawRecord>> {
        let (_, builder) = self.prepared().await?;
        Ok(builder
            .run()
            .await?
            .into_iter()
            .map(strip_attributes)
            .collect())
    }

    /// Page `page` (1-based, `0` reads as `1`) of `per_page` records. One
    /// extra record is requested to tell whether another page follows.
    pub async fn paginate(&self, per_page: usize, page: usize) -> ForceResult<Page<Record>> {
        let page = page.max(1);
        let mut items = self
            .clone()
            .offset((page - 1).saturating_mul(per_page))
            .limit(per_page.saturating_add(1))
            .load()
            .await?;
        let has_more = items.len() > per_page;
        items.truncate(per_page);
        Ok(Page {
            items,
            page,
            per_page,
            has_more,
        })
    }

    /// Hands the results to `consumer` one page at a time, each page
    /// hydrated and eager-loaded. Returning `false` stops. Returns the
    /// number of pages handed over.
    pub async fn chunk<F>(&self, mut consumer: F) -> ForceResult<usize>
    where
        F: FnMut(Vec<Record>) -> bool + Send,
    {
        let (schema, builder) = self.prepared().await?;
        async {
            let mut stream = builder.open_stream().await?;
            let mut pages = 0;
            while let Some(batch) = stream.next_page().await? {
                let mut records: Vec<Record> =
                    batch.iter().map(|r| Record::hydrate(&schema, r)).collect();
                self.eager_load_relations(&mut records).await?;
                pages += 1;
                if !consumer(records) {
                    break;
                }
            }
            Ok(pages)
        }
        .instrument(query_span(self.meta.object_name))
        .await
    }

    /// The number of matching records, as reported by `SELECT COUNT()`.
    pub async fn count(&self) -> ForceResult<u64> {
        let schema = self.connection().schema_for(self.meta.object_name).await?;
        let page = self
            .builder
            .clone()
            .with_schema(schema)
            .select(["COUNT()"])
            .reorder()
            .run_first_page()
            .await?;
        Ok(page.total_size.unwrap_or(page.records.len() as u64))
    }

    /// Loads this query's eager-load spec onto `records`.
    pub async fn eager_load_relations(&self, records: &mut [Record]) -> ForceResult<()> {
        eager::eager_load_relations(self.connection(), self.meta, &self.eager_load, records).await
    }
}
