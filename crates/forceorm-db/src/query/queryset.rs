//! Typed managers and querysets.
//!
//! [`Manager`] is the entry point for queries over one [`Model`] type;
//! [`QuerySet`] wraps an [`ObjectQuery`] and forwards the part of its
//! surface a typed caller needs. Terminal methods convert every hydrated
//! [`Record`] through [`Model::from_record`].
//!
//! # Examples
//!
//! ```ignore
//! let accounts: Vec<Account> = Account::objects(&conn)
//!     .with(["Contacts"])
//!     .where_eq("Type", "Customer")
//!     .get()
//!     .await?;
//! ```

use std::fmt;
use std::marker::PhantomData;

use forceorm_core::{ForceError, ForceResult};

use super::builder::Subquery;
use super::expression::{DateValue, Operator};
use super::object_query::{ObjectQuery, Page};
use crate::connection::Connection;
use crate::model::{Model, Record};
use crate::value::Value;

/// The entry point for queries over `M`.
pub struct Manager<M: Model> {
    connection: Connection,
    _phantom: PhantomData<fn() -> M>,
}

impl<M: Model> fmt::Debug for Manager<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("object", &M::meta().object_name)
            .finish_non_exhaustive()
    }
}

impl<M: Model> Manager<M> {
    /// Creates a manager on `connection`.
    pub fn new(connection: &Connection) -> Self {
        Self {
            connection: connection.clone(),
            _phantom: PhantomData,
        }
    }

    /// A queryset over every record.
    pub fn all(&self) -> QuerySet<M> {
        QuerySet::new(&self.connection)
    }

    /// A queryset eager-loading `paths`.
    pub fn with<I, S>(&self, paths: I) -> QuerySet<M>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.all().with(paths)
    }

    /// The record whose primary key is `id`.
    pub async fn find(&self, id: impl Into<Value>) -> ForceResult<Option<M>> {
        self.all().find(id).await
    }

    /// The first record whose `field` equals `value`.
    pub async fn find_by(
        &self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> ForceResult<Option<M>> {
        self.all().where_eq(field, value).first().await
    }
}

/// A typed, lazily executed query over `M`.
pub struct QuerySet<M: Model> {
    query: ObjectQuery,
    _phantom: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for QuerySet<M> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<M: Model> fmt::Debug for QuerySet<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet").field("query", &self.query).finish()
    }
}

impl<M: Model> QuerySet<M> {
    /// A queryset over every record of `M`.
    pub fn new(connection: &Connection) -> Self {
        Self {
            query: ObjectQuery::new(connection, M::meta()),
            _phantom: PhantomData,
        }
    }

    /// The untyped query.
    pub const fn query(&self) -> &ObjectQuery {
        &self.query
    }

    /// Consumes the queryset, returning the untyped query.
    pub fn into_query(self) -> ObjectQuery {
        self.query
    }

    fn map<F>(self, f: F) -> Self
    where
        F: FnOnce(ObjectQuery) -> ObjectQuery,
    {
        Self {
            query: f(self.query),
            _phantom: PhantomData,
        }
    }

    /// Replaces the selected fields.
    #[must_use]
    pub fn select<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.map(|q| q.select(fields))
    }

    /// Adds `field = value`.
    #[must_use]
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.map(|q| q.where_eq(field, value))
    }

    /// Adds `field op value`.
    #[must_use]
    pub fn where_op(self, field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        self.map(|q| q.where_op(field, operator, value))
    }

    /// Adds one equality clause per pair.
    #[must_use]
    pub fn where_all<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.map(|q| q.where_all(pairs))
    }

    /// Adds `field IN (values)`.
    #[must_use]
    pub fn where_in<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.map(|q| q.where_in(field, values))
    }

    /// Adds `field NOT IN (values)`.
    #[must_use]
    pub fn where_not_in<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.map(|q| q.where_not_in(field, values))
    }

    /// Adds `field IN (sub-select)`.
    #[must_use]
    pub fn where_in_sub(self, field: impl Into<String>, subquery: impl Into<Subquery>) -> Self {
        self.map(|q| q.where_in_sub(field, subquery))
    }

    /// Adds `field = null`.
    #[must_use]
    pub fn where_null(self, field: impl Into<String>) -> Self {
        self.map(|q| q.where_null(field))
    }

    /// Adds `field != null`.
    #[must_use]
    pub fn where_not_null(self, field: impl Into<String>) -> Self {
        self.map(|q| q.where_not_null(field))
    }

    /// Adds a date comparison.
    #[must_use]
    pub fn where_date(self, field: impl Into<String>, operator: Operator, date: impl Into<DateValue>) -> Self {
        self.map(|q| q.where_date(field, operator, date))
    }

    /// Adds a boolean comparison.
    #[must_use]
    pub fn where_boolean(self, field: impl Into<String>, operator: Operator, value: bool) -> Self {
        self.map(|q| q.where_boolean(field, operator, value))
    }

    /// Orders ascending by `field`.
    #[must_use]
    pub fn order_by(self, field: impl Into<String>) -> Self {
        self.map(|q| q.order_by(field))
    }

    /// Orders descending by `field`.
    #[must_use]
    pub fn order_by_desc(self, field: impl Into<String>) -> Self {
        self.map(|q| q.order_by_desc(field))
    }

    /// Sets the LIMIT.
    #[must_use]
    pub fn limit(self, limit: usize) -> Self {
        self.map(|q| q.limit(limit))
    }

    /// Sets the OFFSET.
    #[must_use]
    pub fn offset(self, offset: usize) -> Self {
        self.map(|q| q.offset(offset))
    }

    /// Limits the query to page `page` (1-based) of `per_page` records.
    #[must_use]
    pub fn for_page(self, page: usize, per_page: usize) -> Self {
        self.map(|q| q.for_page(page, per_page))
    }

    /// Eager-loads the relations named by `paths`.
    #[must_use]
    pub fn with<I, S>(self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.map(|q| q.with(paths))
    }

    /// Eager-loads `path`, applying `constraint` to its query.
    #[must_use]
    pub fn with_constrained<F>(self, path: &str, constraint: F) -> Self
    where
        F: Fn(ObjectQuery) -> ObjectQuery + Send + Sync + 'static,
    {
        self.map(|q| q.with_constrained(path, constraint))
    }

    /// Keeps only records with a `relation` record accepted by `constraint`.
    #[must_use]
    pub fn where_has<F>(self, relation: &str, constraint: F) -> Self
    where
        F: FnOnce(ObjectQuery) -> ObjectQuery,
    {
        self.map(|q| q.where_has(relation, constraint))
    }

    /// Keeps only records with at least one `relation` record.
    #[must_use]
    pub fn has(self, relation: &str) -> Self {
        self.map(|q| q.has(relation))
    }

    /// Compiles the query.
    pub fn to_query_text(&self) -> ForceResult<String> {
        self.query.to_query_text()
    }

    /// Every matching object.
    pub async fn get(&self) -> ForceResult<Vec<M>> {
        self.query.get().await?.into_iter().map(M::from_record).collect()
    }

    /// Every matching record, untyped.
    pub async fn records(&self) -> ForceResult<Vec<Record>> {
        self.query.get().await
    }

    /// The first matching object.
    pub async fn first(&self) -> ForceResult<Option<M>> {
        self.query.first().await?.map(M::from_record).transpose()
    }

    /// The object whose primary key is `id`.
    pub async fn find(&self, id: impl Into<Value>) -> ForceResult<Option<M>> {
        self.query.find(id).await?.map(M::from_record).transpose()
    }

    /// Page `page` of `per_page` objects; see [`ObjectQuery::paginate`].
    pub async fn paginate(&self, per_page: usize, page: usize) -> ForceResult<Page<M>> {
        self.query.paginate(per_page, page).await?.try_map(M::from_record)
    }

    /// The number of matching records.
    pub async fn count(&self) -> ForceResult<u64> {
        self.query.count().await
    }

    /// Hands the results to `consumer` one page at a time. Returning `false`
    /// stops. Conversion errors abort the walk.
    pub async fn chunk<F>(&self, mut consumer: F) -> ForceResult<usize>
    where
        F: FnMut(Vec<M>) -> bool + Send,
    {
        let mut failure: Option<ForceError> = None;
        let pages = self
            .query
            .chunk(|records| {
                match records
                    .into_iter()
                    .map(M::from_record)
                    .collect::<ForceResult<Vec<M>>>()
                {
                    Ok(objects) => consumer(objects),
                    Err(err) => {
                        failure = Some(err);
                        false
                    }
                }
            })
            .await?;
        match failure {
            Some(err) => Err(err),
            None => Ok(pages),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::connection;
    use crate::model::ObjectMeta;
    use std::sync::LazyLock;

    #[derive(Debug)]
    struct Lead {
        id: String,
    }

    impl Model for Lead {
        fn meta() -> &'static ObjectMeta {
            static META: LazyLock<ObjectMeta> = LazyLock::new(|| ObjectMeta::new("Lead", "Id"));
            &META
        }

        fn from_record(record: Record) -> ForceResult<Self> {
            Ok(Self {
                id: record.get_as("Id")?,
            })
        }
    }

    #[test]
    fn test_queryset_forwards_to_query() {
        let text = Lead::query(&connection())
            .where_eq("Status", "Open")
            .where_not_null("Email")
            .order_by("LastName")
            .limit(10)
            .to_query_text()
            .unwrap();
        assert_eq!(
            text,
            "SELECT Id FROM Lead WHERE Status = 'Open' AND Email != null ORDER BY LastName ASC LIMIT 10"
        );
    }

    #[test]
    fn test_manager_debug_names_object() {
        let manager = Lead::objects(&connection());
        assert!(format!("{manager:?}").contains("Lead"));
    }

    #[tokio::test]
    async fn test_terminal_methods_on_empty_store() {
        let manager = Lead::objects(&connection());
        assert!(manager.all().get().await.unwrap().is_empty());
        assert!(manager.find("00Q1").await.unwrap().is_none());
        assert!(manager.find_by("Email", "a@b.c").await.unwrap().is_none());
        let lead = Lead::from_record(Record::with_attributes("Lead", [("Id", "00Q1")])).unwrap();
        assert_eq!(lead.id, "00Q1");
    }
}
