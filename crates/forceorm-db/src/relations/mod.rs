//! Relationship descriptors.
//!
//! A [`Relation`] is built from a [`RelationDef`] and either one parent
//! record ([`Relation::for_parent`], which constrains the related query to
//! that parent immediately) or a batch of parents
//! ([`Relation::for_eager`] followed by
//! [`add_eager_constraints`](Relation::add_eager_constraints)). The kinds
//! differ only in which keys they read; the batch algorithm is shared:
//!
//! 1. collect the distinct, non-null join keys of the parents;
//! 2. run one query for all of them (many-to-many first reads the junction);
//! 3. [`build_dictionary`](Relation::build_dictionary): join key to related
//!    records, one pass over the results;
//! 4. [`match_records`](Relation::match_records): one pass over the parents,
//!    attaching the dictionary entry or the kind's empty default.

mod existence;

use std::collections::{HashMap, HashSet};

use forceorm_core::{ForceError, ForceResult};
use tracing::debug;

pub use existence::existence_query;

use crate::connection::Connection;
use crate::model::{ObjectMeta, Record, RelationDef, RelationKind, RelationValue};
use crate::query::object_query::ObjectQuery;
use crate::transport::RawRecord;
use crate::value::Value;

/// Join key to the related records of that key, in result order.
pub type Dictionary = HashMap<String, Vec<Record>>;

/// One relation of one parent, or of a batch of parents.
#[derive(Debug)]
pub struct Relation<'p> {
    def: &'static RelationDef,
    parent: Option<&'p Record>,
    query: ObjectQuery,
    eager_keys: Vec<Value>,
    pivot_rows: Vec<RawRecord>,
    unresolvable: bool,
}

impl<'p> Relation<'p> {
    fn build(
        connection: &Connection,
        meta: &'static ObjectMeta,
        name: &str,
        parent: Option<&'p Record>,
    ) -> ForceResult<Self> {
        let def = meta.relation(name)?;
        Ok(Self {
            def,
            parent,
            query: ObjectQuery::new(connection, def.related_meta()),
            eager_keys: Vec::new(),
            pivot_rows: Vec::new(),
            unresolvable: false,
        })
    }

    /// The relation `name` of `parent`, constrained to that parent.
    pub fn for_parent(
        connection: &Connection,
        meta: &'static ObjectMeta,
        name: &str,
        parent: &'p Record,
    ) -> ForceResult<Self> {
        Ok(Self::build(connection, meta, name, Some(parent))?.add_constraints())
    }

    /// The relation `name` of `meta`, not yet bound to any parent.
    pub fn for_eager(
        connection: &Connection,
        meta: &'static ObjectMeta,
        name: &str,
    ) -> ForceResult<Self> {
        Self::build(connection, meta, name, None)
    }

    /// The relation's declaration.
    pub const fn def(&self) -> &'static RelationDef {
        self.def
    }

    /// The related query as it would currently run.
    pub const fn query(&self) -> &ObjectQuery {
        &self.query
    }

    const fn kind(&self) -> RelationKind {
        self.def.kind
    }

    /// Applies `f` to the related query.
    #[must_use]
    pub fn constrain<F>(mut self, f: F) -> Self
    where
        F: FnOnce(ObjectQuery) -> ObjectQuery,
    {
        self.query = f(self.query);
        self
    }

    fn add_constraints(mut self) -> Self {
        let Some(parent) = self.parent else {
            return self;
        };
        let key = parent.value(self.kind().parent_key()).clone();
        if key.is_null() {
            self.unresolvable = true;
            return self;
        }
        self.query = match self.kind() {
            RelationKind::BelongsTo { owner_key, .. } => self.query.where_eq(owner_key, key),
            RelationKind::HasOne { foreign_key, .. } | RelationKind::HasMany { foreign_key, .. } => {
                self.query.where_eq(foreign_key, key)
            }
            RelationKind::BelongsToMany {
                junction,
                foreign_pivot_key,
                related_pivot_key,
                related_key,
                ..
            } => self.query.where_in_query(related_key, |q| {
                q.from(junction)
                    .select([related_pivot_key])
                    .where_eq(foreign_pivot_key, key)
            }),
        };
        self
    }

    /// Constrains the related query to every parent in `parents`.
    #[must_use]
    pub fn add_eager_constraints(mut self, parents: &[Record]) -> Self {
        self.eager_keys = distinct_keys(parents.iter().map(|p| p.value(self.kind().parent_key())));
        if !matches!(self.kind(), RelationKind::BelongsToMany { .. }) {
            let field = self.kind().related_key();
            self.query = self.query.where_in(field, self.eager_keys.clone());
        }
        self
    }

    /// Sets every parent's relation to the kind's empty default.
    pub fn init_relation(&self, parents: &mut [Record]) {
        for parent in parents {
            parent.set_relation(self.def.name, self.kind().default_value());
        }
    }

    /// Resolves the relation of the single parent.
    ///
    /// A parent whose join key is null resolves to the empty default
    /// without querying.
    pub async fn get_results(self) -> ForceResult<RelationValue> {
        if self.unresolvable {
            return Ok(self.kind().default_value());
        }
        if self.kind().is_to_one() {
            Ok(RelationValue::One(self.query.first().await?.map(Box::new)))
        } else {
            Ok(RelationValue::Many(self.query.get().await?))
        }
    }

    /// Runs the batch query. Many-to-many relations first read the junction
    /// rows of every parent key and then fetch the related records they
    /// point at.
    ///
    /// A narrowed selection always keeps the key results are matched on.
    pub async fn get_eager_results(&mut self) -> ForceResult<Vec<Record>> {
        if self.eager_keys.is_empty() {
            return Ok(Vec::new());
        }
        self.query = self.query.clone().ensure_selected(self.kind().related_key());
        let RelationKind::BelongsToMany {
            junction,
            foreign_pivot_key,
            related_pivot_key,
            related_key,
            ..
        } = self.kind()
        else {
            return self.query.get().await;
        };

        self.pivot_rows = self
            .query
            .connection()
            .table(junction)
            .select([foreign_pivot_key, related_pivot_key])
            .where_in(foreign_pivot_key, self.eager_keys.clone())
            .run()
            .await?;
        let related_keys = distinct_keys(
            self.pivot_rows
                .iter()
                .map(|row| pivot_value(row, related_pivot_key))
                .collect::<Vec<_>>()
                .iter(),
        );
        debug!(
            relation = self.def.name,
            pivots = self.pivot_rows.len(),
            "read junction rows"
        );
        if related_keys.is_empty() {
            return Ok(Vec::new());
        }
        self.query
            .clone()
            .where_in(related_key, related_keys)
            .get()
            .await
    }

    /// Indexes `results` by the key they join on.
    pub fn build_dictionary(&mut self, results: Vec<Record>) -> Dictionary {
        let mut dictionary = Dictionary::new();
        match self.kind() {
            RelationKind::BelongsToMany {
                foreign_pivot_key,
                related_pivot_key,
                related_key,
                ..
            } => {
                let by_key: HashMap<String, Record> = results
                    .into_iter()
                    .filter_map(|r| r.key(related_key).map(|k| (k, r)))
                    .collect();
                for row in std::mem::take(&mut self.pivot_rows) {
                    let parent_key = pivot_value(&row, foreign_pivot_key).join_key();
                    let related = pivot_value(&row, related_pivot_key)
                        .join_key()
                        .and_then(|k| by_key.get(&k));
                    if let (Some(parent_key), Some(related)) = (parent_key, related) {
                        dictionary
                            .entry(parent_key)
                            .or_default()
                            .push(related.clone());
                    }
                }
            }
            kind => {
                let field = kind.related_key();
                for record in results {
                    if let Some(key) = record.key(field) {
                        dictionary.entry(key).or_default().push(record);
                    }
                }
            }
        }
        dictionary
    }

    /// Attaches each parent's dictionary entry, or the empty default.
    pub fn match_records(&self, parents: &mut [Record], dictionary: &Dictionary) {
        let kind = self.kind();
        for parent in parents {
            let related = parent
                .key(kind.parent_key())
                .and_then(|key| dictionary.get(&key));
            let value = match related {
                Some(records) if kind.is_to_one() => {
                    RelationValue::One(records.first().cloned().map(Box::new))
                }
                Some(records) => RelationValue::Many(records.clone()),
                None => kind.default_value(),
            };
            parent.set_relation(self.def.name, value);
        }
    }
}

fn pivot_value(row: &RawRecord, field: &str) -> Value {
    row.get(field).map_or(Value::Null, Value::from_json)
}

/// The distinct, non-null values of `values`, in first-seen order.
fn distinct_keys<'v>(values: impl Iterator<Item = &'v Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    values
        .filter(|v| v.join_key().is_some_and(|k| seen.insert(k)))
        .cloned()
        .collect()
}

/// Returns relation `name` of `record`, loading it first if needed.
pub async fn load_relation<'r>(
    connection: &Connection,
    meta: &'static ObjectMeta,
    record: &'r mut Record,
    name: &str,
) -> ForceResult<&'r RelationValue> {
    if !record.relation_loaded(name) {
        let value = Relation::for_parent(connection, meta, name, record)?
            .get_results()
            .await?;
        record.set_relation(name, value);
    }
    record
        .relation(name)
        .ok_or_else(|| ForceError::relation_not_found(meta.object_name, name))
}
