//! Eager-load planning.
//!
//! An [`EagerLoadSpec`] maps relation paths (`"Contacts"`,
//! `"Contacts.Cases"`) to constraint functions. Adding a dotted path also
//! adds a no-op entry for each of its prefixes, so every level has an entry
//! to recurse through. [`eager_load_relations`] resolves the top-level
//! entries against a batch of parent records and hands the entries nested
//! under each relation down to that relation's own query, which loads them
//! when it runs.

use std::fmt;
use std::sync::Arc;

use forceorm_core::ForceResult;

use super::object_query::ObjectQuery;
use super::BoxFuture;
use crate::connection::Connection;
use crate::model::{ObjectMeta, Record};
use crate::relations::Relation;

/// A constraint applied to a relation's query before it runs.
pub type Constraint = Arc<dyn Fn(ObjectQuery) -> ObjectQuery + Send + Sync>;

fn no_op() -> Constraint {
    Arc::new(|query| query)
}

/// Relation paths to load, each with its constraint, in insertion order.
#[derive(Clone, Default)]
pub struct EagerLoadSpec {
    entries: Vec<(String, Constraint)>,
}

impl fmt::Debug for EagerLoadSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.paths()).finish()
    }
}

impl EagerLoadSpec {
    /// An empty spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `paths`, each without a constraint.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut spec = Self::new();
        for path in paths {
            spec.add(path.as_ref(), None);
        }
        spec
    }

    /// Adds `path`. Missing prefixes get no-op entries; an existing entry
    /// for `path` itself is replaced.
    pub fn add(&mut self, path: &str, constraint: Option<Constraint>) {
        if let Some((parents, _)) = path.rsplit_once('.') {
            let mut prefix = String::new();
            for segment in parents.split('.') {
                if !prefix.is_empty() {
                    prefix.push('.');
                }
                prefix.push_str(segment);
                if !self.contains(&prefix) {
                    self.entries.push((prefix.clone(), no_op()));
                }
            }
        }
        self.set(path.to_string(), constraint.unwrap_or_else(no_op));
    }

    fn set(&mut self, path: String, constraint: Constraint) {
        match self.entries.iter_mut().find(|(p, _)| *p == path) {
            Some(entry) => entry.1 = constraint,
            None => self.entries.push((path, constraint)),
        }
    }

    /// Adds every entry of `other`, replacing entries with the same path.
    pub fn merge(&mut self, other: Self) {
        for (path, constraint) in other.entries {
            self.set(path, constraint);
        }
    }

    /// Returns `true` when `path` has an entry.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|(p, _)| p == path)
    }

    /// Returns `true` when nothing is to be loaded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Every path, in insertion order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }

    /// The entries without a dot.
    pub fn top_level(&self) -> impl Iterator<Item = (&str, &Constraint)> {
        self.entries
            .iter()
            .filter(|(p, _)| !p.contains('.'))
            .map(|(p, c)| (p.as_str(), c))
    }

    /// The entries below `relation`, with the `relation.` prefix removed.
    pub fn nested_under(&self, relation: &str) -> Self {
        let prefix = format!("{relation}.");
        Self {
            entries: self
                .entries
                .iter()
                .filter_map(|(p, c)| {
                    p.strip_prefix(&prefix)
                        .map(|rest| (rest.to_string(), Arc::clone(c)))
                })
                .collect(),
        }
    }
}

/// Loads every top-level relation of `spec` onto `records`.
///
/// Each relation costs one query for the whole batch (two for many-to-many)
/// plus whatever its nested entries cost, regardless of how many parents
/// there are.
pub fn eager_load_relations<'a>(
    connection: &'a Connection,
    meta: &'static ObjectMeta,
    spec: &'a EagerLoadSpec,
    records: &'a mut [Record],
) -> BoxFuture<'a, ForceResult<()>> {
    Box::pin(async move {
        if records.is_empty() {
            return Ok(());
        }
        for (name, constraint) in spec.top_level() {
            let nested = spec.nested_under(name);
            let mut relation = Relation::for_eager(connection, meta, name)?
                .add_eager_constraints(records)
                .constrain(|query| constraint(query).with_spec(nested));
            relation.init_relation(records);
            let results = relation.get_eager_results().await?;
            let dictionary = relation.build_dictionary(results);
            relation.match_records(records, &dictionary);
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::connection;

    fn account_meta() -> &'static ObjectMeta {
        static META: std::sync::LazyLock<ObjectMeta> =
            std::sync::LazyLock::new(|| ObjectMeta::new("Account", "Id"));
        &META
    }

    fn applied(spec: &EagerLoadSpec, path: &str) -> String {
        let (_, constraint) = spec
            .entries
            .iter()
            .find(|(p, _)| p == path)
            .unwrap();
        constraint(ObjectQuery::new(&connection(), account_meta()))
            .to_query_text()
            .unwrap()
    }

    #[test]
    fn test_prefixes_are_synthesized() {
        let spec = EagerLoadSpec::from_paths(["a.b.c"]);
        assert_eq!(spec.paths().collect::<Vec<_>>(), vec!["a", "a.b", "a.b.c"]);
    }

    #[test]
    fn test_nested_path_equals_explicit_prefix() {
        let nested = EagerLoadSpec::from_paths(["a.b"]);
        let explicit = EagerLoadSpec::from_paths(["a", "a.b"]);
        assert_eq!(
            nested.paths().collect::<Vec<_>>(),
            explicit.paths().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_synthesized_prefix_keeps_explicit_constraint() {
        let mut spec = EagerLoadSpec::new();
        spec.add("a", Some(Arc::new(|q: ObjectQuery| q.where_eq("Type", "x"))));
        spec.add("a.b", None);
        assert!(applied(&spec, "a").ends_with("WHERE Type = 'x'"));
    }

    #[test]
    fn test_explicit_entry_overrides_synthesized() {
        let mut spec = EagerLoadSpec::new();
        spec.add("a.b", None);
        spec.add("a", Some(Arc::new(|q: ObjectQuery| q.limit(2))));
        assert_eq!(spec.len(), 2);
        assert!(applied(&spec, "a").ends_with("LIMIT 2"));
    }

    #[test]
    fn test_top_level_and_nested_under() {
        let spec = EagerLoadSpec::from_paths(["Contacts.Cases", "Owner", "Contacts.Account.Owner"]);
        let top: Vec<&str> = spec.top_level().map(|(p, _)| p).collect();
        assert_eq!(top, vec!["Contacts", "Owner"]);

        let nested = spec.nested_under("Contacts");
        assert_eq!(
            nested.paths().collect::<Vec<_>>(),
            vec!["Cases", "Account", "Account.Owner"]
        );
        assert!(spec.nested_under("Owner").is_empty());
    }

    #[tokio::test]
    async fn test_empty_parent_batch_issues_no_query() {
        let spec = EagerLoadSpec::from_paths(["Unknown"]);
        let mut records: Vec<Record> = Vec::new();
        eager_load_relations(&connection(), account_meta(), &spec, &mut records)
            .await
            .unwrap();
    }
}
