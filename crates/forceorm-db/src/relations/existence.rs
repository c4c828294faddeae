//! Relation-existence filters.
//!
//! The remote query language has no joins, so "parents with at least one
//! related record" becomes a semi-join: the parent's join key must appear
//! in a sub-select of the related object's matching key.

use forceorm_core::ForceResult;

use crate::connection::Connection;
use crate::model::{ObjectMeta, RelationKind};
use crate::query::builder::QueryBuilder;
use crate::query::object_query::ObjectQuery;

/// Builds the `(parent field, sub-select)` pair that keeps only parents of
/// `meta` with at least one `relation` record accepted by `constraint`.
///
/// Many-to-many relations go through the junction object:
/// `parent_key IN (SELECT foreign_pivot_key FROM junction WHERE
/// related_pivot_key IN (SELECT related_key FROM related ...))`.
pub fn existence_query<F>(
    connection: &Connection,
    meta: &'static ObjectMeta,
    relation: &str,
    constraint: F,
) -> ForceResult<(String, QueryBuilder)>
where
    F: FnOnce(ObjectQuery) -> ObjectQuery,
{
    let def = meta.relation(relation)?;
    let related = ObjectQuery::new(connection, def.related_meta());
    let (field, subquery) = match def.kind {
        RelationKind::BelongsTo {
            foreign_key,
            owner_key,
        } => (
            foreign_key,
            constraint(related.select([owner_key])).into_builder(),
        ),
        RelationKind::HasOne {
            foreign_key,
            local_key,
        }
        | RelationKind::HasMany {
            foreign_key,
            local_key,
        } => (
            local_key,
            constraint(related.select([foreign_key])).into_builder(),
        ),
        RelationKind::BelongsToMany {
            junction,
            foreign_pivot_key,
            related_pivot_key,
            parent_key,
            related_key,
        } => {
            let inner = constraint(related.select([related_key])).into_builder();
            (
                parent_key,
                connection
                    .table(junction)
                    .select([foreign_pivot_key])
                    .where_in_sub(related_pivot_key, inner),
            )
        }
    };
    Ok((field.to_string(), subquery))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::connection;
    use crate::model::RelationDef;
    use forceorm_core::ForceError;
    use std::sync::LazyLock;

    fn user_meta() -> &'static ObjectMeta {
        static META: LazyLock<ObjectMeta> = LazyLock::new(|| ObjectMeta::new("User", "Id"));
        &META
    }

    fn group_meta() -> &'static ObjectMeta {
        static META: LazyLock<ObjectMeta> = LazyLock::new(|| ObjectMeta::new("Group", "Id"));
        &META
    }

    fn case_meta() -> &'static ObjectMeta {
        static META: LazyLock<ObjectMeta> = LazyLock::new(|| {
            ObjectMeta::new("Case", "Id")
                .with_relation(RelationDef::belongs_to("Owner", user_meta, "OwnerId", "Id"))
                .with_relation(RelationDef::has_many("Comments", user_meta, "ParentId", "Id"))
                .with_relation(RelationDef::belongs_to_many(
                    "Groups",
                    group_meta,
                    "CaseGroup",
                    "CaseId",
                    "GroupId",
                    "Id",
                    "Id",
                ))
        });
        &META
    }

    fn render(relation: &str, constraint: impl FnOnce(ObjectQuery) -> ObjectQuery) -> String {
        let (field, sub) = existence_query(&connection(), case_meta(), relation, constraint).unwrap();
        format!("{field} IN ({})", sub.to_query_text().unwrap())
    }

    #[test]
    fn test_belongs_to() {
        assert_eq!(
            render("Owner", |q| q.where_eq("IsActive", true)),
            "OwnerId IN (SELECT Id FROM User WHERE IsActive = true)"
        );
    }

    #[test]
    fn test_has_many() {
        assert_eq!(
            render("Comments", |q| q),
            "Id IN (SELECT ParentId FROM User)"
        );
    }

    #[test]
    fn test_many_to_many() {
        assert_eq!(
            render("Groups", |q| q.where_eq("Type", "Queue")),
            "Id IN (SELECT CaseId FROM CaseGroup WHERE GroupId IN \
             (SELECT Id FROM Group WHERE Type = 'Queue'))"
        );
    }

    #[test]
    fn test_unknown_relation() {
        let err = existence_query(&connection(), case_meta(), "Widgets", |q| q).unwrap_err();
        assert!(matches!(err, ForceError::RelationNotFound { .. }));
    }
}
