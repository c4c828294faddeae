//! Records, object metadata, and the typed [`Model`] trait.
//!
//! A [`Record`] is one hydrated remote object: its attributes, the relations
//! loaded onto it, and the original value of every attribute mutated since
//! hydration. [`ObjectMeta`] is the explicit per-type registry of primary
//! key and relation accessors; looking a relation up is a search in that
//! registry, never reflection.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use forceorm_core::{ForceError, ForceResult};

use crate::connection::Connection;
use crate::query::queryset::{Manager, QuerySet};
use crate::schema::{FieldType, ObjectSchema};
use crate::transport::RawRecord;
use crate::value::{FromValue, Value};

static NULL: Value = Value::Null;

/// The loaded value of one relation on a record.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationValue {
    /// A to-one relation; `None` when nothing is related.
    One(Option<Box<Record>>),
    /// A to-many relation, in result order.
    Many(Vec<Record>),
}

impl RelationValue {
    /// The related record of a to-one relation.
    pub fn as_one(&self) -> Option<&Record> {
        match self {
            Self::One(record) => record.as_deref(),
            Self::Many(_) => None,
        }
    }

    /// The related records of a to-many relation; empty for to-one.
    pub fn as_many(&self) -> &[Record] {
        match self {
            Self::Many(records) => records,
            Self::One(_) => &[],
        }
    }

    /// Returns `true` when nothing is related.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(record) => record.is_none(),
            Self::Many(records) => records.is_empty(),
        }
    }

    /// Consumes the value, returning every related record.
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::One(record) => record.map(|r| vec![*r]).unwrap_or_default(),
            Self::Many(records) => records,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Self::One(None) => serde_json::Value::Null,
            Self::One(Some(record)) => record.to_json(),
            Self::Many(records) => {
                serde_json::Value::Array(records.iter().map(Record::to_json).collect())
            }
        }
    }
}

/// One hydrated remote object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    object: String,
    attributes: BTreeMap<String, Value>,
    original: BTreeMap<String, Value>,
    relations: BTreeMap<String, RelationValue>,
}

impl Record {
    /// An empty record of `object`.
    pub fn new(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            ..Self::default()
        }
    }

    /// A record holding `attributes`, none of them marked changed.
    pub fn with_attributes<I, K, V>(object: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            object: object.into(),
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// Hydrates a raw record, keeping only the fields `schema` declares and
    /// typing date and timestamp strings by their declared type.
    pub fn hydrate(schema: &ObjectSchema, raw: &RawRecord) -> Self {
        let attributes = schema
            .fields()
            .iter()
            .filter_map(|field| {
                raw.get(&field.name)
                    .map(|json| (field.name.clone(), typed_value(field.field_type, json)))
            })
            .collect();
        Self {
            object: schema.object_name().to_string(),
            attributes,
            ..Self::default()
        }
    }

    /// The object type of this record.
    pub fn object(&self) -> &str {
        &self.object
    }

    /// The value of `field`, if the record carries it.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    /// The value of `field`, or `Null` when absent.
    pub fn value(&self, field: &str) -> &Value {
        self.attributes.get(field).unwrap_or(&NULL)
    }

    /// A typed read of `field`.
    pub fn get_as<T: FromValue>(&self, field: &str) -> ForceResult<T> {
        let value = self.get(field).ok_or_else(|| ForceError::InvalidField {
            object: self.object.clone(),
            field: field.to_string(),
        })?;
        T::from_value(value)
    }

    /// The dictionary key of `field`; `None` when absent or null.
    pub fn key(&self, field: &str) -> Option<String> {
        self.value(field).join_key()
    }

    /// Iterates over all attributes in field-name order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    // ── Attribute tracking ───────────────────────────────────────────

    /// Sets `field`, remembering its value from before the first change.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        if !self.original.contains_key(&field) {
            let before = self.value(&field).clone();
            self.original.insert(field.clone(), before);
        }
        self.attributes.insert(field, value.into());
    }

    /// Fields whose current value differs from the hydrated one.
    pub fn changes(&self) -> BTreeMap<&str, &Value> {
        self.original
            .iter()
            .filter(|(field, before)| self.value(field) != *before)
            .map(|(field, _)| (field.as_str(), self.value(field)))
            .collect()
    }

    /// Returns `true` when `field` differs from its hydrated value.
    pub fn has_changed(&self, field: &str) -> bool {
        self.original
            .get(field)
            .is_some_and(|before| self.value(field) != before)
    }

    /// Returns `true` when any field differs from its hydrated value.
    pub fn is_dirty(&self) -> bool {
        !self.changes().is_empty()
    }

    /// Restores every changed field to its hydrated value.
    pub fn discard_changes(&mut self) {
        for (field, before) in std::mem::take(&mut self.original) {
            if before.is_null() {
                self.attributes.remove(&field);
            } else {
                self.attributes.insert(field, before);
            }
        }
    }

    // ── Relations ────────────────────────────────────────────────────

    /// Stores a loaded relation, replacing any earlier value.
    pub fn set_relation(&mut self, name: impl Into<String>, value: RelationValue) -> &RelationValue {
        match self.relations.entry(name.into()) {
            Entry::Occupied(mut entry) => {
                entry.insert(value);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(value),
        }
    }

    /// The loaded value of relation `name`.
    pub fn relation(&self, name: &str) -> Option<&RelationValue> {
        self.relations.get(name)
    }

    /// Returns `true` once relation `name` has been loaded.
    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// The related record of to-one relation `name`.
    pub fn related_one(&self, name: &str) -> Option<&Record> {
        self.relation(name).and_then(RelationValue::as_one)
    }

    /// The related records of to-many relation `name`; empty when unloaded.
    pub fn related_many(&self, name: &str) -> &[Record] {
        self.relation(name).map_or(&[], RelationValue::as_many)
    }

    /// Removes and returns relation `name`.
    pub fn take_relation(&mut self, name: &str) -> Option<RelationValue> {
        self.relations.remove(name)
    }

    /// Renders attributes merged with loaded relations.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (field, value) in &self.attributes {
            map.insert(field.clone(), value.to_json());
        }
        for (name, relation) in &self.relations {
            map.insert(name.clone(), relation.to_json());
        }
        serde_json::Value::Object(map)
    }
}

fn typed_value(field_type: FieldType, json: &serde_json::Value) -> Value {
    let Some(s) = json.as_str() else {
        return Value::from_json(json);
    };
    match field_type {
        FieldType::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_or_else(|_| Value::String(s.to_string()), Value::Date),
        FieldType::DateTime => parse_timestamp(s)
            .map_or_else(|| Value::String(s.to_string()), Value::DateTimeTz),
        FieldType::Boolean | FieldType::String | FieldType::Other => Value::String(s.to_string()),
    }
}

/// Parses RFC 3339 as well as the remote store's `+0000` offset form.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ── Object metadata ──────────────────────────────────────────────────────

/// The cardinality and join keys of one relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// The parent carries `foreign_key` pointing at the related `owner_key`.
    BelongsTo {
        /// Field on the parent.
        foreign_key: &'static str,
        /// Field on the related object.
        owner_key: &'static str,
    },
    /// The related object carries `foreign_key` pointing at the parent
    /// `local_key`; at most one related record per parent.
    HasOne {
        /// Field on the related object.
        foreign_key: &'static str,
        /// Field on the parent.
        local_key: &'static str,
    },
    /// As `HasOne`, resolving to every matching record.
    HasMany {
        /// Field on the related object.
        foreign_key: &'static str,
        /// Field on the parent.
        local_key: &'static str,
    },
    /// Parent and related object joined through a junction object.
    BelongsToMany {
        /// The junction object.
        junction: &'static str,
        /// Junction field pointing at the parent.
        foreign_pivot_key: &'static str,
        /// Junction field pointing at the related object.
        related_pivot_key: &'static str,
        /// Field on the parent the junction points at.
        parent_key: &'static str,
        /// Field on the related object the junction points at.
        related_key: &'static str,
    },
}

impl RelationKind {
    /// Returns `true` for the kinds that resolve to at most one record.
    pub const fn is_to_one(&self) -> bool {
        matches!(self, Self::BelongsTo { .. } | Self::HasOne { .. })
    }

    /// The parent field whose value joins parent to related records.
    pub const fn parent_key(&self) -> &'static str {
        match *self {
            Self::BelongsTo { foreign_key, .. } => foreign_key,
            Self::HasOne { local_key, .. } | Self::HasMany { local_key, .. } => local_key,
            Self::BelongsToMany { parent_key, .. } => parent_key,
        }
    }

    /// The related field matched against [`parent_key`](Self::parent_key)
    /// (for many-to-many, against the junction's related pivot key).
    pub const fn related_key(&self) -> &'static str {
        match *self {
            Self::BelongsTo { owner_key, .. } => owner_key,
            Self::HasOne { foreign_key, .. } | Self::HasMany { foreign_key, .. } => foreign_key,
            Self::BelongsToMany { related_key, .. } => related_key,
        }
    }

    /// What an unmatched parent resolves to.
    pub const fn default_value(&self) -> RelationValue {
        if self.is_to_one() {
            RelationValue::One(None)
        } else {
            RelationValue::Many(Vec::new())
        }
    }
}

/// One named relation accessor.
#[derive(Debug, Clone, Copy)]
pub struct RelationDef {
    /// The relation name used in `with` and `where_has` paths.
    pub name: &'static str,
    /// The metadata of the related object type.
    pub related: fn() -> &'static ObjectMeta,
    /// Cardinality and join keys.
    pub kind: RelationKind,
}

impl RelationDef {
    /// A many-to-one relation.
    pub const fn belongs_to(
        name: &'static str,
        related: fn() -> &'static ObjectMeta,
        foreign_key: &'static str,
        owner_key: &'static str,
    ) -> Self {
        Self {
            name,
            related,
            kind: RelationKind::BelongsTo {
                foreign_key,
                owner_key,
            },
        }
    }

    /// A one-to-one relation owned by the related object.
    pub const fn has_one(
        name: &'static str,
        related: fn() -> &'static ObjectMeta,
        foreign_key: &'static str,
        local_key: &'static str,
    ) -> Self {
        Self {
            name,
            related,
            kind: RelationKind::HasOne {
                foreign_key,
                local_key,
            },
        }
    }

    /// A one-to-many relation.
    pub const fn has_many(
        name: &'static str,
        related: fn() -> &'static ObjectMeta,
        foreign_key: &'static str,
        local_key: &'static str,
    ) -> Self {
        Self {
            name,
            related,
            kind: RelationKind::HasMany {
                foreign_key,
                local_key,
            },
        }
    }

    /// A many-to-many relation through `junction`.
    pub const fn belongs_to_many(
        name: &'static str,
        related: fn() -> &'static ObjectMeta,
        junction: &'static str,
        foreign_pivot_key: &'static str,
        related_pivot_key: &'static str,
        parent_key: &'static str,
        related_key: &'static str,
    ) -> Self {
        Self {
            name,
            related,
            kind: RelationKind::BelongsToMany {
                junction,
                foreign_pivot_key,
                related_pivot_key,
                parent_key,
                related_key,
            },
        }
    }

    /// The metadata of the related object type.
    pub fn related_meta(&self) -> &'static ObjectMeta {
        (self.related)()
    }
}

/// Static metadata of one object type.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// The remote object name.
    pub object_name: &'static str,
    /// The primary key field.
    pub primary_key: &'static str,
    /// Every relation the type declares.
    pub relations: Vec<RelationDef>,
}

impl ObjectMeta {
    /// Metadata without relations.
    pub const fn new(object_name: &'static str, primary_key: &'static str) -> Self {
        Self {
            object_name,
            primary_key,
            relations: Vec::new(),
        }
    }

    /// Adds a relation.
    #[must_use]
    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Looks up relation `name`.
    pub fn relation(&self, name: &str) -> ForceResult<&RelationDef> {
        self.relations
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| ForceError::relation_not_found(self.object_name, name))
    }
}

/// A typed remote object.
///
/// Implementors declare their [`ObjectMeta`] once (typically in a
/// `LazyLock`) and convert hydrated [`Record`]s into themselves.
///
/// # Examples
///
/// ```
/// use std::sync::LazyLock;
/// use forceorm_core::ForceResult;
/// use forceorm_db::model::{Model, ObjectMeta, Record};
///
/// struct Account {
///     id: String,
///     name: Option<String>,
/// }
///
/// impl Model for Account {
///     fn meta() -> &'static ObjectMeta {
///         static META: LazyLock<ObjectMeta> = LazyLock::new(|| ObjectMeta::new("Account", "Id"));
///         &META
///     }
///
///     fn from_record(record: Record) -> ForceResult<Self> {
///         Ok(Self {
///             id: record.get_as("Id")?,
///             name: record.get_as("Name")?,
///         })
///     }
/// }
///
/// let record = Record::with_attributes("Account", [("Id", "001"), ("Name", "Acme")]);
/// let account = Account::from_record(record).unwrap();
/// assert_eq!(account.id, "001");
/// assert_eq!(account.name.as_deref(), Some("Acme"));
/// ```
pub trait Model: Sized + Send + Sync + 'static {
    /// The static metadata of this type.
    fn meta() -> &'static ObjectMeta;

    /// Converts a hydrated record.
    fn from_record(record: Record) -> ForceResult<Self>;

    /// A typed query over this type.
    fn query(connection: &Connection) -> QuerySet<Self> {
        QuerySet::new(connection)
    }

    /// The manager of this type.
    fn objects(connection: &Connection) -> Manager<Self> {
        Manager::new(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawRecord {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn contact_schema() -> ObjectSchema {
        ObjectSchema::new(
            "Contact",
            [
                ("Id", FieldType::String),
                ("Birthdate", FieldType::Date),
                ("LastModifiedDate", FieldType::DateTime),
                ("HasOptedOut", FieldType::Boolean),
                ("Age", FieldType::Other),
            ],
        )
    }

    #[test]
    fn test_hydrate_keeps_schema_fields_only() {
        let record = Record::hydrate(
            &contact_schema(),
            &raw(json!({
                "attributes": {"type": "Contact"},
                "Id": "003A",
                "Birthdate": "1990-04-01",
                "LastModifiedDate": "2024-01-15T10:00:00.000+0000",
                "HasOptedOut": false,
                "Age": 33,
                "Unknown": "x"
            })),
        );
        assert_eq!(record.object(), "Contact");
        assert_eq!(record.value("Id"), &Value::from("003A"));
        assert_eq!(
            record.get_as::<NaiveDate>("Birthdate").unwrap(),
            NaiveDate::from_ymd_opt(1990, 4, 1).unwrap()
        );
        assert!(matches!(record.value("LastModifiedDate"), Value::DateTimeTz(_)));
        assert_eq!(record.value("HasOptedOut"), &Value::Bool(false));
        assert_eq!(record.get_as::<i64>("Age").unwrap(), 33);
        assert!(record.get("Unknown").is_none());
        assert!(record.get("attributes").is_none());
    }

    #[test]
    fn test_hydrate_tolerates_unparsable_dates() {
        let record = Record::hydrate(&contact_schema(), &raw(json!({"Birthdate": "soon"})));
        assert_eq!(record.value("Birthdate"), &Value::from("soon"));
    }

    #[test]
    fn test_get_as_missing_field() {
        let record = Record::new("Account");
        assert!(matches!(
            record.get_as::<String>("Name"),
            Err(ForceError::InvalidField { .. })
        ));
        assert_eq!(record.value("Name"), &Value::Null);
    }

    #[test]
    fn test_change_tracking() {
        let mut record = Record::with_attributes("Account", [("Name", "Acme"), ("Type", "Customer")]);
        assert!(!record.is_dirty());

        record.set("Name", "Acme Corp");
        record.set("Rating", "Hot");
        assert!(record.has_changed("Name"));
        assert!(record.has_changed("Rating"));
        assert!(!record.has_changed("Type"));
        assert_eq!(record.changes().len(), 2);

        record.set("Name", "Acme");
        assert!(!record.has_changed("Name"));

        record.discard_changes();
        assert_eq!(record.value("Name"), &Value::from("Acme"));
        assert!(record.get("Rating").is_none());
        assert!(!record.is_dirty());
    }

    #[test]
    fn test_relations_and_json() {
        let mut account = Record::with_attributes("Account", [("Id", "001")]);
        let contact = Record::with_attributes("Contact", [("Id", "003")]);
        account.set_relation("Contacts", RelationValue::Many(vec![contact]));
        account.set_relation("Owner", RelationValue::One(None));

        assert!(account.relation_loaded("Contacts"));
        assert_eq!(account.related_many("Contacts").len(), 1);
        assert!(account.related_one("Owner").is_none());
        assert!(account.related_many("Missing").is_empty());

        assert_eq!(
            account.to_json(),
            json!({"Id": "001", "Contacts": [{"Id": "003"}], "Owner": null})
        );

        let taken = account.take_relation("Contacts").unwrap();
        assert_eq!(taken.into_records().len(), 1);
        assert!(!account.relation_loaded("Contacts"));
    }

    fn related() -> &'static ObjectMeta {
        static META: std::sync::LazyLock<ObjectMeta> =
            std::sync::LazyLock::new(|| ObjectMeta::new("Contact", "Id"));
        &META
    }

    #[test]
    fn test_relation_lookup() {
        let meta = ObjectMeta::new("Account", "Id")
            .with_relation(RelationDef::has_many("Contacts", related, "AccountId", "Id"));
        let def = meta.relation("Contacts").unwrap();
        assert_eq!(def.related_meta().object_name, "Contact");
        assert_eq!(def.kind.parent_key(), "Id");
        assert_eq!(def.kind.related_key(), "AccountId");
        assert!(!def.kind.is_to_one());

        let err = meta.relation("Widgets").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Call to undefined relationship [Widgets] on object [Account]"
        );
    }

    #[test]
    fn test_default_values() {
        let to_one = RelationKind::BelongsTo {
            foreign_key: "AccountId",
            owner_key: "Id",
        };
        assert_eq!(to_one.default_value(), RelationValue::One(None));
        let to_many = RelationKind::HasMany {
            foreign_key: "AccountId",
            local_key: "Id",
        };
        assert_eq!(to_many.default_value(), RelationValue::Many(vec![]));
    }
}
