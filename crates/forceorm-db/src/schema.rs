//! The schema collaborator contract.
//!
//! A [`SchemaProvider`] answers one question: given an object type name,
//! which fields does it declare and with which data type. forceorm consults
//! it to pick the default field selection, to format where-clause literals,
//! and to decide which fields to hydrate onto a [`Record`](crate::model::Record).
//!
//! [`SchemaCache`] memoises any provider. It is the only piece of state that
//! is safe to share between concurrent query executions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use forceorm_core::ForceResult;
use tokio::sync::RwLock;

/// The declared data type of a field, as far as the query engine cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `true`/`false`.
    Boolean,
    /// A calendar date.
    Date,
    /// A timestamp with offset.
    DateTime,
    /// Any textual field, including identifiers and references.
    String,
    /// Numbers, currencies, compound fields and everything else.
    Other,
}

impl FieldType {
    /// Maps a remote type name (`"boolean"`, `"date"`, `"datetime"`, ...) to a
    /// `FieldType`.
    pub fn from_remote(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "datetime" => Self::DateTime,
            "string" | "id" | "reference" | "picklist" | "textarea" | "email" | "phone"
            | "url" => Self::String,
            _ => Self::Other,
        }
    }
}

/// One declared field of an object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// The field name.
    pub name: String,
    /// The declared data type.
    pub field_type: FieldType,
}

/// The ordered field declarations of one object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSchema {
    object: String,
    fields: Vec<FieldDescriptor>,
}

impl ObjectSchema {
    /// Creates a schema from `(name, type)` pairs, keeping declaration order.
    pub fn new<I, S>(object: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        Self {
            object: object.into(),
            fields: fields
                .into_iter()
                .map(|(name, field_type)| FieldDescriptor {
                    name: name.into(),
                    field_type,
                })
                .collect(),
        }
    }

    /// The object type this schema describes.
    pub fn object_name(&self) -> &str {
        &self.object
    }

    /// All field declarations, in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// All field names, in declaration order.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// The declared type of `field`, if the object declares it.
    pub fn field_type(&self, field: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find(|f| f.name == field)
            .map(|f| f.field_type)
    }

    /// Returns `true` if the object declares `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.field_type(field).is_some()
    }
}

/// Supplies field metadata for object types.
///
/// Implementations return [`ForceError::SchemaUnavailable`] for object types
/// they cannot describe.
///
/// [`ForceError::SchemaUnavailable`]: forceorm_core::ForceError::SchemaUnavailable
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Returns the field declarations of `object`.
    async fn schema_for(&self, object: &str) -> ForceResult<Arc<ObjectSchema>>;
}

/// A memoising wrapper around another [`SchemaProvider`].
///
/// Each object type is described at most once; later lookups are served
/// from memory. Failed lookups are not cached.
pub struct SchemaCache<P> {
    inner: P,
    cache: RwLock<HashMap<String, Arc<ObjectSchema>>>,
}

impl<P: SchemaProvider> SchemaCache<P> {
    /// Wraps `inner` with an empty cache.
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Number of object types currently cached.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Returns `true` if nothing has been cached yet.
    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }
}

#[async_trait]
impl<P: SchemaProvider> SchemaProvider for SchemaCache<P> {
    async fn schema_for(&self, object: &str) -> ForceResult<Arc<ObjectSchema>> {
        if let Some(schema) = self.cache.read().await.get(object) {
            return Ok(Arc::clone(schema));
        }

        let schema = self.inner.schema_for(object).await?;
        self.cache
            .write()
            .await
            .insert(object.to_string(), Arc::clone(&schema));
        tracing::debug!(object, fields = schema.fields().len(), "cached object schema");
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forceorm_core::ForceError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl SchemaProvider for CountingProvider {
        async fn schema_for(&self, object: &str) -> ForceResult<Arc<ObjectSchema>> {
            self.lookups.fetch_add(1, Ordering::Relaxed);
            if object == "Missing" {
                return Err(ForceError::SchemaUnavailable(object.to_string()));
            }
            Ok(Arc::new(ObjectSchema::new(
                object,
                [("Id", FieldType::String), ("IsActive", FieldType::Boolean)],
            )))
        }
    }

    #[test]
    fn test_field_lookup() {
        let schema = ObjectSchema::new(
            "Account",
            [("Id", FieldType::String), ("CreatedDate", FieldType::DateTime)],
        );
        assert_eq!(schema.object_name(), "Account");
        assert_eq!(schema.field_type("CreatedDate"), Some(FieldType::DateTime));
        assert_eq!(schema.field_type("Nope"), None);
        assert_eq!(schema.field_names(), vec!["Id", "CreatedDate"]);
    }

    #[test]
    fn test_from_remote() {
        assert_eq!(FieldType::from_remote("boolean"), FieldType::Boolean);
        assert_eq!(FieldType::from_remote("DateTime"), FieldType::DateTime);
        assert_eq!(FieldType::from_remote("reference"), FieldType::String);
        assert_eq!(FieldType::from_remote("currency"), FieldType::Other);
    }

    #[tokio::test]
    async fn test_cache_memoises_lookups() {
        let cache = SchemaCache::new(CountingProvider {
            lookups: AtomicUsize::new(0),
        });
        let first = cache.schema_for("Account").await.unwrap();
        let second = cache.schema_for("Account").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.inner.lookups.load(Ordering::Relaxed), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_cache_does_not_store_failures() {
        let cache = SchemaCache::new(CountingProvider {
            lookups: AtomicUsize::new(0),
        });
        assert!(cache.schema_for("Missing").await.is_err());
        assert!(cache.schema_for("Missing").await.is_err());
        assert_eq!(cache.inner.lookups.load(Ordering::Relaxed), 2);
        assert!(cache.is_empty().await);
    }
}
