//! A schema provider backed by a fixed set of object descriptions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use forceorm_core::{ForceError, ForceResult};
use forceorm_db::schema::{ObjectSchema, SchemaProvider};

/// Describes exactly the objects registered with
/// [`with_object`](Self::with_object) and counts every lookup.
#[derive(Debug, Default)]
pub struct StaticSchema {
    objects: HashMap<String, Arc<ObjectSchema>>,
    lookups: AtomicUsize,
}

impl StaticSchema {
    /// Creates a provider that describes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `schema` under its object name.
    #[must_use]
    pub fn with_object(mut self, schema: ObjectSchema) -> Self {
        self.objects
            .insert(schema.object_name().to_string(), Arc::new(schema));
        self
    }

    /// Number of lookups answered so far, successful or not.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchemaProvider for StaticSchema {
    async fn schema_for(&self, object: &str) -> ForceResult<Arc<ObjectSchema>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.objects
            .get(object)
            .cloned()
            .ok_or_else(|| ForceError::SchemaUnavailable(format!("no description of {object}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forceorm_db::schema::{FieldType, SchemaCache};

    fn provider() -> StaticSchema {
        StaticSchema::new().with_object(ObjectSchema::new(
            "Lead",
            [("Id", FieldType::String), ("Company", FieldType::String)],
        ))
    }

    #[tokio::test]
    async fn test_known_object() {
        let schema = provider().schema_for("Lead").await.unwrap();
        assert_eq!(schema.field_names(), vec!["Id", "Company"]);
    }

    #[tokio::test]
    async fn test_unknown_object() {
        let result = provider().schema_for("Nope").await;
        assert!(matches!(result, Err(ForceError::SchemaUnavailable(_))));
    }

    #[tokio::test]
    async fn test_cache_describes_each_object_once() {
        let cache = SchemaCache::new(provider());
        cache.schema_for("Lead").await.unwrap();
        cache.schema_for("Lead").await.unwrap();
        assert_eq!(cache.len().await, 1);
    }
}
