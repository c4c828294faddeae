//! # forceorm
//!
//! Object queries and eager-loaded relationships over a paginated,
//! cursor-based remote object store.
//!
//! This is the meta-crate that re-exports the sub-crates. Depend on
//! `forceorm` for the whole library, or on the individual crates for
//! finer-grained control.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use forceorm::prelude::*;
//! use forceorm::tracing;
//!
//! # async fn example(
//! #     transport: Arc<dyn Transport>,
//! #     schema: Arc<dyn SchemaProvider>,
//! # ) -> ForceResult<()> {
//! let conn = Connection::new(transport, schema, Settings::default());
//!
//! let open = conn
//!     .table("Case")
//!     .where_eq("Status", "Open")
//!     .order_by("CreatedDate")
//!     .run()
//!     .await?;
//! tracing::info!(count = open.len(), "open cases");
//! # Ok(())
//! # }
//! ```

/// Error taxonomy, settings, and logging setup.
pub use forceorm_core as core;

/// Query compilation, pagination draining, records, relations, and eager
/// loading.
pub use forceorm_db as db;

/// Mock transport, static schema, fixtures, and query-count assertions.
#[cfg(feature = "testing")]
pub use forceorm_test as test;

// Third-party re-exports for transport implementations.
pub use async_trait::async_trait;
pub use http;
pub use serde_json;
pub use tracing;

/// The types most applications need.
pub mod prelude {
    pub use forceorm_core::logging::setup_logging;
    pub use forceorm_core::{ForceError, ForceResult, Settings};
    pub use forceorm_db::{
        load_relation, Connection, Direction, EagerLoadSpec, FromValue, Manager, Model,
        ObjectMeta, ObjectQuery, ObjectSchema, Operator, Page, QueryBuilder, QueryPage, QuerySet,
        RawRecord, Record, RelationDef, RelationValue, SchemaCache, SchemaProvider, Transport,
        TransportResponse, Value,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::{Arc, LazyLock};

    struct EmptyStore;

    #[crate::async_trait]
    impl Transport for EmptyStore {
        fn instance_url(&self) -> &str {
            "https://store.example.com"
        }

        async fn request(&self, _: crate::http::Method, url: &str) -> ForceResult<TransportResponse> {
            Err(ForceError::TransportFailure(format!("unexpected request to {url}")))
        }

        async fn query(&self, _: &str) -> ForceResult<QueryPage> {
            Ok(QueryPage::last(Vec::new()))
        }

        async fn query_all(&self, _: &str) -> ForceResult<QueryPage> {
            Ok(QueryPage::last(Vec::new()))
        }
    }

    struct NoSchema;

    #[crate::async_trait]
    impl SchemaProvider for NoSchema {
        async fn schema_for(&self, object: &str) -> ForceResult<Arc<ObjectSchema>> {
            Err(ForceError::SchemaUnavailable(object.to_string()))
        }
    }

    fn lead_meta() -> &'static ObjectMeta {
        static META: LazyLock<ObjectMeta> = LazyLock::new(|| ObjectMeta::new("Lead", "Id"));
        &META
    }

    #[tokio::test]
    async fn test_prelude_covers_a_round_trip() {
        let conn = Connection::new(Arc::new(EmptyStore), Arc::new(NoSchema), Settings::default());

        let rows = conn.table("Lead").where_eq("Status", "New").run().await.unwrap();
        assert!(rows.is_empty());

        let err = ObjectQuery::new(&conn, lead_meta()).get().await.unwrap_err();
        assert!(matches!(err, ForceError::SchemaUnavailable(_)));
    }
}
