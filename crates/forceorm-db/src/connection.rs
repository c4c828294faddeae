//! The connection handle shared by every builder and relation.
//!
//! A [`Connection`] bundles the transport and schema collaborators with the
//! [`Settings`] they run under. Build it once at process start and clone it
//! freely afterwards: every part is behind an `Arc` and none of it can be
//! reconfigured.

use std::fmt;
use std::sync::Arc;

use forceorm_core::{ForceResult, Settings};

use crate::query::builder::QueryBuilder;
use crate::query::grammar::Grammar;
use crate::schema::{ObjectSchema, SchemaProvider};
use crate::transport::Transport;

/// Transport, schema, and settings for one remote object store.
#[derive(Clone)]
pub struct Connection {
    transport: Arc<dyn Transport>,
    schema: Arc<dyn SchemaProvider>,
    settings: Arc<Settings>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("instance_url", &self.transport.instance_url())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Creates a connection from its collaborators.
    pub fn new(
        transport: Arc<dyn Transport>,
        schema: Arc<dyn SchemaProvider>,
        settings: Settings,
    ) -> Self {
        Self {
            transport,
            schema,
            settings: Arc::new(settings),
        }
    }

    /// The transport collaborator.
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// The settings this connection was created with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Looks up the schema of `object`.
    pub async fn schema_for(&self, object: &str) -> ForceResult<Arc<ObjectSchema>> {
        self.schema.schema_for(object).await
    }

    /// The grammar queries on this connection compile with by default.
    pub fn grammar(&self) -> Grammar {
        Grammar::new().with_default_fields(self.settings.default_fields.clone())
    }

    /// A fresh query builder bound to this connection.
    pub fn query_builder(&self) -> QueryBuilder {
        QueryBuilder::new(self)
    }

    /// A fresh query builder targeting `object`.
    pub fn table(&self, object: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(self).from(object)
    }
}
