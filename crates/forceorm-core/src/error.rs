//! Core error types for forceorm.
//!
//! [`ForceError`] covers the full taxonomy of failures the query engine can
//! surface: programmer errors detected while building or compiling a query,
//! relation lookups that name nothing, and failures propagated verbatim from
//! the transport collaborator. The core never retries; see
//! [`ForceError::is_retryable`] for guidance to transport implementations.

use thiserror::Error;

/// The primary error type for forceorm.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForceError {
    // ── Query construction ───────────────────────────────────────────

    /// A where clause whose kind and operator have no rendering rule.
    #[error("Unsupported clause kind: {0}")]
    UnsupportedClauseKind(String),

    /// A sub-query argument that is not a builder, closure, or SELECT text.
    #[error("Invalid subquery argument: {0}")]
    InvalidSubqueryArgument(String),

    /// An operator string that is not part of the query language.
    #[error("Invalid operator: {0}")]
    InvalidOperator(String),

    /// A date string that is neither a calendar date nor an RFC 3339 timestamp.
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    // ── Objects and relations ────────────────────────────────────────

    /// The object type declares no relation with the requested name.
    #[error("Call to undefined relationship [{relation}] on object [{object}]")]
    RelationNotFound {
        /// The object type that was asked for the relation.
        object: String,
        /// The relation name that was requested.
        relation: String,
    },

    /// A typed read of a field the record does not carry.
    #[error("The field {field} does not exist on {object}")]
    InvalidField {
        /// The object type of the record.
        object: String,
        /// The missing field name.
        field: String,
    },

    /// A typed read with a Rust type that does not match the stored value.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// The schema collaborator has no description of an object type.
    #[error("Schema unavailable: {0}")]
    SchemaUnavailable(String),

    // ── Transport and pagination ─────────────────────────────────────

    /// The transport collaborator failed or answered with a non-success status.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// A response body that does not follow the pagination wire shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The server kept issuing continuation cursors past the page guard.
    #[error("Pagination limit exceeded after {0} pages")]
    PaginationLimitExceeded(usize),

    // ── Configuration and serialization ──────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A JSON body could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ForceError {
    /// Returns `true` for failures a transport-level retry policy may retry.
    ///
    /// Only [`ForceError::TransportFailure`] qualifies; every other variant
    /// is deterministic and would fail again.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportFailure(_))
    }

    /// Builds a [`ForceError::RelationNotFound`].
    pub fn relation_not_found(object: impl Into<String>, relation: impl Into<String>) -> Self {
        Self::RelationNotFound {
            object: object.into(),
            relation: relation.into(),
        }
    }
}

impl From<serde_json::Error> for ForceError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// A convenience type alias for `Result<T, ForceError>`.
pub type ForceResult<T> = Result<T, ForceError>;
