//! Settings for forceorm.
//!
//! [`Settings`] is an explicit configuration object. It is built once at
//! process start, handed to `forceorm_db::Connection::new` and treated as
//! immutable from then on. Nothing in forceorm reads configuration from
//! global state.

use serde::{Deserialize, Serialize};

/// The complete set of forceorm settings.
///
/// # Examples
///
/// ```
/// use forceorm_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert_eq!(settings.max_pages, 2_000);
/// assert_eq!(settings.default_fields, vec!["Id".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Upper bound on pages drained for one query, guarding against a server
    /// that never reports its terminal flag.
    pub max_pages: usize,
    /// Fields whose presence in a where clause routes the query to the
    /// endpoint that includes archived and deleted records.
    pub archive_marker_fields: Vec<String>,
    /// Fields rendered when a query has no explicit selection.
    pub default_fields: Vec<String>,
    /// The log level (e.g. "info", "debug", "warn").
    pub log_level: String,
    /// Whether to use human-readable log output.
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_pages: 2_000,
            archive_marker_fields: vec!["IsDeleted".to_string(), "IsArchived".to_string()],
            default_fields: vec!["Id".to_string()],
            log_level: "info".to_string(),
            debug: false,
        }
    }
}

impl Settings {
    /// Returns `true` if `field` is one of the archive marker fields.
    pub fn is_archive_marker(&self, field: &str) -> bool {
        self.archive_marker_fields.iter().any(|f| f == field)
    }
}
