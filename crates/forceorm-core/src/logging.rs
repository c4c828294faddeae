//! Logging integration for forceorm.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`Settings`](crate::settings::Settings) and for creating per-query spans.

use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

/// Target used for the single diagnostic event emitted per compiled query.
pub const QUERY_LOG_TARGET: &str = "forceorm::query";

/// Installs the global subscriber described by `settings`.
///
/// `settings.log_level` is an [`EnvFilter`] directive string; an invalid one
/// falls back to `info`. With `settings.debug` set, output is compact text
/// and every compiled query is logged under [`QUERY_LOG_TARGET`]. Otherwise
/// each event is one flattened JSON object carrying its query span. Only the
/// first call installs anything.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;

    let filter = log_filter(settings);
    let installed = if settings.debug {
        fmt().with_env_filter(filter).compact().try_init()
    } else {
        fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .try_init()
    };
    if installed.is_err() {
        tracing::trace!("global subscriber already installed");
    }
}

/// The filter [`setup_logging`] installs.
pub fn log_filter(settings: &Settings) -> EnvFilter {
    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    if !settings.debug {
        return filter;
    }
    match format!("{QUERY_LOG_TARGET}=debug").parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

/// Creates a tracing span for one query execution against `object`.
///
/// # Examples
///
/// ```
/// use forceorm_core::logging::query_span;
///
/// let span = query_span("Account");
/// let _guard = span.enter();
/// tracing::info!("draining pages");
/// ```
pub fn query_span(object: &str) -> tracing::Span {
    tracing::info_span!("soql", object = object)
}
