//! Diagnostic output.
//!
//! The library only emits `tracing` events. A host that has no subscriber of
//! its own can call [`init`] once to print them to stderr.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Environment variable consulted when no filter is passed to [`init`].
pub const ENV_FILTER: &str = "HOSTLINK_LOG";

pub const DEFAULT_FILTER: &str = "info";

/// Resolves the filter [`init`] would use. Directives that fail to parse fall
/// back to [`DEFAULT_FILTER`].
pub fn env_filter(directives: Option<&str>) -> EnvFilter {
    match directives {
        Some(directives) => EnvFilter::try_new(directives).ok(),
        None => EnvFilter::try_from_env(ENV_FILTER).ok(),
    }
    .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs a stderr subscriber as the global default.
///
/// The filter comes from `filter`, else [`ENV_FILTER`], else
/// [`DEFAULT_FILTER`]. Returns false if a global subscriber was already set,
/// in which case nothing changes.
pub fn init(filter: Option<&str>) -> bool {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter(filter))
        .with(layer)
        .try_init()
        .is_ok()
}
