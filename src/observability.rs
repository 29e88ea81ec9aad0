//! Tracing setup.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `level` accepts the usual tracing directives plus a few legacy aliases
/// from earlier deployments. Falls back to `RUST_LOG`, then `info`. Safe to
/// call more than once; later calls are no-ops.
pub fn init_tracing(level: Option<&str>) {
    let directive = match level {
        Some("DISABLED") => "off".to_string(),
        Some("WARNING") => "warn".to_string(),
        Some("CRITICAL") => "error".to_string(),
        Some(other) => other.to_ascii_lowercase(),
        None => std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
    };
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
