//! Logging initialisation, following the teacher's `--log-level` CLI convention.

use tracing_subscriber::EnvFilter;

/// Initialise the global `tracing` subscriber from a level string
/// (`trace`, `debug`, `info`, `warn`, `error`).
///
/// Mirrors the teacher's `logging::init_logging`: a single call at process
/// start, safe to call once.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
