use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the tracing filter directive.
pub const LOG_ENV: &str = "BCN_LAYER_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Initialize structured logging with environment filter.
/// Set BCN_LAYER_LOG=debug (or trace, info, warn, error) for verbosity control.
///
/// `fallback` is used when the environment variable is unset, typically the
/// `log_filter` from the layer config file.
///
/// The layer lives inside someone else's process, so an already installed
/// global subscriber wins and this call becomes a no-op.
pub fn init_logging(fallback: Option<&str>) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        fallback
            .and_then(|directive| EnvFilter::try_new(directive).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}
