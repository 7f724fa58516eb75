use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Installs the global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over the configured directive. Returns `false`
/// when a subscriber was already installed, which is not an error.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .try_init()
        .is_ok()
}
