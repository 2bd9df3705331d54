//! Logging setup.
//!
//! Installs a global `tracing` subscriber: an [`EnvFilter`] (where `RUST_LOG` wins
//! over the configured level) feeding a text or JSON `fmt` layer.

use crate::{
    config::{LogFormat, LoggingConfig},
    Error, Result,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the global subscriber described by `config`.
///
/// A second call is a no-op: the first subscriber stays in place and `Ok(())`
/// is returned, so binaries and test fixtures can both call it freely.
///
/// # Errors
/// Returns a configuration error if `config.level` is not a valid filter directive.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            Error::configuration(format!("invalid log level '{}': {e}", config.level))
        })?,
    };

    let fmt_layer = match config.format {
        LogFormat::Text => tracing_subscriber::fmt::layer().with_target(true).boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .json()
            .boxed(),
    };

    if tracing_subscriber::registry().with(fmt_layer.with_filter(filter)).try_init().is_ok() {
        tracing::debug!("Logging initialized at level {}", config.level);
    }
    Ok(())
}
