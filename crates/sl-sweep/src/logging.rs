use anyhow::{anyhow, Result};
use std::io;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::optimizer::OPTIMIZER_LOG_TARGET;

/// Filter directives for `config`: the global level plus a separate level
/// for the optimizer target.
pub fn filter_directives(config: &LoggingConfig) -> String {
    format!(
        "{},{}={}",
        config.level.to_ascii_lowercase(),
        OPTIMIZER_LOG_TARGET,
        config.optimizer_level.to_ascii_lowercase()
    )
}

/// Install the global subscriber. `RUST_LOG`, when set, replaces the
/// configured levels. Logs go to stderr so stdout stays clean for output.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives)?,
        _ => EnvFilter::try_new(filter_directives(config))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true);

    match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    }
    .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}
