use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{Error, Result};

const LOG_ENV: &str = "FIMP_LOG";

/// Build the log filter
///
/// `FIMP_LOG` wins over `RUST_LOG`, which wins over the configured level.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directive = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var(EnvFilter::DEFAULT_ENV))
        .unwrap_or_else(|_| config.level.clone());
    EnvFilter::try_new(&directive)
        .map_err(|e| Error::Config(format!("invalid log filter '{directive}': {e}")))
}

/// Install the global tracing subscriber
///
/// Does nothing if a subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;

    let fmt_layer = match config.format {
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().with_target(false).json().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .ok();
    Ok(())
}
