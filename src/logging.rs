//! Logging initialization
//!
//! Sets up a tracing subscriber with an environment filter. `RUST_LOG`
//! takes precedence over the CLI verbosity flag.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::LogFormat;

/// Initialize the logging system
pub fn init_logging(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => {
            registry.with(fmt::layer().json().with_target(false)).init();
        }
        LogFormat::Pretty => {
            registry.with(fmt::layer().with_target(false)).init();
        }
    }
}
