//! Logging integration for the drift migration engine.
//!
//! Provides a helper for configuring tracing-based logging from a
//! [`Config`](crate::config::Config). Note that the executor's structured
//! progress stream (file and statement events) is a separate concern and is
//! rendered by the CLI, not by the tracing subscriber.

use crate::config::Config;

/// Sets up the global tracing subscriber based on the given configuration.
///
/// The log filter is read from `config.log_level`. In debug mode a pretty,
/// human-readable format is used; otherwise a structured JSON format is
/// used. Installing a second subscriber is a no-op.
pub fn setup_logging(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}
