//! Tracing subscriber setup

use crate::config::LoggingConfig;
use crate::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Pick the filter directive for the subscriber
///
/// `RUST_LOG` wins, then the debug flag, then the configured level.
pub fn filter_directive(config: &LoggingConfig, debug: bool, rust_log: Option<&str>) -> String {
    match rust_log {
        Some(directive) if !directive.trim().is_empty() => directive.to_string(),
        _ if debug => "debug".to_string(),
        _ => config.level.clone(),
    }
}

/// Install the global fmt subscriber
///
/// Call once from the binary entry point.
pub fn init_tracing(config: &LoggingConfig, debug: bool) -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = filter_directive(config, debug, rust_log.as_deref());

    let filter = EnvFilter::try_new(&directive)
        .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directive, e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(debug)
        .try_init()
        .map_err(|e| Error::Internal(format!("Tracing init failed: {}", e)))
}
