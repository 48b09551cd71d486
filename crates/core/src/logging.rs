//! Structured logging infrastructure for MeshFlow.
//!
//! This module provides centralized logging initialization with support
//! for structured JSON output and environment-based configuration.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the level filter: `RUST_LOG` wins over the configured level.
fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the logging system with structured output.
///
/// Log level can be configured via the `RUST_LOG` environment variable.
/// If not set, `default_level` is used.
///
/// # Example
/// ```no_run
/// use meshflow_core::logging;
///
/// logging::init("info");
/// tracing::info!("Node started");
/// ```
pub fn init(default_level: &str) {
    tracing_subscriber::registry()
        .with(build_filter(default_level))
        .with(fmt::layer().with_target(true))
        .init();
}

/// Initialize the logging system with JSON output for production environments.
///
/// This format is suitable for log aggregation systems and structured log analysis.
///
/// # Example
/// ```no_run
/// use meshflow_core::logging;
///
/// logging::init_json("info");
/// tracing::info!(role = "gateway", "Node started");
/// ```
pub fn init_json(default_level: &str) {
    tracing_subscriber::registry()
        .with(build_filter(default_level))
        .with(fmt::layer().json().with_target(true))
        .init();
}

/// Initialize logging from the `[logging]` section of a node configuration
pub fn init_from_config(config: &LoggingConfig) {
    if config.json {
        init_json(&config.level);
    } else {
        init(&config.level);
    }
}
