//! SensorBridge Common Library
//!
//! This crate provides shared types and utilities for sensor-to-MQTT bridges:
//!
//! - [`config`] - Settings primitives loaded from environment variables
//! - [`topic`] - Topic resolution and topic-part sanitization
//! - [`reading`] - Decoded sensor readings and state payloads
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod reading;
pub mod topic;

// Re-export commonly used types at the crate root
pub use config::{
    AvailabilityPayloads, LogFormat, LoggingConfig, MqttConfig, env_bool, env_parse, env_string,
    parse_json5,
};
pub use error::{Error, Result};
pub use reading::{SensorReading, format_timestamp};
pub use topic::{
    BRIDGE_NODE, DeviceTopics, TopicResolver, device_id_from_address, has_wildcards,
    sanitize_topic_part,
};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level when set.
///
/// # Example
///
/// ```ignore
/// use sensorbridge_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
