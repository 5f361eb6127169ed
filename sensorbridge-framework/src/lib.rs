//! SensorBridge Framework
//!
//! Common abstractions for building bridges that publish sensor telemetry
//! to an MQTT broker.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for settings loading and validation
//! - [`BridgeRunner`] for managing bridge lifecycle (startup, shutdown, signal handling)
//! - [`MqttConnection`] and [`Lifecycle`] for the connect/reconnect state machine,
//!   Last-Will registration and re-announcement on every connect
//! - [`Publisher`] for non-blocking publishing through the [`MqttPublish`] seam
//! - [`RateLimiter`] for per-device minimum publish intervals
//! - [`BridgeArgs`] for common CLI argument parsing
//!
//! # Example
//!
//! ```ignore
//! use sensorbridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = MyBridgeConfig::from_env()?;
//!     let announcer = Arc::new(MyAnnouncer::new(&config));
//!
//!     let mut runner = BridgeRunner::new("mybridge", config, announcer).await?;
//!
//!     // Spawn sensor workers
//!     runner.spawn(my_worker(runner.publisher()));
//!
//!     // Run until Ctrl+C
//!     runner.run().await?;
//!     Ok(())
//! }
//! ```

mod args;
mod config;
mod connection;
mod error;
mod publisher;
mod runner;
mod status;
mod throttle;

pub use args::BridgeArgs;
pub use config::{BridgeConfig, DEFAULT_SHUTDOWN_GRACE, validate_common};
pub use connection::{
    Announcer, Backoff, ConnectionState, ConnectionStatus, Lifecycle, MqttConnection, mqtt_options,
};
pub use error::{BridgeError, Result};
#[cfg(any(test, feature = "test-util"))]
pub use publisher::MemoryPublisher;
pub use publisher::{MqttPublish, OutboundMessage, PublishStats, Publisher, qos_from_level};
pub use runner::BridgeRunner;
pub use status::Availability;
pub use throttle::RateLimiter;

// Re-export commonly used types from sensorbridge-common
pub use sensorbridge_common::{
    AvailabilityPayloads, LoggingConfig, MqttConfig, SensorReading, TopicResolver,
};

// Re-export the MQTT QoS type used throughout the publishing API
pub use rumqttc::QoS;
