//! Configuration traits and utilities.

use std::time::Duration;

use sensorbridge_common::{
    AvailabilityPayloads, LoggingConfig, MqttConfig, TopicResolver, has_wildcards,
};

use crate::error::{BridgeError, Result};

/// Default time allowed for offline announcements to reach the broker.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

/// Trait for bridge configuration types.
///
/// Implement this trait for your bridge's settings record to get
/// environment loading, validation, and access to common settings.
///
/// # Example
///
/// ```ignore
/// use sensorbridge_framework::{BridgeConfig, BridgeError, Result};
///
/// pub struct MyBridgeConfig {
///     pub mqtt: MqttConfig,
///     pub logging: LoggingConfig,
///     pub topics: TopicResolver,
///     pub availability: AvailabilityPayloads,
///     pub devices: Vec<String>,
/// }
///
/// impl BridgeConfig for MyBridgeConfig {
///     fn mqtt(&self) -> &MqttConfig { &self.mqtt }
///     fn logging(&self) -> &LoggingConfig { &self.logging }
///     fn topics(&self) -> &TopicResolver { &self.topics }
///     fn availability(&self) -> &AvailabilityPayloads { &self.availability }
///
///     fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
///         // read MY_DEVICES etc.
///     }
///
///     fn validate(&self) -> Result<()> {
///         if self.devices.is_empty() {
///             return Err(BridgeError::validation("At least one device required"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait BridgeConfig: Sized + Send + Sync + 'static {
    /// Get the MQTT connection settings.
    fn mqtt(&self) -> &MqttConfig;

    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Get the topic resolver for this bridge's prefix.
    fn topics(&self) -> &TopicResolver;

    /// Get the availability payload pair.
    fn availability(&self) -> &AvailabilityPayloads;

    /// Time allowed for offline announcements before disconnecting.
    fn shutdown_grace(&self) -> Duration {
        DEFAULT_SHUTDOWN_GRACE
    }

    /// Build the settings record from a key/value lookup.
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self>;

    /// Validate bridge-specific settings.
    ///
    /// Called automatically after loading. Override to add custom validation.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Build from a lookup, then run the common and bridge-specific checks.
    fn load_from(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Self::from_lookup(lookup)?;
        validate_common(&config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the process environment.
    fn from_env() -> Result<Self> {
        Self::load_from(&|key: &str| std::env::var(key).ok())
    }
}

/// Checks every bridge shares: broker address, prefix and availability pair.
pub fn validate_common<C: BridgeConfig>(config: &C) -> Result<()> {
    let mqtt = config.mqtt();
    if mqtt.host.trim().is_empty() {
        return Err(BridgeError::validation("MQTT_HOST must not be empty"));
    }
    if mqtt.keep_alive_secs < 5 {
        return Err(BridgeError::validation(format!(
            "MQTT_KEEP_ALIVE must be at least 5 seconds (got {})",
            mqtt.keep_alive_secs
        )));
    }

    let prefix = config.topics().prefix();
    if prefix.trim().is_empty() {
        return Err(BridgeError::validation("Topic prefix must not be empty"));
    }
    if has_wildcards(prefix) {
        return Err(BridgeError::validation(format!(
            "Topic prefix '{}' must not contain '+' or '#'",
            prefix
        )));
    }

    config.availability().validate()?;

    Ok(())
}
