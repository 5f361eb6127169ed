//! Settings for the RuuviTag bridge.

use std::sync::Arc;
use std::time::Duration;

use sensorbridge_common::{
    AvailabilityPayloads, LoggingConfig, MqttConfig, TopicResolver, env_bool, env_parse,
    env_string, has_wildcards,
};
use sensorbridge_framework::{BridgeConfig, BridgeError, QoS, Result, qos_from_level};

use crate::registry::DeviceRegistry;

/// Default topic prefix.
pub const DEFAULT_PREFIX: &str = "ruuvi";

/// Default Home Assistant discovery prefix.
pub const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";

/// Default minimum interval between two state messages of one device.
pub const DEFAULT_MIN_INTERVAL_SECS: u64 = 15;

/// Seeds the default MQTT client id.
const CLIENT_ID_PREFIX: &str = "ruuvi-mqtt-bridge";

/// Complete bridge settings, immutable after loading.
#[derive(Debug, Clone)]
pub struct RuuviBridgeConfig {
    /// Registered tags (`RUUVI_TAGS`).
    pub devices: Arc<DeviceRegistry>,

    /// Broker connection.
    pub mqtt: MqttConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Topic prefix (`MQTT_PREFIX`).
    pub topics: TopicResolver,

    /// Discovery prefix (`HA_DISCOVERY_PREFIX`).
    pub discovery_prefix: String,

    /// Availability payloads (`AVAIL_ONLINE` / `AVAIL_OFFLINE`).
    pub availability: AvailabilityPayloads,

    /// Retain flag for state messages (`MQTT_RETAIN`).
    pub retain: bool,

    /// QoS for state messages (`MQTT_QOS`).
    pub qos: QoS,

    /// Minimum interval per device (`PUBLISH_MIN_INTERVAL`, seconds).
    pub min_interval: Duration,

    /// Grace period for offline messages at shutdown (`SHUTDOWN_GRACE_MS`).
    pub shutdown_grace: Duration,
}

impl BridgeConfig for RuuviBridgeConfig {
    fn mqtt(&self) -> &MqttConfig {
        &self.mqtt
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn topics(&self) -> &TopicResolver {
        &self.topics
    }

    fn availability(&self) -> &AvailabilityPayloads {
        &self.availability
    }

    fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let devices = DeviceRegistry::from_json(&env_string(lookup, "RUUVI_TAGS", ""))?;
        let qos_level: u8 = env_parse(lookup, "MQTT_QOS", 0)?;

        Ok(Self {
            devices: Arc::new(devices),
            mqtt: MqttConfig::from_lookup(lookup, CLIENT_ID_PREFIX)?,
            logging: LoggingConfig::from_lookup(lookup)?,
            topics: TopicResolver::new(env_string(lookup, "MQTT_PREFIX", DEFAULT_PREFIX)),
            discovery_prefix: env_string(lookup, "HA_DISCOVERY_PREFIX", DEFAULT_DISCOVERY_PREFIX),
            availability: AvailabilityPayloads::from_lookup(lookup),
            retain: env_bool(lookup, "MQTT_RETAIN", false)?,
            qos: qos_from_level(qos_level)?,
            min_interval: Duration::from_secs(env_parse(
                lookup,
                "PUBLISH_MIN_INTERVAL",
                DEFAULT_MIN_INTERVAL_SECS,
            )?),
            shutdown_grace: Duration::from_millis(env_parse(lookup, "SHUTDOWN_GRACE_MS", 200)?),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.discovery_prefix.trim().is_empty() {
            return Err(BridgeError::validation("HA_DISCOVERY_PREFIX must not be empty"));
        }
        if has_wildcards(&self.discovery_prefix) {
            return Err(BridgeError::validation(format!(
                "HA_DISCOVERY_PREFIX '{}' must not contain '+' or '#'",
                self.discovery_prefix
            )));
        }
        if self.devices.is_empty() {
            return Err(BridgeError::config(crate::registry::EMPTY_REGISTRY_HINT));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const TAGS: (&str, &str) = ("RUUVI_TAGS", r#"{"AA:BB:CC:11:22:33":"sauna"}"#);

    #[test]
    fn test_defaults() {
        let config = RuuviBridgeConfig::load_from(&lookup_from(&[TAGS])).unwrap();

        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.mqtt.host, "localhost");
        assert_eq!(config.mqtt.port, 1883);
        assert!(config.mqtt.client_id.starts_with("ruuvi-mqtt-bridge-"));
        assert_eq!(config.topics.prefix(), "ruuvi");
        assert_eq!(config.discovery_prefix, "homeassistant");
        assert_eq!(config.availability, AvailabilityPayloads::default());
        assert!(!config.retain);
        assert_eq!(config.qos, QoS::AtMostOnce);
        assert_eq!(config.min_interval, Duration::from_secs(15));
        assert_eq!(config.shutdown_grace(), Duration::from_millis(200));
    }

    #[test]
    fn test_overrides() {
        let lookup = lookup_from(&[
            TAGS,
            ("MQTT_PREFIX", "sensors"),
            ("MQTT_RETAIN", "true"),
            ("MQTT_QOS", "1"),
            ("HA_DISCOVERY_PREFIX", "ha"),
            ("AVAIL_ONLINE", "up"),
            ("AVAIL_OFFLINE", "down"),
            ("PUBLISH_MIN_INTERVAL", "10"),
            ("SHUTDOWN_GRACE_MS", "500"),
        ]);
        let config = RuuviBridgeConfig::load_from(&lookup).unwrap();

        assert_eq!(config.topics.prefix(), "sensors");
        assert!(config.retain);
        assert_eq!(config.qos, QoS::AtLeastOnce);
        assert_eq!(config.discovery_prefix, "ha");
        assert_eq!(config.availability.online, "up");
        assert_eq!(config.min_interval, Duration::from_secs(10));
        assert_eq!(config.shutdown_grace, Duration::from_millis(500));
    }

    #[test]
    fn test_missing_tags_is_fatal() {
        let err = RuuviBridgeConfig::load_from(&lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("RUUVI_TAGS is empty"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        for pair in [
            ("MQTT_QOS", "3"),
            ("MQTT_QOS", "high"),
            ("MQTT_RETAIN", "maybe"),
            ("PUBLISH_MIN_INTERVAL", "-1"),
            ("MQTT_PREFIX", "ruuvi/#"),
            ("HA_DISCOVERY_PREFIX", "home+assistant"),
            ("MQTT_KEEP_ALIVE", "1"),
        ] {
            let result = RuuviBridgeConfig::load_from(&lookup_from(&[TAGS, pair]));
            assert!(result.is_err(), "{:?} should be rejected", pair);
        }
    }

    #[test]
    fn test_identical_availability_payloads_rejected() {
        let lookup = lookup_from(&[TAGS, ("AVAIL_ONLINE", "x"), ("AVAIL_OFFLINE", "x")]);
        assert!(RuuviBridgeConfig::load_from(&lookup).is_err());
    }
}
