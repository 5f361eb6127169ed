//! Settings primitives shared by all bridges.
//!
//! Bridges are configured from environment variables. Every loader takes a
//! lookup function instead of reading `std::env` directly, so a settings
//! record can be built from any key/value source (tests use a `HashMap`).
//! Empty values are treated the same as unset ones.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Read a string value, falling back to `default` when unset or empty.
pub fn env_string(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

/// Read and parse a value, falling back to `default` when unset or empty.
pub fn env_parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|e: T::Err| Error::invalid_value(key, format!("'{}': {}", value, e))),
        _ => Ok(default),
    }
}

/// Read a boolean flag. Accepts `true/false`, `1/0`, `yes/no` and `on/off`.
pub fn env_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> Result<bool> {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            other => Err(Error::invalid_value(
                key,
                format!("'{}' is not a boolean", other),
            )),
        },
        _ => Ok(default),
    }
}

/// Parse a JSON5 document (plain JSON is accepted too).
pub fn parse_json5<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse JSON5: {}", e)))
}

/// MQTT broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MqttConfig {
    /// Broker host name or address.
    pub host: String,

    /// Broker TCP port.
    pub port: u16,

    /// User name; credentials are only sent when this is non-empty.
    pub username: String,

    /// Password for `username`.
    #[serde(skip_serializing)]
    pub password: String,

    /// MQTT client identifier.
    pub client_id: String,

    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u64,
}

impl MqttConfig {
    /// Load from `MQTT_HOST`, `MQTT_PORT`, `MQTT_USER`, `MQTT_PASS`,
    /// `MQTT_CLIENT_ID` and `MQTT_KEEP_ALIVE`.
    ///
    /// `client_prefix` seeds the default client id (`<prefix>-<pid>`).
    pub fn from_lookup(
        lookup: &impl Fn(&str) -> Option<String>,
        client_prefix: &str,
    ) -> Result<Self> {
        let default_client_id = format!("{}-{}", client_prefix, std::process::id());

        Ok(Self {
            host: env_string(lookup, "MQTT_HOST", "localhost"),
            port: env_parse(lookup, "MQTT_PORT", 1883)?,
            username: env_string(lookup, "MQTT_USER", ""),
            password: env_string(lookup, "MQTT_PASS", ""),
            client_id: env_string(lookup, "MQTT_CLIENT_ID", &default_client_id),
            keep_alive_secs: env_parse(lookup, "MQTT_KEEP_ALIVE", 60)?,
        })
    }

    /// Whether credentials should be sent on connect.
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }
}

/// Payload pair used on every availability topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityPayloads {
    pub online: String,
    pub offline: String,
}

impl Default for AvailabilityPayloads {
    fn default() -> Self {
        Self {
            online: "online".to_string(),
            offline: "offline".to_string(),
        }
    }
}

impl AvailabilityPayloads {
    /// Load from `AVAIL_ONLINE` and `AVAIL_OFFLINE`.
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            online: env_string(lookup, "AVAIL_ONLINE", &defaults.online),
            offline: env_string(lookup, "AVAIL_OFFLINE", &defaults.offline),
        }
    }

    /// Online and offline must be distinguishable by subscribers.
    pub fn validate(&self) -> Result<()> {
        if self.online.is_empty() || self.offline.is_empty() {
            return Err(Error::Config(
                "AVAIL_ONLINE and AVAIL_OFFLINE must not be empty".to_string(),
            ));
        }
        if self.online == self.offline {
            return Err(Error::Config(format!(
                "AVAIL_ONLINE and AVAIL_OFFLINE must differ (both are '{}')",
                self.online
            )));
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{}', expected 'text' or 'json'", other)),
        }
    }
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,

    /// Log output format: "text" or "json".
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Load from `LOG_LEVEL` and `LOG_FORMAT`.
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            level: env_string(lookup, "LOG_LEVEL", &default_log_level()),
            format: env_parse(lookup, "LOG_FORMAT", LogFormat::default())?,
        })
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

    #[test]
    fn test_mqtt_defaults() {
        let config = MqttConfig::from_lookup(&lookup_from(&[]), "bridge").unwrap();

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 1883);
        assert!(!config.has_credentials());
        assert!(config.client_id.starts_with("bridge-"));
        assert_eq!(config.keep_alive_secs, 60);
    }

    #[test]
    fn test_mqtt_from_values() {
        let lookup = lookup_from(&[
            ("MQTT_HOST", "broker.lan"),
            ("MQTT_PORT", "8883"),
            ("MQTT_USER", "ruuvi"),
            ("MQTT_PASS", "secret"),
            ("MQTT_CLIENT_ID", "sauna"),
        ]);
        let config = MqttConfig::from_lookup(&lookup, "bridge").unwrap();

        assert_eq!(config.host, "broker.lan");
        assert_eq!(config.port, 8883);
        assert!(config.has_credentials());
        assert_eq!(config.client_id, "sauna");
    }

    #[test]
    fn test_password_not_serialized() {
        let lookup = lookup_from(&[("MQTT_USER", "u"), ("MQTT_PASS", "hunter2")]);
        let config = MqttConfig::from_lookup(&lookup, "bridge").unwrap();

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_invalid_port() {
        let lookup = lookup_from(&[("MQTT_PORT", "not-a-port")]);
        let err = MqttConfig::from_lookup(&lookup, "bridge").unwrap_err();
        assert!(matches!(err, Error::InvalidValue { ref key, .. } if key == "MQTT_PORT"));
    }

    #[test]
    fn test_empty_value_uses_default() {
        let lookup = lookup_from(&[("MQTT_PORT", ""), ("MQTT_HOST", "  ")]);
        let config = MqttConfig::from_lookup(&lookup, "bridge").unwrap();
        assert_eq!(config.port, 1883);
        assert_eq!(config.host, "localhost");
    }

    #[test]
    fn test_env_bool() {
        let lookup = lookup_from(&[("A", "TRUE"), ("B", "no"), ("C", "maybe")]);
        assert!(env_bool(&lookup, "A", false).unwrap());
        assert!(!env_bool(&lookup, "B", true).unwrap());
        assert!(env_bool(&lookup, "C", false).is_err());
        assert!(env_bool(&lookup, "MISSING", true).unwrap());
    }

    #[test]
    fn test_logging_config() {
        let config = LoggingConfig::from_lookup(&lookup_from(&[])).unwrap();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Text);

        let lookup = lookup_from(&[("LOG_LEVEL", "debug"), ("LOG_FORMAT", "JSON")]);
        let config = LoggingConfig::from_lookup(&lookup).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);

        let lookup = lookup_from(&[("LOG_FORMAT", "xml")]);
        assert!(LoggingConfig::from_lookup(&lookup).is_err());
    }

    #[test]
    fn test_availability_payloads() {
        let payloads = AvailabilityPayloads::from_lookup(&lookup_from(&[]));
        assert_eq!(payloads, AvailabilityPayloads::default());
        assert!(payloads.validate().is_ok());

        let lookup = lookup_from(&[("AVAIL_ONLINE", "up"), ("AVAIL_OFFLINE", "up")]);
        let payloads = AvailabilityPayloads::from_lookup(&lookup);
        assert!(payloads.validate().is_err());
    }

    #[test]
    fn test_parse_json5() {
        let map: HashMap<String, String> =
            parse_json5("{ 'AA:BB:CC:11:22:33': 'sauna', }").unwrap();
        assert_eq!(map.get("AA:BB:CC:11:22:33"), Some(&"sauna".to_string()));

        assert!(parse_json5::<HashMap<String, String>>("{ not json").is_err());
    }
}
