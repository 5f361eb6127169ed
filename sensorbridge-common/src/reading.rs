//! Sensor readings and the state payload built from them.

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A decoded reading delivered by a sensor source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Hardware address of the sensor (e.g., "AA:BB:CC:11:22:33").
    pub address: String,

    /// Decoded sensor fields (e.g., `temperature`, `humidity`).
    pub fields: Map<String, Value>,
}

impl SensorReading {
    /// Create a reading with no fields.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            fields: Map::new(),
        }
    }

    /// Create a reading from already decoded fields.
    pub fn with_fields(address: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            address: address.into(),
            fields,
        }
    }

    /// Add a field to this reading.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Build the flat state payload published for this reading.
    ///
    /// The decoded fields are enriched with `mac`, `name` and `time`; these
    /// three keys overwrite decoded fields of the same name.
    pub fn state_payload<Tz>(&self, name: &str, time: &DateTime<Tz>) -> Map<String, Value>
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let mut payload = self.fields.clone();
        payload.insert("mac".to_string(), Value::from(self.address.as_str()));
        payload.insert("name".to_string(), Value::from(name));
        payload.insert("time".to_string(), Value::from(format_timestamp(time)));
        payload
    }
}

/// Format a timestamp as ISO-8601 with second precision and no offset.
pub fn format_timestamp<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    time.format("%Y-%m-%dT%H:%M:%S").to_string()
}
