//! Home Assistant MQTT discovery documents.
//!
//! Every registered tag is announced as one device with four sensor
//! entities. Documents are retained on
//! `<discovery_prefix>/sensor/ruuvi_<device_id>_<field>/config`, so
//! republishing them overwrites the previous announcement instead of
//! creating new entities.

use serde::Serialize;

use sensorbridge_common::{AvailabilityPayloads, TopicResolver};
use sensorbridge_framework::{OutboundMessage, QoS, Result};

use crate::registry::{Device, DeviceRegistry};

/// Prefix of every unique id and device identifier.
pub const UNIQUE_ID_PREFIX: &str = "ruuvi";

const MANUFACTURER: &str = "Ruuvi Innovations";
const MODEL: &str = "RuuviTag";

/// One announced sensor field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorField {
    /// Key in the JSON state payload.
    pub key: &'static str,
    /// Appended to the device name to form the entity name.
    pub label: &'static str,
    pub unit: &'static str,
    pub device_class: &'static str,
    pub state_class: &'static str,
}

/// The fields announced for every tag.
pub const SENSOR_FIELDS: [SensorField; 4] = [
    SensorField {
        key: "temperature",
        label: "Temperature",
        unit: "°C",
        device_class: "temperature",
        state_class: "measurement",
    },
    SensorField {
        key: "humidity",
        label: "Humidity",
        unit: "%",
        device_class: "humidity",
        state_class: "measurement",
    },
    SensorField {
        key: "pressure",
        label: "Pressure",
        unit: "hPa",
        device_class: "pressure",
        state_class: "measurement",
    },
    SensorField {
        key: "battery",
        label: "Battery",
        unit: "mV",
        device_class: "voltage",
        state_class: "measurement",
    },
];

impl SensorField {
    /// Template extracting this field from the state payload.
    pub fn value_template(&self) -> String {
        format!("{{{{ value_json.{} }}}}", self.key)
    }
}

/// Device block shared by the entities of one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

/// A sensor entity configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryDocument {
    pub name: String,
    pub unique_id: String,
    pub state_topic: String,
    pub value_template: String,
    pub unit_of_measurement: String,
    pub device_class: String,
    pub state_class: String,
    pub availability_topic: String,
    pub payload_available: String,
    pub payload_not_available: String,
    pub device: DeviceDescriptor,
}

/// Builds discovery documents from the bridge settings.
#[derive(Debug, Clone)]
pub struct DiscoveryGenerator {
    topics: TopicResolver,
    discovery_prefix: String,
    availability: AvailabilityPayloads,
}

impl DiscoveryGenerator {
    pub fn new(
        topics: TopicResolver,
        discovery_prefix: impl Into<String>,
        availability: AvailabilityPayloads,
    ) -> Self {
        Self {
            topics,
            discovery_prefix: discovery_prefix.into(),
            availability,
        }
    }

    /// `ruuvi_<device_id>_<field>`.
    pub fn unique_id(device: &Device, field: &SensorField) -> String {
        format!("{}_{}_{}", UNIQUE_ID_PREFIX, device.id, field.key)
    }

    /// Where the document for `unique_id` is retained.
    pub fn config_topic(&self, unique_id: &str) -> String {
        format!("{}/sensor/{}/config", self.discovery_prefix, unique_id)
    }

    pub fn descriptor(device: &Device) -> DeviceDescriptor {
        DeviceDescriptor {
            identifiers: vec![format!("{}_{}", UNIQUE_ID_PREFIX, device.id)],
            name: format!("RuuviTag {}", device.name),
            manufacturer: MANUFACTURER.to_string(),
            model: MODEL.to_string(),
        }
    }

    pub fn document(&self, device: &Device, field: &SensorField) -> DiscoveryDocument {
        let topics = self.topics.device(&device.name);

        DiscoveryDocument {
            name: format!("{} {}", device.name, field.label),
            unique_id: Self::unique_id(device, field),
            state_topic: topics.state,
            value_template: field.value_template(),
            unit_of_measurement: field.unit.to_string(),
            device_class: field.device_class.to_string(),
            state_class: field.state_class.to_string(),
            availability_topic: topics.availability,
            payload_available: self.availability.online.clone(),
            payload_not_available: self.availability.offline.clone(),
            device: Self::descriptor(device),
        }
    }

    /// The four retained QoS 1 messages of one device.
    pub fn device_messages(&self, device: &Device) -> Result<Vec<OutboundMessage>> {
        SENSOR_FIELDS
            .iter()
            .map(|field| {
                let document = self.document(device, field);
                let topic = self.config_topic(&document.unique_id);
                OutboundMessage::json(topic, &document, QoS::AtLeastOnce, true)
            })
            .collect()
    }

    /// Messages for every registered device, in registry order.
    ///
    /// A device whose documents cannot be serialized is logged and skipped.
    pub fn messages(&self, registry: &DeviceRegistry) -> Vec<OutboundMessage> {
        let mut messages = Vec::with_capacity(registry.len() * SENSOR_FIELDS.len());

        for device in registry.iter() {
            match self.device_messages(device) {
                Ok(device_messages) => messages.extend(device_messages),
                Err(e) => {
                    tracing::warn!(device = %device.address, error = %e, "Failed to build discovery documents");
                }
            }
        }

        messages
    }
}
