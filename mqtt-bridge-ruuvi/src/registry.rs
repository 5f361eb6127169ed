//! Registered RuuviTags.

use std::collections::{BTreeMap, HashMap};

use sensorbridge_common::{BRIDGE_NODE, device_id_from_address, parse_json5, sanitize_topic_part};
use sensorbridge_framework::{BridgeError, Result};

/// Shown when no tag is registered.
pub const EMPTY_REGISTRY_HINT: &str =
    r#"RUUVI_TAGS is empty. Set it e.g. RUUVI_TAGS='{"AA:BB:CC:11:22:33":"device1"}'"#;

/// One sensor: hardware address, display name and derived device id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Hardware address as configured (e.g., "AA:BB:CC:11:22:33").
    pub address: String,
    /// Display name; also the source of the device's topic level.
    pub name: String,
    /// Lowercase address without `:`, stable across renames.
    pub id: String,
}

impl Device {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        let address = address.into();
        let id = device_id_from_address(&address);
        Self {
            address,
            name: name.into(),
            id,
        }
    }
}

/// The fixed set of registered devices, loaded once at startup.
///
/// Lookups go through the device id, so addresses match regardless of
/// letter case. Iteration order is sorted by configured address.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
    index: HashMap<String, usize>,
}

impl DeviceRegistry {
    /// Parse a JSON (or JSON5) object of `address -> name`.
    pub fn from_json(json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Err(BridgeError::config(EMPTY_REGISTRY_HINT));
        }

        let tags: BTreeMap<String, String> = parse_json5(json)
            .map_err(|e| BridgeError::config(format!("RUUVI_TAGS: {}", e)))?;
        Self::from_pairs(tags)
    }

    /// Build from `(address, name)` pairs, rejecting ambiguous registrations.
    pub fn from_pairs<I, A, N>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (A, N)>,
        A: Into<String>,
        N: Into<String>,
    {
        let mut registry = Self::default();
        let mut nodes: HashMap<String, String> = HashMap::new();

        for (address, name) in pairs {
            let device = Device::new(address, name);

            if device.id.is_empty() {
                return Err(BridgeError::validation("RUUVI_TAGS contains an empty address"));
            }

            let node = sanitize_topic_part(&device.name);
            if node.is_empty() {
                return Err(BridgeError::validation(format!(
                    "Device {} has an empty name",
                    device.address
                )));
            }
            if node == BRIDGE_NODE {
                return Err(BridgeError::validation(format!(
                    "Device {} cannot be named '{}': reserved for the bridge itself",
                    device.address, device.name
                )));
            }

            if let Some(&existing) = registry.index.get(&device.id) {
                let existing = registry
                    .devices
                    .get(existing)
                    .map(|d| d.address.as_str())
                    .unwrap_or_default();
                return Err(BridgeError::validation(format!(
                    "Addresses {} and {} refer to the same device",
                    existing, device.address
                )));
            }

            if let Some(other) = nodes.insert(node.clone(), device.address.clone()) {
                return Err(BridgeError::validation(format!(
                    "Devices {} and {} would share the topic level '{}'",
                    other, device.address, node
                )));
            }

            registry.index.insert(device.id.clone(), registry.devices.len());
            registry.devices.push(device);
        }

        if registry.devices.is_empty() {
            return Err(BridgeError::config(EMPTY_REGISTRY_HINT));
        }

        Ok(registry)
    }

    /// The registered device for an address, if any.
    pub fn get(&self, address: &str) -> Option<&Device> {
        self.index
            .get(&device_id_from_address(address))
            .and_then(|&i| self.devices.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
