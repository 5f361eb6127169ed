//! Topic resolution for bridged devices.
//!
//! Topics follow the pattern:
//! - `<prefix>/<node>/json` - device state
//! - `<prefix>/<node>/availability` - device availability
//! - `<prefix>/bridge/availability` - bridge availability
//!
//! `<node>` is the device's display name (or its raw address when it has no
//! registration) passed through [`sanitize_topic_part`].

/// Node name reserved for the bridge itself.
pub const BRIDGE_NODE: &str = "bridge";

/// Make a string safe to use as a single topic level.
///
/// Trims surrounding whitespace, replaces space, `/`, `+` and `#` with `_`,
/// and removes `:`. The result never contains MQTT wildcards or level
/// separators.
///
/// # Example
/// ```
/// use sensorbridge_common::topic::sanitize_topic_part;
///
/// assert_eq!(sanitize_topic_part(" My Device/Name:01+# "), "My_Device_Name01__");
/// ```
pub fn sanitize_topic_part(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|c| *c != ':')
        .map(|c| match c {
            ' ' | '/' | '+' | '#' => '_',
            other => other,
        })
        .collect()
}

/// Derive the stable device identifier from a hardware address.
///
/// Lowercase, with `:` removed. Used as the discovery unique-id suffix and as
/// the registry key, so it is independent of the configured display name.
///
/// # Example
/// ```
/// use sensorbridge_common::topic::device_id_from_address;
///
/// assert_eq!(device_id_from_address("AA:BB:CC:11:22:33"), "aabbcc112233");
/// ```
pub fn device_id_from_address(address: &str) -> String {
    sanitize_topic_part(&address.to_lowercase())
}

/// The concrete topics of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    /// State topic (`<prefix>/<node>/json`).
    pub state: String,
    /// Availability topic (`<prefix>/<node>/availability`).
    pub availability: String,
}

/// Maps device labels to concrete topic strings under a fixed prefix.
///
/// Pure and deterministic: the same label always yields the same topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicResolver {
    prefix: String,
}

impl TopicResolver {
    /// Create a resolver for the given topic prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The configured prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The sanitized topic level for a device label.
    pub fn node(&self, label: &str) -> String {
        sanitize_topic_part(label)
    }

    /// Build a topic for a device label and a suffix.
    ///
    /// # Example
    /// ```
    /// use sensorbridge_common::topic::TopicResolver;
    ///
    /// let resolver = TopicResolver::new("ruuvi");
    /// assert_eq!(resolver.device_topic("My Device", "json"), "ruuvi/My_Device/json");
    /// ```
    pub fn device_topic(&self, label: &str, suffix: &str) -> String {
        format!("{}/{}/{}", self.prefix, self.node(label), suffix)
    }

    /// State topic for a device label.
    pub fn state_topic(&self, label: &str) -> String {
        self.device_topic(label, "json")
    }

    /// Availability topic for a device label.
    pub fn availability_topic(&self, label: &str) -> String {
        self.device_topic(label, "availability")
    }

    /// Bridge-wide availability topic.
    pub fn bridge_availability_topic(&self) -> String {
        format!("{}/{}/availability", self.prefix, BRIDGE_NODE)
    }

    /// Both topics of a device at once.
    pub fn device(&self, label: &str) -> DeviceTopics {
        DeviceTopics {
            state: self.state_topic(label),
            availability: self.availability_topic(label),
        }
    }
}

/// Whether a topic contains MQTT wildcard characters.
pub fn has_wildcards(topic: &str) -> bool {
    topic.contains(['+', '#'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(
            sanitize_topic_part(" My Device/Name:01+# "),
            "My_Device_Name01__"
        );
        assert_eq!(sanitize_topic_part("sauna"), "sauna");
        assert_eq!(sanitize_topic_part(""), "");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            " My Device/Name:01+# ",
            "AA:BB:CC:11:22:33",
            "a / b",
            "  ::  ",
            "kitchen#1+2",
            "olohuone/ikkuna",
        ];

        for input in inputs {
            let once = sanitize_topic_part(input);
            assert_eq!(sanitize_topic_part(&once), once, "input: {:?}", input);
            assert!(!once.contains(['+', '#', '/', ':']), "input: {:?}", input);
        }
    }

    #[test]
    fn test_device_id() {
        assert_eq!(device_id_from_address("AA:BB:CC:11:22:33"), "aabbcc112233");
        assert_eq!(
            device_id_from_address("aa:bb:cc:11:22:33"),
            device_id_from_address("AA:BB:CC:11:22:33")
        );
    }

    #[test]
    fn test_topics() {
        let resolver = TopicResolver::new("ruuvi");

        assert_eq!(resolver.state_topic("My Device"), "ruuvi/My_Device/json");
        assert_eq!(
            resolver.availability_topic("My Device"),
            "ruuvi/My_Device/availability"
        );
        assert_eq!(
            resolver.bridge_availability_topic(),
            "ruuvi/bridge/availability"
        );
    }

    #[test]
    fn test_unregistered_address_as_label() {
        let resolver = TopicResolver::new("ruuvi");
        assert_eq!(
            resolver.state_topic("AA:BB:CC:11:22:99"),
            "ruuvi/AABBCC112299/json"
        );
    }

    #[test]
    fn test_device_topics() {
        let resolver = TopicResolver::new("home/sensors");
        let topics = resolver.device("sauna");

        assert_eq!(topics.state, "home/sensors/sauna/json");
        assert_eq!(topics.availability, "home/sensors/sauna/availability");
    }

    #[test]
    fn test_has_wildcards() {
        assert!(has_wildcards("ruuvi/+/json"));
        assert!(has_wildcards("ruuvi/#"));
        assert!(!has_wildcards("ruuvi/sauna/json"));
    }
}
