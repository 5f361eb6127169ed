//! Connect and shutdown announcements for registered tags.

use std::sync::Arc;

use sensorbridge_common::{AvailabilityPayloads, TopicResolver};
use sensorbridge_framework::{Announcer, Availability, OutboundMessage};

use crate::config::RuuviBridgeConfig;
use crate::discovery::DiscoveryGenerator;
use crate::registry::DeviceRegistry;

/// Announces discovery documents and per-device availability.
#[derive(Debug, Clone)]
pub struct RuuviAnnouncer {
    devices: Arc<DeviceRegistry>,
    discovery: DiscoveryGenerator,
    topics: TopicResolver,
    availability: AvailabilityPayloads,
}

impl RuuviAnnouncer {
    pub fn new(config: &RuuviBridgeConfig) -> Self {
        Self {
            devices: config.devices.clone(),
            discovery: DiscoveryGenerator::new(
                config.topics.clone(),
                config.discovery_prefix.clone(),
                config.availability.clone(),
            ),
            topics: config.topics.clone(),
            availability: config.availability.clone(),
        }
    }

    fn device_availability(&self) -> impl Iterator<Item = Availability> + '_ {
        self.devices.iter().map(|device| {
            Availability::new(
                self.topics.availability_topic(&device.name),
                self.availability.clone(),
            )
        })
    }
}

impl Announcer for RuuviAnnouncer {
    /// Discovery documents for every tag, then every tag "online".
    fn on_connect(&self) -> Vec<OutboundMessage> {
        let mut messages = self.discovery.messages(&self.devices);
        messages.extend(self.device_availability().map(|a| a.online()));
        messages
    }

    /// Every tag "offline".
    fn on_shutdown(&self) -> Vec<OutboundMessage> {
        self.device_availability().map(|a| a.offline()).collect()
    }
}
