//! Availability reporting for the bridge and its devices.

use rumqttc::{LastWill, QoS};
use sensorbridge_common::{AvailabilityPayloads, TopicResolver};

use crate::publisher::OutboundMessage;

/// An availability topic together with its online/offline payloads.
///
/// Every availability message is retained and published with QoS 1, so a
/// subscriber joining later immediately sees the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    topic: String,
    payloads: AvailabilityPayloads,
}

impl Availability {
    /// Availability for an arbitrary topic.
    pub fn new(topic: impl Into<String>, payloads: AvailabilityPayloads) -> Self {
        Self {
            topic: topic.into(),
            payloads,
        }
    }

    /// Bridge-wide availability (`<prefix>/bridge/availability`).
    pub fn bridge(topics: &TopicResolver, payloads: AvailabilityPayloads) -> Self {
        Self::new(topics.bridge_availability_topic(), payloads)
    }

    /// The availability topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Retained "online" message.
    pub fn online(&self) -> OutboundMessage {
        OutboundMessage::retained(&self.topic, self.payloads.online.as_bytes())
    }

    /// Retained "offline" message.
    pub fn offline(&self) -> OutboundMessage {
        OutboundMessage::retained(&self.topic, self.payloads.offline.as_bytes())
    }

    /// Last-Will registration publishing "offline" if the connection drops
    /// without a clean disconnect.
    pub fn last_will(&self) -> LastWill {
        LastWill::new(
            self.topic.clone(),
            self.payloads.offline.clone(),
            QoS::AtLeastOnce,
            true,
        )
    }
}
