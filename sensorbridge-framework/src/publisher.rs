//! Outbound message publishing.
//!
//! Publishing never performs network I/O on the caller's task: an
//! [`MqttPublish`] implementation only enqueues the message for the
//! connection's event loop.

use std::fmt;
use std::sync::Arc;

use rumqttc::{AsyncClient, QoS};
use serde::Serialize;

use crate::error::{BridgeError, Result};

/// Convert a configured QoS level (0, 1 or 2) into an MQTT QoS.
pub fn qos_from_level(level: u8) -> Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(BridgeError::validation(format!(
            "QoS must be 0, 1 or 2 (got {})",
            other
        ))),
    }
}

/// A single message ready to be handed to the broker connection.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl OutboundMessage {
    /// Create a message with an arbitrary payload.
    pub fn new(
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        qos: QoS,
        retain: bool,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        }
    }

    /// Create a retained QoS 1 message, as used for availability and discovery.
    pub fn retained(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(topic, payload, QoS::AtLeastOnce, true)
    }

    /// Create a message with a JSON-serialized payload.
    pub fn json<T: Serialize>(
        topic: impl Into<String>,
        value: &T,
        qos: QoS,
        retain: bool,
    ) -> Result<Self> {
        let payload = serde_json::to_vec(value)?;
        Ok(Self::new(topic, payload, qos, retain))
    }

    /// The payload as UTF-8 text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Minimal publish seam between bridge logic and the MQTT client.
///
/// Implementations must not block: they enqueue and return.
pub trait MqttPublish: Send + Sync {
    /// Enqueue one message for delivery.
    fn publish(&self, message: OutboundMessage) -> Result<()>;
}

impl MqttPublish for AsyncClient {
    fn publish(&self, message: OutboundMessage) -> Result<()> {
        let topic = message.topic;
        self.try_publish(topic.clone(), message.qos, message.retain, message.payload)
            .map_err(|e| BridgeError::publish(topic, e))
    }
}

/// Cloneable publisher handle shared by the bridge's components.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<dyn MqttPublish>,
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher").finish_non_exhaustive()
    }
}

impl Publisher {
    /// Create a new publisher over any [`MqttPublish`] implementation.
    pub fn new(inner: Arc<dyn MqttPublish>) -> Self {
        Self { inner }
    }

    /// Publish one message.
    pub fn publish(&self, message: OutboundMessage) -> Result<()> {
        self.inner.publish(message)
    }

    /// Publish a JSON value to a topic.
    pub fn publish_json<T: Serialize>(
        &self,
        topic: &str,
        value: &T,
        qos: QoS,
        retain: bool,
    ) -> Result<()> {
        self.publish(OutboundMessage::json(topic, value, qos, retain)?)
    }

    /// Publish a batch of messages in order.
    ///
    /// Failures are logged and do not stop the batch.
    pub fn publish_batch<I>(&self, messages: I) -> PublishStats
    where
        I: IntoIterator<Item = OutboundMessage>,
    {
        let mut stats = PublishStats::default();

        for message in messages {
            let topic = message.topic.clone();
            match self.publish(message) {
                Ok(()) => stats.success += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(topic = %topic, error = %e, "Failed to publish message");
                }
            }
        }

        stats
    }
}

/// Statistics from a batch publish operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    /// Number of successfully enqueued messages.
    pub success: usize,
    /// Number of failed publishes.
    pub failed: usize,
}

impl PublishStats {
    /// Total number of attempted publishes.
    pub fn total(&self) -> usize {
        self.success + self.failed
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryPublisher;

#[cfg(any(test, feature = "test-util"))]
mod memory {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::{MqttPublish, OutboundMessage};
    use crate::error::{BridgeError, Result};

    /// In-memory publisher that records every attempted message.
    ///
    /// When switched to failing mode, messages are still recorded but
    /// `publish` returns an error.
    #[derive(Debug, Default)]
    pub struct MemoryPublisher {
        messages: Mutex<Vec<OutboundMessage>>,
        failing: AtomicBool,
    }

    impl MemoryPublisher {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make subsequent publishes fail (or succeed again).
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        /// All attempted messages so far.
        pub fn messages(&self) -> Vec<OutboundMessage> {
            self.messages
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }

        /// Attempted messages on one topic.
        pub fn messages_on(&self, topic: &str) -> Vec<OutboundMessage> {
            self.messages()
                .into_iter()
                .filter(|m| m.topic == topic)
                .collect()
        }

        /// Forget recorded messages.
        pub fn clear(&self) {
            self.messages
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clear();
        }
    }

    impl MqttPublish for MemoryPublisher {
        fn publish(&self, message: OutboundMessage) -> Result<()> {
            let topic = message.topic.clone();
            self.messages
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(message);

            if self.failing.load(Ordering::SeqCst) {
                return Err(BridgeError::publish(topic, "simulated failure"));
            }
            Ok(())
        }
    }
}
