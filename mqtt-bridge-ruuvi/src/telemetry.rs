//! Rate-limited state publishing.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, TimeZone};
use tokio::sync::mpsc;

use sensorbridge_common::{SensorReading, TopicResolver};
use sensorbridge_framework::{ConnectionStatus, Publisher, QoS, RateLimiter};

use crate::config::RuuviBridgeConfig;
use crate::registry::DeviceRegistry;

/// How often the dispatcher logs its counters.
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// What happened to one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Enqueued on the state topic.
    Published,
    /// Dropped: no broker connection.
    NotConnected,
    /// Dropped: the address is not a registered tag.
    Unregistered,
    /// Dropped: the device published less than the minimum interval ago.
    RateLimited,
    /// The publish call itself failed.
    Failed,
}

/// Reading counters since the last report.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryStats {
    pub published: u64,
    pub not_connected: u64,
    pub unregistered: u64,
    pub rate_limited: u64,
    pub failed: u64,
}

impl TelemetryStats {
    pub fn record(&mut self, outcome: PublishOutcome) {
        match outcome {
            PublishOutcome::Published => self.published += 1,
            PublishOutcome::NotConnected => self.not_connected += 1,
            PublishOutcome::Unregistered => self.unregistered += 1,
            PublishOutcome::RateLimited => self.rate_limited += 1,
            PublishOutcome::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.published + self.not_connected + self.unregistered + self.rate_limited + self.failed
    }
}

/// Publishes readings of registered devices to their state topics, at most
/// once per interval per device, and only while connected.
pub struct TelemetryPublisher {
    publisher: Publisher,
    status: ConnectionStatus,
    devices: Arc<DeviceRegistry>,
    topics: TopicResolver,
    limiter: RateLimiter,
    qos: QoS,
    retain: bool,
}

impl fmt::Debug for TelemetryPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryPublisher")
            .field("prefix", &self.topics.prefix())
            .field("interval", &self.limiter.interval())
            .field("qos", &self.qos)
            .field("retain", &self.retain)
            .finish_non_exhaustive()
    }
}

impl TelemetryPublisher {
    pub fn new(config: &RuuviBridgeConfig, publisher: Publisher, status: ConnectionStatus) -> Self {
        Self {
            publisher,
            status,
            devices: config.devices.clone(),
            topics: config.topics.clone(),
            limiter: RateLimiter::new(config.min_interval),
            qos: config.qos,
            retain: config.retain,
        }
    }

    /// Handle a reading arriving now.
    pub fn handle(&self, reading: &SensorReading) -> PublishOutcome {
        self.handle_at(reading, Instant::now(), &Local::now())
    }

    /// Handle a reading arriving at `now`, stamped with `time`.
    pub fn handle_at<Tz>(
        &self,
        reading: &SensorReading,
        now: Instant,
        time: &DateTime<Tz>,
    ) -> PublishOutcome
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        if !self.status.is_connected() {
            tracing::trace!(address = %reading.address, "Not connected, dropping reading");
            return PublishOutcome::NotConnected;
        }

        // Only registered tags get a topic and a limiter slot.
        let Some(device) = self.devices.get(&reading.address) else {
            tracing::trace!(address = %reading.address, "Unregistered tag, dropping reading");
            return PublishOutcome::Unregistered;
        };

        // Accepting records the timestamp, so a failed publish still
        // consumes the interval.
        if !self.limiter.try_acquire(&device.id, now) {
            tracing::trace!(device = %device.name, "Within minimum interval, dropping reading");
            return PublishOutcome::RateLimited;
        }

        let topic = self.topics.state_topic(&device.name);
        let payload = reading.state_payload(&device.name, time);

        match self.publisher.publish_json(&topic, &payload, self.qos, self.retain) {
            Ok(()) => {
                tracing::debug!(topic = %topic, "Published reading");
                PublishOutcome::Published
            }
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "MQTT publish failed");
                PublishOutcome::Failed
            }
        }
    }

    /// Dispatch readings until the channel closes.
    pub async fn run(self, mut rx: mpsc::Receiver<SensorReading>) {
        let mut stats = TelemetryStats::default();
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + STATS_INTERVAL, STATS_INTERVAL);

        loop {
            tokio::select! {
                reading = rx.recv() => match reading {
                    Some(reading) => stats.record(self.handle(&reading)),
                    None => break,
                },
                _ = ticker.tick() => {
                    if stats.total() > 0 {
                        tracing::info!(
                            published = stats.published,
                            rate_limited = stats.rate_limited,
                            not_connected = stats.not_connected,
                            unregistered = stats.unregistered,
                            failed = stats.failed,
                            "Readings in the last minute"
                        );
                    }
                    stats = TelemetryStats::default();
                }
            }
        }

        tracing::info!("Reading channel closed, telemetry dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorbridge_framework::{Announcer, Availability, BridgeConfig, Lifecycle, MemoryPublisher};

    struct Silent;

    impl Announcer for Silent {
        fn on_connect(&self) -> Vec<sensorbridge_framework::OutboundMessage> {
            Vec::new()
        }

        fn on_shutdown(&self) -> Vec<sensorbridge_framework::OutboundMessage> {
            Vec::new()
        }
    }

    fn connected_publisher() -> (Arc<MemoryPublisher>, Lifecycle, TelemetryPublisher) {
        let config = RuuviBridgeConfig::load_from(&|key: &str| {
            (key == "RUUVI_TAGS").then(|| r#"{"AA:BB:CC:11:22:33": "sauna"}"#.to_string())
        })
        .unwrap();
        let memory = Arc::new(MemoryPublisher::new());
        let publisher = Publisher::new(memory.clone());
        let bridge = Availability::bridge(config.topics(), config.availability().clone());
        let lifecycle = Lifecycle::new(publisher.clone(), bridge, Arc::new(Silent));
        let telemetry = TelemetryPublisher::new(&config, publisher, lifecycle.status());

        lifecycle.connecting();
        lifecycle.connected();
        memory.clear();
        (memory, lifecycle, telemetry)
    }

    #[test]
    fn test_unregistered_readings_leave_no_trace() {
        let (memory, _lifecycle, telemetry) = connected_publisher();
        let now = Instant::now();
        let time = Local::now();

        for i in 0..500u32 {
            let address = format!("FF:FF:{:02X}:{:02X}:00:00", i >> 8, i & 0xff);
            let reading = SensorReading::new(address.as_str()).with_field("temperature", 1.0);
            assert_eq!(
                telemetry.handle_at(&reading, now, &time),
                PublishOutcome::Unregistered
            );
            let id = sensorbridge_common::device_id_from_address(&address);
            assert!(telemetry.limiter.last_accepted(&id).is_none());
        }
        assert!(memory.messages().is_empty());

        let registered = SensorReading::new("AA:BB:CC:11:22:33").with_field("temperature", 1.0);
        assert_eq!(
            telemetry.handle_at(&registered, now, &time),
            PublishOutcome::Published
        );
        assert_eq!(memory.messages_on("ruuvi/sauna/json").len(), 1);
    }

    #[test]
    fn test_stats_record() {
        let mut stats = TelemetryStats::default();
        stats.record(PublishOutcome::Published);
        stats.record(PublishOutcome::RateLimited);
        stats.record(PublishOutcome::RateLimited);
        stats.record(PublishOutcome::NotConnected);
        stats.record(PublishOutcome::Unregistered);

        assert_eq!(stats.published, 1);
        assert_eq!(stats.rate_limited, 2);
        assert_eq!(stats.not_connected, 1);
        assert_eq!(stats.unregistered, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.total(), 5);
    }
}
