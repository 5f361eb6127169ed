//! MQTT connection lifecycle.
//!
//! The connection moves through three states:
//!
//! ```text
//!  Disconnected ──start──▶ Connecting ──ConnAck──▶ Connected
//!                              ▲                      │
//!                              └──── error/drop ──────┘
//! ```
//!
//! Losing the broker is never terminal: the event loop keeps retrying with a
//! bounded backoff. Every transition into `Connected` (first connect or
//! reconnect) re-announces the bridge and its devices, since a restarted
//! broker has lost all retained messages. Only [`MqttConnection::shutdown`]
//! leaves the machine for good.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet};
use sensorbridge_common::MqttConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::publisher::{OutboundMessage, PublishStats, Publisher};
use crate::status::Availability;

/// Requests that may wait in the client's queue besides a full announcement.
const REQUEST_CAPACITY: usize = 100;

/// How long to wait for the event loop to stop after requesting a disconnect.
const EVENT_LOOP_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection state as seen by the rest of the bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Read-only view of the connection state, cheap to clone.
#[derive(Debug, Clone)]
pub struct ConnectionStatus(watch::Receiver<ConnectionState>);

impl ConnectionStatus {
    /// The current state.
    pub fn state(&self) -> ConnectionState {
        *self.0.borrow()
    }

    /// Whether a broker connection is currently established.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

/// Supplies the messages a bridge publishes around its connection.
///
/// Implementations must be deterministic: announcing twice with unchanged
/// settings must yield identical messages, so republishing on every
/// reconnect overwrites rather than duplicates.
pub trait Announcer: Send + Sync {
    /// Messages published after the bridge's own "online", on every
    /// transition into `Connected`.
    fn on_connect(&self) -> Vec<OutboundMessage>;

    /// Messages published before the bridge's own "offline" during shutdown.
    fn on_shutdown(&self) -> Vec<OutboundMessage>;
}

/// Bounded exponential backoff between reconnect attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    next: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl Backoff {
    /// Create a backoff starting at `min` and doubling up to `max`.
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            next: min,
        }
    }

    /// Delay before the next attempt; grows until `max`.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    /// Start over from `min` after a successful connect.
    pub fn reset(&mut self) {
        self.next = self.min;
    }
}

/// The connection state machine and the actions bound to its transitions.
///
/// Driven by the MQTT event loop; usable on its own with any publisher.
pub struct Lifecycle {
    publisher: Publisher,
    bridge: Availability,
    announcer: Arc<dyn Announcer>,
    state: watch::Sender<ConnectionState>,
    closed: AtomicBool,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("bridge", &self.bridge)
            .field("state", &*self.state.borrow())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Lifecycle {
    /// Create a lifecycle in the `Disconnected` state.
    pub fn new(publisher: Publisher, bridge: Availability, announcer: Arc<dyn Announcer>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            publisher,
            bridge,
            announcer,
            state,
            closed: AtomicBool::new(false),
        }
    }

    /// A status view that follows this lifecycle.
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus(self.state.subscribe())
    }

    /// The current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether shutdown has closed the machine.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Enter `Connecting` (initial attempt or after losing the broker).
    pub fn connecting(&self) {
        if self.is_closed() {
            return;
        }

        let previous = self.state.send_replace(ConnectionState::Connecting);
        if previous == ConnectionState::Connected {
            tracing::warn!("MQTT disconnected (will retry)");
        }
    }

    /// Enter `Connected` and re-announce everything.
    ///
    /// Publishes bridge "online" first, then the announcer's messages.
    pub fn connected(&self) -> PublishStats {
        if self.is_closed() {
            return PublishStats::default();
        }

        self.state.send_replace(ConnectionState::Connected);
        tracing::info!(topic = %self.bridge.topic(), "MQTT connected");

        let mut messages = vec![self.bridge.online()];
        messages.extend(self.announcer.on_connect());

        let stats = self.publisher.publish_batch(messages);
        tracing::info!(
            published = stats.success,
            failed = stats.failed,
            "Announced bridge and devices"
        );
        stats
    }

    /// Publish the offline announcements: the announcer's first, then the
    /// bridge's own "offline". Failures are logged and swallowed.
    pub fn farewell(&self) -> PublishStats {
        let mut messages = self.announcer.on_shutdown();
        messages.push(self.bridge.offline());

        let stats = self.publisher.publish_batch(messages);
        if stats.failed > 0 {
            tracing::warn!(
                failed = stats.failed,
                total = stats.total(),
                "Some offline announcements could not be published"
            );
        }
        stats
    }

    /// Leave the state machine for good.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.state.send_replace(ConnectionState::Disconnected);
    }

    /// Close the machine, then say farewell if it was connected.
    ///
    /// Closing first means a reconnect while the offline messages are in
    /// flight cannot announce "online" again. Returns `None` when the
    /// broker was not connected.
    pub fn begin_shutdown(&self) -> Option<PublishStats> {
        let was_connected = self.state() == ConnectionState::Connected;
        self.close();
        was_connected.then(|| self.farewell())
    }
}

/// An MQTT broker connection with its background event loop.
///
/// The event loop runs on its own task, so connecting never blocks the
/// caller and an unreachable broker at startup is not an error.
pub struct MqttConnection {
    client: AsyncClient,
    lifecycle: Arc<Lifecycle>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    shutdown_started: AtomicBool,
}

impl fmt::Debug for MqttConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttConnection")
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

/// Build client options, registering `bridge` "offline" as the Last-Will.
pub fn mqtt_options(config: &MqttConfig, bridge: &Availability) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    if config.has_credentials() {
        options.set_credentials(&config.username, &config.password);
    }
    options.set_last_will(bridge.last_will());
    options
}

impl MqttConnection {
    /// Start connecting in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: &MqttConfig,
        bridge: Availability,
        announcer: Arc<dyn Announcer>,
        backoff: Backoff,
    ) -> Self {
        let options = mqtt_options(config, &bridge);

        // A full re-announcement is queued from inside the event loop task,
        // so it has to fit without waiting for the loop to drain it.
        let capacity = REQUEST_CAPACITY + announcer.on_connect().len() + 1;
        let (client, event_loop) = AsyncClient::new(options, capacity);

        let publisher = Publisher::new(Arc::new(client.clone()));
        let lifecycle = Arc::new(Lifecycle::new(publisher, bridge, announcer));

        tracing::info!(
            host = %config.host,
            port = config.port,
            client_id = %config.client_id,
            "Connecting to MQTT broker"
        );
        lifecycle.connecting();

        let handle = tokio::spawn(drive(event_loop, lifecycle.clone(), backoff));

        Self {
            client,
            lifecycle,
            event_loop: Mutex::new(Some(handle)),
            shutdown_started: AtomicBool::new(false),
        }
    }

    /// A publisher that enqueues onto this connection.
    pub fn publisher(&self) -> Publisher {
        Publisher::new(Arc::new(self.client.clone()))
    }

    /// A status view of this connection.
    pub fn status(&self) -> ConnectionStatus {
        self.lifecycle.status()
    }

    /// Announce offline, wait `grace` for delivery, then disconnect.
    ///
    /// Safe to call more than once: only the first call does anything and
    /// returns `true`. Offline announcements are skipped when the broker is
    /// not reachable (it has already published the Last-Will then).
    pub async fn shutdown(&self, grace: Duration) -> bool {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            tracing::debug!("Shutdown already in progress");
            return false;
        }

        if self.lifecycle.begin_shutdown().is_some() {
            tokio::time::sleep(grace).await;
        } else {
            tracing::info!("MQTT not connected, skipping offline announcements");
        }

        if let Err(e) = self.client.try_disconnect() {
            tracing::warn!(error = %e, "Failed to request MQTT disconnect");
        }

        let handle = self
            .event_loop
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(mut handle) = handle {
            match tokio::time::timeout(EVENT_LOOP_STOP_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "MQTT event loop task failed"),
                Err(_) => {
                    tracing::warn!("MQTT event loop did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        true
    }
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        let handle = self
            .event_loop
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            tracing::warn!("MqttConnection dropped without shutdown(), aborting event loop");
            handle.abort();
        }
    }
}

/// Poll the event loop forever, feeding connection events into `lifecycle`.
async fn drive(mut event_loop: EventLoop, lifecycle: Arc<Lifecycle>, mut backoff: Backoff) {
    loop {
        match event_loop.poll().await {
            // Refused ConnAcks surface as errors below.
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                backoff.reset();
                lifecycle.connected();
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("Broker closed the MQTT session");
                lifecycle.connecting();
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("Sent MQTT Disconnect");
                break;
            }
            Ok(event) => {
                tracing::trace!(event = ?event, "MQTT event");
            }
            Err(e) => {
                if lifecycle.is_closed() {
                    break;
                }
                let delay = backoff.next_delay();
                tracing::warn!(error = %e, retry_in = ?delay, "MQTT connection error");
                lifecycle.connecting();
                tokio::time::sleep(delay).await;
            }
        }
    }

    tracing::info!("MQTT event loop stopped");
}
