//! Bridge runner for lifecycle management.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use sensorbridge_common::{LoggingConfig, init_tracing};

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::connection::{Announcer, Backoff, ConnectionStatus, MqttConnection};
use crate::error::{BridgeError, Result};
use crate::publisher::Publisher;
use crate::status::Availability;

/// Upper bound on shutdown work beyond the configured grace period.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Bridge runner that manages the lifecycle of a sensor bridge.
///
/// Handles:
/// - Logging initialization
/// - MQTT connection with Last-Will and automatic reconnects
/// - Task spawning and management
/// - Graceful shutdown on Ctrl+C or SIGTERM
///
/// # Example
///
/// ```ignore
/// use sensorbridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = MyBridgeConfig::from_env()?;
///     let announcer = Arc::new(MyAnnouncer::new(&config));
///
///     let mut runner = BridgeRunner::new("mybridge", config, announcer).await?;
///
///     let publisher = runner.publisher();
///     runner.spawn(async move {
///         // Worker logic here
///     });
///
///     runner.run().await?;
///     Ok(())
/// }
/// ```
pub struct BridgeRunner<C: BridgeConfig> {
    /// Bridge name for logging.
    name: String,
    /// The loaded configuration.
    config: C,
    /// Broker connection.
    connection: MqttConnection,
    /// Spawned tasks.
    tasks: Vec<JoinHandle<()>>,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Create a new bridge runner.
    ///
    /// This will:
    /// 1. Initialize logging based on config
    /// 2. Start connecting to the broker in the background
    pub async fn new(
        name: impl Into<String>,
        config: C,
        announcer: Arc<dyn Announcer>,
    ) -> Result<Self> {
        Self::new_with_args(name, config, announcer, None).await
    }

    /// Create a new bridge runner with CLI args for log level override.
    pub async fn new_with_args(
        name: impl Into<String>,
        config: C,
        announcer: Arc<dyn Announcer>,
        args: Option<&BridgeArgs>,
    ) -> Result<Self> {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION");

        // Initialize logging with optional CLI override
        let log_config = match args.and_then(|a| a.log_level.as_ref()) {
            Some(level) => LoggingConfig {
                level: level.clone(),
                ..config.logging().clone()
            },
            None => config.logging().clone(),
        };

        if let Err(e) = init_tracing(&log_config) {
            // A subscriber installed by the embedding process wins.
            tracing::debug!(error = %e, "Tracing already initialized");
        }

        tracing::info!(bridge = %name, version = %version, "Starting bridge");

        let bridge = Availability::bridge(config.topics(), config.availability().clone());
        let connection = MqttConnection::start(config.mqtt(), bridge, announcer, Backoff::default());

        Ok(Self {
            name,
            config,
            connection,
            tasks: Vec::new(),
        })
    }

    /// Get the bridge name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Get a publisher bound to the broker connection.
    pub fn publisher(&self) -> Publisher {
        self.connection.publisher()
    }

    /// Get a view of the connection state.
    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Spawn a worker task.
    ///
    /// The task will be tracked and aborted on shutdown.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.tasks.push(handle);
    }

    /// Spawn a worker task that returns a Result.
    ///
    /// Errors are logged automatically.
    pub fn spawn_with_error<F, E>(&mut self, name: String, future: F)
    where
        F: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            if let Err(e) = future.await {
                tracing::error!(worker = %name, error = %e, "Worker failed");
            }
        });
        self.tasks.push(handle);
    }

    /// Run the bridge until Ctrl+C or SIGTERM is received.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run the bridge until `shutdown` completes.
    ///
    /// This will:
    /// 1. Wait for the shutdown future
    /// 2. Abort all spawned tasks
    /// 3. Publish offline availability (when connected)
    /// 4. Disconnect from the broker
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            bridge = %self.name,
            tasks = self.tasks.len(),
            "Bridge running. Press Ctrl+C to stop."
        );

        shutdown.await;

        tracing::info!(bridge = %self.name, "Received shutdown signal");

        for task in &self.tasks {
            task.abort();
        }

        let grace = self.config.shutdown_grace();
        let limit = grace + SHUTDOWN_TIMEOUT;
        if tokio::time::timeout(limit, self.connection.shutdown(grace))
            .await
            .is_err()
        {
            tracing::error!(timeout = ?limit, "Shutdown did not complete in time");
            return Err(BridgeError::ShutdownTimeout(limit));
        }

        tracing::info!(bridge = %self.name, "Goodbye!");

        Ok(())
    }
}

/// Resolves on Ctrl+C, or on SIGTERM where available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::OutboundMessage;
    use sensorbridge_common::{AvailabilityPayloads, MqttConfig, TopicResolver};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct TestConfig {
        mqtt: MqttConfig,
        logging: LoggingConfig,
        topics: TopicResolver,
        availability: AvailabilityPayloads,
    }

    impl BridgeConfig for TestConfig {
        fn mqtt(&self) -> &MqttConfig {
            &self.mqtt
        }

        fn logging(&self) -> &LoggingConfig {
            &self.logging
        }

        fn topics(&self) -> &TopicResolver {
            &self.topics
        }

        fn availability(&self) -> &AvailabilityPayloads {
            &self.availability
        }

        fn shutdown_grace(&self) -> Duration {
            Duration::from_millis(10)
        }

        fn from_lookup(_lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
            Ok(Self {
                mqtt: MqttConfig {
                    host: "127.0.0.1".to_string(),
                    port: 1,
                    username: String::new(),
                    password: String::new(),
                    client_id: "runner-test".to_string(),
                    keep_alive_secs: 60,
                },
                logging: LoggingConfig::default(),
                topics: TopicResolver::new("test"),
                availability: AvailabilityPayloads::default(),
            })
        }
    }

    struct Silent;

    impl Announcer for Silent {
        fn on_connect(&self) -> Vec<OutboundMessage> {
            Vec::new()
        }

        fn on_shutdown(&self) -> Vec<OutboundMessage> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_run_until_aborts_workers_and_returns() {
        let config = TestConfig::load_from(&|_: &str| None).unwrap();
        let args = BridgeArgs {
            log_level: Some("warn".to_string()),
            check_config: false,
        };
        let mut runner = BridgeRunner::new_with_args("test", config, Arc::new(Silent), Some(&args))
            .await
            .unwrap();

        assert_eq!(runner.name(), "test");
        assert!(!runner.status().is_connected());

        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        runner.spawn(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            flag.store(true, Ordering::SeqCst);
        });
        runner.spawn_with_error("failing".to_string(), async { Err::<(), _>("boom") });

        runner.run_until(async {}).await.unwrap();
        assert!(!finished.load(Ordering::SeqCst));
    }
}
