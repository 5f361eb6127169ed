//! MQTT bridge for RuuviTag sensors.
//!
//! Reads decoded tag readings as JSON lines and publishes them to MQTT with
//! Home Assistant discovery and availability tracking.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sensorbridge_framework::{Announcer, BridgeArgs, BridgeConfig, BridgeRunner};

use mqtt_bridge_ruuvi::announce::RuuviAnnouncer;
use mqtt_bridge_ruuvi::config::RuuviBridgeConfig;
use mqtt_bridge_ruuvi::source::{self, READING_CHANNEL_CAPACITY};
use mqtt_bridge_ruuvi::telemetry::TelemetryPublisher;

/// MQTT bridge for RuuviTag sensors.
#[derive(Parser, Debug)]
#[command(name = "mqtt-bridge-ruuvi")]
#[command(about = "Publishes RuuviTag readings to MQTT with Home Assistant discovery")]
#[command(version)]
struct Args {
    #[command(flatten)]
    bridge: BridgeArgs,

    /// JSON-lines file with decoded readings ("-" for stdin).
    #[arg(long, env = "RUUVI_INPUT", default_value = "-")]
    input: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Settings come from the environment
    let config = RuuviBridgeConfig::from_env().context("Failed to load settings")?;
    let announcer = RuuviAnnouncer::new(&config);

    if args.bridge.check_config {
        print_check(&config, &announcer);
        return Ok(());
    }

    let mut runner =
        BridgeRunner::new_with_args("ruuvi", config, Arc::new(announcer), Some(&args.bridge))
            .await
            .context("Failed to start bridge")?;

    log_settings(runner.config());

    let (sink, rx) = source::channel(READING_CHANNEL_CAPACITY);
    let telemetry = TelemetryPublisher::new(runner.config(), runner.publisher(), runner.status());
    runner.spawn(telemetry.run(rx));
    runner.spawn_with_error("reading-source".to_string(), source::run_input(args.input, sink));

    // Run until Ctrl+C or SIGTERM (publishes offline on the way out)
    runner.run().await.context("Bridge shutdown failed")?;

    Ok(())
}

fn log_settings(config: &RuuviBridgeConfig) {
    for device in config.devices.iter() {
        tracing::info!(address = %device.address, name = %device.name, "Registered tag");
    }
    tracing::info!(
        host = %config.mqtt.host,
        port = config.mqtt.port,
        prefix = %config.topics.prefix(),
        retain = config.retain,
        qos = ?config.qos,
        min_interval = ?config.min_interval,
        "MQTT settings"
    );
}

fn print_check(config: &RuuviBridgeConfig, announcer: &RuuviAnnouncer) {
    println!("Settings OK");
    println!(
        "MQTT: {}:{}, prefix='{}', retain={}, qos={:?}, min_interval={}s",
        config.mqtt.host,
        config.mqtt.port,
        config.topics.prefix(),
        config.retain,
        config.qos,
        config.min_interval.as_secs()
    );
    println!("Tags:");
    for device in config.devices.iter() {
        println!(" - {} = {}", device.address, device.name);
    }
    println!("Announced on connect:");
    for message in announcer.on_connect() {
        println!("{} {}", message.topic, message.payload_str().unwrap_or_default());
    }
}
