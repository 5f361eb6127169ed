//! MQTT bridge for RuuviTag environmental sensors.
//!
//! Decoded tag readings are published as flat JSON state messages, at most
//! once per configured interval per tag. Each tag is announced to Home
//! Assistant through MQTT discovery and gets a retained availability topic.
//!
//! # Topics
//!
//! ```text
//! ruuvi/<name>/json                                   - tag state
//! ruuvi/<name>/availability                           - tag availability
//! ruuvi/bridge/availability                           - bridge availability (Last-Will)
//! homeassistant/sensor/ruuvi_<id>_<field>/config      - discovery documents
//! ```

pub mod announce;
pub mod config;
pub mod discovery;
pub mod registry;
pub mod source;
pub mod telemetry;
