//! Decoded readings delivered as JSON lines.
//!
//! Each line holds one reading, either as an object carrying its address
//! under `mac`:
//!
//! ```text
//! {"mac": "AA:BB:CC:11:22:33", "temperature": 21.5, "humidity": 40.2}
//! ```
//!
//! or as an `[address, fields]` pair:
//!
//! ```text
//! ["AA:BB:CC:11:22:33", {"temperature": 21.5, "humidity": 40.2}]
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use sensorbridge_common::SensorReading;

/// Default capacity of the reading hand-off channel.
pub const READING_CHANNEL_CAPACITY: usize = 256;

/// Reading parse errors.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Reading has no string 'mac' field")]
    MissingAddress,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireReading {
    Pair(String, Map<String, Value>),
    Object(Map<String, Value>),
}

/// Parse one line; `Ok(None)` for lines carrying no reading.
pub fn parse_line(line: &str) -> Result<Option<SensorReading>, SourceError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let reading = match serde_json::from_str::<WireReading>(line)? {
        WireReading::Pair(address, fields) => SensorReading::with_fields(address, fields),
        WireReading::Object(mut fields) => match fields.remove("mac") {
            Some(Value::String(address)) => SensorReading::with_fields(address, fields),
            _ => return Err(SourceError::MissingAddress),
        },
    };

    Ok(Some(reading))
}

/// Non-blocking hand-off of readings to the dispatcher.
///
/// Readings are dropped when the channel is full; they are perishable and
/// a newer one follows shortly.
#[derive(Debug, Clone)]
pub struct ReadingSink {
    tx: mpsc::Sender<SensorReading>,
}

impl ReadingSink {
    pub fn new(tx: mpsc::Sender<SensorReading>) -> Self {
        Self { tx }
    }

    /// Hand off a reading. Returns `false` once the dispatcher is gone.
    pub fn submit(&self, reading: SensorReading) -> bool {
        match self.tx.try_send(reading) {
            Ok(()) => true,
            Err(TrySendError::Full(reading)) => {
                tracing::debug!(address = %reading.address, "Reading channel full, dropping reading");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// A sink and the receiving end for the dispatcher.
pub fn channel(capacity: usize) -> (ReadingSink, mpsc::Receiver<SensorReading>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ReadingSink::new(tx), rx)
}

/// Feed every reading from `reader` into `sink` until end of input.
///
/// Returns the number of readings handed off.
pub async fn read_lines<R>(reader: R, sink: &ReadingSink) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut count = 0u64;
    let mut line_number = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        match parse_line(&line) {
            Ok(Some(reading)) => {
                if !sink.submit(reading) {
                    tracing::warn!("Reading dispatcher stopped, closing input");
                    break;
                }
                count += 1;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(line = line_number, error = %e, "Skipping malformed reading");
            }
        }
    }

    Ok(count)
}

/// Read JSON lines from `path` (`-` for stdin) into `sink`.
pub async fn run_input(path: String, sink: ReadingSink) -> std::io::Result<()> {
    tracing::info!(input = %path, "Reading sensor data");

    let count = if path == "-" {
        read_lines(BufReader::new(tokio::io::stdin()), &sink).await?
    } else {
        let file = tokio::fs::File::open(&path).await?;
        read_lines(BufReader::new(file), &sink).await?
    };

    tracing::info!(input = %path, readings = count, "End of sensor input; bridge stays online");
    Ok(())
}
