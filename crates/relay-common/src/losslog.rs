//! The emulator's append-only structured loss log.
//!
//! Opened in truncate mode once at startup; one line per drop, covering all
//! four loss causes (queue-full, no-route, random loss — END is never
//! logged here because it's never dropped).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::Path;

use chrono::Utc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LossLogError {
    #[error("failed to open loss log {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write loss log entry: {0}")]
    Write(#[source] std::io::Error),
}

/// One dropped-packet event, as surfaced by the emulator loop.
#[derive(Debug, Clone, Copy)]
pub struct LossEvent<'a> {
    pub reason: &'a str,
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dest_ip: Ipv4Addr,
    pub dest_port: u16,
    pub priority: u8,
    pub payload_size: u32,
}

pub struct LossLog {
    file: File,
}

impl LossLog {
    /// Open (truncating) the log file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, LossLogError> {
        let path_ref = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path_ref)
            .map_err(|source| LossLogError::Open {
                path: path_ref.display().to_string(),
                source,
            })?;
        Ok(LossLog { file })
    }

    /// Append one formatted line for `event`.
    pub fn record(&mut self, event: LossEvent<'_>) -> Result<(), LossLogError> {
        let line = format_line(event, Utc::now());
        self.file
            .write_all(line.as_bytes())
            .map_err(LossLogError::Write)?;
        self.file.write_all(b"\n").map_err(LossLogError::Write)
    }
}

fn format_line(event: LossEvent<'_>, timestamp: chrono::DateTime<Utc>) -> String {
    format!(
        "{reason} {src_ip}:{src_port} {dest_ip}:{dest_port} {timestamp} {priority} {size}",
        reason = event.reason,
        src_ip = event.src_ip,
        src_port = event.src_port,
        dest_ip = event.dest_ip,
        dest_port = event.dest_port,
        timestamp = timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
        priority = event.priority,
        size = event.payload_size,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn known_epoch_formats_correctly() {
        let ts = Utc.timestamp_opt(1609459200, 0).unwrap(); // 2021-01-01T00:00:00Z
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string(), "2021-01-01 00:00:00.000");
    }

    #[test]
    fn epoch_zero_formats_correctly() {
        let ts = Utc.timestamp_opt(0, 5_000_000).unwrap();
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string(), "1970-01-01 00:00:00.005");
    }

    #[test]
    fn line_contains_all_fields_in_order() {
        let event = LossEvent {
            reason: "Priority queue 2 was full",
            src_ip: Ipv4Addr::new(10, 0, 0, 1),
            src_port: 5000,
            dest_ip: Ipv4Addr::new(10, 0, 0, 2),
            dest_port: 6000,
            priority: 2,
            payload_size: 49,
        };
        let ts = Utc.timestamp_opt(1609459200, 123_000_000).unwrap();
        let line = format_line(event, ts);
        assert_eq!(
            line,
            "Priority queue 2 was full 10.0.0.1:5000 10.0.0.2:6000 2021-01-01 00:00:00.123 2 49"
        );
    }
}
