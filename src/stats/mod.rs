//! Connection statistics
//!
//! Two views of a connection's traffic: [`SessionStats`] is the durable
//! per-session record handed to the store when the session ends, and
//! [`ConnectionMonitor`] is the live snapshot published every tick for
//! observers. [`TrafficSample`] is what the interface handle reports.

mod aggregator;
mod window;

pub use aggregator::Aggregator;
pub use window::SpeedWindow;

use serde::{Deserialize, Serialize};

/// Cumulative counters read from a virtual interface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficSample {
    /// Total bytes sent since the interface came up
    pub uploaded: u64,
    /// Total bytes received since the interface came up
    pub downloaded: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    /// Most recent path latency; 0 when unknown
    pub latency_ms: u64,
}

/// Durable record of one tunnel session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Profile the session ran under
    pub profile_id: u64,
    /// Session start (unix millis)
    pub connected_at: u64,
    /// Session end (unix millis), set on finalization
    pub disconnected_at: Option<u64>,
    pub uploaded_bytes: u64,
    pub downloaded_bytes: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    /// Running latency average, `(prev + new) / 2` per sample
    pub avg_latency_ms: u64,
    /// Highest latency seen during the session
    pub peak_latency_ms: u64,
    /// Failures observed during the session (failed ticks, lost health
    /// checks, cipher authentication failures)
    pub connection_errors: u32,
    /// Reconnect attempts consumed by the cycle that produced this session
    pub reconnect_attempts: u32,
}

impl SessionStats {
    /// New record for a session starting now
    pub fn start(profile_id: u64, reconnect_attempts: u32) -> Self {
        Self {
            profile_id,
            connected_at: now_millis(),
            disconnected_at: None,
            uploaded_bytes: 0,
            downloaded_bytes: 0,
            packets_sent: 0,
            packets_received: 0,
            avg_latency_ms: 0,
            peak_latency_ms: 0,
            connection_errors: 0,
            reconnect_attempts,
        }
    }

    /// Fold one latency reading into the running average and peak.
    /// The first reading seeds the average.
    pub fn record_latency(&mut self, millis: u64) {
        if millis == 0 {
            return;
        }
        self.avg_latency_ms = if self.avg_latency_ms == 0 {
            millis
        } else {
            (self.avg_latency_ms + millis) / 2
        };
        self.peak_latency_ms = self.peak_latency_ms.max(millis);
    }

    /// Stamp the end time. Idempotent: the first stamp wins.
    pub fn finalize(&mut self) {
        if self.disconnected_at.is_none() {
            self.disconnected_at = Some(now_millis());
        }
    }

    /// Session length in milliseconds (up to now if still open)
    pub fn duration_ms(&self) -> u64 {
        self.disconnected_at
            .unwrap_or_else(now_millis)
            .saturating_sub(self.connected_at)
    }
}

/// Live per-tick snapshot for observers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionMonitor {
    /// Whether a session is currently up; the default snapshot is down
    pub connected: bool,
    /// Instantaneous upload speed, bytes per second
    pub upload_speed: u64,
    /// Instantaneous download speed, bytes per second
    pub download_speed: u64,
    pub total_uploaded: u64,
    pub total_downloaded: u64,
    /// Latest latency reading, 0 when unknown
    pub latency_ms: u64,
    /// Seconds since the session connected
    pub duration_secs: u64,
    /// When this snapshot was taken (unix millis)
    pub updated_at: u64,
}

impl ConnectionMonitor {
    /// One-line human-readable summary for status displays
    pub fn summary(&self) -> String {
        format!(
            "↑ {} ↓ {} | total ↑ {} ↓ {} | {} ms | {}",
            format_speed(self.upload_speed),
            format_speed(self.download_speed),
            format_bytes(self.total_uploaded),
            format_bytes(self.total_downloaded),
            self.latency_ms,
            format_duration(self.duration_secs),
        )
    }
}

/// Format a byte count with a binary-unit suffix
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Format a bytes-per-second rate
pub fn format_speed(bytes_per_sec: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec))
}

/// Format a duration in seconds as `h:mm:ss` or `m:ss`
pub fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Current wall-clock time in unix milliseconds
pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
