//! Playback callbacks
//!
//! Observers receive download progress on every chunk and the playback
//! position on every heartbeat tick. All methods default to no-ops.

use crate::download::DownloadProgress;
use tracing::{debug, info};

pub const STATUS_CONNECTING: &str = "Connecting";
pub const STATUS_BUFFERING: &str = "Buffering";
pub const STATUS_PLAYING: &str = "Playing";
pub const STATUS_DOWNLOAD_COMPLETE: &str = "Download complete";

/// Download progress as shown to the listener.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    /// `None` when the total length is unknown
    pub percent: Option<f64>,
    pub bytes_label: String,
    pub status_label: String,
}

impl ProgressReport {
    pub fn new(progress: &DownloadProgress, status: impl Into<String>) -> Self {
        let bytes_label = match progress.total_bytes {
            Some(total) => format!(
                "{} / {}",
                format_bytes(progress.received_bytes),
                format_bytes(total)
            ),
            None => format_bytes(progress.received_bytes),
        };
        Self {
            percent: progress.percent(),
            bytes_label,
            status_label: status.into(),
        }
    }
}

/// Human-readable byte count (binary units, one decimal above bytes).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Receives playback notifications.
pub trait PlaybackObserver: Send + Sync {
    /// Called on every chunk, at completion, and with an error status on failure.
    fn on_progress(&self, _report: &ProgressReport) {}

    /// Called on every heartbeat tick that has a position to report.
    fn on_position(&self, _current_secs: f64, _total_secs: f64) {}

    /// Called once when a track has played to its end.
    fn on_finished(&self) {}
}

/// Observer that writes notifications to the log.
#[derive(Debug, Default, Clone)]
pub struct LoggingObserver;

impl PlaybackObserver for LoggingObserver {
    fn on_progress(&self, report: &ProgressReport) {
        match report.percent {
            Some(percent) => debug!(
                "[{}] {:.1}% ({})",
                report.status_label, percent, report.bytes_label
            ),
            None => debug!("[{}] {}", report.status_label, report.bytes_label),
        }
    }

    fn on_position(&self, current_secs: f64, total_secs: f64) {
        debug!("Position {:.1}s / {:.1}s", current_secs, total_secs);
    }

    fn on_finished(&self) {
        info!("Track finished");
    }
}
