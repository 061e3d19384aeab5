//! Observer that records every callback for later assertions

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use streamplay_ap::playback::{PlaybackObserver, ProgressReport};

#[derive(Debug, Default)]
pub struct RecordingObserver {
    progress: Mutex<Vec<ProgressReport>>,
    positions: Mutex<Vec<(f64, f64)>>,
    finished: AtomicUsize,
}

impl RecordingObserver {
    pub fn progress(&self) -> Vec<ProgressReport> {
        self.progress.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.progress()
            .into_iter()
            .map(|report| report.status_label)
            .collect()
    }

    pub fn last_status(&self) -> Option<String> {
        self.statuses().pop()
    }

    pub fn has_status(&self, prefix: &str) -> bool {
        self.statuses().iter().any(|s| s.starts_with(prefix))
    }

    pub fn positions(&self) -> Vec<(f64, f64)> {
        self.positions.lock().unwrap().clone()
    }

    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Total number of callbacks received so far
    pub fn callback_count(&self) -> usize {
        self.progress.lock().unwrap().len()
            + self.positions.lock().unwrap().len()
            + self.finished_count()
    }
}

impl PlaybackObserver for RecordingObserver {
    fn on_progress(&self, report: &ProgressReport) {
        self.progress.lock().unwrap().push(report.clone());
    }

    fn on_position(&self, current_secs: f64, total_secs: f64) {
        self.positions.lock().unwrap().push((current_secs, total_secs));
    }

    fn on_finished(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `condition` every 10 ms until it holds.
///
/// # Panics
/// When `timeout` elapses first
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let result = tokio::time::timeout(timeout, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not met within {:?}", timeout);
}
