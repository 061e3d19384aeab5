//! Player settings
//!
//! All tunables live in code defaults; the binary overrides individual values
//! from command-line flags (with environment fallbacks). There is no
//! configuration file.

use crate::error::{Error, Result};
use std::time::Duration;

/// Bytes that must accumulate before the first decode of a compressed stream
pub const DEFAULT_INITIAL_THRESHOLD_COMPRESSED: usize = 64 * 1024;

/// Bytes that must accumulate before the first decode of a linear PCM stream
pub const DEFAULT_INITIAL_THRESHOLD_PCM: usize = 256 * 1024;

/// Growth between decodes once playback has started
pub const DEFAULT_STEADY_THRESHOLD: usize = 1024 * 1024;

/// Heartbeat tick period
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

/// Distance from the end of decoded audio below which a stopped unit counts as finished
pub const DEFAULT_RESTART_TOLERANCE_SECS: f64 = 0.2;

/// Seek targets are clamped to this far before the end of decoded audio
pub const DEFAULT_SEEK_END_MARGIN_SECS: f64 = 0.1;

/// Progressive playback settings.
///
/// Built with `Default` and adjusted with the `with_*` setters.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSettings {
    pub initial_threshold_compressed: usize,
    pub initial_threshold_pcm: usize,
    pub steady_threshold: usize,
    pub heartbeat_interval: Duration,
    pub restart_tolerance_secs: f64,
    pub seek_end_margin_secs: f64,
    /// Pass-through relay for remote URLs (`{relay}?target=<url>`), applied
    /// by `RoutingSource::from_settings` and `Player::from_settings`
    pub relay_url: Option<String>,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            initial_threshold_compressed: DEFAULT_INITIAL_THRESHOLD_COMPRESSED,
            initial_threshold_pcm: DEFAULT_INITIAL_THRESHOLD_PCM,
            steady_threshold: DEFAULT_STEADY_THRESHOLD,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            restart_tolerance_secs: DEFAULT_RESTART_TOLERANCE_SECS,
            seek_end_margin_secs: DEFAULT_SEEK_END_MARGIN_SECS,
            relay_url: None,
        }
    }
}

impl PlayerSettings {
    pub fn with_initial_threshold_compressed(mut self, bytes: usize) -> Self {
        self.initial_threshold_compressed = bytes;
        self
    }

    pub fn with_initial_threshold_pcm(mut self, bytes: usize) -> Self {
        self.initial_threshold_pcm = bytes;
        self
    }

    pub fn with_steady_threshold(mut self, bytes: usize) -> Self {
        self.steady_threshold = bytes;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_restart_tolerance(mut self, secs: f64) -> Self {
        self.restart_tolerance_secs = secs;
        self
    }

    pub fn with_seek_end_margin(mut self, secs: f64) -> Self {
        self.seek_end_margin_secs = secs;
        self
    }

    pub fn with_relay_url(mut self, relay: impl Into<String>) -> Self {
        self.relay_url = Some(relay.into());
        self
    }

    /// Reject values that would stall the cadence or the heartbeat.
    pub fn validate(&self) -> Result<()> {
        if self.initial_threshold_compressed == 0
            || self.initial_threshold_pcm == 0
            || self.steady_threshold == 0
        {
            return Err(Error::Config("decode thresholds must be non-zero".to_string()));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(Error::Config("heartbeat interval must be non-zero".to_string()));
        }
        if !(self.restart_tolerance_secs >= 0.0) || !(self.seek_end_margin_secs >= 0.0) {
            return Err(Error::Config(format!(
                "tolerances must be non-negative (restart={}, seek margin={})",
                self.restart_tolerance_secs, self.seek_end_margin_secs
            )));
        }
        if let Some(relay) = &self.relay_url {
            reqwest::Url::parse(relay)
                .map_err(|e| Error::Config(format!("invalid relay URL {}: {}", relay, e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = PlayerSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.heartbeat_interval, Duration::from_millis(100));
        assert!(settings.initial_threshold_compressed < settings.initial_threshold_pcm);
    }

    #[test]
    fn test_builder_overrides() {
        let settings = PlayerSettings::default()
            .with_steady_threshold(4096)
            .with_relay_url("http://localhost:8080/");
        assert_eq!(settings.steady_threshold, 4096);
        assert_eq!(settings.relay_url.as_deref(), Some("http://localhost:8080/"));
    }

    #[test]
    fn test_validate_rejects_bad_relay_url() {
        assert!(PlayerSettings::default()
            .with_relay_url("relay without scheme")
            .validate()
            .is_err());
        assert!(PlayerSettings::default()
            .with_relay_url("http://localhost:8080/")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_and_negative() {
        assert!(PlayerSettings::default().with_steady_threshold(0).validate().is_err());
        assert!(PlayerSettings::default()
            .with_heartbeat_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(PlayerSettings::default().with_restart_tolerance(-0.5).validate().is_err());
        assert!(PlayerSettings::default().with_seek_end_margin(f64::NAN).validate().is_err());
    }
}
