//! Decode cadence
//!
//! Decides when the accumulated prefix is worth decoding again. Decoding the
//! whole prefix on every chunk would be quadratic, so attempts are spaced by
//! a byte threshold: a smaller one until audio first decodes, a larger one
//! afterwards, plus one final attempt when the stream completes.

use crate::audio::AudioFormat;
use crate::config::PlayerSettings;

#[derive(Debug, Clone)]
pub struct DecodeCadence {
    initial_threshold: usize,
    steady_threshold: usize,
    last_attempt_len: usize,
    decoded_once: bool,
}

impl DecodeCadence {
    pub fn new(initial_threshold: usize, steady_threshold: usize) -> Self {
        Self {
            initial_threshold: initial_threshold.max(1),
            steady_threshold: steady_threshold.max(1),
            last_attempt_len: 0,
            decoded_once: false,
        }
    }

    /// Thresholds for `format` taken from `settings`
    pub fn for_format(format: AudioFormat, settings: &PlayerSettings) -> Self {
        let initial = if format.is_linear_pcm() {
            settings.initial_threshold_pcm
        } else {
            settings.initial_threshold_compressed
        };
        Self::new(initial, settings.steady_threshold)
    }

    fn step(&self) -> usize {
        if self.decoded_once {
            self.steady_threshold
        } else {
            self.initial_threshold
        }
    }

    /// Whether a chunk arrival that brought the prefix to `received` bytes
    /// should trigger a decode.
    pub fn should_decode(&self, received: usize) -> bool {
        received.saturating_sub(self.last_attempt_len) >= self.step()
    }

    /// Whether completion at `received` bytes needs one last decode
    pub fn should_decode_on_complete(&self, received: usize) -> bool {
        received > self.last_attempt_len
    }

    /// Record an attempt over `received` bytes and whether it produced audio.
    pub fn record_attempt(&mut self, received: usize, succeeded: bool) {
        self.last_attempt_len = received;
        self.decoded_once |= succeeded;
    }

    pub fn has_decoded(&self) -> bool {
        self.decoded_once
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_then_steady_threshold() {
        let mut cadence = DecodeCadence::new(100, 1000);

        assert!(!cadence.should_decode(99));
        assert!(cadence.should_decode(100));

        cadence.record_attempt(120, true);
        assert!(!cadence.should_decode(1119));
        assert!(cadence.should_decode(1120));
    }

    #[test]
    fn test_failed_attempt_retries_at_initial_step() {
        let mut cadence = DecodeCadence::new(100, 1000);
        cadence.record_attempt(100, false);
        assert!(!cadence.has_decoded());
        assert!(!cadence.should_decode(150));
        assert!(cadence.should_decode(200));
    }

    #[test]
    fn test_completion_decodes_only_new_bytes() {
        let mut cadence = DecodeCadence::new(100, 1000);
        assert!(cadence.should_decode_on_complete(10));
        cadence.record_attempt(500, true);
        assert!(!cadence.should_decode_on_complete(500));
        assert!(cadence.should_decode_on_complete(501));
    }

    #[test]
    fn test_pcm_waits_longer_than_compressed() {
        let settings = PlayerSettings::default();
        let pcm = DecodeCadence::for_format(AudioFormat::Wav, &settings);
        let mp3 = DecodeCadence::for_format(AudioFormat::Mp3, &settings);
        let at = settings.initial_threshold_compressed;
        assert!(mp3.should_decode(at));
        assert!(!pcm.should_decode(at));
    }
}
