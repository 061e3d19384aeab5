//! Playback scheduling
//!
//! Turns each new decode result into output units without replaying audio
//! the listener has already heard.
//!
//! **Strategies:**
//! - Differential: only frames decoded since the last decode are appended,
//!   back to back, forming one gapless chain.
//! - Full restart: the whole buffer replaces the active unit, starting at the
//!   current playback position.
//!
//! Position is tracked as `played_offset` (track seconds) plus the device time
//! elapsed since `output_start`.

use crate::audio::output::{OutputDevice, OutputUnit, UnitHandle};
use crate::audio::{DecodedAudio, SchedulingStrategy};
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Clamp a seek request into `[0, duration - margin]`.
///
/// Tracks shorter than the margin always seek to 0; non-finite requests
/// also map to 0.
pub fn clamp_seek(requested: f64, duration: f64, margin: f64) -> f64 {
    if !requested.is_finite() {
        return 0.0;
    }
    let upper = (duration - margin).max(0.0);
    requested.clamp(0.0, upper)
}

/// Position bookkeeping for one track.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    /// Track seconds already played when `output_start` was taken
    pub played_offset: f64,
    /// Device time at which playback from `played_offset` began
    pub output_start: f64,
    /// Tail of the unit chain currently playing
    pub active: Option<UnitHandle>,
    pub stopped: bool,
    pub downloading: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            played_offset: 0.0,
            output_start: 0.0,
            active: None,
            stopped: false,
            downloading: true,
        }
    }
}

pub struct PlaybackScheduler {
    strategy: SchedulingStrategy,
    seek_end_margin: f64,
    state: PlaybackState,
    /// Every started unit that may still be playing; the last one is `active`
    chain: Vec<UnitHandle>,
    last_scheduled_frame: usize,
    next_free_time: f64,
}

impl PlaybackScheduler {
    pub fn new(strategy: SchedulingStrategy, seek_end_margin: f64) -> Self {
        Self {
            strategy,
            seek_end_margin,
            state: PlaybackState::default(),
            chain: Vec::new(),
            last_scheduled_frame: 0,
            next_free_time: 0.0,
        }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn set_downloading(&mut self, downloading: bool) {
        self.state.downloading = downloading;
    }

    /// Frames of the current buffer already handed to the device
    pub fn last_scheduled_frame(&self) -> usize {
        self.last_scheduled_frame
    }

    /// Device time at which the chain runs out
    pub fn next_free_time(&self) -> f64 {
        self.next_free_time
    }

    /// Current track position, clamped to the end of the active chain.
    pub fn position(&self, device: &dyn OutputDevice) -> f64 {
        match &self.state.active {
            Some(active) => {
                let elapsed = (device.current_time() - self.state.output_start).max(0.0);
                (self.state.played_offset + elapsed).min(active.track_end())
            }
            None => self.state.played_offset,
        }
    }

    /// Notice a chain that has played out (or been cut off by the device).
    ///
    /// Folds the elapsed time into `played_offset` and clears the active
    /// handle. Returns true when an end was observed.
    pub fn refresh(&mut self, device: &dyn OutputDevice) -> bool {
        let Some(active) = &self.state.active else {
            return false;
        };
        if device.is_active(active) {
            return false;
        }

        let ended_at = self.position(device);
        debug!(
            "Output unit {} ended at track position {:.3}s",
            active.id, ended_at
        );
        self.state.played_offset = ended_at.max(self.state.played_offset);
        self.state.active = None;
        self.chain.clear();
        true
    }

    /// Hand a fresh decode result to the device.
    pub fn schedule(&mut self, device: &mut dyn OutputDevice, audio: &Arc<DecodedAudio>) -> Result<()> {
        if self.state.stopped {
            return Ok(());
        }
        self.refresh(device);

        match self.strategy {
            SchedulingStrategy::Differential => self.append(device, audio),
            SchedulingStrategy::FullRestart => {
                let position = self.position(device);
                self.restart_at(device, audio, position)
            }
        }
    }

    /// Append frames `[last_scheduled_frame, N)` after the chain.
    fn append(&mut self, device: &mut dyn OutputDevice, audio: &Arc<DecodedAudio>) -> Result<()> {
        let total = audio.frames();
        if total <= self.last_scheduled_frame {
            return Ok(());
        }

        let now = device.current_time();
        let gapless = self.state.active.is_some() && self.next_free_time >= now;
        let start_at = if gapless { self.next_free_time } else { now };

        let unit = OutputUnit::new(Arc::clone(audio), self.last_scheduled_frame..total);
        let handle = device.start(unit, start_at)?;

        if !gapless {
            // Nothing audible between the old chain and this unit
            self.state.played_offset = handle.track_offset;
            self.state.output_start = handle.start_time;
        }

        debug!(
            "Appended frames {:?} at {:.3}s (gapless={})",
            handle.frames, handle.start_time, gapless
        );
        self.next_free_time = handle.end_time();
        self.last_scheduled_frame = total;
        self.chain.push(handle.clone());
        self.state.active = Some(handle);
        Ok(())
    }

    /// Stop everything and play the whole buffer from `offset` seconds.
    pub fn restart_at(
        &mut self,
        device: &mut dyn OutputDevice,
        audio: &Arc<DecodedAudio>,
        offset: f64,
    ) -> Result<()> {
        self.stop_chain(device);

        let now = device.current_time();
        let total = audio.frames();
        let start_frame = audio.frame_at(offset);

        self.state.played_offset = offset.max(0.0);
        self.state.output_start = now;
        self.last_scheduled_frame = total;
        self.next_free_time = now;

        let unit = OutputUnit::new(Arc::clone(audio), start_frame..total);
        if unit.is_empty() {
            debug!("Nothing left to play after {:.3}s", offset);
            return Ok(());
        }

        let handle = device.start(unit, now)?;
        debug!(
            "Restarted at {:.3}s with frames {:?}",
            offset, handle.frames
        );
        self.state.output_start = handle.start_time;
        self.next_free_time = handle.end_time();
        self.chain.push(handle.clone());
        self.state.active = Some(handle);
        Ok(())
    }

    /// Jump to `requested` seconds, clamped into the decoded range.
    ///
    /// # Returns
    /// The clamped target, or `None` when nothing is decoded yet or playback
    /// has been stopped
    pub fn seek(
        &mut self,
        device: &mut dyn OutputDevice,
        audio: Option<&Arc<DecodedAudio>>,
        requested: f64,
    ) -> Result<Option<f64>> {
        if self.state.stopped {
            return Ok(None);
        }
        let Some(audio) = audio else {
            return Ok(None);
        };

        let target = clamp_seek(requested, audio.duration_seconds(), self.seek_end_margin);
        info!("Seek to {:.3}s (requested {:.3}s)", target, requested);
        self.restart_at(device, audio, target)?;
        Ok(Some(target))
    }

    /// Stop every unit. Later schedule and seek calls are ignored.
    pub fn stop(&mut self, device: &mut dyn OutputDevice) {
        if !self.state.stopped {
            self.state.played_offset = self.position(device);
        }
        self.stop_chain(device);
        self.state.stopped = true;
    }

    fn stop_chain(&mut self, device: &mut dyn OutputDevice) {
        for handle in self.chain.drain(..) {
            device.stop(&handle);
        }
        self.state.active = None;
    }
}
