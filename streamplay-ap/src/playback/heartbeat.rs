//! Heartbeat monitor
//!
//! Runs on a fixed tick while a track is loaded. Each tick reports the
//! playback position and repairs unexpected stops: when no unit is playing
//! but decoded audio remains beyond the tolerance, playback restarts from
//! the last known position.

use crate::audio::output::OutputDevice;
use crate::audio::DecodedAudio;
use crate::error::Result;
use crate::playback::scheduler::PlaybackScheduler;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pulse {
    /// Nothing decoded yet, or playback stopped
    Idle,
    Playing { current: f64, total: f64 },
    /// Playback had stopped early and was restarted at `from`
    Restarted { from: f64, total: f64 },
    /// Caught up with the download; waiting for more audio
    Waiting { current: f64, total: f64 },
    /// Played to the end and the download is finished
    Ended { total: f64 },
}

#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    tolerance: f64,
}

impl HeartbeatMonitor {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Run one tick.
    ///
    /// # Arguments
    /// - `estimated_total`: running duration estimate while downloading
    pub fn tick(
        &self,
        scheduler: &mut PlaybackScheduler,
        device: &mut dyn OutputDevice,
        audio: Option<&Arc<DecodedAudio>>,
        estimated_total: f64,
    ) -> Result<Pulse> {
        if scheduler.state().stopped {
            return Ok(Pulse::Idle);
        }
        let Some(audio) = audio else {
            return Ok(Pulse::Idle);
        };

        scheduler.refresh(device);

        let duration = audio.duration_seconds();
        let downloading = scheduler.state().downloading;
        let total = if downloading {
            estimated_total.max(duration)
        } else {
            duration
        };

        if scheduler.state().active.is_some() {
            let current = scheduler.position(device).clamp(0.0, duration);
            return Ok(Pulse::Playing { current, total });
        }

        let played = scheduler.state().played_offset;
        if played < duration - self.tolerance {
            warn!(
                "Playback stopped at {:.3}s of {:.3}s decoded; restarting",
                played, duration
            );
            scheduler.restart_at(device, audio, played)?;
            return Ok(Pulse::Restarted {
                from: played,
                total,
            });
        }

        if downloading {
            debug!("Playback caught up with download at {:.3}s", played);
            Ok(Pulse::Waiting {
                current: played.min(duration),
                total,
            })
        } else {
            Ok(Pulse::Ended { total: duration })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::UnitHandle;
    use crate::audio::virtual_output::{ManualClock, OutputProbe, VirtualClock, VirtualOutput};
    use crate::audio::SchedulingStrategy;

    fn audio(frames: usize) -> Arc<DecodedAudio> {
        let mut audio = DecodedAudio::new(100, 2);
        audio.channels = vec![vec![0.0; frames]; 2];
        Arc::new(audio)
    }

    fn setup() -> (VirtualOutput, ManualClock, OutputProbe, PlaybackScheduler) {
        let clock = ManualClock::new();
        let probe = OutputProbe::new();
        let device = VirtualOutput::new(VirtualClock::Manual(clock.clone()), probe.clone());
        let scheduler = PlaybackScheduler::new(SchedulingStrategy::FullRestart, 0.1);
        (device, clock, probe, scheduler)
    }

    #[test]
    fn test_idle_before_audio() {
        let (mut device, _clock, _probe, mut scheduler) = setup();
        let monitor = HeartbeatMonitor::new(0.2);
        let pulse = monitor.tick(&mut scheduler, &mut device, None, 0.0).unwrap();
        assert_eq!(pulse, Pulse::Idle);
    }

    #[test]
    fn test_reports_estimate_while_downloading() {
        let (mut device, clock, _probe, mut scheduler) = setup();
        let monitor = HeartbeatMonitor::new(0.2);
        let buffer = audio(1000);
        scheduler.schedule(&mut device, &buffer).unwrap();
        clock.advance(2.5);

        let pulse = monitor.tick(&mut scheduler, &mut device, Some(&buffer), 60.0).unwrap();
        assert_eq!(
            pulse,
            Pulse::Playing {
                current: 2.5,
                total: 60.0
            }
        );

        scheduler.set_downloading(false);
        let pulse = monitor.tick(&mut scheduler, &mut device, Some(&buffer), 60.0).unwrap();
        assert_eq!(
            pulse,
            Pulse::Playing {
                current: 2.5,
                total: 10.0
            }
        );
    }

    #[test]
    fn test_unexpected_stop_is_repaired() {
        let (mut device, clock, probe, mut scheduler) = setup();
        let monitor = HeartbeatMonitor::new(0.2);
        let buffer = audio(1000);
        scheduler.schedule(&mut device, &buffer).unwrap();
        clock.advance(3.0);

        // Device drops the unit behind the scheduler's back
        let handle: UnitHandle = probe.units()[0].handle.clone();
        device.stop(&handle);

        let pulse = monitor.tick(&mut scheduler, &mut device, Some(&buffer), 10.0).unwrap();
        assert_eq!(
            pulse,
            Pulse::Restarted {
                from: 3.0,
                total: 10.0
            }
        );
        let units = probe.units();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].handle.frames.start, 300);
    }

    #[test]
    fn test_genuine_end_is_not_restarted() {
        let (mut device, clock, probe, mut scheduler) = setup();
        let monitor = HeartbeatMonitor::new(0.2);
        let buffer = audio(100);
        scheduler.schedule(&mut device, &buffer).unwrap();
        scheduler.set_downloading(false);
        clock.advance(5.0);

        let pulse = monitor.tick(&mut scheduler, &mut device, Some(&buffer), 1.0).unwrap();
        assert_eq!(pulse, Pulse::Ended { total: 1.0 });
        assert_eq!(probe.units().len(), 1);
    }

    #[test]
    fn test_caught_up_waits_for_download() {
        let (mut device, clock, probe, mut scheduler) = setup();
        let monitor = HeartbeatMonitor::new(0.2);
        let buffer = audio(100);
        scheduler.schedule(&mut device, &buffer).unwrap();
        clock.advance(1.5);

        let pulse = monitor.tick(&mut scheduler, &mut device, Some(&buffer), 30.0).unwrap();
        assert_eq!(
            pulse,
            Pulse::Waiting {
                current: 1.0,
                total: 30.0
            }
        );
        assert_eq!(probe.units().len(), 1);
    }
}
