//! Timeline-only output device
//!
//! `VirtualOutput` produces no sound. It tracks which units would be playing
//! against either the wall clock (headless playback) or a manually advanced
//! clock (deterministic tests), and records every start and stop in an
//! `OutputProbe` that callers can inspect.

use crate::audio::output::{OutputDevice, OutputFactory, OutputUnit, UnitHandle};
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::debug;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Manually advanced clock shared between a test and its devices.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<Mutex<f64>>);

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> f64 {
        *lock(&self.0)
    }

    pub fn advance(&self, seconds: f64) {
        *lock(&self.0) += seconds;
    }

    pub fn set(&self, seconds: f64) {
        *lock(&self.0) = seconds;
    }
}

/// Time source of a virtual device.
#[derive(Debug, Clone)]
pub enum VirtualClock {
    /// Seconds since the device was opened
    Wall,
    Manual(ManualClock),
}

/// One recorded `start` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledUnit {
    pub handle: UnitHandle,
    pub sample_rate: u32,
    pub stopped_at: Option<f64>,
}

impl ScheduledUnit {
    pub fn frame_count(&self) -> usize {
        self.handle.frames.len()
    }
}

#[derive(Debug, Default)]
struct ProbeLog {
    opened: usize,
    closed: usize,
    units: Vec<ScheduledUnit>,
}

/// Shared record of what virtual devices were asked to do.
#[derive(Debug, Clone, Default)]
pub struct OutputProbe(Arc<Mutex<ProbeLog>>);

impl OutputProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every unit ever started, in start order
    pub fn units(&self) -> Vec<ScheduledUnit> {
        lock(&self.0).units.clone()
    }

    pub fn opened(&self) -> usize {
        lock(&self.0).opened
    }

    pub fn closed(&self) -> usize {
        lock(&self.0).closed
    }

    fn record_unit(&self, unit: ScheduledUnit) {
        lock(&self.0).units.push(unit);
    }

    fn mark_stopped(&self, id: u64, at: f64) {
        let mut log = lock(&self.0);
        if let Some(unit) = log.units.iter_mut().find(|u| u.handle.id == id) {
            unit.stopped_at.get_or_insert(at);
        }
    }

    fn stopped_at(&self, id: u64) -> Option<f64> {
        lock(&self.0)
            .units
            .iter()
            .find(|u| u.handle.id == id)
            .and_then(|u| u.stopped_at)
    }
}

/// Output device that keeps the timeline and nothing else.
pub struct VirtualOutput {
    clock: VirtualClock,
    opened_at: Instant,
    probe: OutputProbe,
    next_id: u64,
    closed: bool,
}

impl VirtualOutput {
    pub fn new(clock: VirtualClock, probe: OutputProbe) -> Self {
        lock(&probe.0).opened += 1;
        Self {
            clock,
            opened_at: Instant::now(),
            probe,
            next_id: 1,
            closed: false,
        }
    }
}

impl OutputDevice for VirtualOutput {
    fn current_time(&self) -> f64 {
        match &self.clock {
            VirtualClock::Wall => self.opened_at.elapsed().as_secs_f64(),
            VirtualClock::Manual(clock) => clock.now(),
        }
    }

    fn start(&mut self, unit: OutputUnit, when: f64) -> Result<UnitHandle> {
        if self.closed {
            return Err(Error::InvalidState("output device is closed".to_string()));
        }

        let start_time = when.max(self.current_time());
        let handle = UnitHandle {
            id: self.next_id,
            start_time,
            track_offset: unit.track_offset(),
            duration: unit.duration(),
            frames: unit.frame_range(),
        };
        self.next_id += 1;

        debug!(
            "Virtual unit {} frames {:?} at {:.3}s",
            handle.id, handle.frames, start_time
        );
        self.probe.record_unit(ScheduledUnit {
            handle: handle.clone(),
            sample_rate: unit.sample_rate(),
            stopped_at: None,
        });
        Ok(handle)
    }

    fn stop(&mut self, handle: &UnitHandle) {
        if self.is_active(handle) {
            self.probe.mark_stopped(handle.id, self.current_time());
        }
    }

    fn is_active(&self, handle: &UnitHandle) -> bool {
        !self.closed
            && self.probe.stopped_at(handle.id).is_none()
            && self.current_time() < handle.end_time()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            lock(&self.probe.0).closed += 1;
        }
    }
}

/// Opens `VirtualOutput` devices sharing one clock and one probe.
#[derive(Debug, Clone)]
pub struct VirtualOutputFactory {
    clock: VirtualClock,
    probe: OutputProbe,
}

impl VirtualOutputFactory {
    /// Wall-clock devices, used for headless playback
    pub fn wall_clock() -> Self {
        Self {
            clock: VirtualClock::Wall,
            probe: OutputProbe::new(),
        }
    }

    pub fn manual(clock: ManualClock) -> Self {
        Self {
            clock: VirtualClock::Manual(clock),
            probe: OutputProbe::new(),
        }
    }

    pub fn probe(&self) -> OutputProbe {
        self.probe.clone()
    }
}

impl OutputFactory for VirtualOutputFactory {
    fn open(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn OutputDevice>> {
        debug!("Opening virtual output ({}Hz, {} channels)", sample_rate, channels);
        Ok(Box::new(VirtualOutput::new(self.clock.clone(), self.probe.clone())))
    }
}
