//! Audio output
//!
//! The scheduler talks to an `OutputDevice`: a clock plus the ability to start
//! and stop output units at given times. `CpalOutput` drives real hardware;
//! `VirtualOutput` (see `virtual_output`) keeps only the timeline.
//!
//! A cpal `Stream` is not `Send`, so `CpalOutput` builds and owns it on a
//! dedicated thread. The session holds a handle that shares the mixer state
//! and the frame clock with the audio callback.

use crate::audio::resampler::UnitResampler;
use crate::audio::types::DecodedAudio;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

// ========================================
// Output units
// ========================================

/// A contiguous frame range of decoded audio, ready to be started.
#[derive(Debug, Clone)]
pub struct OutputUnit {
    audio: Arc<DecodedAudio>,
    frames: Range<usize>,
}

impl OutputUnit {
    /// Build a unit over `frames`, clamped to the buffer.
    pub fn new(audio: Arc<DecodedAudio>, frames: Range<usize>) -> Self {
        let end = frames.end.min(audio.frames());
        let start = frames.start.min(end);
        Self {
            audio,
            frames: start..end,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate
    }

    /// The whole decoded buffer this unit is a range of
    pub fn audio(&self) -> &DecodedAudio {
        &self.audio
    }

    pub fn frame_range(&self) -> Range<usize> {
        self.frames.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Seconds into the track where this unit begins
    pub fn track_offset(&self) -> f64 {
        self.frames.start as f64 / self.audio.sample_rate as f64
    }

    pub fn duration(&self) -> f64 {
        self.frames.len() as f64 / self.audio.sample_rate as f64
    }
}

/// Handle to a started unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitHandle {
    pub id: u64,
    /// Device time at which the first frame plays
    pub start_time: f64,
    /// Track time of the first frame
    pub track_offset: f64,
    pub duration: f64,
    pub frames: Range<usize>,
}

impl UnitHandle {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Track time just past the last frame
    pub fn track_end(&self) -> f64 {
        self.track_offset + self.duration
    }
}

/// Output device seen by the scheduler.
pub trait OutputDevice: Send {
    /// Device clock in seconds
    fn current_time(&self) -> f64;

    /// Start `unit` at device time `when` (immediately if `when` has passed).
    fn start(&mut self, unit: OutputUnit, when: f64) -> Result<UnitHandle>;

    /// Stop a unit; stopping an ended unit is a no-op.
    fn stop(&mut self, handle: &UnitHandle);

    /// True until the unit has played through or been stopped.
    fn is_active(&self, handle: &UnitHandle) -> bool;

    /// Release the device. No unit plays afterwards.
    fn close(&mut self);
}

/// Opens an output device for a decoded track layout.
pub trait OutputFactory: Send + Sync {
    fn open(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn OutputDevice>>;
}

// ========================================
// Hardware output
// ========================================

struct MixUnit {
    id: u64,
    start_frame: u64,
    planes: Vec<Vec<f32>>,
}

impl MixUnit {
    fn len(&self) -> u64 {
        self.planes.first().map_or(0, |p| p.len() as u64)
    }

    fn end_frame(&self) -> u64 {
        self.start_frame + self.len()
    }
}

/// Units currently owned by the audio callback.
#[derive(Default)]
struct Mixer {
    units: Vec<MixUnit>,
    scratch: Vec<f32>,
}

impl Mixer {
    fn render<T>(&mut self, data: &mut [T], channels: usize, first_frame: u64)
    where
        T: SizedSample + FromSample<f32>,
    {
        self.scratch.resize(channels, 0.0);

        for (index, frame) in data.chunks_mut(channels).enumerate() {
            let now = first_frame + index as u64;
            self.scratch.iter_mut().for_each(|s| *s = 0.0);

            for unit in &self.units {
                if now < unit.start_frame || now >= unit.end_frame() {
                    continue;
                }
                let position = (now - unit.start_frame) as usize;
                for (channel, slot) in self.scratch.iter_mut().enumerate() {
                    let plane = &unit.planes[channel % unit.planes.len()];
                    *slot += plane[position];
                }
            }

            for (out, value) in frame.iter_mut().zip(&self.scratch) {
                *out = T::from_sample(value.clamp(-1.0, 1.0));
            }
        }

        let rendered_to = first_frame + (data.len() / channels.max(1)) as u64;
        self.units.retain(|unit| unit.end_frame() > rendered_to);
    }
}

/// Device frame placement of started units.
///
/// A unit that continues the previous one (same track frame, same start time
/// to within a frame) starts on the device frame where the previous one
/// ended, so rounding never opens a gap or an overlap between them.
#[derive(Debug, Default)]
struct Placement {
    /// Track frame and device frame just past the last placed unit
    chain_end: Option<(usize, u64)>,
}

impl Placement {
    fn place(&mut self, frames: &Range<usize>, start_time: f64, device_rate: u32, len: u64) -> u64 {
        let rounded = (start_time * device_rate as f64).round() as u64;
        let start_frame = match self.chain_end {
            Some((track_frame, device_frame))
                if track_frame == frames.start && rounded.abs_diff(device_frame) <= 1 =>
            {
                device_frame
            }
            _ => rounded,
        };
        self.chain_end = Some((frames.end, start_frame + len));
        start_frame
    }

    fn reset(&mut self) {
        self.chain_end = None;
    }
}

fn lock_mixer(mixer: &Mutex<Mixer>) -> MutexGuard<'_, Mixer> {
    mixer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// cpal-backed output.
pub struct CpalOutput {
    mixer: Arc<Mutex<Mixer>>,
    clock: Arc<AtomicU64>,
    error_flag: Arc<AtomicBool>,
    device_rate: u32,
    placement: Placement,
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    next_id: u64,
}

impl CpalOutput {
    /// Open the default output device, preferring the track's sample rate.
    ///
    /// # Errors
    /// - No default output device
    /// - No usable stream configuration
    /// - Stream failed to build or start
    pub fn open(sample_rate: u32, channels: u16) -> Result<Self> {
        let mixer = Arc::new(Mutex::new(Mixer::default()));
        let clock = Arc::new(AtomicU64::new(0));
        let error_flag = Arc::new(AtomicBool::new(false));

        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread_mixer = Arc::clone(&mixer);
        let thread_clock = Arc::clone(&clock);
        let thread_error = Arc::clone(&error_flag);

        let thread = std::thread::Builder::new()
            .name("streamplay-output".to_string())
            .spawn(move || {
                let stream = match Self::start_stream(
                    sample_rate,
                    channels,
                    thread_mixer,
                    thread_clock,
                    thread_error,
                ) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Sender dropped or explicit shutdown both end the stream
                let _ = shutdown_rx.recv();
                if let Err(e) = stream.pause() {
                    warn!("Failed to pause output stream: {}", e);
                }
                drop(stream);
                debug!("Output thread exiting");
            })?;

        let device_rate = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("output thread exited during setup".to_string()))??;

        info!(
            "Audio output open: track {}Hz, device {}Hz, {} channels",
            sample_rate, device_rate, channels
        );

        Ok(Self {
            mixer,
            clock,
            error_flag,
            device_rate,
            placement: Placement::default(),
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
            next_id: 1,
        })
    }

    fn start_stream(
        sample_rate: u32,
        channels: u16,
        mixer: Arc<Mutex<Mixer>>,
        clock: Arc<AtomicU64>,
        error_flag: Arc<AtomicBool>,
    ) -> Result<(Stream, u32)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using default audio device: {}", name);

        let (config, sample_format) = Self::get_best_config(&device, sample_rate, channels)?;
        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}",
            config.sample_rate.0, config.channels, sample_format
        );

        let stream = match sample_format {
            SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config, mixer, clock, error_flag)?
            }
            SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config, mixer, clock, error_flag)?
            }
            SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config, mixer, clock, error_flag)?
            }
            SampleFormat::I32 => {
                Self::build_stream::<i32>(&device, &config, mixer, clock, error_flag)?
            }
            other => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

        Ok((stream, config.sample_rate.0))
    }

    /// Pick a stream configuration.
    ///
    /// Prefers f32 at the track's rate and channel count, then any format at
    /// the track's rate, then the device default.
    fn get_best_config(
        device: &Device,
        sample_rate: u32,
        channels: u16,
    ) -> Result<(StreamConfig, SampleFormat)> {
        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?
            .collect();

        let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate().0 <= sample_rate && c.max_sample_rate().0 >= sample_rate
        };

        let preferred = supported
            .iter()
            .find(|c| {
                supports_rate(*c)
                    && c.channels() == channels.max(1)
                    && c.sample_format() == SampleFormat::F32
            })
            .or_else(|| supported.iter().find(|c| supports_rate(*c) && c.channels() >= 2))
            .or_else(|| supported.iter().find(|c| supports_rate(*c)));

        if let Some(range) = preferred {
            let config = range.clone().with_sample_rate(cpal::SampleRate(sample_rate));
            return Ok((config.config(), config.sample_format()));
        }

        warn!(
            "Device does not support {}Hz; falling back to default config with resampling",
            sample_rate
        );
        let default = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
        Ok((default.config(), default.sample_format()))
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        mixer: Arc<Mutex<Mixer>>,
        clock: Arc<AtomicU64>,
        error_flag: Arc<AtomicBool>,
    ) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = config.channels as usize;

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let first_frame = clock.load(Ordering::Acquire);
                    lock_mixer(&mixer).render(data, channels, first_frame);
                    clock.fetch_add((data.len() / channels) as u64, Ordering::Release);
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }
}

impl OutputDevice for CpalOutput {
    fn current_time(&self) -> f64 {
        self.clock.load(Ordering::Acquire) as f64 / self.device_rate as f64
    }

    fn start(&mut self, unit: OutputUnit, when: f64) -> Result<UnitHandle> {
        if self.error_flag.load(Ordering::SeqCst) {
            return Err(Error::AudioOutput("output stream reported an error".to_string()));
        }
        if self.shutdown.is_none() {
            return Err(Error::InvalidState("output device is closed".to_string()));
        }

        let now = self.current_time();
        let start_time = when.max(now);
        let resampler = UnitResampler::new(unit.sample_rate(), self.device_rate);
        let planes = resampler.resample_unit(&unit.audio().channels, unit.frame_range())?;

        let id = self.next_id;
        self.next_id += 1;
        let start_frame = self.placement.place(
            &unit.frame_range(),
            start_time,
            self.device_rate,
            planes.first().map_or(0, |p| p.len() as u64),
        );

        lock_mixer(&self.mixer).units.push(MixUnit {
            id,
            start_frame,
            planes,
        });

        Ok(UnitHandle {
            id,
            start_time,
            track_offset: unit.track_offset(),
            duration: unit.duration(),
            frames: unit.frame_range(),
        })
    }

    fn stop(&mut self, handle: &UnitHandle) {
        self.placement.reset();
        lock_mixer(&self.mixer).units.retain(|unit| unit.id != handle.id);
    }

    fn is_active(&self, handle: &UnitHandle) -> bool {
        lock_mixer(&self.mixer)
            .units
            .iter()
            .any(|unit| unit.id == handle.id)
    }

    fn close(&mut self) {
        lock_mixer(&self.mixer).units.clear();
        self.placement.reset();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Output thread panicked");
            }
        }
        info!("Audio output closed");
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        if self.shutdown.is_some() {
            self.close();
        }
    }
}

/// Opens `CpalOutput` on the default device.
#[derive(Debug, Default, Clone)]
pub struct CpalOutputFactory;

impl OutputFactory for CpalOutputFactory {
    fn open(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn OutputDevice>> {
        Ok(Box::new(CpalOutput::open(sample_rate, channels)?))
    }
}
