//! Playback session
//!
//! A `Session` owns everything belonging to one track: the transfer, the
//! growing prefix, the codec, the scheduler and the output device. It runs as
//! a single task that reacts, one event at a time, to cancellation, control
//! commands, chunk arrivals and heartbeat ticks. Decoding and scheduling
//! never overlap.
//!
//! Cancelling the session token ends the task without further callbacks;
//! output units and the device are released on the way out.

use crate::audio::output::{OutputDevice, OutputFactory};
use crate::audio::{AudioFormat, Codec, DecodedAudio};
use crate::config::PlayerSettings;
use crate::download::{ByteSource, ChunkAccumulator, ChunkEvent, DownloadProgress};
use crate::error::{Error, Result};
use crate::playback::cadence::DecodeCadence;
use crate::playback::events::{
    PlaybackObserver, ProgressReport, STATUS_BUFFERING, STATUS_CONNECTING,
    STATUS_DOWNLOAD_COMPLETE, STATUS_PLAYING,
};
use crate::playback::heartbeat::{HeartbeatMonitor, Pulse};
use crate::playback::scheduler::PlaybackScheduler;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A track to play.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub url: String,
    pub format: AudioFormat,
}

impl Track {
    pub fn new(url: impl Into<String>, format: AudioFormat) -> Self {
        Self {
            url: url.into(),
            format,
        }
    }

    /// Track whose format is guessed from the URL's extension
    pub fn from_url(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let format = AudioFormat::from_url(&url)?;
        Ok(Self { url, format })
    }
}

/// Control messages delivered to a running session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionCommand {
    Seek(f64),
}

/// Collaborators shared by every session of a player.
#[derive(Clone)]
pub struct SessionContext {
    pub settings: PlayerSettings,
    pub source: Arc<dyn ByteSource>,
    pub outputs: Arc<dyn OutputFactory>,
    pub observer: Arc<dyn PlaybackObserver>,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Finished,
    Cancelled,
}

pub struct Session {
    track: Track,
    ctx: SessionContext,
    cancel: CancellationToken,
    codec: Codec,
    cadence: DecodeCadence,
    scheduler: PlaybackScheduler,
    heartbeat: HeartbeatMonitor,
    device: Option<Box<dyn OutputDevice>>,
    audio: Option<Arc<DecodedAudio>>,
    estimated_duration: f64,
    last_progress: DownloadProgress,
    last_decode_error: Option<String>,
}

impl Session {
    pub fn new(track: Track, ctx: SessionContext, cancel: CancellationToken) -> Self {
        let codec = Codec::for_format(track.format);
        let cadence = DecodeCadence::for_format(track.format, &ctx.settings);
        let scheduler =
            PlaybackScheduler::new(codec.scheduling_strategy(), ctx.settings.seek_end_margin_secs);
        let heartbeat = HeartbeatMonitor::new(ctx.settings.restart_tolerance_secs);

        Self {
            track,
            ctx,
            cancel,
            codec,
            cadence,
            scheduler,
            heartbeat,
            device: None,
            audio: None,
            estimated_duration: 0.0,
            last_progress: DownloadProgress {
                received_bytes: 0,
                total_bytes: None,
            },
            last_decode_error: None,
        }
    }

    /// Drive the session to completion, then release its resources.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) -> SessionEnd {
        info!("Session started: {} ({})", self.track.url, self.track.format);

        let end = match self.drive(&mut commands).await {
            Ok(end) => end,
            Err(_) if self.cancel.is_cancelled() => SessionEnd::Cancelled,
            Err(err) => {
                error!("Session for {} failed: {}", self.track.url, err);
                self.report_failure(&err);
                SessionEnd::Finished
            }
        };

        self.teardown();
        info!("Session ended ({:?}): {}", end, self.track.url);
        end
    }

    async fn drive(
        &mut self,
        commands: &mut mpsc::UnboundedReceiver<SessionCommand>,
    ) -> Result<SessionEnd> {
        self.report_progress(STATUS_CONNECTING);

        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            opened = self.ctx.source.open(&self.track.url) => opened?,
        };

        let mut accumulator = ChunkAccumulator::new(opened, self.cancel.clone());
        self.last_progress = accumulator.session().progress();

        let mut heartbeat = tokio::time::interval(self.ctx.settings.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut commands_open = true;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                command = commands.recv(), if commands_open => match command {
                    Some(SessionCommand::Seek(seconds)) => self.seek(seconds)?,
                    None => commands_open = false,
                },
                event = accumulator.next_event(), if !accumulator.is_finished() => match event {
                    Some(ChunkEvent::Chunk(progress)) => self.on_chunk(&mut accumulator, progress)?,
                    Some(ChunkEvent::Completed(progress)) => {
                        self.on_complete(&mut accumulator, progress)?
                    }
                    Some(ChunkEvent::Failed(err)) => self.on_failure(&mut accumulator, err)?,
                    None => {}
                },
                _ = heartbeat.tick() => {
                    if let Some(end) = self.on_heartbeat()? {
                        return Ok(end);
                    }
                }
            }
        }
    }

    // ========================================
    // Download events
    // ========================================

    fn on_chunk(&mut self, accumulator: &mut ChunkAccumulator, progress: DownloadProgress) -> Result<()> {
        self.last_progress = progress;
        let status = if self.audio.is_some() {
            STATUS_PLAYING
        } else {
            STATUS_BUFFERING
        };
        self.report_progress(status);

        if self.cadence.should_decode(progress.received_bytes as usize) {
            self.decode_step(accumulator)?;
        }
        Ok(())
    }

    fn on_complete(
        &mut self,
        accumulator: &mut ChunkAccumulator,
        progress: DownloadProgress,
    ) -> Result<()> {
        self.last_progress = progress;
        self.scheduler.set_downloading(false);
        self.report_progress(STATUS_DOWNLOAD_COMPLETE);

        if self.cadence.should_decode_on_complete(progress.received_bytes as usize) {
            self.decode_step(accumulator)?;
        }

        if self.audio.is_none() {
            let reason = self
                .last_decode_error
                .take()
                .unwrap_or_else(|| "no audio could be decoded".to_string());
            return Err(Error::Decode(reason));
        }
        Ok(())
    }

    fn on_failure(&mut self, accumulator: &mut ChunkAccumulator, err: Error) -> Result<()> {
        self.scheduler.set_downloading(false);
        let received = accumulator.session().received_bytes() as usize;
        // Whatever arrived is all there will be, threshold or not
        if self.cadence.should_decode_on_complete(received) {
            self.decode_step(accumulator)?;
        }
        if self.audio.is_none() {
            return Err(err);
        }

        // Keep playing what was decoded; the heartbeat ends the track there
        warn!("Download stopped early, playing decoded audio only: {}", err);
        let reason = match err {
            Error::Network(reason) => reason,
            other => other.to_string(),
        };
        self.report_progress(format!("Network error: {}", reason));
        Ok(())
    }

    // ========================================
    // Decode and schedule
    // ========================================

    fn decode_step(&mut self, accumulator: &mut ChunkAccumulator) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let download = accumulator.session_mut();
        let received = download.received_bytes();
        let total = download.total_bytes();

        match self.codec.decode_available(download.bytes_mut()) {
            Ok(audio) => {
                self.cadence.record_attempt(received as usize, true);
                self.last_decode_error = None;
                self.on_decoded(audio, received, total)
            }
            Err(err) => {
                self.cadence.record_attempt(received as usize, false);
                match err {
                    Error::InsufficientData(ref reason) => {
                        debug!("Decode deferred at {} bytes: {}", received, reason)
                    }
                    ref other => warn!("Decode failed at {} bytes: {}", received, other),
                }
                self.last_decode_error = Some(err.to_string());
                Ok(())
            }
        }
    }

    fn on_decoded(&mut self, audio: DecodedAudio, received: u64, total: Option<u64>) -> Result<()> {
        let duration = audio.duration_seconds();
        self.estimated_duration = match total {
            Some(total) if received > 0 => duration * total as f64 / received as f64,
            _ => duration,
        };
        debug!(
            "Decoded {:.3}s from {} bytes (estimated total {:.1}s)",
            duration, received, self.estimated_duration
        );

        if self.device.is_none() {
            let device = self.ctx.outputs.open(audio.sample_rate, audio.channel_count())?;
            self.device = Some(device);
        }
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let audio = Arc::new(audio);
        self.audio = Some(Arc::clone(&audio));
        if let Some(device) = self.device.as_mut() {
            self.scheduler.schedule(device.as_mut(), &audio)?;
        }
        Ok(())
    }

    // ========================================
    // Control and heartbeat
    // ========================================

    fn seek(&mut self, seconds: f64) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        let Some(device) = self.device.as_mut() else {
            debug!("Seek to {:.3}s ignored: nothing decoded yet", seconds);
            return Ok(());
        };

        if let Some(target) = self.scheduler.seek(device.as_mut(), self.audio.as_ref(), seconds)? {
            let total = self.reported_total();
            self.ctx.observer.on_position(target, total);
        }
        Ok(())
    }

    fn on_heartbeat(&mut self) -> Result<Option<SessionEnd>> {
        let Some(device) = self.device.as_mut() else {
            return Ok(None);
        };

        let pulse = self.heartbeat.tick(
            &mut self.scheduler,
            device.as_mut(),
            self.audio.as_ref(),
            self.estimated_duration,
        )?;

        match pulse {
            Pulse::Idle => {}
            Pulse::Playing { current, total }
            | Pulse::Waiting { current, total }
            | Pulse::Restarted {
                from: current,
                total,
            } => self.ctx.observer.on_position(current, total),
            Pulse::Ended { total } => {
                self.ctx.observer.on_position(total, total);
                self.ctx.observer.on_finished();
                return Ok(Some(SessionEnd::Finished));
            }
        }
        Ok(None)
    }

    fn reported_total(&self) -> f64 {
        let decoded = self.audio.as_ref().map_or(0.0, |a| a.duration_seconds());
        if self.scheduler.state().downloading {
            self.estimated_duration.max(decoded)
        } else {
            decoded
        }
    }

    // ========================================
    // Reporting and teardown
    // ========================================

    fn report_progress(&self, status: impl Into<String>) {
        if self.cancel.is_cancelled() {
            return;
        }
        let report = ProgressReport::new(&self.last_progress, status);
        self.ctx.observer.on_progress(&report);
    }

    fn report_failure(&self, err: &Error) {
        let status = match err {
            Error::Network(reason) => format!("Network error: {}", reason),
            Error::Decode(reason) | Error::InsufficientData(reason) => {
                format!("Unplayable: {}", reason)
            }
            Error::AudioOutput(reason) => format!("Output error: {}", reason),
            other => format!("Error: {}", other),
        };
        self.report_progress(status);
    }

    fn teardown(&mut self) {
        if let Some(mut device) = self.device.take() {
            self.scheduler.stop(device.as_mut());
            device.close();
        } else {
            self.scheduler.set_downloading(false);
        }
        self.audio = None;
    }
}
