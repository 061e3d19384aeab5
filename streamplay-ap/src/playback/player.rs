//! Player control surface
//!
//! `Player` runs at most one `Session` at a time. Starting a track fully stops
//! the previous one first, so transfers, units and devices never outlive the
//! track they belong to.

use crate::audio::output::OutputFactory;
use crate::config::PlayerSettings;
use crate::download::{ByteSource, RoutingSource};
use crate::error::{Error, Result};
use crate::playback::events::PlaybackObserver;
use crate::playback::session::{Session, SessionCommand, SessionContext, SessionEnd, Track};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

struct ActiveSession {
    track: Track,
    cancel: CancellationToken,
    commands: mpsc::UnboundedSender<SessionCommand>,
    task: JoinHandle<SessionEnd>,
}

pub struct Player {
    ctx: SessionContext,
    current: Option<ActiveSession>,
}

impl Player {
    /// Create a player.
    ///
    /// # Errors
    /// `Error::Config` when `settings` fail validation
    pub fn new(
        settings: PlayerSettings,
        source: Arc<dyn ByteSource>,
        outputs: Arc<dyn OutputFactory>,
        observer: Arc<dyn PlaybackObserver>,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            ctx: SessionContext {
                settings,
                source,
                outputs,
                observer,
            },
            current: None,
        })
    }

    /// Create a player that fetches through a `RoutingSource` built from
    /// `settings`, so `relay_url` applies to remote tracks.
    pub fn from_settings(
        settings: PlayerSettings,
        outputs: Arc<dyn OutputFactory>,
        observer: Arc<dyn PlaybackObserver>,
    ) -> Result<Self> {
        settings.validate()?;
        let source = RoutingSource::from_settings(&settings)?;
        Self::new(settings, Arc::new(source), outputs, observer)
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.ctx.settings
    }

    /// Stop whatever is playing and start `track`.
    pub async fn play(&mut self, track: Track) -> Result<()> {
        self.stop().await;

        info!("Playing {} ({})", track.url, track.format);
        let cancel = CancellationToken::new();
        let (commands, receiver) = mpsc::unbounded_channel();
        let session = Session::new(track.clone(), self.ctx.clone(), cancel.clone());
        let task = tokio::spawn(session.run(receiver));

        self.current = Some(ActiveSession {
            track,
            cancel,
            commands,
            task,
        });
        Ok(())
    }

    /// Stop the current track and wait until its resources are released.
    pub async fn stop(&mut self) {
        let Some(active) = self.current.take() else {
            return;
        };
        debug!("Stopping {}", active.track.url);
        active.cancel.cancel();
        if let Err(e) = active.task.await {
            error!("Session task for {} failed: {}", active.track.url, e);
        }
    }

    /// Seek the current track to `seconds` (clamped into the decoded range).
    pub fn seek(&self, seconds: f64) -> Result<()> {
        let active = self
            .current
            .as_ref()
            .ok_or_else(|| Error::InvalidState("nothing is playing".to_string()))?;
        active
            .commands
            .send(SessionCommand::Seek(seconds))
            .map_err(|_| Error::InvalidState("track has already ended".to_string()))
    }

    /// Wait for the current track to end on its own.
    ///
    /// Cancel-safe: dropping the future leaves the track playing.
    pub async fn wait(&mut self) -> Option<SessionEnd> {
        let result = {
            let active = self.current.as_mut()?;
            (&mut active.task).await
        };
        let active = self.current.take()?;
        match result {
            Ok(end) => Some(end),
            Err(e) => {
                error!("Session task for {} failed: {}", active.track.url, e);
                None
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|active| !active.task.is_finished())
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current.as_ref().map(|active| &active.track)
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if let Some(active) = self.current.take() {
            active.cancel.cancel();
        }
    }
}
