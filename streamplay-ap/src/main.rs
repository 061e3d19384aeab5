//! Streamplay Audio Player (streamplay-ap) - Main entry point
//!
//! Plays one track progressively from a URL or local path. While the track
//! plays, stdin accepts `seek <secs>`, `play <url>`, `stop` and `quit`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamplay_ap::audio::{AudioFormat, CpalOutputFactory, OutputFactory, VirtualOutputFactory};
use streamplay_ap::playback::{PlaybackObserver, ProgressReport};
use streamplay_ap::{Player, PlayerSettings, Track};

/// Command-line arguments for streamplay-ap
#[derive(Parser, Debug)]
#[command(name = "streamplay-ap")]
#[command(about = "Progressive streaming audio player")]
#[command(version)]
struct Args {
    /// Track URL (http/https) or local file path
    url: String,

    /// Format tag (mp3, wav, aiff); guessed from the URL when omitted
    #[arg(short, long, env = "STREAMPLAY_FORMAT")]
    format: Option<String>,

    /// Pass-through relay for remote URLs
    #[arg(long, env = "STREAMPLAY_RELAY")]
    relay: Option<String>,

    /// Track the timeline without opening an audio device
    #[arg(long, env = "STREAMPLAY_NULL_OUTPUT")]
    null_output: bool,

    /// Heartbeat period in milliseconds
    #[arg(long, default_value = "100", env = "STREAMPLAY_HEARTBEAT_MS")]
    heartbeat_ms: u64,

    /// Bytes between decodes once playing, in KiB
    #[arg(long, env = "STREAMPLAY_STEADY_THRESHOLD_KIB")]
    steady_threshold_kib: Option<usize>,
}

/// Prints status changes and every tenth percent of download progress.
#[derive(Default)]
struct ConsoleObserver {
    last: Mutex<(String, i64)>,
}

impl PlaybackObserver for ConsoleObserver {
    fn on_progress(&self, report: &ProgressReport) {
        let decile = report.percent.map_or(-1, |p| (p / 10.0).floor() as i64);
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if last.0 != report.status_label || last.1 != decile {
            info!("{} - {}", report.status_label, report.bytes_label);
            *last = (report.status_label.clone(), decile);
        }
    }

    fn on_finished(&self) {
        info!("Track finished");
    }
}

fn track_for(url: &str, format: Option<&str>) -> Result<Track> {
    let format = match format {
        Some(tag) => AudioFormat::from_tag(tag)?,
        None => AudioFormat::from_url(url)
            .context("Could not guess the format; pass --format")?,
    };
    Ok(Track::new(url, format))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streamplay_ap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    let mut settings =
        PlayerSettings::default().with_heartbeat_interval(Duration::from_millis(args.heartbeat_ms));
    if let Some(kib) = args.steady_threshold_kib {
        settings = settings.with_steady_threshold(kib * 1024);
    }
    if let Some(relay) = &args.relay {
        settings = settings.with_relay_url(relay.clone());
    }

    let outputs: Arc<dyn OutputFactory> = if args.null_output {
        info!("Using timeline-only output");
        Arc::new(VirtualOutputFactory::wall_clock())
    } else {
        Arc::new(CpalOutputFactory)
    };

    let mut player = Player::from_settings(settings, outputs, Arc::new(ConsoleObserver::default()))
        .context("Failed to initialize player")?;

    player
        .play(track_for(&args.url, args.format.as_deref())?)
        .await
        .context("Failed to start playback")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                player.stop().await;
                break;
            }
            end = player.wait(), if player.current_track().is_some() => {
                info!("Playback ended: {:?}", end);
                if !stdin_open {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !handle_command(&mut player, line.trim()).await {
                        player.stop().await;
                        break;
                    }
                }
                Ok(None) | Err(_) => {
                    stdin_open = false;
                    if player.current_track().is_none() {
                        break;
                    }
                }
            },
        }
    }

    info!("Player shutdown complete");
    Ok(())
}

/// Apply one stdin command. Returns false on `quit`.
async fn handle_command(player: &mut Player, line: &str) -> bool {
    let mut parts = line.splitn(2, char::is_whitespace);
    match (parts.next(), parts.next()) {
        (Some("seek"), Some(arg)) => match arg.trim().parse::<f64>() {
            Ok(seconds) => {
                if let Err(e) = player.seek(seconds) {
                    warn!("Seek failed: {}", e);
                }
            }
            Err(_) => warn!("Invalid seek position: {}", arg),
        },
        (Some("play"), Some(url)) => match track_for(url.trim(), None) {
            Ok(track) => {
                if let Err(e) = player.play(track).await {
                    warn!("Play failed: {}", e);
                }
            }
            Err(e) => warn!("{:#}", e),
        },
        (Some("stop"), None) => player.stop().await,
        (Some("quit"), None) => return false,
        (Some(""), None) | (None, _) => {}
        _ => warn!("Commands: seek <secs> | play <url> | stop | quit"),
    }
    true
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
