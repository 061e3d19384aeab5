//! Progressive playback
//!
//! Decode cadence, scheduling, heartbeat, and the per-track session driven
//! by the `Player` control surface.

pub mod cadence;
pub mod events;
pub mod heartbeat;
pub mod player;
pub mod scheduler;
pub mod session;

pub use events::{LoggingObserver, PlaybackObserver, ProgressReport};
pub use player::Player;
pub use session::{SessionEnd, Track};
