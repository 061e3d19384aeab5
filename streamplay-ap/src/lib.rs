//! # Streamplay Audio Player Library (streamplay-ap)
//!
//! Progressive decode-and-playback engine: audio starts while the file is
//! still downloading.
//!
//! **Purpose:** Fetch an MP3, WAV or AIFF file as a byte stream, decode the
//! growing prefix at a controlled cadence, and schedule the decoded audio so
//! nothing is replayed or skipped as the buffer grows.
//!
//! **Architecture:** one tokio task per track (`playback::session`) over
//! reqwest + symphonia + cpal, with a manual big-endian PCM codec for AIFF.

pub mod audio;
pub mod config;
pub mod download;
pub mod error;
pub mod playback;

pub use config::PlayerSettings;
pub use error::{Error, Result};
pub use playback::{Player, Track};
