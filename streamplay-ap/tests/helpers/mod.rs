//! Test helper modules for streamplay-ap integration tests
//!
//! Provides reusable test infrastructure components:
//! - audio_generator: deterministic WAV, AIFF and MP3 files in memory
//! - MemorySource: chunked in-memory byte source
//! - RecordingObserver: captures progress and position callbacks

#![allow(dead_code)]

pub mod audio_generator;
pub mod memory_source;
pub mod recording_observer;

pub use audio_generator::{
    append_chunk, mp3_bytes, pattern_value, wav_bytes, wav_bytes_of_len, AiffSpec, MP3_FRAME_LEN,
    MP3_FRAME_SAMPLES, TEST_SAMPLE_RATE,
};
pub use memory_source::MemorySource;
pub use recording_observer::{wait_until, RecordingObserver};
