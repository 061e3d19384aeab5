//! Core audio data types
//!
//! Defines the format tag, the parsed container header and the decoded sample
//! buffer shared between the decode step and the output units.

use crate::error::{Error, Result};
use std::fmt;

/// Container format of a track, selected once per play request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// Self-describing compressed stream (MPEG layer III)
    Mp3,
    /// RIFF/WAVE linear PCM, little-endian size fields
    Wav,
    /// FORM/AIFF linear PCM, big-endian size fields
    Aiff,
}

impl AudioFormat {
    /// Parse a format tag such as `"mp3"`, `"wav"` or `"aiff"`.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "wav" | "wave" => Ok(AudioFormat::Wav),
            "aif" | "aiff" => Ok(AudioFormat::Aiff),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }

    /// Guess the format from the extension of a URL or path.
    ///
    /// Query strings and fragments are ignored.
    pub fn from_url(url: &str) -> Result<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let extension = path
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .ok_or_else(|| Error::UnsupportedFormat(format!("no file extension in {}", url)))?;
        Self::from_tag(extension)
    }

    /// Linear PCM formats need a larger prefix before the first decode.
    pub fn is_linear_pcm(&self) -> bool {
        matches!(self, AudioFormat::Wav | AudioFormat::Aiff)
    }

    /// File extension handed to the generic decoder as a probe hint
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Aiff => "aiff",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Parsed container header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescriptor {
    pub channels: u16,
    pub sample_rate: u32,
    /// Bits per sample (absent for compressed streams)
    pub bits_per_sample: Option<u16>,
    /// Byte offset of the first raw sample
    pub data_offset: usize,
    /// Raw sample bytes declared by the header (absent for compressed streams)
    pub declared_data_len: Option<u64>,
}

impl ContainerDescriptor {
    /// Bytes per interleaved frame for linear PCM
    pub fn frame_size(&self) -> Option<usize> {
        self.bits_per_sample
            .map(|bits| self.channels as usize * (bits as usize).div_ceil(8))
    }

    /// Upper bound on sample bytes, as declared by the file itself.
    ///
    /// Streaming writers that never went back to fill in the size leave 0
    /// there; that is treated as unknown.
    pub fn data_limit(&self) -> Option<u64> {
        self.declared_data_len.filter(|&len| len > 0)
    }
}

/// Decoded audio, planar `f32` in `[-1.0, 1.0)`.
///
/// Replaced wholesale after every decode and shared through `Arc` with the
/// output units built from it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    /// One vector per channel, all the same length
    pub channels: Vec<Vec<f32>>,
}

impl DecodedAudio {
    /// Create an empty buffer with the given layout
    pub fn new(sample_rate: u32, channel_count: u16) -> Self {
        Self {
            sample_rate,
            channels: vec![Vec::new(); channel_count as usize],
        }
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Frame index for a time offset, rounded down and capped at the buffer end
    pub fn frame_at(&self, seconds: f64) -> usize {
        let frame = (seconds.max(0.0) * self.sample_rate as f64).floor() as usize;
        frame.min(self.frames())
    }

    /// Append interleaved samples, dropping a trailing partial frame.
    pub fn push_interleaved(&mut self, samples: &[f32]) {
        let channel_count = self.channels.len();
        if channel_count == 0 {
            return;
        }
        for frame in samples.chunks_exact(channel_count) {
            for (channel, sample) in self.channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
    }
}
