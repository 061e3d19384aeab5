//! Audio Test File Generation Utilities
//!
//! Builds deterministic WAV and AIFF files in memory. Every sample follows
//! `pattern_sample`, so a decode can be checked value by value.

use hound::{WavSpec, WavWriter};
use std::io::Cursor;
use streamplay_ap::audio::aiff::encode_extended;

/// Standard test sample rate (44.1 kHz)
pub const TEST_SAMPLE_RATE: u32 = 44100;

/// Sample value of `channel` at `frame`: a ramp in [-1000, 1000).
pub fn pattern_sample(frame: usize, channel: usize) -> i16 {
    ((frame * 7 + channel * 1000) % 2000) as i16 - 1000
}

/// Float value a 16-bit `pattern_sample` decodes to
pub fn pattern_value(frame: usize, channel: usize) -> f32 {
    pattern_sample(frame, channel) as f32 / 32768.0
}

/// Stereo 16-bit WAV holding `frames` frames of the test pattern.
pub fn wav_bytes(frames: usize) -> Vec<u8> {
    let spec = WavSpec {
        channels: 2,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for frame in 0..frames {
            writer.write_sample(pattern_sample(frame, 0)).unwrap();
            writer.write_sample(pattern_sample(frame, 1)).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Stereo 16-bit WAV of exactly `total_len` bytes.
///
/// # Panics
/// When the sample bytes left after the header are not whole frames
pub fn wav_bytes_of_len(total_len: usize) -> Vec<u8> {
    let header_len = wav_bytes(0).len();
    assert_eq!((total_len - header_len) % 4, 0, "length must end on a frame");
    let bytes = wav_bytes((total_len - header_len) / 4);
    assert_eq!(bytes.len(), total_len);
    bytes
}

/// Bytes in one 128 kbps, 44.1 kHz MPEG-1 Layer III frame without padding
pub const MP3_FRAME_LEN: usize = 417;

/// Samples per channel decoded from one Layer III frame
pub const MP3_FRAME_SAMPLES: usize = 1152;

/// Joint-stereo MP3 of `frames` silent frames.
///
/// Each frame is a bare header (`FF FB 90 64`) followed by zeroed side
/// information and main data, which decodes to digital silence.
pub fn mp3_bytes(frames: usize) -> Vec<u8> {
    let mut frame = vec![0u8; MP3_FRAME_LEN];
    frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
    frame.repeat(frames)
}

/// Append a `[id][size][payload]` chunk of `payload_len` bytes of `fill`
/// after everything in `file`, then fix the outer container size.
///
/// Sizes are big-endian for `FORM` files and little-endian otherwise.
pub fn append_chunk(file: &mut Vec<u8>, id: &[u8; 4], payload_len: usize, fill: u8) {
    let big_endian = &file[..4] == b"FORM";
    let encode = |value: u32| {
        if big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        }
    };

    file.extend_from_slice(id);
    file.extend_from_slice(&encode(payload_len as u32));
    file.extend(std::iter::repeat(fill).take(payload_len + (payload_len & 1)));
    let outer = encode((file.len() - 8) as u32);
    file[4..8].copy_from_slice(&outer);
}

/// Shape of a generated AIFF file.
#[derive(Debug, Clone)]
pub struct AiffSpec {
    pub channels: u16,
    pub bits: u16,
    pub sample_rate: f64,
    pub frames: usize,
    /// Optional `NAME` chunk placed between `COMM` and `SSND`
    pub name: Option<&'static str>,
}

impl AiffSpec {
    pub fn stereo_16(frames: usize) -> Self {
        Self {
            channels: 2,
            bits: 16,
            sample_rate: TEST_SAMPLE_RATE as f64,
            frames,
            name: None,
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// Bytes before the first sample
    pub fn header_len(&self) -> usize {
        let name_len = self.name.map_or(0, |n| 8 + n.len() + (n.len() & 1));
        12 + 26 + name_len + 16
    }

    pub fn frame_size(&self) -> usize {
        self.channels as usize * (self.bits as usize).div_ceil(8)
    }

    /// Complete big-endian AIFF file
    pub fn build(&self) -> Vec<u8> {
        let width = (self.bits as usize).div_ceil(8);
        let data_len = self.frames * self.frame_size();

        let mut bytes = Vec::with_capacity(self.header_len() + data_len);
        bytes.extend_from_slice(b"FORM");
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(b"AIFF");

        bytes.extend_from_slice(b"COMM");
        bytes.extend_from_slice(&18u32.to_be_bytes());
        bytes.extend_from_slice(&self.channels.to_be_bytes());
        bytes.extend_from_slice(&(self.frames as u32).to_be_bytes());
        bytes.extend_from_slice(&self.bits.to_be_bytes());
        bytes.extend_from_slice(&encode_extended(self.sample_rate));

        if let Some(name) = self.name {
            bytes.extend_from_slice(b"NAME");
            bytes.extend_from_slice(&(name.len() as u32).to_be_bytes());
            bytes.extend_from_slice(name.as_bytes());
            if name.len() % 2 == 1 {
                bytes.push(0);
            }
        }

        bytes.extend_from_slice(b"SSND");
        bytes.extend_from_slice(&((data_len + 8) as u32).to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());

        for frame in 0..self.frames {
            for channel in 0..self.channels as usize {
                let value = pattern_sample(frame, channel) as i32;
                match width {
                    1 => bytes.push((value >> 8) as i8 as u8),
                    2 => bytes.extend_from_slice(&(value as i16).to_be_bytes()),
                    3 => bytes.extend_from_slice(&(value << 8).to_be_bytes()[1..4]),
                    _ => bytes.extend_from_slice(&(value << 16).to_be_bytes()),
                }
            }
        }

        let form_len = (bytes.len() - 8) as u32;
        bytes[4..8].copy_from_slice(&form_len.to_be_bytes());
        bytes
    }
}
