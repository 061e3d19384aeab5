//! Manual AIFF PCM codec
//!
//! The generic decoder cannot be trusted with a truncated AIFF prefix, so this
//! module parses the `COMM`/`SSND` chunks itself and converts big-endian PCM
//! to planar `f32`. Only the complete frames present in the prefix are
//! returned.
//!
//! **Responsibilities:**
//! - Header parse (signatures, channel count, bit depth, 80-bit sample rate)
//! - Sample conversion for 8/16/24/32-bit big-endian PCM
//! - Frame accounting against both the received and the declared data length

use crate::audio::types::{ContainerDescriptor, DecodedAudio};
use crate::error::{Error, Result};
use tracing::debug;

/// Outer header plus the first chunk header
const FIRST_CHUNK_OFFSET: usize = 12;

/// `COMM` payload: channels, frames, bit depth, 80-bit sample rate
const COMM_PAYLOAD_LEN: usize = 18;

/// `SSND` payload starts with offset and block size fields
const SSND_SUBHEADER_LEN: usize = 8;

/// Exponent bias of the 80-bit extended float
const EXTENDED_EXPONENT_BIAS: i32 = 16383;

// ========================================
// Extended precision float
// ========================================

/// Decode an 80-bit IEEE 754 extended float (big-endian).
///
/// Layout: sign bit, 15-bit biased exponent, 64-bit mantissa with an explicit
/// integer bit. An exponent field of zero decodes to 0.
pub fn decode_extended(bytes: &[u8; 10]) -> f64 {
    let sign_exponent = u16::from_be_bytes([bytes[0], bytes[1]]);
    let sign = if sign_exponent & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = (sign_exponent & 0x7FFF) as i32;
    if exponent == 0 {
        return 0.0;
    }

    let hi = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]) as f64;
    let lo = u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as f64;
    let mantissa = hi * 2f64.powi(-31) + lo * 2f64.powi(-63);

    sign * mantissa * 2f64.powi(exponent - EXTENDED_EXPONENT_BIAS)
}

/// Encode a value as an 80-bit extended float (big-endian).
pub fn encode_extended(value: f64) -> [u8; 10] {
    let mut out = [0u8; 10];
    if value == 0.0 || !value.is_finite() {
        return out;
    }

    let sign: u16 = if value < 0.0 { 0x8000 } else { 0 };
    let magnitude = value.abs();
    let exponent = magnitude.log2().floor() as i32;
    let mut normalized = magnitude / 2f64.powi(exponent);
    let mut exponent = exponent;
    // log2 rounding can land one off near powers of two
    if normalized >= 2.0 {
        normalized /= 2.0;
        exponent += 1;
    } else if normalized < 1.0 {
        normalized *= 2.0;
        exponent -= 1;
    }

    let mantissa = (normalized * 2f64.powi(63)) as u64;
    let biased = (exponent + EXTENDED_EXPONENT_BIAS) as u16 & 0x7FFF;

    out[..2].copy_from_slice(&(sign | biased).to_be_bytes());
    out[2..].copy_from_slice(&mantissa.to_be_bytes());
    out
}

// ========================================
// Header parsing
// ========================================

/// Parse the AIFF header out of a (possibly truncated) prefix.
///
/// Succeeds once both the `COMM` chunk and the `SSND` sub-header have been
/// received. A wrong signature is a decode error; a short prefix is
/// `Error::InsufficientData`.
pub fn parse_header(prefix: &[u8]) -> Result<ContainerDescriptor> {
    if prefix.len() < FIRST_CHUNK_OFFSET {
        return Err(Error::InsufficientData(format!(
            "AIFF outer header needs {} bytes, have {}",
            FIRST_CHUNK_OFFSET,
            prefix.len()
        )));
    }
    if &prefix[0..4] != b"FORM" {
        return Err(Error::Decode("missing FORM signature".to_string()));
    }
    if &prefix[8..12] != b"AIFF" {
        return Err(Error::Decode("missing AIFF form type".to_string()));
    }

    let mut comm: Option<(u16, u16, u32)> = None;
    let mut offset = FIRST_CHUNK_OFFSET;

    while offset + 8 <= prefix.len() {
        let id = &prefix[offset..offset + 4];
        let size = u32::from_be_bytes([
            prefix[offset + 4],
            prefix[offset + 5],
            prefix[offset + 6],
            prefix[offset + 7],
        ]) as usize;
        let payload = offset + 8;

        match id {
            b"COMM" => {
                if size < COMM_PAYLOAD_LEN {
                    return Err(Error::Decode(format!("COMM chunk too small ({} bytes)", size)));
                }
                if payload + COMM_PAYLOAD_LEN > prefix.len() {
                    break;
                }
                let body = &prefix[payload..payload + COMM_PAYLOAD_LEN];
                let channels = u16::from_be_bytes([body[0], body[1]]);
                let bits = u16::from_be_bytes([body[6], body[7]]);
                let mut rate_bytes = [0u8; 10];
                rate_bytes.copy_from_slice(&body[8..18]);
                let sample_rate = decode_extended(&rate_bytes);
                if channels == 0 || !(1..=32).contains(&bits) || sample_rate < 1.0 {
                    return Err(Error::Decode(format!(
                        "invalid COMM values: channels={}, bits={}, rate={}",
                        channels, bits, sample_rate
                    )));
                }
                comm = Some((channels, bits, sample_rate.round() as u32));
            }
            b"SSND" => {
                let Some((channels, bits, sample_rate)) = comm else {
                    return Err(Error::Decode("SSND chunk precedes COMM".to_string()));
                };
                if payload + SSND_SUBHEADER_LEN > prefix.len() {
                    break;
                }
                let data_skip = u32::from_be_bytes([
                    prefix[payload],
                    prefix[payload + 1],
                    prefix[payload + 2],
                    prefix[payload + 3],
                ]) as usize;
                let declared = size.saturating_sub(SSND_SUBHEADER_LEN + data_skip);
                return Ok(ContainerDescriptor {
                    channels,
                    sample_rate,
                    bits_per_sample: Some(bits),
                    data_offset: payload + SSND_SUBHEADER_LEN + data_skip,
                    declared_data_len: Some(declared as u64),
                });
            }
            _ => {}
        }

        offset = match payload.checked_add(size + (size & 1)) {
            Some(next) => next,
            None => break,
        };
    }

    Err(Error::InsufficientData(format!(
        "AIFF header incomplete after {} bytes",
        prefix.len()
    )))
}

// ========================================
// Sample decoding
// ========================================

/// Convert one big-endian sample of `width` bytes to `f32`.
fn sample_to_f32(bytes: &[u8], width: usize) -> f32 {
    match width {
        1 => bytes[0] as i8 as f32 / 128.0,
        2 => i16::from_be_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
        3 => {
            let value = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], 0]) >> 8;
            value as f32 / 8_388_608.0
        }
        _ => {
            let value = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            value as f32 / 2_147_483_648.0
        }
    }
}

/// Decode every complete frame of `prefix` described by `descriptor`.
pub fn decode_frames(descriptor: &ContainerDescriptor, prefix: &[u8]) -> Result<DecodedAudio> {
    let bits = descriptor
        .bits_per_sample
        .ok_or_else(|| Error::Internal("AIFF descriptor without bit depth".to_string()))?;
    let width = (bits as usize).div_ceil(8);
    let frame_size = descriptor.channels as usize * width;

    let received = prefix.len().saturating_sub(descriptor.data_offset) as u64;
    let available = descriptor
        .data_limit()
        .map_or(received, |declared| received.min(declared)) as usize;
    let frames = available / frame_size;
    if frames == 0 {
        return Err(Error::InsufficientData(format!(
            "no complete AIFF frame yet ({} sample bytes)",
            available
        )));
    }

    let data = &prefix[descriptor.data_offset..descriptor.data_offset + frames * frame_size];
    let mut audio = DecodedAudio::new(descriptor.sample_rate, descriptor.channels);
    for channel in audio.channels.iter_mut() {
        channel.reserve_exact(frames);
    }

    for frame in data.chunks_exact(frame_size) {
        for (channel, sample) in audio.channels.iter_mut().zip(frame.chunks_exact(width)) {
            channel.push(sample_to_f32(sample, width));
        }
    }

    debug!(
        "AIFF decoded {} frames ({} channels, {} bits)",
        frames, descriptor.channels, bits
    );
    Ok(audio)
}

/// Manual codec state for one track.
///
/// The first successful header parse is kept for the whole track, so the
/// declared `SSND` length is the file's own and not a patched one.
#[derive(Debug, Default)]
pub struct AiffCodec {
    descriptor: Option<ContainerDescriptor>,
}

impl AiffCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn descriptor(&self) -> Option<&ContainerDescriptor> {
        self.descriptor.as_ref()
    }

    /// Parse the header if it has not been parsed yet.
    pub fn try_parse_header(&mut self, prefix: &[u8]) -> Result<&ContainerDescriptor> {
        if self.descriptor.is_none() {
            let parsed = parse_header(prefix)?;
            debug!(
                "AIFF header: {} Hz, {} channels, {:?} bits, data at {}",
                parsed.sample_rate, parsed.channels, parsed.bits_per_sample, parsed.data_offset
            );
            self.descriptor = Some(parsed);
        }
        self.descriptor
            .as_ref()
            .ok_or_else(|| Error::Internal("AIFF descriptor missing after parse".to_string()))
    }

    /// Decode all complete frames currently available in `prefix`.
    pub fn decode_available(&mut self, prefix: &[u8]) -> Result<DecodedAudio> {
        let descriptor = self.try_parse_header(prefix)?;
        decode_frames(descriptor, prefix)
    }
}
