//! WAV header parsing and prefix decoding
//!
//! The header is read here so the track layout is known before the first
//! decode; sample conversion itself goes through the generic decoder once the
//! prefix sizes have been patched.

use crate::audio::decoder::PrefixDecoder;
use crate::audio::types::{AudioFormat, ContainerDescriptor, DecodedAudio};
use crate::error::{Error, Result};
use tracing::debug;

const FIRST_CHUNK_OFFSET: usize = 12;
const FMT_MIN_LEN: usize = 16;

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Parse the RIFF/WAVE header out of a (possibly truncated) prefix.
pub fn parse_header(prefix: &[u8]) -> Result<ContainerDescriptor> {
    if prefix.len() < FIRST_CHUNK_OFFSET {
        return Err(Error::InsufficientData(format!(
            "WAV outer header needs {} bytes, have {}",
            FIRST_CHUNK_OFFSET,
            prefix.len()
        )));
    }
    if &prefix[0..4] != b"RIFF" || &prefix[8..12] != b"WAVE" {
        return Err(Error::Decode("missing RIFF/WAVE signature".to_string()));
    }

    let mut fmt: Option<(u16, u32, u16)> = None;
    let mut offset = FIRST_CHUNK_OFFSET;

    while offset + 8 <= prefix.len() {
        let id = &prefix[offset..offset + 4];
        let size = read_u32(prefix, offset + 4) as usize;
        let payload = offset + 8;

        match id {
            b"fmt " => {
                if size < FMT_MIN_LEN {
                    return Err(Error::Decode(format!("fmt chunk too small ({} bytes)", size)));
                }
                if payload + FMT_MIN_LEN > prefix.len() {
                    break;
                }
                let channels = read_u16(prefix, payload + 2);
                let sample_rate = read_u32(prefix, payload + 4);
                let bits = read_u16(prefix, payload + 14);
                if channels == 0 || sample_rate == 0 {
                    return Err(Error::Decode(format!(
                        "invalid fmt values: channels={}, rate={}",
                        channels, sample_rate
                    )));
                }
                fmt = Some((channels, sample_rate, bits));
            }
            b"data" => {
                let Some((channels, sample_rate, bits)) = fmt else {
                    return Err(Error::Decode("data chunk precedes fmt".to_string()));
                };
                return Ok(ContainerDescriptor {
                    channels,
                    sample_rate,
                    bits_per_sample: Some(bits),
                    data_offset: payload,
                    declared_data_len: Some(size as u64),
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
        "WAV header incomplete after {} bytes",
        prefix.len()
    )))
}

/// WAV codec state for one track.
#[derive(Debug, Default)]
pub struct WavCodec {
    descriptor: Option<ContainerDescriptor>,
}

impl WavCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn descriptor(&self) -> Option<&ContainerDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn try_parse_header(&mut self, prefix: &[u8]) -> Result<&ContainerDescriptor> {
        if self.descriptor.is_none() {
            let parsed = parse_header(prefix)?;
            debug!(
                "WAV header: {} Hz, {} channels, {:?} bits, data at {}",
                parsed.sample_rate, parsed.channels, parsed.bits_per_sample, parsed.data_offset
            );
            self.descriptor = Some(parsed);
        }
        self.descriptor
            .as_ref()
            .ok_or_else(|| Error::Internal("WAV descriptor missing after parse".to_string()))
    }

    /// Decode a size-patched prefix.
    pub fn decode_available(&mut self, prefix: &[u8]) -> Result<DecodedAudio> {
        let data_offset = self.try_parse_header(prefix)?.data_offset;
        if prefix.len() <= data_offset {
            return Err(Error::InsufficientData("no sample bytes yet".to_string()));
        }
        PrefixDecoder::decode(prefix.to_vec(), AudioFormat::Wav)
    }
}
