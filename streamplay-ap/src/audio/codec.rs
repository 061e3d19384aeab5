//! Per-track codec selection
//!
//! One `Codec` is chosen from the format tag when a track starts and answers
//! every format-specific question for the rest of the session: whether the
//! prefix needs size patching, how to decode it, and which scheduling
//! strategy suits the decoded output.

use crate::audio::aiff::AiffCodec;
use crate::audio::decoder::PrefixDecoder;
use crate::audio::patch::{self, ContainerLayout, AIFF_LAYOUT, RIFF_LAYOUT};
use crate::audio::types::{AudioFormat, ContainerDescriptor, DecodedAudio};
use crate::audio::wav::WavCodec;
use crate::error::{Error, Result};

/// How newly decoded audio reaches the output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStrategy {
    /// Append only the frames decoded since the last decode
    Differential,
    /// Replace the active unit with the whole buffer at the current position
    FullRestart,
}

/// Tagged codec variant for one track.
#[derive(Debug)]
pub enum Codec {
    Compressed { descriptor: Option<ContainerDescriptor> },
    Wav(WavCodec),
    Aiff(AiffCodec),
}

impl Codec {
    pub fn for_format(format: AudioFormat) -> Self {
        match format {
            AudioFormat::Mp3 => Codec::Compressed { descriptor: None },
            AudioFormat::Wav => Codec::Wav(WavCodec::new()),
            AudioFormat::Aiff => Codec::Aiff(AiffCodec::new()),
        }
    }

    pub fn format(&self) -> AudioFormat {
        match self {
            Codec::Compressed { .. } => AudioFormat::Mp3,
            Codec::Wav(_) => AudioFormat::Wav,
            Codec::Aiff(_) => AudioFormat::Aiff,
        }
    }

    /// Container layout to patch before each decode, if any
    pub fn size_patch_layout(&self) -> Option<&'static ContainerLayout> {
        match self {
            Codec::Compressed { .. } => None,
            Codec::Wav(_) => Some(&RIFF_LAYOUT),
            Codec::Aiff(_) => Some(&AIFF_LAYOUT),
        }
    }

    pub fn requires_size_patch(&self) -> bool {
        self.size_patch_layout().is_some()
    }

    pub fn scheduling_strategy(&self) -> SchedulingStrategy {
        match self {
            Codec::Aiff(_) => SchedulingStrategy::Differential,
            Codec::Compressed { .. } | Codec::Wav(_) => SchedulingStrategy::FullRestart,
        }
    }

    /// Parsed header, once available
    pub fn descriptor(&self) -> Option<&ContainerDescriptor> {
        match self {
            Codec::Compressed { descriptor } => descriptor.as_ref(),
            Codec::Wav(codec) => codec.descriptor(),
            Codec::Aiff(codec) => codec.descriptor(),
        }
    }

    /// Parse the container header without decoding samples.
    ///
    /// Compressed streams describe themselves frame by frame; their descriptor
    /// is filled in by the first successful decode instead.
    pub fn try_parse_header(&mut self, prefix: &[u8]) -> Result<&ContainerDescriptor> {
        match self {
            Codec::Compressed { descriptor } => descriptor.as_ref().ok_or_else(|| {
                Error::InsufficientData("compressed stream not decoded yet".to_string())
            }),
            Codec::Wav(codec) => codec.try_parse_header(prefix),
            Codec::Aiff(codec) => codec.try_parse_header(prefix),
        }
    }

    /// Patch (where needed) and decode everything decodable in `prefix`.
    ///
    /// The header is parsed before the first patch, while the size fields
    /// still hold what the file declares; that parse is kept for the rest of
    /// the track. Patching rewrites size fields in place; sample bytes are
    /// untouched.
    pub fn decode_available(&mut self, prefix: &mut [u8]) -> Result<DecodedAudio> {
        if let Some(layout) = self.size_patch_layout() {
            let data_limit = self.try_parse_header(prefix)?.data_limit();
            patch::patch_prefix_within(layout, prefix, data_limit)?;
        }

        match self {
            Codec::Compressed { descriptor } => {
                let audio = PrefixDecoder::decode(prefix.to_vec(), AudioFormat::Mp3)?;
                descriptor.get_or_insert_with(|| ContainerDescriptor {
                    channels: audio.channel_count(),
                    sample_rate: audio.sample_rate,
                    bits_per_sample: None,
                    data_offset: 0,
                    declared_data_len: None,
                });
                Ok(audio)
            }
            Codec::Wav(codec) => codec.decode_available(prefix),
            Codec::Aiff(codec) => codec.decode_available(prefix),
        }
    }
}
