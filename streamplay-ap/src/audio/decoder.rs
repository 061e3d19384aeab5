//! Generic decoder using symphonia
//!
//! Decodes an in-memory prefix of a self-describing stream (MP3, or a WAV
//! whose sizes have already been patched) from the start. The prefix is
//! treated as the complete file: decoding stops quietly at the first
//! truncated packet.

use crate::audio::types::{AudioFormat, DecodedAudio};
use crate::error::{Error, Result};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

fn is_end_of_stream(err: &SymphoniaError) -> bool {
    matches!(err, SymphoniaError::IoError(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
}

fn classify(context: &str, err: SymphoniaError) -> Error {
    if is_end_of_stream(&err) {
        Error::InsufficientData(format!("{}: stream ends early", context))
    } else {
        Error::Decode(format!("{}: {}", context, err))
    }
}

/// Stateless symphonia front end for byte prefixes.
pub struct PrefixDecoder;

impl PrefixDecoder {
    /// Decode every complete packet of `prefix`.
    ///
    /// # Arguments
    /// - `prefix`: bytes received so far, starting at the beginning of the file
    /// - `format`: container hint for the probe
    ///
    /// # Returns
    /// Planar decoded audio; `Error::InsufficientData` when no packet decoded
    pub fn decode(prefix: Vec<u8>, format: AudioFormat) -> Result<DecodedAudio> {
        let prefix_len = prefix.len();
        let mss = MediaSourceStream::new(Box::new(Cursor::new(prefix)), Default::default());

        let mut hint = Hint::new();
        hint.with_extension(format.extension());

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| classify("probe", e))?;

        let mut reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        let mut audio: Option<DecodedAudio> = codec_params
            .sample_rate
            .zip(codec_params.channels)
            .map(|(rate, channels)| DecodedAudio::new(rate, channels.count() as u16));
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match reader.next_packet() {
                Ok(packet) => packet,
                Err(ref e) if is_end_of_stream(e) => break,
                Err(e) => {
                    debug!("Stopping at unreadable packet: {}", e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping corrupt packet: {}", e);
                    continue;
                }
                Err(ref e) if is_end_of_stream(e) => break,
                Err(e) => {
                    debug!("Stopping at undecodable packet: {}", e);
                    break;
                }
            };

            let spec = *decoded.spec();
            let target = audio.get_or_insert_with(|| {
                DecodedAudio::new(spec.rate, spec.channels.count() as u16)
            });

            let needed = decoded.capacity();
            if sample_buf
                .as_ref()
                .map_or(true, |buf| buf.capacity() < needed * spec.channels.count())
            {
                sample_buf = Some(SampleBuffer::new(needed as u64, spec));
            }
            if let Some(buf) = sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                target.push_interleaved(buf.samples());
            }
        }

        match audio {
            Some(audio) if audio.frames() > 0 => {
                debug!(
                    "Decoded {} frames from {} byte prefix ({})",
                    audio.frames(),
                    prefix_len,
                    format
                );
                Ok(audio)
            }
            _ => Err(Error::InsufficientData(format!(
                "no complete packet in {} byte prefix",
                prefix_len
            ))),
        }
    }
}
