//! Container Patching & Incremental Decode Tests
//!
//! Truncated WAV and AIFF prefixes must decode to exactly the complete
//! frames received, and converge to the full file once every byte arrives.

mod helpers;

use helpers::{
    append_chunk, mp3_bytes, pattern_value, wav_bytes, AiffSpec, MP3_FRAME_LEN, MP3_FRAME_SAMPLES,
};
use streamplay_ap::audio::patch::{patch_prefix, AIFF_LAYOUT, RIFF_LAYOUT};
use streamplay_ap::audio::{AudioFormat, Codec};
use streamplay_ap::Error;

fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn be_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

// ========================================
// Size patching
// ========================================

#[test]
fn test_wav_prefix_sizes_describe_received_bytes() {
    let file = wav_bytes(2000);

    for len in [44, 45, 100, 4097, 6000, file.len()] {
        let mut prefix = file[..len].to_vec();
        let patched = patch_prefix(&RIFF_LAYOUT, &mut prefix).unwrap();

        assert_eq!(le_u32(&prefix, 4) as usize, len - 8, "RIFF size at {}", len);
        assert_eq!(patched.size_field_offset, 40);
        assert_eq!(patched.payload_offset, 44);
        assert_eq!(le_u32(&prefix, 40) as usize, len - 44, "data size at {}", len);

        // Nothing but the two size fields changes
        assert_eq!(prefix[8..40], file[8..40]);
        assert_eq!(prefix[44..], file[44..len]);
    }
}

#[test]
fn test_short_prefix_is_insufficient() {
    let file = wav_bytes(100);
    let mut prefix = file[..43].to_vec();
    let result = patch_prefix(&RIFF_LAYOUT, &mut prefix);
    assert!(matches!(result, Err(Error::InsufficientData(_))));
    assert_eq!(prefix, file[..43]);

    let aiff = AiffSpec::stereo_16(100).build();
    let mut prefix = aiff[..53].to_vec();
    assert!(matches!(
        patch_prefix(&AIFF_LAYOUT, &mut prefix),
        Err(Error::InsufficientData(_))
    ));
}

#[test]
fn test_aiff_prefix_sizes_skip_padded_chunks() {
    // "abc" is odd-sized, so one pad byte follows it
    let spec = AiffSpec::stereo_16(500).with_name("abc");
    let file = spec.build();
    let ssnd_payload = spec.header_len() - 8;

    for len in [spec.header_len(), spec.header_len() + 3, 1000, file.len()] {
        let mut prefix = file[..len].to_vec();
        let patched = patch_prefix(&AIFF_LAYOUT, &mut prefix).unwrap();

        assert_eq!(be_u32(&prefix, 4) as usize, len - 8);
        assert_eq!(patched.payload_offset, ssnd_payload);
        assert_eq!(be_u32(&prefix, ssnd_payload - 4) as usize, len - ssnd_payload);
    }
}

#[test]
fn test_outer_size_patched_before_data_chunk_arrives() {
    let spec = AiffSpec::stereo_16(100).with_name("a fairly long track name");
    let file = spec.build();
    // Long enough for the minimum header, too short for the SSND header
    let len = spec.header_len() - 12;
    let mut prefix = file[..len].to_vec();

    let result = patch_prefix(&AIFF_LAYOUT, &mut prefix);

    assert!(matches!(result, Err(Error::InsufficientData(_))));
    assert_eq!(be_u32(&prefix, 4) as usize, len - 8);
}

// ========================================
// Incremental decoding
// ========================================

#[test]
fn test_wav_prefixes_converge_to_full_decode() {
    let frames = 4410;
    let file = wav_bytes(frames);
    let mut codec = Codec::for_format(AudioFormat::Wav);

    let mut previous = 0;
    for len in (1044..file.len()).step_by(4000).chain([file.len()]) {
        let mut prefix = file[..len].to_vec();
        let audio = codec.decode_available(&mut prefix).unwrap();

        let complete = (len - 44) / 4;
        assert!(audio.frames() <= complete, "{} frames from {} bytes", audio.frames(), len);
        assert!(audio.frames() >= previous, "decode shrank at {} bytes", len);
        if (len - 44) % 4 == 0 {
            assert_eq!(audio.frames(), complete);
        }
        previous = audio.frames();

        assert_eq!(audio.sample_rate, 44100);
        assert_eq!(audio.channel_count(), 2);
        for frame in [0, audio.frames() / 2, audio.frames() - 1] {
            assert!((audio.channels[0][frame] - pattern_value(frame, 0)).abs() < 1e-6);
            assert!((audio.channels[1][frame] - pattern_value(frame, 1)).abs() < 1e-6);
        }
    }

    assert_eq!(previous, frames);
}

#[test]
fn test_aiff_prefixes_converge_to_full_decode() {
    let spec = AiffSpec::stereo_16(3000).with_name("xyz");
    let file = spec.build();
    let mut codec = Codec::for_format(AudioFormat::Aiff);

    // One byte short of a frame cannot decode yet
    let mut prefix = file[..spec.header_len() + spec.frame_size() - 1].to_vec();
    assert!(matches!(
        codec.decode_available(&mut prefix),
        Err(Error::InsufficientData(_))
    ));

    for len in (spec.header_len() + spec.frame_size()..file.len())
        .step_by(997)
        .chain([file.len()])
    {
        let mut prefix = file[..len].to_vec();
        let audio = codec.decode_available(&mut prefix).unwrap();

        assert_eq!(audio.frames(), (len - spec.header_len()) / spec.frame_size());
        for frame in 0..audio.frames() {
            assert_eq!(audio.channels[0][frame], pattern_value(frame, 0));
            assert_eq!(audio.channels[1][frame], pattern_value(frame, 1));
        }
    }

    let descriptor = codec.descriptor().unwrap();
    assert_eq!(descriptor.sample_rate, 44100);
    assert_eq!(descriptor.data_offset, spec.header_len());
}

#[test]
fn test_mp3_prefixes_converge_to_full_decode() {
    let file = mp3_bytes(40);
    let mut codec = Codec::for_format(AudioFormat::Mp3);
    assert!(codec.descriptor().is_none());

    let mut previous = 0;
    for frames in [3, 10, 25, 40] {
        let mut prefix = file[..frames * MP3_FRAME_LEN].to_vec();
        let audio = codec.decode_available(&mut prefix).unwrap();

        assert_eq!(audio.frames(), frames * MP3_FRAME_SAMPLES);
        assert!(audio.frames() > previous);
        assert_eq!(audio.sample_rate, 44100);
        assert_eq!(audio.channel_count(), 2);
        assert!(audio.channels.iter().flatten().all(|s| s.abs() < 1e-6));
        // Compressed prefixes are never rewritten
        assert_eq!(prefix, file[..frames * MP3_FRAME_LEN]);
        previous = audio.frames();
    }

    let descriptor = codec.descriptor().unwrap();
    assert_eq!(descriptor.sample_rate, 44100);
    assert_eq!(descriptor.channels, 2);
}

#[test]
fn test_mp3_cut_inside_a_frame_keeps_complete_frames() {
    let file = mp3_bytes(12);
    let mut codec = Codec::for_format(AudioFormat::Mp3);

    let mut prefix = file[..10 * MP3_FRAME_LEN + 200].to_vec();
    let audio = codec.decode_available(&mut prefix).unwrap();

    assert!(audio.frames() >= 9 * MP3_FRAME_SAMPLES, "{} frames", audio.frames());
    assert!(audio.frames() <= 10 * MP3_FRAME_SAMPLES, "{} frames", audio.frames());
    assert_eq!(audio.frames() % MP3_FRAME_SAMPLES, 0);
}

#[test]
fn test_aiff_mono_24_bit() {
    let spec = AiffSpec {
        channels: 1,
        bits: 24,
        sample_rate: 22050.0,
        frames: 100,
        name: None,
    };
    let mut file = spec.build();
    let mut codec = Codec::for_format(AudioFormat::Aiff);

    let audio = codec.decode_available(&mut file).unwrap();

    assert_eq!(audio.sample_rate, 22050);
    assert_eq!(audio.frames(), 100);
    for frame in 0..100 {
        assert!((audio.channels[0][frame] - pattern_value(frame, 0)).abs() < 1e-6);
    }
}

#[test]
fn test_aiff_header_only_is_insufficient() {
    let spec = AiffSpec::stereo_16(100);
    let file = spec.build();
    let mut codec = Codec::for_format(AudioFormat::Aiff);

    let mut prefix = file[..spec.header_len() + 3].to_vec();
    let result = codec.decode_available(&mut prefix);

    assert!(matches!(result, Err(Error::InsufficientData(_))));
    assert!(codec.descriptor().is_some(), "header parsed even without a frame");
}

#[test]
fn test_garbage_pcm_is_decode_error() {
    let mut bytes = vec![0x55u8; 4096];
    let mut codec = Codec::for_format(AudioFormat::Aiff);
    let err = codec.decode_available(&mut bytes).unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}

// ========================================
// Trailing chunks
// ========================================

#[test]
fn test_aiff_trailing_chunk_is_not_audio() {
    let spec = AiffSpec::stereo_16(1000);
    let mut file = spec.build();
    append_chunk(&mut file, b"ID3 ", 400, 0x7F);
    let mut codec = Codec::for_format(AudioFormat::Aiff);

    // Every cut, including ones ending inside the trailing chunk
    for len in [spec.header_len() + 2000, spec.header_len() + 4000 + 100, file.len()] {
        let mut prefix = file[..len].to_vec();
        let audio = codec.decode_available(&mut prefix).unwrap();
        let expected = ((len - spec.header_len()) / spec.frame_size()).min(1000);
        assert_eq!(audio.frames(), expected, "at {} bytes", len);
    }

    let mut whole = file.clone();
    let audio = codec.decode_available(&mut whole).unwrap();
    assert_eq!(audio.frames(), 1000);
    assert_eq!(audio.channels[0][999], pattern_value(999, 0));
    assert_eq!(audio.channels[1][999], pattern_value(999, 1));
}

#[test]
fn test_wav_trailing_chunk_is_not_audio() {
    let mut file = wav_bytes(1000);
    append_chunk(&mut file, b"LIST", 400, 0x7F);
    let mut codec = Codec::for_format(AudioFormat::Wav);

    let audio = codec.decode_available(&mut file).unwrap();

    assert_eq!(audio.frames(), 1000);
    assert!((audio.duration_seconds() - 1000.0 / 44100.0).abs() < 1e-9);
    assert!((audio.channels[0][999] - pattern_value(999, 0)).abs() < 1e-6);
    assert_eq!(le_u32(&file, 40), 4000);
}
