//! Container size patching
//!
//! A partially downloaded WAV or AIFF file still declares the size of the
//! complete file. Standard decoders reject or over-read such a prefix, so
//! before each decode the outer container size and the sample-data chunk size
//! are rewritten in place to describe exactly the bytes received so far. The
//! data chunk never grows past the length the complete file declares, so
//! trailing metadata chunks are not mistaken for samples.
//!
//! Both containers share one layout: a 12-byte outer header (id, size, form
//! type) followed by `[id:4][size:4][payload]` chunks. RIFF stores sizes
//! little-endian, AIFF big-endian; both pad odd-sized chunks to even length.

use crate::error::{Error, Result};

/// Offset of the first chunk after the outer header
const FIRST_CHUNK_OFFSET: usize = 12;

/// Offset of the outer container size field
const OUTER_SIZE_OFFSET: usize = 4;

/// Size-field byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    fn read_u32(self, bytes: &[u8]) -> u32 {
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            Endian::Little => u32::from_le_bytes(raw),
            Endian::Big => u32::from_be_bytes(raw),
        }
    }

    fn write_u32(self, bytes: &mut [u8], value: u32) {
        let raw = match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        };
        bytes[..4].copy_from_slice(&raw);
    }
}

/// Chunk layout of a patchable container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerLayout {
    /// Outer container id
    pub container_id: [u8; 4],
    pub endian: Endian,
    /// Id of the chunk holding raw samples
    pub data_chunk_id: [u8; 4],
    /// Smallest prefix that can hold the canonical header
    pub min_header_len: usize,
    /// Odd-sized chunks are followed by one pad byte
    pub pad_odd_chunks: bool,
}

/// RIFF/WAVE: little-endian sizes, `data` chunk, 44-byte canonical header
pub const RIFF_LAYOUT: ContainerLayout = ContainerLayout {
    container_id: *b"RIFF",
    endian: Endian::Little,
    data_chunk_id: *b"data",
    min_header_len: 44,
    pad_odd_chunks: true,
};

/// FORM/AIFF: big-endian sizes, `SSND` chunk, 54-byte canonical header
pub const AIFF_LAYOUT: ContainerLayout = ContainerLayout {
    container_id: *b"FORM",
    endian: Endian::Big,
    data_chunk_id: *b"SSND",
    min_header_len: 54,
    pad_odd_chunks: true,
};

/// Result of a successful patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchedChunk {
    /// Offset of the data chunk's size field
    pub size_field_offset: usize,
    /// First byte after the size field
    pub payload_offset: usize,
    /// Value written into the size field
    pub patched_size: u32,
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Rewrite the outer size and the data chunk size of `prefix` in place.
///
/// The outer size is patched first and unconditionally once the prefix holds
/// the minimum header. `Error::InsufficientData` is returned when the prefix
/// is shorter than that, or when the data chunk header has not arrived yet.
/// A prefix with the wrong container id is left untouched and reported as
/// `Error::Decode`.
pub fn patch_prefix(layout: &ContainerLayout, prefix: &mut [u8]) -> Result<PatchedChunk> {
    patch_prefix_within(layout, prefix, None)
}

/// Like `patch_prefix`, but the data chunk size never exceeds `data_limit`.
///
/// `data_limit` is the sample length the complete file declares. Bytes
/// received past it belong to trailing chunks and stay outside the data chunk.
pub fn patch_prefix_within(
    layout: &ContainerLayout,
    prefix: &mut [u8],
    data_limit: Option<u64>,
) -> Result<PatchedChunk> {
    let len = prefix.len();
    if len < layout.min_header_len {
        return Err(Error::InsufficientData(format!(
            "{} bytes received, header needs {}",
            len, layout.min_header_len
        )));
    }
    if prefix[..4] != layout.container_id {
        return Err(Error::Decode(format!(
            "expected {:?} container",
            String::from_utf8_lossy(&layout.container_id)
        )));
    }

    layout.endian.write_u32(
        &mut prefix[OUTER_SIZE_OFFSET..],
        saturating_u32(len - 8),
    );

    let mut offset = FIRST_CHUNK_OFFSET;
    while offset + 8 <= len {
        let id = &prefix[offset..offset + 4];
        let size_field_offset = offset + 4;
        let payload_offset = offset + 8;

        if id == layout.data_chunk_id {
            let received = (len - payload_offset) as u64;
            let available = data_limit.map_or(received, |limit| received.min(limit));
            let patched_size = u32::try_from(available).unwrap_or(u32::MAX);
            layout
                .endian
                .write_u32(&mut prefix[size_field_offset..], patched_size);
            return Ok(PatchedChunk {
                size_field_offset,
                payload_offset,
                patched_size,
            });
        }

        let size = layout.endian.read_u32(&prefix[size_field_offset..]) as usize;
        let pad = if layout.pad_odd_chunks { size & 1 } else { 0 };
        offset = match payload_offset
            .checked_add(size)
            .and_then(|end| end.checked_add(pad))
        {
            Some(next) => next,
            None => break,
        };
    }

    Err(Error::InsufficientData(format!(
        "{:?} chunk header not yet received ({} bytes)",
        String::from_utf8_lossy(&layout.data_chunk_id),
        len
    )))
}
