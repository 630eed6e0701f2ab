//! FFNA container walker.
//!
//! Layout: a 4-byte `ffna` signature and a 1-byte container type, followed by
//! a flat run of sibling chunks. Each chunk is an 8-byte header
//! (`u32 id`, `u32 size`, little-endian) and `size` payload bytes; the size
//! excludes the header itself.

use rootcause::Report;
use tracing::{debug, trace, warn};
use winnow::Parser;
use winnow::binary::{le_u8, le_u32};

use crate::data::parser_utils::{WResult, parse_failure};
use crate::error::FormatError;

/// Container magic.
pub const FFNA_SIGNATURE: [u8; 4] = *b"ffna";
/// Signature plus the container type byte.
pub const SIGNATURE_LEN: usize = 5;
/// Size of a chunk's `(id, size)` header.
pub const CHUNK_HEADER_LEN: usize = 8;

/// Known chunk tags.
pub mod chunk_id {
    pub const GEOMETRY: u32 = 0xFA0;
    pub const ANIMATION: u32 = 0xFA1;
    pub const TEXTURE_ATEX: u32 = 0xFA3;
    pub const METADATA: u32 = 0xFA4;
    pub const TEXTURE_FILENAMES: u32 = 0xFA5;
    pub const TEXTURE_ATEX_PLAIN: u32 = 0xFAA;

    pub const GEOMETRY_OTHER: u32 = 0xBB8;
    pub const ANIMATION_OTHER: u32 = 0xBB9;
    pub const METADATA_OTHER: u32 = 0xBBA;
    pub const TEXTURE_FILENAMES_OTHER: u32 = 0xBBB;
    pub const TEXTURE_FILENAMES_OTHER_ALT: u32 = 0xBBC;
}

/// The container type byte that follows the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Model,
    Map,
    Other(u8),
}

impl From<u8> for ContainerKind {
    fn from(value: u8) -> Self {
        match value {
            2 => ContainerKind::Model,
            3 => ContainerKind::Map,
            other => ContainerKind::Other(other),
        }
    }
}

impl From<ContainerKind> for u8 {
    fn from(kind: ContainerKind) -> Self {
        match kind {
            ContainerKind::Model => 2,
            ContainerKind::Map => 3,
            ContainerKind::Other(other) => other,
        }
    }
}

/// A tagged byte range inside the container.
///
/// Borrows nothing; use [`Chunk::payload`] to re-slice the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub id: u32,
    /// Absolute offset of the payload (just past the 8-byte chunk header).
    pub offset: usize,
    pub size: u32,
}

impl Chunk {
    /// The chunk's payload within `buf`, the same buffer it was read from.
    pub fn payload<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        let end = (self.offset + self.size as usize).min(buf.len());
        &buf[self.offset.min(end)..end]
    }

    /// Offset one past the end of the payload.
    pub fn end(&self) -> usize {
        self.offset + self.size as usize
    }
}

fn parse_prefix(input: &mut &[u8]) -> WResult<([u8; 4], u8)> {
    let signature = crate::data::parser_utils::parse_array::<4>(input)?;
    let kind = le_u8.parse_next(input)?;
    Ok((signature, kind))
}

fn parse_chunk_header(input: &mut &[u8]) -> WResult<(u32, u32)> {
    let id = le_u32.parse_next(input)?;
    let size = le_u32.parse_next(input)?;
    Ok((id, size))
}

/// Validate the `ffna` signature and return the container type.
pub fn parse_signature(buf: &[u8]) -> Result<ContainerKind, Report<FormatError>> {
    if buf.len() < SIGNATURE_LEN {
        return Err(Report::new(FormatError::BadSignature { got: buf.to_vec() }));
    }

    let (signature, kind) = parse_prefix(&mut &buf[..]).map_err(parse_failure(0))?;
    if signature != FFNA_SIGNATURE {
        return Err(Report::new(FormatError::BadSignature {
            got: buf[..SIGNATURE_LEN].to_vec(),
        }));
    }

    Ok(ContainerKind::from(kind))
}

/// Walk every chunk in an FFNA container.
///
/// Unknown tags are returned like any other chunk; callers pick the ones
/// they understand. Fewer than 8 trailing bytes end the walk.
pub fn read_chunks(buf: &[u8]) -> Result<Vec<Chunk>, Report<FormatError>> {
    let kind = parse_signature(buf)?;
    trace!(?kind, len = buf.len(), "walking ffna container");

    let mut chunks = Vec::new();
    let mut offset = SIGNATURE_LEN;

    while buf.len() - offset >= CHUNK_HEADER_LEN {
        let (id, size) = parse_chunk_header(&mut &buf[offset..]).map_err(parse_failure(offset))?;
        let payload_offset = offset + CHUNK_HEADER_LEN;
        let available = buf.len() - payload_offset;
        if size as usize > available {
            return Err(Report::new(FormatError::TruncatedContainer {
                id,
                offset,
                size,
                available,
            }));
        }

        if !is_known(id) {
            debug!(id = format_args!("0x{id:X}"), offset, size, "skipping unknown chunk");
        }

        chunks.push(Chunk {
            id,
            offset: payload_offset,
            size,
        });
        offset = payload_offset + size as usize;
    }

    if offset != buf.len() {
        warn!(
            trailing = buf.len() - offset,
            "ignoring trailing bytes shorter than a chunk header"
        );
    }

    Ok(chunks)
}

fn is_known(id: u32) -> bool {
    use chunk_id::*;
    matches!(
        id,
        GEOMETRY
            | ANIMATION
            | TEXTURE_ATEX
            | METADATA
            | TEXTURE_FILENAMES
            | TEXTURE_ATEX_PLAIN
            | GEOMETRY_OTHER
            | ANIMATION_OTHER
            | METADATA_OTHER
            | TEXTURE_FILENAMES_OTHER
            | TEXTURE_FILENAMES_OTHER_ALT
    )
}
