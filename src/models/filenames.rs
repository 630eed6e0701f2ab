//! Texture filename chunks.
//!
//! Each entry is three `u16`s: two packed id halves and one unknown word. The
//! ids decode to the numeric file hash that names the texture's own file.
//!
//! - `0xFA5`: `u32 count`, entries
//! - `0xBBB` / `0xBBC`: `u32 unknown`, `u32 count`, entries
//!
//! A count larger than the chunk can hold is clamped to the entries present.

use rootcause::Report;
use tracing::warn;
use winnow::Parser;
use winnow::binary::{le_u16, le_u32};
use winnow::combinator::repeat;

use crate::data::parser_utils::{WResult, parse_failure};
use crate::error::FormatError;
use crate::models::chunk::chunk_id;
use crate::models::sections::SectionKind;

const ENTRY_LEN: usize = 6;

/// Decode a packed id pair into a file hash.
pub fn decode(id0: u16, id1: u16) -> u32 {
    (id0 as u32)
        .wrapping_sub(0xFF00FF)
        .wrapping_add((id1 as u32).wrapping_mul(0xFF00))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureFilename {
    pub id0: u16,
    pub id1: u16,
    pub unknown: u16,
}

impl TextureFilename {
    pub fn file_hash(&self) -> u32 {
        decode(self.id0, self.id1)
    }
}

fn parse_entry(input: &mut &[u8]) -> WResult<TextureFilename> {
    let id0 = le_u16.parse_next(input)?;
    let id1 = le_u16.parse_next(input)?;
    let unknown = le_u16.parse_next(input)?;
    Ok(TextureFilename { id0, id1, unknown })
}

/// Parse the entries of a texture filename chunk with the given tag.
pub fn parse_texture_filenames(
    payload: &[u8],
    tag: u32,
) -> Result<Vec<TextureFilename>, Report<FormatError>> {
    let prefix_len = match tag {
        chunk_id::TEXTURE_FILENAMES => 4,
        _ => 8,
    };
    if payload.len() < prefix_len {
        return Err(Report::new(FormatError::SectionOverrun {
            section: SectionKind::TextureFilenames,
            offset: 0,
            need: prefix_len,
            end: payload.len(),
        }));
    }

    let count_offset = prefix_len - 4;
    let declared = le_u32
        .parse_next(&mut &payload[count_offset..prefix_len])
        .map_err(parse_failure(count_offset))? as usize;

    let available = (payload.len() - prefix_len) / ENTRY_LEN;
    let count = if declared > available {
        warn!(
            tag = format_args!("0x{tag:X}"),
            declared, available, "texture filename count exceeds chunk, clamping"
        );
        available
    } else {
        declared
    };
    let need = count * ENTRY_LEN;

    repeat(count, parse_entry)
        .parse_next(&mut &payload[prefix_len..prefix_len + need])
        .map_err(parse_failure(prefix_len))
}
