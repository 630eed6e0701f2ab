//! Geometry chunk header.
//!
//! Both geometry tags (`0xFA0` "normal" and `0xBB8` "other") open with the
//! same 48-byte header, at the same offsets:
//!
//! ```text
//! 0x00  u32   unknown
//! 0x04  u32   unknown
//! 0x08  u32   class flags (gate the optional sections that follow)
//! 0x0C  u32 x3 unknown
//! 0x18  u8    bone group count / legacy shader record count
//! 0x19  u8    texture group count
//! 0x1A  u16   texture count
//! 0x1C  u8    bone weight set count / legacy texture slot count
//! 0x1D  u8    shared texture index count
//! 0x1E  u16   material count
//! 0x20  u32   aux field (non-zero adds a trailing byte array to texture blocks)
//! 0x24  u32   class flags (output)
//! 0x28  f32   scale x
//! 0x2C  f32   scale y
//! ```

use rootcause::Report;
use winnow::Parser;
use winnow::binary::{le_f32, le_u8, le_u16, le_u32};
use winnow::token::take;

use crate::data::parser_utils::{WResult, parse_failure};
use crate::error::FormatError;
use crate::models::chunk::chunk_id;

pub const GEOMETRY_HEADER_LEN: usize = 0x30;

/// Bits of [`GeometryHeader::class_flags`].
pub mod class_flags {
    pub const BONE_GROUPS: u32 = 0x002;
    pub const BOUNDING_BOX: u32 = 0x004;
    pub const SUBMESHES: u32 = 0x008;
    pub const LOD: u32 = 0x010;
    pub const VERTEX_BUFFER: u32 = 0x020;
    pub const BONE_WEIGHTS: u32 = 0x040;
    pub const MORPH_TARGETS: u32 = 0x080;
    pub const ANIMATION: u32 = 0x100;
    pub const SKELETON: u32 = 0x200;
    pub const EXTENDED_LOD: u32 = 0x400;
}

/// Which of the two geometry chunk encodings a payload uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ChunkVariant {
    /// Tag `0xFA0`.
    #[default]
    Normal,
    /// Tag `0xBB8`.
    Other,
}

impl ChunkVariant {
    pub fn from_tag(tag: u32) -> Option<ChunkVariant> {
        match tag {
            chunk_id::GEOMETRY => Some(ChunkVariant::Normal),
            chunk_id::GEOMETRY_OTHER => Some(ChunkVariant::Other),
            _ => None,
        }
    }

    pub fn tag(self) -> u32 {
        match self {
            ChunkVariant::Normal => chunk_id::GEOMETRY,
            ChunkVariant::Other => chunk_id::GEOMETRY_OTHER,
        }
    }

    /// Tags of the texture filename chunks that accompany this encoding.
    pub fn filename_tags(self) -> &'static [u32] {
        match self {
            ChunkVariant::Normal => &[chunk_id::TEXTURE_FILENAMES],
            ChunkVariant::Other => &[
                chunk_id::TEXTURE_FILENAMES_OTHER,
                chunk_id::TEXTURE_FILENAMES_OTHER_ALT,
            ],
        }
    }

    pub fn opposite(self) -> ChunkVariant {
        match self {
            ChunkVariant::Normal => ChunkVariant::Other,
            ChunkVariant::Other => ChunkVariant::Normal,
        }
    }
}

impl std::str::FromStr for ChunkVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" | "fa0" | "0xfa0" => Ok(ChunkVariant::Normal),
            "other" | "bb8" | "0xbb8" => Ok(ChunkVariant::Other),
            _ => Err(format!("unknown geometry encoding '{s}' (expected normal or other)")),
        }
    }
}

/// Parsed geometry chunk header. Read once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryHeader {
    pub variant: ChunkVariant,
    pub class_flags: u32,
    /// Also the number of 8-byte shader records in the legacy texture block.
    pub num_bone_groups: u8,
    pub num_texture_groups: u8,
    pub num_textures: u16,
    /// Also the number of texture slots in the legacy texture block.
    pub num_bone_weight_sets: u8,
    /// Length of the modern block's shared texture index array.
    pub num_texture_indices: u8,
    pub num_materials: u16,
    pub aux_field: u32,
    pub class_flags_output: u32,
    pub scale: glam::Vec2,
}

impl GeometryHeader {
    pub fn has(&self, flag: u32) -> bool {
        self.class_flags & flag != 0
    }
}

struct HeaderFields {
    class_flags: u32,
    num_bone_groups: u8,
    num_texture_groups: u8,
    num_textures: u16,
    num_bone_weight_sets: u8,
    num_texture_indices: u8,
    num_materials: u16,
    aux_field: u32,
    class_flags_output: u32,
    scale_x: f32,
    scale_y: f32,
}

fn parse_header_fields(input: &mut &[u8]) -> WResult<HeaderFields> {
    let _unknown = take(8usize).parse_next(input)?;
    let class_flags = le_u32.parse_next(input)?;
    let _unknown = take(12usize).parse_next(input)?;
    let num_bone_groups = le_u8.parse_next(input)?;
    let num_texture_groups = le_u8.parse_next(input)?;
    let num_textures = le_u16.parse_next(input)?;
    let num_bone_weight_sets = le_u8.parse_next(input)?;
    let num_texture_indices = le_u8.parse_next(input)?;
    let num_materials = le_u16.parse_next(input)?;
    let aux_field = le_u32.parse_next(input)?;
    let class_flags_output = le_u32.parse_next(input)?;
    let scale_x = le_f32.parse_next(input)?;
    let scale_y = le_f32.parse_next(input)?;
    Ok(HeaderFields {
        class_flags,
        num_bone_groups,
        num_texture_groups,
        num_textures,
        num_bone_weight_sets,
        num_texture_indices,
        num_materials,
        aux_field,
        class_flags_output,
        scale_x,
        scale_y,
    })
}

/// Parse the fixed header at the start of a geometry chunk payload.
pub fn parse_header(
    chunk_payload: &[u8],
    variant: ChunkVariant,
) -> Result<GeometryHeader, Report<FormatError>> {
    if chunk_payload.len() < GEOMETRY_HEADER_LEN {
        return Err(Report::new(FormatError::HeaderTooShort {
            have: chunk_payload.len(),
        }));
    }

    let fields = parse_header_fields(&mut &chunk_payload[..GEOMETRY_HEADER_LEN])
        .map_err(parse_failure(0))?;

    Ok(GeometryHeader {
        variant,
        class_flags: fields.class_flags,
        num_bone_groups: fields.num_bone_groups,
        num_texture_groups: fields.num_texture_groups,
        num_textures: fields.num_textures,
        num_bone_weight_sets: fields.num_bone_weight_sets,
        num_texture_indices: fields.num_texture_indices,
        num_materials: fields.num_materials,
        aux_field: fields.aux_field,
        class_flags_output: fields.class_flags_output,
        scale: glam::Vec2::new(fields.scale_x, fields.scale_y),
    })
}
