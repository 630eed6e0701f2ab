//! Optional sections between the geometry header and the submesh block.
//!
//! Each section's presence comes from the header and its length is a closed
//! form of header fields and counts already read. Sections appear in a fixed
//! order:
//!
//! 1. bone groups (`0x002`): `u32 count`, then `count` 28-byte records
//! 2. bone weights (`0x040`): layout unknown, rejected
//! 3. legacy texture block: `b18 * 8 + b1C * 9 (+ b1C when aux != 0)` bytes
//! 4. modern texture block: groups, shared texture indices, texture
//!    references, names and materials
//! 5. vertex buffer metadata (`0x020`): `u32 size`, `u32 unknown`, `size` bytes
//! 6. morph targets (`0x080`): layout unknown, rejected
//! 7. submeshes (`0x008`): see [`crate::models::submesh`]

use std::fmt;

use rootcause::Report;
use tracing::{debug, trace};
use winnow::Parser;
use winnow::binary::{le_u8, le_u16, le_u32};
use winnow::combinator::repeat;

use crate::data::parser_utils::{WResult, parse_array, parse_c_string, parse_failure, parse_vec3};
use crate::error::FormatError;
use crate::models::geometry::{GEOMETRY_HEADER_LEN, GeometryHeader, class_flags};

/// Legacy `uv_set_index` value marking an unused texture slot.
pub const UNUSED_UV_SET: u8 = 0xFF;
/// Count value that disables a texture block.
const DISABLED_COUNT: u8 = 0xFF;

const BONE_GROUP_LEN: usize = 28;
const SHADER_RECORD_LEN: usize = 8;
const TEXTURE_GROUP_LEN: usize = 9;
const TEXTURE_REFERENCE_LEN: usize = 8;
const MATERIAL_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Header,
    BoneGroups,
    BoneWeights,
    LegacyTextures,
    ModernTextures,
    VertexBuffer,
    MorphTargets,
    Submeshes,
    TextureFilenames,
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectionKind::Header => "geometry header",
            SectionKind::BoneGroups => "bone groups",
            SectionKind::BoneWeights => "bone weights",
            SectionKind::LegacyTextures => "legacy texture block",
            SectionKind::ModernTextures => "modern texture block",
            SectionKind::VertexBuffer => "vertex buffer metadata",
            SectionKind::MorphTargets => "morph targets",
            SectionKind::Submeshes => "submesh block",
            SectionKind::TextureFilenames => "texture filename chunk",
        };
        f.write_str(name)
    }
}

/// One bone group record.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneGroup {
    pub offset: glam::Vec3,
    pub parent: u32,
    pub child_count: u32,
    pub flags: u32,
    pub bone_id: u32,
}

/// Per-submesh record of the legacy texture block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderRecord {
    pub no_cull: bool,
    pub pixel_shader_id: u8,
    /// How many consecutive texture slots this submesh consumes.
    pub num_uv_coords_to_use: u8,
    pub raw: [u8; SHADER_RECORD_LEN],
}

/// Legacy texture bindings: per-submesh shader records plus parallel slot arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyTextureBlock {
    pub records: Vec<ShaderRecord>,
    pub texture_types: Vec<u16>,
    /// [`UNUSED_UV_SET`] marks a slot to skip.
    pub uv_set_index: Vec<u8>,
    pub blend_flag: Vec<u8>,
    pub texture_index: Vec<u8>,
    /// Present only when the header's aux field is non-zero.
    pub extra: Vec<u8>,
}

/// One per submesh in the modern encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureGroup {
    pub num_textures_to_use: u8,
    pub aux_byte: u8,
    pub raw: [u8; TEXTURE_GROUP_LEN],
}

impl TextureGroup {
    pub fn flags(&self) -> (u16, u16) {
        (
            u16::from_le_bytes([self.raw[0], self.raw[1]]),
            u16::from_le_bytes([self.raw[2], self.raw[3]]),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModernTextureBlock {
    pub groups: Vec<TextureGroup>,
    pub texture_flags: Vec<u16>,
    /// Partitioned between submeshes by each group's `num_textures_to_use`.
    pub texture_indices: Vec<u8>,
    pub extra: Vec<u8>,
    pub texture_references: Vec<[u8; TEXTURE_REFERENCE_LEN]>,
    pub texture_names: Vec<String>,
    pub materials: Vec<[u8; MATERIAL_LEN]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferInfo {
    pub size: u32,
    pub unknown: u32,
}

/// Everything the walker parsed ahead of the submesh block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionData {
    pub bone_groups: Vec<BoneGroup>,
    pub legacy: Option<LegacyTextureBlock>,
    pub modern: Option<ModernTextureBlock>,
    pub vertex_buffer: Option<VertexBufferInfo>,
}

/// Byte cursor over a geometry payload.
///
/// After [`walk`] it sits at the start of the submesh block (if any) and
/// carries the sections parsed on the way.
#[derive(Debug, Clone)]
pub struct SectionCursor {
    offset: usize,
    submeshes_present: bool,
    pub sections: SectionData,
}

impl SectionCursor {
    pub fn new(offset: usize) -> Self {
        Self {
            offset,
            submeshes_present: false,
            sections: SectionData::default(),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn submeshes_present(&self) -> bool {
        self.submeshes_present
    }

    pub(crate) fn rewind(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub fn remaining(&self, payload: &[u8]) -> usize {
        payload.len().saturating_sub(self.offset)
    }

    /// Consume `len` bytes of `section`, or fail without moving.
    pub fn take<'a>(
        &mut self,
        payload: &'a [u8],
        section: SectionKind,
        len: usize,
    ) -> Result<&'a [u8], Report<FormatError>> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= payload.len())
            .ok_or_else(|| {
                Report::new(FormatError::SectionOverrun {
                    section,
                    offset: self.offset,
                    need: len,
                    end: payload.len(),
                })
            })?;
        let bytes = &payload[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    /// Consume a little-endian `u32`.
    pub fn take_u32(
        &mut self,
        payload: &[u8],
        section: SectionKind,
    ) -> Result<u32, Report<FormatError>> {
        let offset = self.offset;
        let bytes = self.take(payload, section, 4)?;
        le_u32.parse_next(&mut &bytes[..]).map_err(parse_failure(offset))
    }
}

type ConsumeFn =
    fn(&mut SectionCursor, &[u8], &GeometryHeader) -> Result<(), Report<FormatError>>;

/// A section: when it is present and how to consume it.
struct SectionRule {
    kind: SectionKind,
    present: fn(&GeometryHeader) -> bool,
    consume: ConsumeFn,
}

/// Every section ahead of the submesh block, in on-disk order.
const SECTION_RULES: [SectionRule; 6] = [
    SectionRule {
        kind: SectionKind::BoneGroups,
        present: bone_groups_present,
        consume: consume_bone_groups,
    },
    SectionRule {
        kind: SectionKind::BoneWeights,
        present: bone_weights_present,
        consume: reject_bone_weights,
    },
    SectionRule {
        kind: SectionKind::LegacyTextures,
        present: legacy_block_present,
        consume: consume_legacy_textures,
    },
    SectionRule {
        kind: SectionKind::ModernTextures,
        present: modern_block_present,
        consume: consume_modern_textures,
    },
    SectionRule {
        kind: SectionKind::VertexBuffer,
        present: vertex_buffer_present,
        consume: consume_vertex_buffer,
    },
    SectionRule {
        kind: SectionKind::MorphTargets,
        present: morph_targets_present,
        consume: reject_morph_targets,
    },
];

fn bone_groups_present(header: &GeometryHeader) -> bool {
    header.has(class_flags::BONE_GROUPS)
}

fn bone_weights_present(header: &GeometryHeader) -> bool {
    header.has(class_flags::BONE_WEIGHTS)
}

fn vertex_buffer_present(header: &GeometryHeader) -> bool {
    header.has(class_flags::VERTEX_BUFFER)
}

fn morph_targets_present(header: &GeometryHeader) -> bool {
    header.has(class_flags::MORPH_TARGETS)
}

// The layouts behind these two flags are unknown. Guessing a size would
// silently shift every later section.
fn reject_bone_weights(
    _cursor: &mut SectionCursor,
    _payload: &[u8],
    _header: &GeometryHeader,
) -> Result<(), Report<FormatError>> {
    Err(Report::new(FormatError::UnsupportedSection {
        flag: class_flags::BONE_WEIGHTS,
        section: SectionKind::BoneWeights,
    }))
}

fn reject_morph_targets(
    _cursor: &mut SectionCursor,
    _payload: &[u8],
    _header: &GeometryHeader,
) -> Result<(), Report<FormatError>> {
    Err(Report::new(FormatError::UnsupportedSection {
        flag: class_flags::MORPH_TARGETS,
        section: SectionKind::MorphTargets,
    }))
}

/// The slot arrays are sized by `0x1C` alone, so either count enables the block.
pub fn legacy_block_present(header: &GeometryHeader) -> bool {
    header.num_bone_groups != DISABLED_COUNT
        && (header.num_bone_groups != 0 || header.num_bone_weight_sets != 0)
}

pub fn modern_block_present(header: &GeometryHeader) -> bool {
    header.num_texture_groups != 0
        && header.num_texture_groups != DISABLED_COUNT
        && header.num_textures < 0x100
        && header.num_materials < 0x100
}

/// Walk the optional sections of a geometry payload, stopping at the submesh block.
pub fn walk(payload: &[u8], header: &GeometryHeader) -> Result<SectionCursor, Report<FormatError>> {
    let mut cursor = SectionCursor::new(0);
    cursor.take(payload, SectionKind::Header, GEOMETRY_HEADER_LEN)?;

    for rule in SECTION_RULES.iter() {
        if !(rule.present)(header) {
            continue;
        }
        let start = cursor.offset;
        (rule.consume)(&mut cursor, payload, header)?;
        trace!(section = %rule.kind, start, len = cursor.offset - start, "consumed section");
    }

    cursor.submeshes_present = header.has(class_flags::SUBMESHES);
    debug!(
        offset = cursor.offset,
        submeshes = cursor.submeshes_present,
        "sections walked"
    );
    Ok(cursor)
}

fn parse_bone_group(input: &mut &[u8]) -> WResult<BoneGroup> {
    let offset = parse_vec3(input)?;
    let parent = le_u32.parse_next(input)?;
    let child_count = le_u32.parse_next(input)?;
    let flags = le_u32.parse_next(input)?;
    let bone_id = le_u32.parse_next(input)?;
    Ok(BoneGroup {
        offset,
        parent,
        child_count,
        flags,
        bone_id,
    })
}

fn consume_bone_groups(
    cursor: &mut SectionCursor,
    payload: &[u8],
    _header: &GeometryHeader,
) -> Result<(), Report<FormatError>> {
    let count = cursor.take_u32(payload, SectionKind::BoneGroups)? as usize;
    let offset = cursor.offset;
    let bytes = cursor.take(
        payload,
        SectionKind::BoneGroups,
        count.saturating_mul(BONE_GROUP_LEN),
    )?;
    cursor.sections.bone_groups = repeat(count, parse_bone_group)
        .parse_next(&mut &bytes[..])
        .map_err(parse_failure(offset))?;
    Ok(())
}

fn legacy_block_len(header: &GeometryHeader) -> usize {
    let slots = header.num_bone_weight_sets as usize;
    let extra = if header.aux_field != 0 { slots } else { 0 };
    extra + header.num_bone_groups as usize * SHADER_RECORD_LEN + slots * 9
}

fn parse_shader_record(input: &mut &[u8]) -> WResult<ShaderRecord> {
    let raw = parse_array::<SHADER_RECORD_LEN>(input)?;
    Ok(ShaderRecord {
        no_cull: raw[0] != 0,
        pixel_shader_id: raw[6],
        num_uv_coords_to_use: raw[7],
        raw,
    })
}

fn parse_legacy_block(
    input: &mut &[u8],
    records: usize,
    slots: usize,
    with_extra: bool,
) -> WResult<LegacyTextureBlock> {
    let records = repeat(records, parse_shader_record).parse_next(input)?;
    let texture_types = repeat(slots, le_u16).parse_next(input)?;
    let uv_set_index = repeat(slots, le_u8).parse_next(input)?;
    let _reserved: Vec<u32> = repeat(slots, le_u32).parse_next(input)?;
    let blend_flag = repeat(slots, le_u8).parse_next(input)?;
    let texture_index = repeat(slots, le_u8).parse_next(input)?;
    let extra = if with_extra {
        repeat(slots, le_u8).parse_next(input)?
    } else {
        Vec::new()
    };
    Ok(LegacyTextureBlock {
        records,
        texture_types,
        uv_set_index,
        blend_flag,
        texture_index,
        extra,
    })
}

fn consume_legacy_textures(
    cursor: &mut SectionCursor,
    payload: &[u8],
    header: &GeometryHeader,
) -> Result<(), Report<FormatError>> {
    let offset = cursor.offset;
    let bytes = cursor.take(payload, SectionKind::LegacyTextures, legacy_block_len(header))?;
    let block = parse_legacy_block(
        &mut &bytes[..],
        header.num_bone_groups as usize,
        header.num_bone_weight_sets as usize,
        header.aux_field != 0,
    )
    .map_err(parse_failure(offset))?;
    cursor.sections.legacy = Some(block);
    Ok(())
}

fn parse_texture_group(input: &mut &[u8]) -> WResult<TextureGroup> {
    let raw = parse_array::<TEXTURE_GROUP_LEN>(input)?;
    Ok(TextureGroup {
        num_textures_to_use: raw[6],
        aux_byte: raw[4],
        raw,
    })
}

/// Texture groups, shared texture indices and texture references.
fn parse_modern_fixed(
    input: &mut &[u8],
    header: &GeometryHeader,
) -> WResult<ModernTextureBlock> {
    let indices = header.num_texture_indices as usize;
    let groups = repeat(header.num_texture_groups as usize, parse_texture_group).parse_next(input)?;
    let texture_flags = repeat(indices, le_u16).parse_next(input)?;
    let texture_indices = repeat(indices, le_u8).parse_next(input)?;
    let extra = if header.aux_field != 0 {
        repeat(indices, le_u8).parse_next(input)?
    } else {
        Vec::new()
    };
    let texture_references =
        repeat(header.num_textures as usize, parse_array::<TEXTURE_REFERENCE_LEN>).parse_next(input)?;
    Ok(ModernTextureBlock {
        groups,
        texture_flags,
        texture_indices,
        extra,
        texture_references,
        texture_names: Vec::new(),
        materials: Vec::new(),
    })
}

fn consume_modern_textures(
    cursor: &mut SectionCursor,
    payload: &[u8],
    header: &GeometryHeader,
) -> Result<(), Report<FormatError>> {
    let index_width = if header.aux_field != 0 { 4 } else { 3 };
    let fixed_len = header.num_texture_groups as usize * TEXTURE_GROUP_LEN
        + header.num_texture_indices as usize * index_width
        + header.num_textures as usize * TEXTURE_REFERENCE_LEN;

    let mut offset = cursor.offset;
    let bytes = cursor.take(payload, SectionKind::ModernTextures, fixed_len)?;
    let mut block = parse_modern_fixed(&mut &bytes[..], header).map_err(parse_failure(offset))?;

    // Names are NUL-terminated, so their length is only known by reading them.
    offset = cursor.offset;
    let input = &mut &payload[offset..];
    let before = input.len();
    let names: Vec<String> = repeat(header.num_textures as usize, parse_c_string)
        .parse_next(input)
        .map_err(|_| {
            Report::new(FormatError::SectionOverrun {
                section: SectionKind::ModernTextures,
                offset,
                need: before.saturating_add(1),
                end: payload.len(),
            })
        })?;
    cursor.take(payload, SectionKind::ModernTextures, before - input.len())?;
    block.texture_names = names;

    offset = cursor.offset;
    let bytes = cursor.take(
        payload,
        SectionKind::ModernTextures,
        header.num_materials as usize * MATERIAL_LEN,
    )?;
    block.materials = repeat(header.num_materials as usize, parse_array::<MATERIAL_LEN>)
        .parse_next(&mut &bytes[..])
        .map_err(parse_failure(offset))?;

    cursor.sections.modern = Some(block);
    Ok(())
}

fn consume_vertex_buffer(
    cursor: &mut SectionCursor,
    payload: &[u8],
    _header: &GeometryHeader,
) -> Result<(), Report<FormatError>> {
    let size = cursor.take_u32(payload, SectionKind::VertexBuffer)?;
    let unknown = cursor.take_u32(payload, SectionKind::VertexBuffer)?;
    cursor.take(payload, SectionKind::VertexBuffer, size as usize)?;
    cursor.sections.vertex_buffer = Some(VertexBufferInfo { size, unknown });
    Ok(())
}
