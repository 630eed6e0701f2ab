//! Submesh block decoding.
//!
//! The block is a `u32` submesh count followed by, per submesh:
//!
//! - the "other" encoding only, before the first submesh: 8 zero bytes
//! - a 24-byte header: `num_indices`, `num_vertices`, four auxiliary `u32`s
//! - `num_indices` `u16` triangle-list indices
//! - the vertex data
//!
//! "Normal" vertices are interleaved with a stride taken from the FVF in the
//! third auxiliary slot (remapped from its on-disk bit order), and UVs are
//! `f32`. "Other" vertices are planar: every
//! position (`3 x f32`), then 4 bytes of per-vertex group data, then each UV
//! set as `u16` pairs in 1/65536 units. With the single UV set seen in
//! practice that is 20 bytes per vertex. The "other" encoding also stores
//! each triangle with the opposite winding.

use glam::{Vec2, Vec3};
use rootcause::Report;
use tracing::{debug, trace, warn};
use winnow::Parser;
use winnow::binary::{le_u16, le_u32};
use winnow::combinator::repeat;

use crate::data::parser_utils::{WResult, parse_failure, parse_vec2, parse_vec3};
use crate::error::FormatError;
use crate::models::geometry::ChunkVariant;
use crate::models::sections::{SectionCursor, SectionKind};
use crate::models::vertex_format::{AttributeSemantic, VertexFormat, from_dat_fvf};

pub const SUBMESH_HEADER_LEN: usize = 24;
/// Zero padding ahead of the first "other" submesh.
const OTHER_ALIGNMENT_PREFIX: usize = 8;
/// Position plus per-vertex group data in the planar layout.
const PLANAR_BASE_STRIDE: usize = 16;
const PLANAR_UV_STRIDE: usize = 4;
const MAX_PLANAR_UV_SETS: u32 = 8;
const FIXED_POINT_SCALE: f32 = 65536.0;

/// Fixed per-submesh header.
///
/// The auxiliary slots hold `uv_set_count`, `vertex_group_count`, then the
/// FVF ("normal") or a colour count ("other"), then `normal_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmeshHeader {
    pub num_indices: u32,
    pub num_vertices: u32,
    pub aux: [u32; 4],
}

impl SubmeshHeader {
    pub fn uv_set_count(&self) -> u32 {
        self.aux[0]
    }

    pub fn vertex_group_count(&self) -> u32 {
        self.aux[1]
    }

    /// Vertex format of a "normal" submesh, as stored on disk.
    pub fn dat_fvf(&self) -> u32 {
        self.aux[2]
    }

    /// The on-disk FVF remapped for size lookup, or `None` if it has stray high bits.
    pub fn fvf(&self) -> Option<u16> {
        from_dat_fvf(self.dat_fvf())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Option<Vec3>,
    pub uv_sets: Vec<Vec2>,
}

/// One indexed triangle list. Every index is below `num_vertices`.
#[derive(Debug, Clone, PartialEq)]
pub struct Submesh {
    pub num_indices: u32,
    pub num_vertices: u32,
    pub aux: [u32; 4],
    pub indices: Vec<u16>,
    pub vertices: Vec<Vertex>,
}

impl Submesh {
    /// UV sets per vertex, taken from the first vertex.
    pub fn uv_set_count(&self) -> usize {
        self.vertices.first().map_or(0, |v| v.uv_sets.len())
    }
}

fn parse_submesh_header(input: &mut &[u8]) -> WResult<SubmeshHeader> {
    let num_indices = le_u32.parse_next(input)?;
    let num_vertices = le_u32.parse_next(input)?;
    let mut aux = [0u32; 4];
    for slot in aux.iter_mut() {
        *slot = le_u32.parse_next(input)?;
    }
    Ok(SubmeshHeader {
        num_indices,
        num_vertices,
        aux,
    })
}

/// Decode the submesh block at `cursor`.
///
/// On failure the cursor is left where it started.
pub fn decode_submeshes(
    payload: &[u8],
    cursor: &mut SectionCursor,
    variant: ChunkVariant,
) -> Result<Vec<Submesh>, Report<FormatError>> {
    if !cursor.submeshes_present() {
        return Ok(Vec::new());
    }

    let start = cursor.offset();
    let result = decode_block(payload, cursor, variant);
    if result.is_err() {
        cursor.rewind(start);
    }
    result
}

fn decode_block(
    payload: &[u8],
    cursor: &mut SectionCursor,
    variant: ChunkVariant,
) -> Result<Vec<Submesh>, Report<FormatError>> {
    let count = cursor.take_u32(payload, SectionKind::Submeshes)? as usize;
    let min_len = count.saturating_mul(SUBMESH_HEADER_LEN);
    if min_len > cursor.remaining(payload) {
        return Err(Report::new(FormatError::SectionOverrun {
            section: SectionKind::Submeshes,
            offset: cursor.offset(),
            need: min_len,
            end: payload.len(),
        }));
    }

    let mut submeshes = Vec::with_capacity(count);
    for index in 0..count {
        if variant == ChunkVariant::Other && index == 0 {
            let prefix = cursor.take(payload, SectionKind::Submeshes, OTHER_ALIGNMENT_PREFIX)?;
            if prefix.iter().any(|&b| b != 0) {
                debug!(?prefix, "non-zero alignment prefix before first submesh");
            }
        }
        submeshes.push(decode_submesh(payload, cursor, variant, index)?);
    }

    debug!(count, end = cursor.offset(), "decoded submeshes");
    Ok(submeshes)
}

fn decode_submesh(
    payload: &[u8],
    cursor: &mut SectionCursor,
    variant: ChunkVariant,
    index: usize,
) -> Result<Submesh, Report<FormatError>> {
    let header_offset = cursor.offset();
    let header_bytes = cursor.take(payload, SectionKind::Submeshes, SUBMESH_HEADER_LEN)?;
    let header = parse_submesh_header(&mut &header_bytes[..]).map_err(parse_failure(header_offset))?;
    trace!(index, ?header, "submesh header");

    if header.num_indices % 3 != 0 {
        return Err(Report::new(FormatError::IncompleteTriangle {
            submesh: index,
            num_indices: header.num_indices,
        }));
    }

    let indices = decode_indices(payload, cursor, &header, variant, index)?;
    let vertices = match variant {
        ChunkVariant::Normal => decode_interleaved(payload, cursor, &header)?,
        ChunkVariant::Other => decode_planar(payload, cursor, &header, index)?,
    };

    Ok(Submesh {
        num_indices: header.num_indices,
        num_vertices: header.num_vertices,
        aux: header.aux,
        indices,
        vertices,
    })
}

fn decode_indices(
    payload: &[u8],
    cursor: &mut SectionCursor,
    header: &SubmeshHeader,
    variant: ChunkVariant,
    index: usize,
) -> Result<Vec<u16>, Report<FormatError>> {
    let count = header.num_indices as usize;
    let offset = cursor.offset();
    let bytes = cursor.take(payload, SectionKind::Submeshes, count.saturating_mul(2))?;
    let mut indices: Vec<u16> = repeat(count, le_u16)
        .parse_next(&mut &bytes[..])
        .map_err(parse_failure(offset))?;

    if let Some((position, &value)) = indices
        .iter()
        .enumerate()
        .find(|(_, v)| u32::from(**v) >= header.num_vertices)
    {
        return Err(Report::new(FormatError::IndexOutOfRange {
            submesh: index,
            position,
            value,
            num_vertices: header.num_vertices,
        }));
    }

    if variant == ChunkVariant::Other {
        for triangle in indices.chunks_exact_mut(3) {
            triangle.reverse();
        }
    }

    Ok(indices)
}

/// Attribute offsets within one interleaved vertex.
struct InterleavedLayout {
    stride: usize,
    position: usize,
    normal: Option<usize>,
    uv_sets: Vec<usize>,
}

impl InterleavedLayout {
    fn from_format(format: &VertexFormat) -> Option<Self> {
        Some(Self {
            stride: format.stride,
            position: format.attribute(AttributeSemantic::Position)?.offset,
            normal: format.attribute(AttributeSemantic::Normal).map(|a| a.offset),
            uv_sets: format.uv_sets().map(|a| a.offset).collect(),
        })
    }
}

fn parse_interleaved_vertex(vertex: &[u8], layout: &InterleavedLayout) -> WResult<Vertex> {
    let position = parse_vec3(&mut &vertex[layout.position..])?;
    let normal = match layout.normal {
        Some(offset) => Some(parse_vec3(&mut &vertex[offset..])?),
        None => None,
    };
    let uv_sets = layout
        .uv_sets
        .iter()
        .map(|&offset| parse_vec2(&mut &vertex[offset..]))
        .collect::<WResult<Vec<_>>>()?;
    Ok(Vertex {
        position,
        normal,
        uv_sets,
    })
}

fn decode_interleaved(
    payload: &[u8],
    cursor: &mut SectionCursor,
    header: &SubmeshHeader,
) -> Result<Vec<Vertex>, Report<FormatError>> {
    let layout = header
        .fvf()
        .and_then(VertexFormat::from_fvf)
        .as_ref()
        .and_then(InterleavedLayout::from_format)
        .ok_or_else(|| {
            Report::new(FormatError::UnknownFvf {
                fvf: header.dat_fvf(),
            })
        })?;

    let offset = cursor.offset();
    let len = (header.num_vertices as usize).saturating_mul(layout.stride);
    let bytes = cursor.take(payload, SectionKind::Submeshes, len)?;

    bytes
        .chunks_exact(layout.stride)
        .enumerate()
        .map(|(i, vertex)| {
            parse_interleaved_vertex(vertex, &layout)
                .map_err(parse_failure(offset + i * layout.stride))
        })
        .collect()
}

fn parse_fixed_point_uv(input: &mut &[u8]) -> WResult<Vec2> {
    let u = le_u16.parse_next(input)?;
    let v = le_u16.parse_next(input)?;
    Ok(Vec2::new(
        f32::from(u) / FIXED_POINT_SCALE,
        f32::from(v) / FIXED_POINT_SCALE,
    ))
}

fn decode_planar(
    payload: &[u8],
    cursor: &mut SectionCursor,
    header: &SubmeshHeader,
    index: usize,
) -> Result<Vec<Vertex>, Report<FormatError>> {
    let mut uv_set_count = header.uv_set_count();
    if uv_set_count > MAX_PLANAR_UV_SETS {
        warn!(
            submesh = index,
            declared = uv_set_count,
            "implausible UV set count, reading one set"
        );
        uv_set_count = 1;
    }

    let count = header.num_vertices as usize;
    let stride = PLANAR_BASE_STRIDE + PLANAR_UV_STRIDE * uv_set_count as usize;
    let offset = cursor.offset();
    let bytes = cursor.take(payload, SectionKind::Submeshes, count.saturating_mul(stride))?;
    if count == 0 {
        return Ok(Vec::new());
    }

    let (position_bytes, rest) = bytes.split_at(count * 12);
    let uv_offset = offset + count * PLANAR_BASE_STRIDE;
    let uv_bytes = &rest[count * 4..];

    let positions: Vec<Vec3> = repeat(count, parse_vec3)
        .parse_next(&mut &position_bytes[..])
        .map_err(parse_failure(offset))?;
    let uv_sets: Vec<Vec<Vec2>> = uv_bytes
        .chunks_exact(count * PLANAR_UV_STRIDE)
        .take(uv_set_count as usize)
        .map(|set| -> WResult<Vec<Vec2>> {
            repeat(count, parse_fixed_point_uv).parse_next(&mut &set[..])
        })
        .collect::<WResult<_>>()
        .map_err(parse_failure(uv_offset))?;

    Ok(positions
        .into_iter()
        .enumerate()
        .map(|(i, position)| Vertex {
            position,
            normal: None,
            uv_sets: uv_sets.iter().map(|set| set[i]).collect(),
        })
        .collect())
}
