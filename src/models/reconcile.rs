//! Texture binding reconciliation.
//!
//! Both geometry encodings describe which textures a submesh samples, with
//! which UV set and blend rule, but they store it differently:
//!
//! - Modern block (either tag): submesh `n` takes the next
//!   `groups[n].num_textures_to_use` entries of a shared texture index array.
//!   The UV set cycles through the submesh's UV sets and the blend flag is 0.
//! - Legacy block ("normal" tag only): submesh `n` takes the next
//!   `records[n].num_uv_coords_to_use` slots of the parallel slot arrays,
//!   skipping slots whose UV set is `0xFF`.
//! - "Other" tag without texture groups: a single `(0, 0, 8)` binding.
//!
//! Each path reduces to the same [`CanonicalTextureBinding`] list, so a model
//! stored under both tags yields identical bindings per submesh.

use rootcause::Report;

use crate::error::FormatError;
use crate::models::geometry::{ChunkVariant, GeometryHeader};
use crate::models::sections::{LegacyTextureBlock, ModernTextureBlock, SectionData, UNUSED_UV_SET};

/// Blend flag telling the pixel shader to honour texture alpha.
pub const ALPHA_BLEND_FLAG: u8 = 8;

/// Binding emitted for "other" submeshes that have no texture group.
pub const FALLBACK_BINDING: CanonicalTextureBinding = CanonicalTextureBinding {
    texture_index: 0,
    uv_set_index: 0,
    blend_flag: ALPHA_BLEND_FLAG,
};

/// One texture a submesh samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanonicalTextureBinding {
    /// Index into the model's texture filename list.
    pub texture_index: u32,
    pub uv_set_index: u8,
    pub blend_flag: u8,
}

impl CanonicalTextureBinding {
    pub fn new(texture_index: u32, uv_set_index: u8, blend_flag: u8) -> Self {
        Self {
            texture_index,
            uv_set_index,
            blend_flag,
        }
    }
}

/// Which binding algorithm applies to a geometry chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingPath {
    Modern,
    Legacy,
    Fallback,
    Untextured,
}

/// Shader family a consumer should use for a submesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub enum PixelShaderType {
    /// Legacy slot bindings with per-slot blend flags.
    OldModel,
    /// Modern texture groups.
    NewModel,
}

impl PixelShaderType {
    pub fn for_path(path: BindingPath) -> Self {
        match path {
            BindingPath::Modern => PixelShaderType::NewModel,
            BindingPath::Legacy | BindingPath::Fallback | BindingPath::Untextured => {
                PixelShaderType::OldModel
            }
        }
    }
}

impl TryFrom<u8> for PixelShaderType {
    type Error = FormatError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            6 => Ok(PixelShaderType::OldModel),
            7 => Ok(PixelShaderType::NewModel),
            tag => Err(FormatError::UnknownPixelShaderType { tag }),
        }
    }
}

impl From<PixelShaderType> for u8 {
    fn from(ty: PixelShaderType) -> Self {
        match ty {
            PixelShaderType::OldModel => 6,
            PixelShaderType::NewModel => 7,
        }
    }
}

/// Parse a raw shader tag as carried by exported records.
pub fn pixel_shader_type(tag: u8) -> Result<PixelShaderType, Report<FormatError>> {
    PixelShaderType::try_from(tag).map_err(Report::new)
}

/// Per-encoding reduction of parsed sections to canonical bindings.
pub trait FormatReconciler: Sync {
    fn variant(&self) -> ChunkVariant;

    fn binding_path(&self, header: &GeometryHeader, sections: &SectionData) -> BindingPath;

    fn reconcile(
        &self,
        header: &GeometryHeader,
        sections: &SectionData,
        submesh_index: usize,
        uv_set_count: usize,
    ) -> Vec<CanonicalTextureBinding> {
        match (self.binding_path(header, sections), &sections.modern, &sections.legacy) {
            (BindingPath::Modern, Some(modern), _) => {
                modern_bindings(modern, submesh_index, uv_set_count)
            }
            (BindingPath::Legacy, _, Some(legacy)) => legacy_bindings(legacy, submesh_index),
            (BindingPath::Fallback, _, _) => vec![FALLBACK_BINDING],
            _ => Vec::new(),
        }
    }
}

fn has_texture_groups(header: &GeometryHeader, sections: &SectionData) -> bool {
    header.num_texture_groups > 0 && sections.modern.is_some()
}

/// `0xFA0`: modern groups when present, else the legacy slot arrays.
pub struct NormalReconciler;

impl FormatReconciler for NormalReconciler {
    fn variant(&self) -> ChunkVariant {
        ChunkVariant::Normal
    }

    fn binding_path(&self, header: &GeometryHeader, sections: &SectionData) -> BindingPath {
        if has_texture_groups(header, sections) {
            BindingPath::Modern
        } else if sections.legacy.is_some() {
            BindingPath::Legacy
        } else {
            BindingPath::Untextured
        }
    }
}

/// `0xBB8`: modern groups when present, else the fixed fallback binding.
pub struct OtherReconciler;

impl FormatReconciler for OtherReconciler {
    fn variant(&self) -> ChunkVariant {
        ChunkVariant::Other
    }

    fn binding_path(&self, header: &GeometryHeader, sections: &SectionData) -> BindingPath {
        if has_texture_groups(header, sections) {
            BindingPath::Modern
        } else {
            BindingPath::Fallback
        }
    }
}

pub fn reconciler_for(variant: ChunkVariant) -> &'static dyn FormatReconciler {
    match variant {
        ChunkVariant::Normal => &NormalReconciler,
        ChunkVariant::Other => &OtherReconciler,
    }
}

/// Canonical bindings of one submesh, using the reconciler for `header.variant`.
pub fn reconcile(
    header: &GeometryHeader,
    sections: &SectionData,
    submesh_index: usize,
    uv_set_count: usize,
) -> Vec<CanonicalTextureBinding> {
    reconciler_for(header.variant).reconcile(header, sections, submesh_index, uv_set_count)
}

fn modern_bindings(
    block: &ModernTextureBlock,
    submesh_index: usize,
    uv_set_count: usize,
) -> Vec<CanonicalTextureBinding> {
    if block.groups.is_empty() || block.texture_indices.is_empty() {
        return Vec::new();
    }

    // More submeshes than groups wrap around, as the game does.
    let groups = block.groups.len();
    let start: usize = (0..submesh_index)
        .map(|i| block.groups[i % groups].num_textures_to_use as usize)
        .sum();
    let group = &block.groups[submesh_index % groups];

    (0..group.num_textures_to_use as usize)
        .map(|i| {
            let slot = (start + i) % block.texture_indices.len();
            CanonicalTextureBinding {
                texture_index: u32::from(block.texture_indices[slot]),
                uv_set_index: i.checked_rem(uv_set_count).unwrap_or(0) as u8,
                blend_flag: 0,
            }
        })
        .collect()
}

fn legacy_bindings(block: &LegacyTextureBlock, submesh_index: usize) -> Vec<CanonicalTextureBinding> {
    if block.records.is_empty() {
        return Vec::new();
    }

    let record = submesh_index % block.records.len();
    let start: usize = block.records[..record]
        .iter()
        .map(|r| r.num_uv_coords_to_use as usize)
        .sum();
    let count = block.records[record].num_uv_coords_to_use as usize;

    (start..start + count)
        .filter_map(|i| {
            let uv_set_index = *block.uv_set_index.get(i)?;
            if uv_set_index == UNUSED_UV_SET {
                return None;
            }
            Some(CanonicalTextureBinding {
                texture_index: u32::from(*block.texture_index.get(i)?),
                uv_set_index,
                blend_flag: *block.blend_flag.get(i)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{GeometryBuilder, LegacySlot};
    use crate::models::geometry::parse_header;
    use crate::models::sections::walk;

    fn parse(payload: &[u8], variant: ChunkVariant) -> (GeometryHeader, SectionData) {
        let header = parse_header(payload, variant).unwrap();
        let cursor = walk(payload, &header).unwrap();
        (header, cursor.sections)
    }

    fn b(texture_index: u32, uv_set_index: u8, blend_flag: u8) -> CanonicalTextureBinding {
        CanonicalTextureBinding::new(texture_index, uv_set_index, blend_flag)
    }

    #[test]
    fn test_modern_partitions_shared_array() {
        let payload = GeometryBuilder::new(ChunkVariant::Normal)
            .modern(&[2, 3, 1], &[10, 11, 12, 13, 14, 15], &["a"], 0)
            .build();
        let (header, sections) = parse(&payload, ChunkVariant::Normal);

        assert_eq!(reconcile(&header, &sections, 0, 1), vec![b(10, 0, 0), b(11, 0, 0)]);
        assert_eq!(
            reconcile(&header, &sections, 1, 2),
            vec![b(12, 0, 0), b(13, 1, 0), b(14, 0, 0)]
        );
        assert_eq!(reconcile(&header, &sections, 2, 1), vec![b(15, 0, 0)]);
    }

    #[test]
    fn test_modern_is_symmetric_across_tags() {
        let build = |variant| {
            GeometryBuilder::new(variant)
                .modern(&[1, 2], &[3, 4, 5], &["x", "y"], 1)
                .build()
        };
        let normal = build(ChunkVariant::Normal);
        let other = build(ChunkVariant::Other);
        let (nh, ns) = parse(&normal, ChunkVariant::Normal);
        let (oh, os) = parse(&other, ChunkVariant::Other);

        for submesh in 0..2 {
            assert_eq!(
                reconcile(&nh, &ns, submesh, 1),
                reconcile(&oh, &os, submesh, 1)
            );
        }
        assert_eq!(NormalReconciler.binding_path(&nh, &ns), BindingPath::Modern);
        assert_eq!(OtherReconciler.binding_path(&oh, &os), BindingPath::Modern);
    }

    #[test]
    fn test_legacy_skips_unused_slots() {
        let payload = GeometryBuilder::new(ChunkVariant::Normal)
            .legacy(
                &[(6, 3), (6, 2)],
                &[
                    LegacySlot::new(0, 0, 4),
                    LegacySlot::new(UNUSED_UV_SET, 0, 9),
                    LegacySlot::new(1, ALPHA_BLEND_FLAG, 5),
                    LegacySlot::new(0, 0, 6),
                    LegacySlot::new(UNUSED_UV_SET, 0, 9),
                ],
            )
            .build();
        let (header, sections) = parse(&payload, ChunkVariant::Normal);
        assert_eq!(
            NormalReconciler.binding_path(&header, &sections),
            BindingPath::Legacy
        );

        assert_eq!(
            reconcile(&header, &sections, 0, 2),
            vec![b(4, 0, 0), b(5, 1, ALPHA_BLEND_FLAG)]
        );
        assert_eq!(reconcile(&header, &sections, 1, 2), vec![b(6, 0, 0)]);
    }

    #[test]
    fn test_legacy_slots_past_end_are_dropped() {
        let payload = GeometryBuilder::new(ChunkVariant::Normal)
            .legacy(&[(6, 4)], &[LegacySlot::new(0, 0, 1), LegacySlot::new(0, 0, 2)])
            .build();
        let (header, sections) = parse(&payload, ChunkVariant::Normal);
        assert_eq!(reconcile(&header, &sections, 0, 1), vec![b(1, 0, 0), b(2, 0, 0)]);
    }

    #[test]
    fn test_other_fallback_ignores_payload() {
        let header = parse_header(&[0u8; 48], ChunkVariant::Other).unwrap();
        assert_eq!(header.num_texture_groups, 0);

        let mut sections = SectionData::default();
        assert_eq!(reconcile(&header, &sections, 0, 1), vec![b(0, 0, 8)]);

        // legacy data present in an "other" chunk does not change the result
        sections.legacy = Some(LegacyTextureBlock {
            records: Vec::new(),
            uv_set_index: vec![1],
            blend_flag: vec![0],
            texture_index: vec![3],
            ..Default::default()
        });
        for submesh in 0..4 {
            assert_eq!(reconcile(&header, &sections, submesh, 3), vec![FALLBACK_BINDING]);
        }
    }

    #[test]
    fn test_normal_untextured() {
        let header = parse_header(&[0u8; 48], ChunkVariant::Normal).unwrap();
        let sections = SectionData::default();
        assert_eq!(
            NormalReconciler.binding_path(&header, &sections),
            BindingPath::Untextured
        );
        assert!(reconcile(&header, &sections, 0, 1).is_empty());
    }

    #[test]
    fn test_pixel_shader_type() {
        assert_eq!(pixel_shader_type(6).unwrap(), PixelShaderType::OldModel);
        assert_eq!(pixel_shader_type(7).unwrap(), PixelShaderType::NewModel);
        assert_eq!(u8::from(PixelShaderType::NewModel), 7);

        let err = pixel_shader_type(9).unwrap_err();
        assert!(matches!(
            err.current_context(),
            FormatError::UnknownPixelShaderType { tag: 9 }
        ));
        assert_eq!(
            PixelShaderType::for_path(BindingPath::Fallback),
            PixelShaderType::OldModel
        );
    }
}
