//! Whole-container decoding.
//!
//! [`decode_model`] chains the stages: container walk, geometry header,
//! section walk, submesh decode, binding reconciliation and texture filename
//! lookup. The result is the same shape whichever geometry tag the container
//! used.

use bon::Builder;
use itertools::{EitherOrBoth, Itertools};
use rootcause::Report;
use tracing::{debug, warn};

use crate::error::FormatError;
use crate::models::chunk::{Chunk, ContainerKind, chunk_id, parse_signature, read_chunks};
use crate::models::filenames::parse_texture_filenames;
use crate::models::geometry::{ChunkVariant, GeometryHeader, parse_header};
use crate::models::reconcile::{CanonicalTextureBinding, PixelShaderType, reconciler_for};
use crate::models::sections::{SectionData, walk};
use crate::models::submesh::{Submesh, decode_submeshes};

#[derive(Builder, Debug, Clone)]
pub struct DecodeOptions {
    /// Geometry chunk to decode when a container carries both tags.
    #[builder(default)]
    pub preferred_variant: ChunkVariant,
    /// Reject containers whose type byte is not the model type.
    #[builder(default = true)]
    pub require_model_container: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A submesh with its reconciled texture bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSubmesh {
    pub geometry: Submesh,
    pub bindings: Vec<CanonicalTextureBinding>,
    pub pixel_shader_type: PixelShaderType,
}

impl ModelSubmesh {
    pub fn positions(&self) -> impl Iterator<Item = glam::Vec3> + '_ {
        self.geometry.vertices.iter().map(|v| v.position)
    }

    pub fn indices(&self) -> &[u16] {
        &self.geometry.indices
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelGeometry {
    pub kind: ContainerKind,
    pub variant: ChunkVariant,
    pub header: GeometryHeader,
    pub sections: SectionData,
    pub submeshes: Vec<ModelSubmesh>,
    /// One per texture filename entry; binding texture indices point here.
    pub texture_file_hashes: Vec<u32>,
}

fn find_geometry(chunks: &[Chunk], preferred: ChunkVariant) -> Option<(ChunkVariant, &Chunk)> {
    [preferred, preferred.opposite()]
        .into_iter()
        .find_map(|variant| {
            chunks
                .iter()
                .find(|c| c.id == variant.tag())
                .map(|c| (variant, c))
        })
}

fn is_filename_chunk(id: u32) -> bool {
    matches!(
        id,
        chunk_id::TEXTURE_FILENAMES
            | chunk_id::TEXTURE_FILENAMES_OTHER
            | chunk_id::TEXTURE_FILENAMES_OTHER_ALT
    )
}

fn find_filenames(chunks: &[Chunk], variant: ChunkVariant) -> Option<&Chunk> {
    variant
        .filename_tags()
        .iter()
        .find_map(|tag| chunks.iter().find(|c| c.id == *tag))
        .or_else(|| chunks.iter().find(|c| is_filename_chunk(c.id)))
}

/// Decode one FFNA model container.
pub fn decode_model(
    buf: &[u8],
    options: &DecodeOptions,
) -> Result<ModelGeometry, Report<FormatError>> {
    let kind = parse_signature(buf)?;
    let chunks = read_chunks(buf)?;
    if options.require_model_container && kind != ContainerKind::Model {
        return Err(Report::new(FormatError::UnexpectedContainerKind {
            kind: u8::from(kind),
        }));
    }

    let (variant, geometry) = find_geometry(&chunks, options.preferred_variant)
        .ok_or_else(|| Report::new(FormatError::MissingGeometryChunk))?;
    if variant != options.preferred_variant {
        debug!(?variant, "preferred geometry chunk absent, using the other tag");
    }

    let payload = geometry.payload(buf);
    let header = parse_header(payload, variant)?;
    let mut cursor = walk(payload, &header)?;
    let decoded = decode_submeshes(payload, &mut cursor, variant)?;
    let sections = cursor.sections;

    let reconciler = reconciler_for(variant);
    let path = reconciler.binding_path(&header, &sections);
    let pixel_shader_type = PixelShaderType::for_path(path);
    let submeshes = decoded
        .into_iter()
        .enumerate()
        .map(|(index, geometry)| {
            let bindings =
                reconciler.reconcile(&header, &sections, index, geometry.uv_set_count());
            ModelSubmesh {
                geometry,
                bindings,
                pixel_shader_type,
            }
        })
        .collect::<Vec<_>>();

    // A damaged filename chunk costs the texture list, not the geometry.
    let texture_file_hashes = match find_filenames(&chunks, variant)
        .map(|chunk| (chunk.id, parse_texture_filenames(chunk.payload(buf), chunk.id)))
    {
        Some((_, Ok(names))) => names.iter().map(|name| name.file_hash()).collect(),
        Some((id, Err(err))) => {
            warn!(chunk = format_args!("0x{id:X}"), "ignoring texture filenames: {err}");
            Vec::new()
        }
        None => Vec::new(),
    };

    if !texture_file_hashes.is_empty() {
        for (index, submesh) in submeshes.iter().enumerate() {
            let past_end = submesh
                .bindings
                .iter()
                .find(|b| b.texture_index as usize >= texture_file_hashes.len());
            if let Some(binding) = past_end {
                warn!(
                    submesh = index,
                    texture_index = binding.texture_index,
                    textures = texture_file_hashes.len(),
                    "binding refers past the texture filename list"
                );
            }
        }
    }

    debug!(
        ?variant,
        ?path,
        submeshes = submeshes.len(),
        textures = texture_file_hashes.len(),
        "decoded model"
    );

    Ok(ModelGeometry {
        kind,
        variant,
        header,
        sections,
        submeshes,
        texture_file_hashes,
    })
}

/// Check that two decodes of the same model agree on every submesh's bindings.
///
/// Meant for a model available under both geometry tags.
pub fn compare_bindings(
    normal: &ModelGeometry,
    other: &ModelGeometry,
) -> Result<(), Report<FormatError>> {
    for (submesh, pair) in normal.submeshes.iter().zip_longest(&other.submeshes).enumerate() {
        let detail = match pair {
            EitherOrBoth::Both(a, b) if a.bindings == b.bindings => continue,
            EitherOrBoth::Both(a, b) => {
                format!("{:?} vs {:?}", a.bindings, b.bindings)
            }
            EitherOrBoth::Left(_) | EitherOrBoth::Right(_) => format!(
                "submesh count {} vs {}",
                normal.submeshes.len(),
                other.submeshes.len()
            ),
        };
        return Err(Report::new(FormatError::ReconciliationMismatch {
            submesh,
            detail,
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{ContainerBuilder, GeometryBuilder, LegacySlot, SubmeshSpec};
    use crate::models::reconcile::FALLBACK_BINDING;
    use crate::models::sections::UNUSED_UV_SET;

    fn legacy_normal() -> Vec<u8> {
        let geometry = GeometryBuilder::new(ChunkVariant::Normal)
            .legacy(
                &[(6, 3), (6, 1)],
                &[
                    LegacySlot::new(0, 0, 0),
                    LegacySlot::new(UNUSED_UV_SET, 0, 9),
                    LegacySlot::new(0, 0, 1),
                    LegacySlot::new(0, 0, 2),
                ],
            )
            .submesh(SubmeshSpec::grid(66, 26))
            .submesh(SubmeshSpec::grid(6, 4))
            .build();
        ContainerBuilder::model()
            .chunk(chunk_id::GEOMETRY, &geometry)
            .filenames(
                chunk_id::TEXTURE_FILENAMES,
                &[(0x16A1, 0x0102), (0x100, 0x100), (0x101, 0x100)],
            )
            .build()
    }

    fn modern_other() -> Vec<u8> {
        let geometry = GeometryBuilder::new(ChunkVariant::Other)
            .modern(&[2, 1], &[0, 1, 2], &["a", "b", "c"], 0)
            .submesh(SubmeshSpec::grid(66, 26))
            .submesh(SubmeshSpec::grid(6, 4))
            .build();
        ContainerBuilder::model()
            .chunk(chunk_id::GEOMETRY_OTHER, &geometry)
            .filenames(
                chunk_id::TEXTURE_FILENAMES_OTHER,
                &[(0x16A1, 0x0102), (0x100, 0x100), (0x101, 0x100)],
            )
            .build()
    }

    #[test]
    fn test_cross_encoding_agreement() {
        let options = DecodeOptions::default();
        let normal = decode_model(&legacy_normal(), &options).unwrap();
        let other = decode_model(&modern_other(), &options).unwrap();

        assert_eq!(normal.variant, ChunkVariant::Normal);
        assert_eq!(other.variant, ChunkVariant::Other);
        assert_eq!(normal.texture_file_hashes, vec![0x213A2, 1, 2]);
        assert_eq!(normal.texture_file_hashes, other.texture_file_hashes);

        compare_bindings(&normal, &other).unwrap();
        for (a, b) in normal.submeshes.iter().zip(&other.submeshes) {
            assert_eq!(a.geometry.indices, b.geometry.indices);
            assert_eq!(a.geometry.vertices, b.geometry.vertices);
        }
        assert_eq!(normal.submeshes[0].pixel_shader_type, PixelShaderType::OldModel);
        assert_eq!(other.submeshes[0].pixel_shader_type, PixelShaderType::NewModel);
        assert_eq!(
            normal.submeshes[0].bindings,
            vec![
                CanonicalTextureBinding::new(0, 0, 0),
                CanonicalTextureBinding::new(1, 0, 0)
            ]
        );
    }

    #[test]
    fn test_decode_is_idempotent() {
        let buf = legacy_normal();
        let options = DecodeOptions::default();
        assert_eq!(
            decode_model(&buf, &options).unwrap(),
            decode_model(&buf, &options).unwrap()
        );
    }

    #[test]
    fn test_mismatch_is_reported() {
        let options = DecodeOptions::default();
        let normal = decode_model(&legacy_normal(), &options).unwrap();

        let geometry = GeometryBuilder::new(ChunkVariant::Other)
            .submesh(SubmeshSpec::grid(66, 26))
            .submesh(SubmeshSpec::grid(6, 4))
            .build();
        let buf = ContainerBuilder::model()
            .chunk(chunk_id::GEOMETRY_OTHER, &geometry)
            .build();
        let fallback = decode_model(&buf, &options).unwrap();
        assert_eq!(fallback.submeshes[1].bindings, vec![FALLBACK_BINDING]);

        let err = compare_bindings(&normal, &fallback).unwrap_err();
        assert!(matches!(
            err.current_context(),
            FormatError::ReconciliationMismatch { submesh: 0, .. }
        ));

        let mut short = fallback.clone();
        short.submeshes.truncate(1);
        short.submeshes[0].bindings = normal.submeshes[0].bindings.clone();
        let err = compare_bindings(&normal, &short).unwrap_err();
        assert!(matches!(
            err.current_context(),
            FormatError::ReconciliationMismatch { submesh: 1, .. }
        ));
    }

    #[test]
    fn test_preferred_variant() {
        let normal = GeometryBuilder::new(ChunkVariant::Normal)
            .submesh(SubmeshSpec::grid(3, 3))
            .build();
        let other = GeometryBuilder::new(ChunkVariant::Other)
            .submesh(SubmeshSpec::grid(6, 4))
            .build();
        let buf = ContainerBuilder::model()
            .chunk(chunk_id::GEOMETRY, &normal)
            .chunk(chunk_id::GEOMETRY_OTHER, &other)
            .build();

        let model = decode_model(&buf, &DecodeOptions::default()).unwrap();
        assert_eq!(model.variant, ChunkVariant::Normal);
        assert!(model.submeshes[0].bindings.is_empty());

        let options = DecodeOptions::builder()
            .preferred_variant(ChunkVariant::Other)
            .build();
        let model = decode_model(&buf, &options).unwrap();
        assert_eq!(model.variant, ChunkVariant::Other);
        assert_eq!(model.submeshes[0].indices().len(), 6);
    }

    #[test]
    fn test_filename_problems_keep_geometry() {
        let geometry = GeometryBuilder::new(ChunkVariant::Normal)
            .submesh(SubmeshSpec::grid(6, 4))
            .build();
        let mut names = 10u32.to_le_bytes().to_vec();
        for id in [0x16A1u16, 0x0102, 0] {
            names.extend_from_slice(&id.to_le_bytes());
        }
        let buf = ContainerBuilder::model()
            .chunk(chunk_id::GEOMETRY, &geometry)
            .chunk(chunk_id::TEXTURE_FILENAMES, &names)
            .build();
        let model = decode_model(&buf, &DecodeOptions::default()).unwrap();
        assert_eq!(model.submeshes.len(), 1);
        assert_eq!(model.texture_file_hashes, vec![0x213A2]);

        // too short to hold even the count
        let buf = ContainerBuilder::model()
            .chunk(chunk_id::GEOMETRY, &geometry)
            .chunk(chunk_id::TEXTURE_FILENAMES_OTHER, &[1, 2, 3])
            .build();
        let model = decode_model(&buf, &DecodeOptions::default()).unwrap();
        assert_eq!(model.submeshes[0].indices().len(), 6);
        assert!(model.texture_file_hashes.is_empty());
    }

    #[test]
    fn test_container_errors() {
        let options = DecodeOptions::default();

        let buf = ContainerBuilder::model().chunk(chunk_id::METADATA, &[0; 4]).build();
        let err = decode_model(&buf, &options).unwrap_err();
        assert!(matches!(err.current_context(), FormatError::MissingGeometryChunk));

        let geometry = GeometryBuilder::new(ChunkVariant::Normal).build();
        let buf = ContainerBuilder::new(3)
            .chunk(chunk_id::GEOMETRY, &geometry)
            .build();
        let err = decode_model(&buf, &options).unwrap_err();
        assert!(matches!(
            err.current_context(),
            FormatError::UnexpectedContainerKind { kind: 3 }
        ));

        let lenient = DecodeOptions::builder().require_model_container(false).build();
        let model = decode_model(&buf, &lenient).unwrap();
        assert_eq!(model.kind, ContainerKind::Map);
        assert!(model.submeshes.is_empty());
    }
}
