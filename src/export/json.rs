//! JSON form of a decoded model.
//!
//! Field names follow the layout downstream tools already read:
//!
//! ```text
//! { "variant": "normal",
//!   "submodels": [ { "vertices": [ { "pos", "normal", "has_normal", "texture_uv_coords" } ],
//!                    "indices", "texture_indices", "texture_uv_map_index",
//!                    "texture_blend_flags", "pixel_shader_type" } ],
//!   "textures": [ { "file_hash" } ] }
//! ```

use rootcause::Report;
use serde::{Deserialize, Serialize};

use crate::error::FormatError;
use crate::models::geometry::ChunkVariant;
use crate::models::model::{ModelGeometry, ModelSubmesh};
use crate::models::reconcile::PixelShaderType;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VertexRecord {
    pub pos: [f32; 3],
    /// Zero when `has_normal` is false.
    pub normal: [f32; 3],
    pub has_normal: bool,
    pub texture_uv_coords: Vec<[f32; 2]>,
}

/// One submesh. The three `texture_*` arrays run in parallel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubmodelRecord {
    pub vertices: Vec<VertexRecord>,
    pub indices: Vec<u16>,
    pub texture_indices: Vec<u32>,
    pub texture_uv_map_index: Vec<u8>,
    pub texture_blend_flags: Vec<u8>,
    pub pixel_shader_type: PixelShaderType,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRecord {
    pub file_hash: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModelRecord {
    pub variant: ChunkVariant,
    pub submodels: Vec<SubmodelRecord>,
    pub textures: Vec<TextureRecord>,
}

impl From<&ModelSubmesh> for SubmodelRecord {
    fn from(submesh: &ModelSubmesh) -> Self {
        let vertices = submesh
            .geometry
            .vertices
            .iter()
            .map(|v| VertexRecord {
                pos: v.position.to_array(),
                normal: v.normal.unwrap_or_default().to_array(),
                has_normal: v.normal.is_some(),
                texture_uv_coords: v.uv_sets.iter().map(|uv| uv.to_array()).collect(),
            })
            .collect();

        SubmodelRecord {
            vertices,
            indices: submesh.geometry.indices.clone(),
            texture_indices: submesh.bindings.iter().map(|b| b.texture_index).collect(),
            texture_uv_map_index: submesh.bindings.iter().map(|b| b.uv_set_index).collect(),
            texture_blend_flags: submesh.bindings.iter().map(|b| b.blend_flag).collect(),
            pixel_shader_type: submesh.pixel_shader_type,
        }
    }
}

impl From<&ModelGeometry> for ModelRecord {
    fn from(model: &ModelGeometry) -> Self {
        ModelRecord {
            variant: model.variant,
            submodels: model.submeshes.iter().map(SubmodelRecord::from).collect(),
            textures: model
                .texture_file_hashes
                .iter()
                .map(|&file_hash| TextureRecord { file_hash })
                .collect(),
        }
    }
}

fn json_error(err: serde_json::Error) -> Report<FormatError> {
    Report::new(FormatError::Json(err.to_string()))
}

pub fn to_json(model: &ModelGeometry) -> Result<String, Report<FormatError>> {
    serde_json::to_string_pretty(&ModelRecord::from(model)).map_err(json_error)
}

/// Read a record back. Unknown `pixel_shader_type` values are rejected.
pub fn from_json(json: &str) -> Result<ModelRecord, Report<FormatError>> {
    serde_json::from_str(json).map_err(json_error)
}
