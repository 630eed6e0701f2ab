//! Byte builders for synthesised containers and geometry payloads used in tests.

use crate::models::chunk::{FFNA_SIGNATURE, chunk_id};
use crate::models::geometry::{ChunkVariant, GEOMETRY_HEADER_LEN, class_flags};

pub struct ContainerBuilder {
    buf: Vec<u8>,
}

impl ContainerBuilder {
    pub fn new(kind: u8) -> Self {
        let mut buf = FFNA_SIGNATURE.to_vec();
        buf.push(kind);
        Self { buf }
    }

    pub fn model() -> Self {
        Self::new(2)
    }

    pub fn chunk(mut self, id: u32, payload: &[u8]) -> Self {
        self.buf.extend_from_slice(&id.to_le_bytes());
        self.buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(payload);
        self
    }

    /// A normal-style filename chunk (`0xFA5`) or other-style one for `0xBBB`/`0xBBC`.
    pub fn filenames(self, tag: u32, pairs: &[(u16, u16)]) -> Self {
        let mut payload = Vec::new();
        if tag != chunk_id::TEXTURE_FILENAMES {
            payload.extend_from_slice(&0u32.to_le_bytes());
        }
        payload.extend_from_slice(&(pairs.len() as u32).to_le_bytes());
        for &(id0, id1) in pairs {
            payload.extend_from_slice(&id0.to_le_bytes());
            payload.extend_from_slice(&id1.to_le_bytes());
            payload.extend_from_slice(&0u16.to_le_bytes());
        }
        self.chunk(tag, &payload)
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LegacySlot {
    pub uv_set: u8,
    pub blend: u8,
    pub texture: u8,
}

impl LegacySlot {
    pub fn new(uv_set: u8, blend: u8, texture: u8) -> Self {
        Self {
            uv_set,
            blend,
            texture,
        }
    }
}

/// Geometry for one submesh, written in whichever encoding the builder targets.
#[derive(Debug, Clone)]
pub struct SubmeshSpec {
    pub indices: Vec<u16>,
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Vec<[f32; 2]>,
}

impl SubmeshSpec {
    /// A deterministic submesh with UVs on a 1/16 grid (exact in 16-bit fixed point).
    pub fn grid(num_indices: usize, num_vertices: usize) -> Self {
        let positions = (0..num_vertices)
            .map(|i| [i as f32, (i * 2) as f32, -(i as f32)])
            .collect();
        let uvs = (0..num_vertices)
            .map(|i| [(i % 16) as f32 / 16.0, ((i / 16) % 16) as f32 / 16.0])
            .collect();
        let indices = (0..num_indices).map(|i| (i % num_vertices) as u16).collect();
        Self {
            indices,
            positions,
            normals: None,
            uvs,
        }
    }

    pub fn with_normals(mut self) -> Self {
        self.normals = Some(self.positions.iter().map(|_| [0.0, 0.0, 1.0]).collect());
        self
    }

    /// FVF in its on-disk form.
    fn dat_fvf(&self) -> u32 {
        if self.normals.is_some() { 0x015 } else { 0x011 }
    }
}

#[derive(Default)]
struct ModernSpec {
    groups: Vec<u8>,
    texture_indices: Vec<u8>,
    names: Vec<String>,
    materials: u16,
}

pub struct GeometryBuilder {
    variant: ChunkVariant,
    class_flags: u32,
    aux_field: u32,
    bone_groups: Option<u32>,
    legacy: Option<(Vec<(u8, u8)>, Vec<LegacySlot>)>,
    modern: Option<ModernSpec>,
    vertex_buffer: Option<u32>,
    submeshes: Vec<SubmeshSpec>,
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

impl GeometryBuilder {
    pub fn new(variant: ChunkVariant) -> Self {
        Self {
            variant,
            class_flags: 0,
            aux_field: 0,
            bone_groups: None,
            legacy: None,
            modern: None,
            vertex_buffer: None,
            submeshes: Vec::new(),
        }
    }

    pub fn class_flags(mut self, flags: u32) -> Self {
        self.class_flags |= flags;
        self
    }

    pub fn aux_field(mut self, aux: u32) -> Self {
        self.aux_field = aux;
        self
    }

    pub fn bone_groups(mut self, count: u32) -> Self {
        self.bone_groups = Some(count);
        self
    }

    /// `records` are `(pixel_shader_id, num_uv_coords_to_use)` per submesh.
    pub fn legacy(mut self, records: &[(u8, u8)], slots: &[LegacySlot]) -> Self {
        self.legacy = Some((records.to_vec(), slots.to_vec()));
        self
    }

    /// `groups` holds each submesh's `num_textures_to_use`.
    pub fn modern(
        mut self,
        groups: &[u8],
        texture_indices: &[u8],
        names: &[&str],
        materials: u16,
    ) -> Self {
        self.modern = Some(ModernSpec {
            groups: groups.to_vec(),
            texture_indices: texture_indices.to_vec(),
            names: names.iter().map(|s| s.to_string()).collect(),
            materials,
        });
        self
    }

    pub fn vertex_buffer(mut self, len: u32) -> Self {
        self.vertex_buffer = Some(len);
        self
    }

    pub fn submesh(mut self, spec: SubmeshSpec) -> Self {
        self.submeshes.push(spec);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut flags = self.class_flags;
        if self.bone_groups.is_some() {
            flags |= class_flags::BONE_GROUPS;
        }
        if self.vertex_buffer.is_some() {
            flags |= class_flags::VERTEX_BUFFER;
        }
        if !self.submeshes.is_empty() {
            flags |= class_flags::SUBMESHES;
        }

        let mut out = vec![0u8; GEOMETRY_HEADER_LEN];
        out[0x08..0x0C].copy_from_slice(&flags.to_le_bytes());
        if let Some((records, slots)) = &self.legacy {
            out[0x18] = records.len() as u8;
            out[0x1C] = slots.len() as u8;
        }
        if let Some(modern) = &self.modern {
            out[0x19] = modern.groups.len() as u8;
            out[0x1A..0x1C].copy_from_slice(&(modern.names.len() as u16).to_le_bytes());
            out[0x1D] = modern.texture_indices.len() as u8;
            out[0x1E..0x20].copy_from_slice(&modern.materials.to_le_bytes());
        }
        out[0x20..0x24].copy_from_slice(&self.aux_field.to_le_bytes());
        out[0x28..0x2C].copy_from_slice(&1.0f32.to_le_bytes());
        out[0x2C..0x30].copy_from_slice(&1.0f32.to_le_bytes());

        if let Some(count) = self.bone_groups {
            put_u32(&mut out, count);
            for i in 0..count {
                for v in [0.5f32, 1.5, 2.5] {
                    out.extend_from_slice(&v.to_le_bytes());
                }
                put_u32(&mut out, i.saturating_sub(1));
                put_u32(&mut out, 0);
                put_u32(&mut out, 0);
                put_u32(&mut out, i);
            }
        }

        if let Some((records, slots)) = &self.legacy {
            for &(pixel_shader_id, num_uv) in records {
                out.extend_from_slice(&[0, 0, 0, 0, 0, 0, pixel_shader_id, num_uv]);
            }
            for _ in slots {
                out.extend_from_slice(&1u16.to_le_bytes());
            }
            out.extend(slots.iter().map(|s| s.uv_set));
            for _ in slots {
                put_u32(&mut out, 0);
            }
            out.extend(slots.iter().map(|s| s.blend));
            out.extend(slots.iter().map(|s| s.texture));
            if self.aux_field != 0 {
                out.extend(slots.iter().map(|_| 0u8));
            }
        }

        if let Some(modern) = &self.modern {
            for &n in &modern.groups {
                out.extend_from_slice(&[0, 0, 0, 0, 0, 0, n, 0, 0]);
            }
            for _ in &modern.texture_indices {
                out.extend_from_slice(&0u16.to_le_bytes());
            }
            out.extend_from_slice(&modern.texture_indices);
            if self.aux_field != 0 {
                out.extend(modern.texture_indices.iter().map(|_| 0u8));
            }
            for _ in &modern.names {
                out.extend_from_slice(&[0u8; 8]);
            }
            for name in &modern.names {
                out.extend_from_slice(name.as_bytes());
                out.push(0);
            }
            for _ in 0..modern.materials {
                out.extend_from_slice(&[0u8; 8]);
            }
        }

        if let Some(len) = self.vertex_buffer {
            put_u32(&mut out, len);
            put_u32(&mut out, 0);
            out.extend(std::iter::repeat_n(0xCDu8, len as usize));
        }

        if !self.submeshes.is_empty() {
            put_u32(&mut out, self.submeshes.len() as u32);
            for (i, spec) in self.submeshes.iter().enumerate() {
                match self.variant {
                    ChunkVariant::Normal => write_normal_submesh(&mut out, spec),
                    ChunkVariant::Other => write_other_submesh(&mut out, spec, i == 0),
                }
            }
        }

        out
    }
}

fn write_normal_submesh(out: &mut Vec<u8>, spec: &SubmeshSpec) {
    put_u32(out, spec.indices.len() as u32);
    put_u32(out, spec.positions.len() as u32);
    put_u32(out, 1);
    put_u32(out, 0);
    put_u32(out, spec.dat_fvf());
    put_u32(out, 0);
    for index in &spec.indices {
        out.extend_from_slice(&index.to_le_bytes());
    }
    for (i, position) in spec.positions.iter().enumerate() {
        for v in position {
            out.extend_from_slice(&v.to_le_bytes());
        }
        if let Some(normals) = &spec.normals {
            for v in normals[i] {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        for v in spec.uvs[i] {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
}

fn write_other_submesh(out: &mut Vec<u8>, spec: &SubmeshSpec, first: bool) {
    if first {
        out.extend_from_slice(&[0u8; 8]);
    }
    put_u32(out, spec.indices.len() as u32);
    put_u32(out, spec.positions.len() as u32);
    put_u32(out, 1);
    put_u32(out, 0);
    put_u32(out, 0);
    put_u32(out, 0);
    for tri in spec.indices.chunks(3) {
        for index in tri.iter().rev() {
            out.extend_from_slice(&index.to_le_bytes());
        }
    }
    for position in &spec.positions {
        for v in position {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    for _ in &spec.positions {
        put_u32(out, 0);
    }
    for uv in &spec.uvs {
        for v in uv {
            out.extend_from_slice(&((v * 65536.0) as u16).to_le_bytes());
        }
    }
}
