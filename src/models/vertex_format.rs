/// Flexible vertex format (FVF) resolution for the "normal" geometry encoding.
///
/// An FVF is a 16-bit field whose sub-fields say which attributes a vertex
/// carries. Bits `[15:12]` and `[11:8]` each hold up to four UV sets (8 bytes
/// apiece), bits `[6:4]` hold three 12-byte attributes (tangent, bitangent and
/// one unidentified vector) and bits `[3:0]` hold position, bone index, normal
/// and diffuse colour. Attributes are tightly packed in that bit order.

/// UV sets; indexed by each of the two upper nibbles.
const UV_SET_SIZES: [u32; 16] = [
    0x00, 0x08, 0x08, 0x10, 0x08, 0x10, 0x10, 0x18, 0x08, 0x10, 0x10, 0x18, 0x10, 0x18, 0x18, 0x20,
];
/// Tangent frame; indexed by bits `[6:4]`.
const TANGENT_SIZES: [u32; 8] = [0x00, 0x0C, 0x0C, 0x18, 0x0C, 0x18, 0x18, 0x24];
/// Base attributes; indexed by bits `[3:0]`.
const BASE_SIZES: [u32; 16] = [
    0x00, 0x0C, 0x04, 0x10, 0x0C, 0x18, 0x10, 0x1C, 0x04, 0x10, 0x08, 0x14, 0x10, 0x1C, 0x14, 0x20,
];

/// Bit 7 is not assigned to any table. An FVF with it set has no defined layout.
const UNASSIGNED_BITS: u16 = 0x0080;

pub mod fvf_flags {
    pub const POSITION: u16 = 0x0001;
    pub const BONE_INDEX: u16 = 0x0002;
    pub const NORMAL: u16 = 0x0004;
    pub const DIFFUSE: u16 = 0x0008;
    pub const TANGENT: u16 = 0x0010;
    pub const BITANGENT: u16 = 0x0020;
    pub const EXTRA_VECTOR: u16 = 0x0040;
}

/// Byte stride of a vertex with the given FVF.
///
/// Returns `None` for an FVF that touches the unassigned bit or that
/// describes an empty vertex.
pub fn vertex_size(fvf: u16) -> Option<u32> {
    if fvf & UNASSIGNED_BITS != 0 {
        return None;
    }

    let size = UV_SET_SIZES[((fvf >> 12) & 0xF) as usize]
        + UV_SET_SIZES[((fvf >> 8) & 0xF) as usize]
        + TANGENT_SIZES[((fvf >> 4) & 0x7) as usize]
        + BASE_SIZES[(fvf & 0xF) as usize];

    (size != 0).then_some(size)
}

/// Bits of the on-disk FVF that [`from_dat_fvf`] reads.
const DAT_FVF_MASK: u32 = 0x3FFF;

/// Remap the FVF stored in a submesh header to the layout the size tables use.
///
/// On disk, bits `[11:4]` hold the two UV-set nibbles and bits `[13:12]` the
/// first two tangent-frame bits. Values with bits above `0x3FFF` give `None`.
pub fn from_dat_fvf(dat_fvf: u32) -> Option<u16> {
    if dat_fvf & !DAT_FVF_MASK != 0 {
        return None;
    }
    let fvf = ((dat_fvf & 0xFF0) << 4) | ((dat_fvf >> 8) & 0x30) | (dat_fvf & 0xF);
    Some(fvf as u16)
}

/// Which attributes an FVF declares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VertexAttributeSet {
    pub position: bool,
    pub bone_index: bool,
    pub normal: bool,
    pub diffuse: bool,
    pub tangent: bool,
    pub bitangent: bool,
    pub extra_vector: bool,
    pub uv_sets: u8,
}

/// Decode the attribute flags of an FVF without checking that it resolves.
pub fn decode_flags(fvf: u16) -> VertexAttributeSet {
    VertexAttributeSet {
        position: fvf & fvf_flags::POSITION != 0,
        bone_index: fvf & fvf_flags::BONE_INDEX != 0,
        normal: fvf & fvf_flags::NORMAL != 0,
        diffuse: fvf & fvf_flags::DIFFUSE != 0,
        tangent: fvf & fvf_flags::TANGENT != 0,
        bitangent: fvf & fvf_flags::BITANGENT != 0,
        extra_vector: fvf & fvf_flags::EXTRA_VECTOR != 0,
        uv_sets: ((fvf >> 12) & 0xF).count_ones() as u8 + ((fvf >> 8) & 0xF).count_ones() as u8,
    }
}

/// Semantic meaning of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeSemantic {
    Position,
    BoneIndex,
    Normal,
    Diffuse,
    Tangent,
    Bitangent,
    ExtraVector,
    TexCoord(u8),
}

/// How an attribute is stored in the vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeFormat {
    /// 3 x f32 = 12 bytes
    Float32x3,
    /// 2 x f32 = 8 bytes
    Float32x2,
    /// 4 opaque bytes
    Raw4,
}

impl AttributeFormat {
    pub fn size(self) -> u32 {
        match self {
            AttributeFormat::Float32x3 => 12,
            AttributeFormat::Float32x2 => 8,
            AttributeFormat::Raw4 => 4,
        }
    }
}

/// A single vertex attribute descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    pub semantic: AttributeSemantic,
    pub format: AttributeFormat,
    pub offset: usize,
}

/// Interleaved vertex layout with all attributes and the resolved stride.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexFormat {
    pub fvf: u16,
    pub attributes: Vec<VertexAttribute>,
    pub stride: usize,
}

impl VertexFormat {
    /// Lay out the attributes of `fvf`.
    ///
    /// Returns `None` when [`vertex_size`] cannot resolve the FVF.
    pub fn from_fvf(fvf: u16) -> Option<VertexFormat> {
        let stride = vertex_size(fvf)?;
        let flags = decode_flags(fvf);

        let mut attributes = Vec::new();
        let mut offset = 0usize;
        let mut push = |present: bool, semantic: AttributeSemantic, format: AttributeFormat| {
            if present {
                attributes.push(VertexAttribute {
                    semantic,
                    format,
                    offset,
                });
                offset += format.size() as usize;
            }
        };

        push(flags.position, AttributeSemantic::Position, AttributeFormat::Float32x3);
        push(flags.bone_index, AttributeSemantic::BoneIndex, AttributeFormat::Raw4);
        push(flags.normal, AttributeSemantic::Normal, AttributeFormat::Float32x3);
        push(flags.diffuse, AttributeSemantic::Diffuse, AttributeFormat::Raw4);
        push(flags.tangent, AttributeSemantic::Tangent, AttributeFormat::Float32x3);
        push(flags.bitangent, AttributeSemantic::Bitangent, AttributeFormat::Float32x3);
        push(flags.extra_vector, AttributeSemantic::ExtraVector, AttributeFormat::Float32x3);
        for set in 0..flags.uv_sets {
            push(true, AttributeSemantic::TexCoord(set), AttributeFormat::Float32x2);
        }

        debug_assert_eq!(offset, stride as usize);

        Some(VertexFormat {
            fvf,
            attributes,
            stride: stride as usize,
        })
    }

    pub fn attribute(&self, semantic: AttributeSemantic) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.semantic == semantic)
    }

    pub fn uv_sets(&self) -> impl Iterator<Item = &VertexAttribute> {
        self.attributes
            .iter()
            .filter(|a| matches!(a.semantic, AttributeSemantic::TexCoord(_)))
    }
}
