use thiserror::Error;

use crate::models::sections::SectionKind;

/// Every way decoding an FFNA container can fail.
///
/// All variants are recoverable at file granularity: a batch caller logs the
/// error and moves on to the next file.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("bad container signature: expected \"ffna\" + type byte, got {got:02X?}")]
    BadSignature { got: Vec<u8> },
    #[error("expected a model container (type 2), got type {kind}")]
    UnexpectedContainerKind { kind: u8 },
    #[error(
        "chunk 0x{id:X} at offset 0x{offset:X} declares 0x{size:X} payload bytes but only 0x{available:X} remain"
    )]
    TruncatedContainer {
        id: u32,
        offset: usize,
        size: u32,
        available: usize,
    },
    #[error("no geometry chunk (0xFA0 or 0xBB8) in container")]
    MissingGeometryChunk,
    #[error("geometry header too short: need 0x30 bytes, have 0x{have:X}")]
    HeaderTooShort { have: usize },
    #[error("{section} at offset 0x{offset:X} needs 0x{need:X} bytes but the chunk ends at 0x{end:X}")]
    SectionOverrun {
        section: SectionKind,
        offset: usize,
        need: usize,
        end: usize,
    },
    #[error("class flag 0x{flag:03X} ({section}) is set but its layout is not supported")]
    UnsupportedSection { flag: u32, section: SectionKind },
    #[error("stored FVF 0x{fvf:X} has no usable vertex layout")]
    UnknownFvf { fvf: u32 },
    #[error("submesh {submesh}: index count {num_indices} is not a multiple of 3")]
    IncompleteTriangle { submesh: usize, num_indices: u32 },
    #[error(
        "submesh {submesh}: index {value} at position {position} is out of range for {num_vertices} vertices"
    )]
    IndexOutOfRange {
        submesh: usize,
        position: usize,
        value: u16,
        num_vertices: u32,
    },
    #[error("unknown pixel shader type {tag}")]
    UnknownPixelShaderType { tag: u8 },
    #[error("texture bindings differ between encodings at submesh {submesh}: {detail}")]
    ReconciliationMismatch { submesh: usize, detail: String },
    #[error("winnow parse error at 0x{offset:X}: {detail}")]
    Parse { offset: usize, detail: String },
    #[cfg(feature = "json")]
    #[error("json error: {0}")]
    Json(String),
}
