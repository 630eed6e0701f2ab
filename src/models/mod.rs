/// FFNA container signature and chunk walking
pub mod chunk;
/// Texture filename chunks and file hash decoding
pub mod filenames;
/// Geometry chunk header and the two chunk encodings
pub mod geometry;
/// End-to-end decoding of a model container
pub mod model;
/// Reduction of both texture binding layouts to one canonical form
pub mod reconcile;
/// Optional sections between the geometry header and the submeshes
pub mod sections;
/// Submesh headers, indices and vertices
pub mod submesh;
/// Flexible vertex format (FVF) resolution
pub mod vertex_format;

#[cfg(test)]
pub(crate) mod fixtures;
