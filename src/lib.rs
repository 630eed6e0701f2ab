/// Shared parsing helpers
pub mod data;
/// Error definitions
pub mod error;
/// Serialised forms of decoded models
pub mod export;
/// FFNA containers and their geometry chunks
pub mod models;

pub use models::model::{DecodeOptions, ModelGeometry, compare_bindings, decode_model};
