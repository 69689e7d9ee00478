/// Skinned mesh assembly across a node hierarchy
pub mod mesh;
/// Polygon-list interpretation
pub mod poly_stream;
/// The cross-node vertex cache
pub mod vertex_cache;
/// Vertex-list interpretation
pub mod vertex_stream;

pub use mesh::{ExportOptions, export_geometry, export_model};
