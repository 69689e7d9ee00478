/// Chunk type table and 16/32-bit chunk headers
pub mod chunk;
/// Packed colour codecs
pub mod color;
/// Geometry records
pub mod geometry;
/// Material, blend and texture state chunks
pub mod material;
/// Node hierarchy and node records
pub mod node;
/// Polygon chunk lists
pub mod poly_chunk;
/// Strip chunks and strip expansion
pub mod strip;
/// Vertex chunk lists
pub mod vertex_chunk;
/// Vertex chunk formats and attribute layouts
pub mod vertex_format;
