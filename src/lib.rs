/// Binary reading and writing helpers shared by every chunk type
pub mod data;
/// Error definitions
pub mod error;
/// Forward conversion: chunk lists across a node hierarchy into skinned meshes
pub mod export;
/// Inverse conversion: skinned meshes into per-node chunk lists
pub mod import;
/// Chunk, geometry and node models with their binary codecs
pub mod models;
/// Generic wrapper for values that may or may not match a known variant.
pub mod recognized;
/// Format-neutral skinned mesh types
pub mod scene;
