//! Vertex-list interpretation: write every vertex of a node's geometry into
//! the shared cache under that node's world transform.

use glam::{Mat3, Mat4, Vec3};
use tracing::trace;

use crate::error::{ChunkLocation, DecodeError};
use crate::export::vertex_cache::VertexCache;
use crate::models::vertex_chunk::{MAX_VERTICES_PER_CHUNK, VertexChunk, WeightStatus};

/// Interpret `chunks` for the node with visit index `node`.
///
/// Plain formats overwrite `base_index + local` with a single full-weight
/// contribution. Weighted formats scale the transformed position and normal
/// by their weight byte; a `Start` write (or a write to an id nobody has
/// written yet) begins a new entry, anything else adds to the existing one.
pub fn interpret_vertices(
    cache: &mut VertexCache,
    chunks: &[VertexChunk],
    offsets: &[usize],
    world: &Mat4,
    node: u32,
) -> Result<(), DecodeError> {
    let linear = Mat3::from_mat4(*world);

    for (index, chunk) in chunks.iter().enumerate() {
        if chunk.vertices.len() > MAX_VERTICES_PER_CHUNK {
            return Err(DecodeError::OversizedVertexChunk {
                location: ChunkLocation::new(index, offsets.get(index).copied()),
                count: chunk.vertices.len() as u32,
            });
        }

        let weighted = chunk.format.is_weighted();
        let status = chunk.weight_status();
        trace!(
            node,
            chunk = index,
            format = ?chunk.format,
            count = chunk.vertices.len(),
            base = chunk.base_index,
            ?status,
            "vertex chunk"
        );

        for (local, vertex) in chunk.vertices.iter().enumerate() {
            let id = chunk.vertex_id(local);
            let position = world.transform_point3(vertex.position);
            let normal = vertex.normal.map_or(Vec3::ZERO, |n| linear * n);

            match vertex.ninja_flags {
                Some(flags) if weighted => {
                    let weight = flags.weight_factor();
                    let (position, normal) = (position * weight, normal * weight);
                    if status == WeightStatus::Start
                        || !cache.accumulate(id, position, normal, node, weight)
                    {
                        cache.overwrite(id, position, normal, vertex.diffuse, node, weight);
                    }
                }
                _ => cache.overwrite(id, position, normal, vertex.diffuse, node, 1.0),
            }
        }
    }

    Ok(())
}
