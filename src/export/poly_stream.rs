//! Polygon-list interpretation: material state, cached segments and strips.

use std::collections::HashMap;

use glam::Vec2;
use tracing::{debug, trace};

use crate::error::{ChunkLocation, DecodeError};
use crate::export::vertex_cache::{CachedVertex, VertexCache};
use crate::models::poly_chunk::PolyChunk;
use crate::models::strip::StripChunk;
use crate::scene::{Material, TextureSlot};

/// A cached vertex as it was when a strip referenced it.
#[derive(Debug, Clone)]
pub struct VertexSnapshot {
    pub id: u32,
    pub vertex: CachedVertex,
    /// Every UV this vertex was drawn with, in first-seen order.
    pub uvs: Vec<Vec2>,
}

impl VertexSnapshot {
    fn uv_index(&mut self, uv: Vec2) -> usize {
        match self.uvs.iter().position(|known| *known == uv) {
            Some(index) => index,
            None => {
                self.uvs.push(uv);
                self.uvs.len() - 1
            }
        }
    }
}

/// One corner of an emitted triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriangleVertex {
    /// Index into [`ExportContext::snapshots`].
    pub snapshot: usize,
    /// Index into that snapshot's `uvs`.
    pub uv: usize,
    /// Index into [`ExportContext::materials`].
    pub material: usize,
}

#[derive(Debug, Clone, Copy)]
struct CachedSegment<'a> {
    chunks: &'a [PolyChunk],
    offsets: &'a [usize],
    resume: usize,
}

/// What [`ExportContext::rollback`] restores.
#[derive(Debug)]
pub struct Checkpoint<'a> {
    cache: VertexCache,
    slots: HashMap<u8, CachedSegment<'a>>,
    materials: usize,
    snapshots: usize,
    triangles: usize,
}

/// Everything one hierarchy traversal accumulates. Nothing here is global:
/// each export owns its own context.
#[derive(Debug, Default)]
pub struct ExportContext<'a> {
    pub cache: VertexCache,
    slots: HashMap<u8, CachedSegment<'a>>,
    pub materials: Vec<Material>,
    material_lookup: HashMap<Material, usize>,
    pub snapshots: Vec<VertexSnapshot>,
    snapshot_lookup: HashMap<(u32, u64), usize>,
    pub triangles: Vec<TriangleVertex>,
}

impl<'a> ExportContext<'a> {
    pub fn new() -> Self {
        ExportContext::default()
    }

    pub fn checkpoint(&self) -> Checkpoint<'a> {
        Checkpoint {
            cache: self.cache.clone(),
            slots: self.slots.clone(),
            materials: self.materials.len(),
            snapshots: self.snapshots.len(),
            triangles: self.triangles.len(),
        }
    }

    /// Undo everything interpreted since `checkpoint` was taken.
    pub fn rollback(&mut self, checkpoint: Checkpoint<'a>) {
        self.cache = checkpoint.cache;
        self.slots = checkpoint.slots;
        self.materials.truncate(checkpoint.materials);
        self.material_lookup
            .retain(|_, index| *index < checkpoint.materials);
        self.snapshots.truncate(checkpoint.snapshots);
        self.snapshot_lookup
            .retain(|_, index| *index < checkpoint.snapshots);
        self.triangles.truncate(checkpoint.triangles);
    }

    pub fn is_slot_cached(&self, slot: u8) -> bool {
        self.slots.contains_key(&slot)
    }

    fn material_index(&mut self, material: Material) -> usize {
        if let Some(&index) = self.material_lookup.get(&material) {
            return index;
        }
        let index = self.materials.len();
        self.materials.push(material);
        self.material_lookup.insert(material, index);
        index
    }

    fn snapshot(&mut self, id: u32) -> Option<usize> {
        let vertex = self.cache.get(id)?;
        let key = (id, vertex.serial);
        if let Some(&index) = self.snapshot_lookup.get(&key) {
            return Some(index);
        }
        let index = self.snapshots.len();
        self.snapshots.push(VertexSnapshot {
            id,
            vertex: vertex.clone(),
            uvs: Vec::new(),
        });
        self.snapshot_lookup.insert(key, index);
        Some(index)
    }

    fn push_strips(
        &mut self,
        strip_chunk: &StripChunk,
        location: ChunkLocation,
        material: &Material,
    ) -> Result<(), DecodeError> {
        if strip_chunk.strips.iter().all(|strip| strip.indices.len() < 3) {
            return Ok(());
        }

        let material_index = self.material_index(Material {
            strip_flags: strip_chunk.flags,
            ..*material
        });
        let precision = strip_chunk.format.uv();

        for strip in &strip_chunk.strips {
            for corner in strip.triangle_corners() {
                let id = u32::from(strip.indices[corner]);
                let snapshot = self
                    .snapshot(id)
                    .ok_or(DecodeError::DanglingStripReference { location, id })?;
                let uv = match (precision, strip.uvs.get(corner)) {
                    (Some(precision), Some(raw)) => precision.decode(*raw),
                    _ => Vec2::ZERO,
                };
                let uv = self.snapshots[snapshot].uv_index(uv);
                self.triangles.push(TriangleVertex {
                    snapshot,
                    uv,
                    material: material_index,
                });
            }
        }
        Ok(())
    }
}

/// Apply a material-state chunk. Returns `false` for chunks that are not
/// material state.
fn apply_state(chunk: &PolyChunk, material: &mut Material) -> bool {
    match chunk {
        PolyChunk::BlendAlpha(blend) => material.set_blend(*blend),
        PolyChunk::MipmapDAdjust(bias) => material.texture.mipmap_bias = *bias,
        PolyChunk::SpecularExponent(exponent) => material.exponent = *exponent,
        // Second-texture state has no slot in the interchange material.
        PolyChunk::TextureId(texture) if texture.second_texture => {}
        PolyChunk::TextureId(texture) => material.texture = TextureSlot::from_chunk(texture),
        PolyChunk::Material(chunk) if chunk.second_texture => {}
        PolyChunk::Material(chunk) => {
            material.set_blend(chunk.blend);
            if let Some(diffuse) = chunk.diffuse {
                material.diffuse = diffuse;
            }
            if let Some(ambient) = chunk.ambient {
                material.ambient = ambient;
            }
            if let Some(specular) = chunk.specular {
                material.specular = specular.with_alpha(0xFF);
                material.exponent = specular.a;
            }
        }
        _ => return false,
    }
    true
}

/// Interpret `chunks[start..]`.
///
/// A cache marker records the rest of the list under its slot and ends the
/// pass. A draw marker replays a recorded suffix with `was_cached` set; cache
/// and draw markers are not allowed inside such a replay.
pub fn interpret_polygons<'a>(
    ctx: &mut ExportContext<'a>,
    chunks: &'a [PolyChunk],
    offsets: &'a [usize],
    start: usize,
    was_cached: bool,
    material: &mut Material,
) -> Result<(), DecodeError> {
    for (index, chunk) in chunks.iter().enumerate().skip(start) {
        let location = ChunkLocation::new(index, offsets.get(index).copied());

        if apply_state(chunk, material) {
            continue;
        }

        match chunk {
            PolyChunk::CachePolygonList(_) | PolyChunk::DrawPolygonList(_) if was_cached => {
                return Err(DecodeError::NestedCacheViolation {
                    location,
                    chunk_type: chunk.type_byte(),
                });
            }
            PolyChunk::CachePolygonList(slot) => {
                trace!(slot, resume = index + 1, "caching polygon list");
                ctx.slots.insert(
                    *slot,
                    CachedSegment {
                        chunks,
                        offsets,
                        resume: index + 1,
                    },
                );
                break;
            }
            PolyChunk::DrawPolygonList(slot) => {
                let Some(segment) = ctx.slots.get(slot).copied() else {
                    debug!(slot, %location, "draw of a polygon list that was never cached");
                    continue;
                };
                interpret_polygons(
                    ctx,
                    segment.chunks,
                    segment.offsets,
                    segment.resume,
                    true,
                    material,
                )?;
            }
            PolyChunk::Strip(strip_chunk) => ctx.push_strips(strip_chunk, location, material)?,
            PolyChunk::Bump(_) | PolyChunk::Volume(_) => {
                trace!(chunk_type = chunk.type_byte(), "skipping chunk");
            }
            // Material state, handled above.
            _ => {}
        }
    }
    Ok(())
}
