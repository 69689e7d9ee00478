//! Polygon-list emission: material deltas and strip chunks.

use std::collections::HashMap;

use glam::Vec2;
use meshopt_rs::INVALID_INDEX;
use meshopt_rs::stripify::{stripify, stripify_bound};
use tracing::warn;

use crate::models::material::{MAX_FLAGS_EXPONENT, MaterialChunk, MaterialColors};
use crate::models::poly_chunk::PolyChunk;
use crate::models::strip::{
    MAX_STRIP_LEN, MAX_STRIPS_PER_CHUNK, Strip, StripChunk, StripFormat, UvPrecision,
};
use crate::scene::Material;

/// Words a strip chunk's size field can describe.
const STRIP_CHUNK_WORDS: usize = u16::MAX as usize;

/// The fewest state chunks that turn `previous` into `next`.
///
/// Colour changes are covered by one material chunk carrying exactly the
/// changed colours (and the blend modes). Otherwise a blend change gets a
/// blend-alpha chunk. Exponents that fit the flags byte use a
/// specular-exponent chunk; larger ones ride on the specular colour's alpha.
/// Texture changes use a texture-id chunk, or a mipmap chunk when only the
/// bias moved. Strip flags travel on the strip chunks themselves.
pub fn material_delta(previous: &Material, next: &Material) -> Vec<PolyChunk> {
    let mut chunks = Vec::new();

    let exponent_changed = previous.exponent != next.exponent;
    let mut colors = MaterialColors::empty();
    colors.set(MaterialColors::DIFFUSE, previous.diffuse != next.diffuse);
    colors.set(MaterialColors::AMBIENT, previous.ambient != next.ambient);
    colors.set(
        MaterialColors::SPECULAR,
        previous.specular != next.specular || (exponent_changed && next.exponent > MAX_FLAGS_EXPONENT),
    );

    if !colors.is_empty() {
        chunks.push(PolyChunk::Material(MaterialChunk {
            second_texture: false,
            blend: next.blend(),
            diffuse: colors.contains(MaterialColors::DIFFUSE).then_some(next.diffuse),
            ambient: colors.contains(MaterialColors::AMBIENT).then_some(next.ambient),
            specular: colors
                .contains(MaterialColors::SPECULAR)
                .then_some(next.specular.with_alpha(next.exponent)),
        }));
    } else if previous.blend() != next.blend() {
        chunks.push(PolyChunk::BlendAlpha(next.blend()));
    }

    if exponent_changed && !colors.contains(MaterialColors::SPECULAR) {
        chunks.push(PolyChunk::SpecularExponent(next.exponent));
    }

    if !previous.texture.same_binding(&next.texture) {
        chunks.push(PolyChunk::TextureId(next.texture.to_chunk()));
    } else if previous.texture.mipmap_bias != next.texture.mipmap_bias {
        chunks.push(PolyChunk::MipmapDAdjust(next.texture.mipmap_bias));
    }

    chunks
}

/// Strips covering `triangles`, as `(indices, reversed)` runs.
///
/// meshopt separates strips with a restart index but still joins some
/// triangles through a degenerate swap, so each strip is cut wherever a
/// degenerate triangle would be drawn. Degenerate input triangles are dropped.
fn build_strips(triangles: &[[u16; 3]]) -> Vec<(Vec<u16>, bool)> {
    let Some(&highest) = triangles.iter().flatten().max() else {
        return Vec::new();
    };
    let indices: Vec<u32> = triangles.iter().flatten().map(|&id| u32::from(id)).collect();
    let mut destination = vec![0u32; stripify_bound(indices.len())];
    let len = stripify(&mut destination, &indices, usize::from(highest) + 1, INVALID_INDEX);
    destination.truncate(len);

    destination
        .split(|&index| index == INVALID_INDEX)
        .flat_map(degenerate_free_runs)
        .collect()
}

fn degenerate_free_runs(strip: &[u32]) -> Vec<(Vec<u16>, bool)> {
    let triangle_count = strip.len().saturating_sub(2);
    let mut runs = Vec::new();
    let mut first = None;
    for k in 0..=triangle_count {
        let degenerate = k == triangle_count || {
            let (a, b, c) = (strip[k], strip[k + 1], strip[k + 2]);
            a == b || b == c || a == c
        };
        match (first, degenerate) {
            (None, false) => first = Some(k),
            (Some(start), true) => {
                // Ids went in as u16.
                let indices = strip[start..k + 2].iter().map(|&id| id as u16).collect();
                runs.push((indices, start % 2 == 1));
                first = None;
            }
            _ => {}
        }
    }
    runs
}

/// Split a strip into pieces of at most `max_len` indices, overlapping by two
/// and keeping every triangle's winding.
fn split_strip(indices: &[u16], reversed: bool, max_len: usize) -> Vec<Strip> {
    let mut strips = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + max_len).min(indices.len());
        strips.push(Strip::new(indices[start..end].to_vec(), reversed ^ (start % 2 == 1)));
        if end == indices.len() {
            break;
        }
        start = end - 2;
    }
    strips
}

/// Stripify a triangle list of vertex ids into strip chunks.
///
/// UVs come from `uvs` by vertex id. Chunks are split so neither the strip
/// count nor the size word overflows.
pub fn strip_chunks(
    triangles: &[[u16; 3]],
    uvs: &HashMap<u16, Vec2>,
    precision: UvPrecision,
    material: &Material,
) -> Vec<StripChunk> {
    let textured = triangles
        .iter()
        .flatten()
        .any(|id| uvs.get(id).is_some_and(|uv| *uv != Vec2::ZERO));
    let format = StripFormat::with_uv(textured.then_some(precision));
    let words_per_index = format.words_per_index();
    let max_len = MAX_STRIP_LEN.min((STRIP_CHUNK_WORDS - 2) / words_per_index);

    let mut clamped = 0usize;
    let mut strips = Vec::new();
    for (indices, reversed) in build_strips(triangles) {
        for mut strip in split_strip(&indices, reversed, max_len) {
            if let Some(precision) = format.uv() {
                strip.uvs = strip
                    .indices
                    .iter()
                    .map(|id| {
                        let (raw, was_clamped) = precision.encode(uvs.get(id).copied().unwrap_or_default());
                        clamped += usize::from(was_clamped);
                        raw
                    })
                    .collect();
            }
            strips.push(strip);
        }
    }
    if clamped > 0 {
        warn!(clamped, ?precision, "UVs outside the strip format's range were clamped");
    }

    let mut chunks = Vec::new();
    let mut current: Vec<Strip> = Vec::new();
    let mut words = 1;
    for strip in strips {
        let cost = 1 + strip.indices.len() * words_per_index;
        if !current.is_empty() && (words + cost > STRIP_CHUNK_WORDS || current.len() == MAX_STRIPS_PER_CHUNK) {
            chunks.push(StripChunk {
                format,
                flags: material.strip_flags,
                user_offset: 0,
                strips: std::mem::take(&mut current),
            });
            words = 1;
        }
        words += cost;
        current.push(strip);
    }
    if !current.is_empty() {
        chunks.push(StripChunk {
            format,
            flags: material.strip_flags,
            user_offset: 0,
            strips: current,
        });
    }
    chunks
}
