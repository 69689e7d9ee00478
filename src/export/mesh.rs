//! Skinned mesh assembly over a whole node hierarchy.

use std::collections::HashMap;

use bon::Builder;
use glam::{Mat3, Mat4};
use itertools::Itertools;
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::export::poly_stream::{ExportContext, VertexSnapshot, interpret_polygons};
use crate::export::vertex_stream::interpret_vertices;
use crate::models::geometry::Geometry;
use crate::models::node::NodeTree;
use crate::scene::{Bone, BoneWeight, Material, SkinnedMesh, Submesh, Vertex};

/// One weight byte step, plus float slack.
const WEIGHT_TOLERANCE: f32 = 1.0 / 255.0 + 1e-5;

#[derive(Builder, Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    /// Log and skip nodes whose geometry fails to interpret instead of
    /// failing the whole export. A skipped geometry leaves no vertices,
    /// materials or cache slots behind.
    #[builder(default)]
    pub skip_failed_geometry: bool,
}

/// Interpret one node's geometry into `ctx`.
pub fn interpret_geometry<'a>(
    ctx: &mut ExportContext<'a>,
    geometry: &'a Geometry,
    world: &Mat4,
    node: u32,
) -> Result<(), DecodeError> {
    interpret_vertices(
        &mut ctx.cache,
        &geometry.vertex_chunks,
        &geometry.vertex_offsets,
        world,
        node,
    )?;
    let mut material = Material::default();
    interpret_polygons(
        ctx,
        &geometry.poly_chunks,
        &geometry.poly_offsets,
        0,
        false,
        &mut material,
    )
}

/// Export every geometry under the tree's root into one skinned mesh.
///
/// Nodes are visited depth-first, children before siblings, sharing one
/// vertex cache and one set of polygon cache slots. Each visited node is a
/// bone, whether or not it has geometry. Output positions and normals are
/// relative to the root node.
pub fn export_model(tree: &NodeTree, options: &ExportOptions) -> Result<SkinnedMesh, DecodeError> {
    let visits = tree.depth_first();
    let Some(root) = visits.first() else {
        return Ok(SkinnedMesh::default());
    };
    let root_inverse = root.world.inverse();

    let mut ctx = ExportContext::new();
    for visit in &visits {
        let Some(geometry) = &tree.node(visit.id).geometry else {
            continue;
        };
        let node = visit.index as u32;
        let checkpoint = options.skip_failed_geometry.then(|| ctx.checkpoint());
        if let Err(err) = interpret_geometry(&mut ctx, geometry, &visit.world, node) {
            let Some(checkpoint) = checkpoint else {
                return Err(err);
            };
            warn!(node, %err, "skipping geometry");
            ctx.rollback(checkpoint);
        }
    }

    let mut visit_of = vec![0u32; tree.len()];
    for visit in &visits {
        visit_of[visit.id.0] = visit.index as u32;
    }
    let bones = visits
        .iter()
        .map(|visit| {
            let node = tree.node(visit.id);
            Bone {
                index: visit.index as u32,
                parent: node.parent.map(|parent| visit_of[parent.0]),
                local: node.local_transform(),
                world: visit.world,
            }
        })
        .collect();

    let mesh = SkinnedMesh {
        bones,
        submeshes: assemble(&ctx, &root_inverse),
        materials: ctx.materials,
    };
    debug!(
        bones = mesh.bones.len(),
        submeshes = mesh.submeshes.len(),
        triangles = mesh.triangle_count(),
        "exported model"
    );
    Ok(mesh)
}

/// Export a single geometry with an identity transform and one bone.
pub fn export_geometry(geometry: &Geometry) -> Result<SkinnedMesh, DecodeError> {
    let mut ctx = ExportContext::new();
    interpret_geometry(&mut ctx, geometry, &Mat4::IDENTITY, 0)?;
    Ok(SkinnedMesh {
        bones: vec![Bone {
            index: 0,
            parent: None,
            local: Mat4::IDENTITY,
            world: Mat4::IDENTITY,
        }],
        submeshes: assemble(&ctx, &Mat4::IDENTITY),
        materials: ctx.materials,
    })
}

/// Group triangle records by material and build one submesh per material,
/// numbering vertices locally.
fn assemble(ctx: &ExportContext<'_>, root_inverse: &Mat4) -> Vec<Submesh> {
    let linear = Mat3::from_mat4(*root_inverse);
    let groups = ctx.triangles.iter().into_group_map_by(|t| t.material);

    let mut submeshes = Vec::with_capacity(groups.len());
    for material in 0..ctx.materials.len() {
        let Some(records) = groups.get(&material) else {
            continue;
        };

        let mut submesh = Submesh {
            material,
            ..Default::default()
        };
        let mut local: HashMap<(usize, usize), u32> = HashMap::new();
        for record in records {
            let index = *local.entry((record.snapshot, record.uv)).or_insert_with(|| {
                let snapshot = &ctx.snapshots[record.snapshot];
                submesh
                    .vertices
                    .push(export_vertex(snapshot, record.uv, root_inverse, &linear));
                (submesh.vertices.len() - 1) as u32
            });
            submesh.indices.push(index);
        }
        submeshes.push(submesh);
    }
    submeshes
}

fn export_vertex(snapshot: &VertexSnapshot, uv: usize, root_inverse: &Mat4, linear: &Mat3) -> Vertex {
    let cached = &snapshot.vertex;

    let mut weights: Vec<BoneWeight> = Vec::with_capacity(cached.weights.len());
    for &(bone, weight) in &cached.weights {
        match weights.iter_mut().find(|w| w.bone == bone) {
            Some(existing) => existing.weight += weight,
            None => weights.push(BoneWeight { bone, weight }),
        }
    }
    weights.sort_by_key(|w| w.bone);

    let total = cached.weight_sum();
    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
        warn!(id = snapshot.id, total, "vertex weights do not sum to one");
    }
    if total > 0.0 {
        for w in &mut weights {
            w.weight /= total;
        }
    }

    Vertex {
        position: root_inverse.transform_point3(cached.position),
        normal: (*linear * cached.normal).normalize_or_zero(),
        uv: snapshot.uvs.get(uv).copied().unwrap_or_default(),
        color: cached.color,
        weights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    use crate::models::material::TextureChunk;
    use crate::models::node::Node;
    use crate::models::poly_chunk::PolyChunk;
    use crate::models::strip::{Strip, StripChunk, StripFlags, StripFormat};
    use crate::models::vertex_chunk::{ChunkVertex, VertexChunk};
    use crate::models::vertex_format::VertexFormat;

    fn triangle_geometry(base: u16) -> Geometry {
        let vertices = [Vec3::ZERO, Vec3::X, Vec3::Y]
            .into_iter()
            .map(|position| ChunkVertex {
                position,
                normal: Some(Vec3::Z),
                ..Default::default()
            })
            .collect();
        Geometry::new(
            vec![VertexChunk::new(VertexFormat::Normal, base, vertices)],
            vec![PolyChunk::Strip(StripChunk {
                format: StripFormat::Plain,
                flags: StripFlags::empty(),
                user_offset: 0,
                strips: vec![Strip::new(vec![base, base + 1, base + 2], false)],
            })],
        )
    }

    #[test]
    fn geometry_less_nodes_still_count_as_bones() {
        let mut tree = NodeTree::new();
        let root = tree.add_root(Node::default());
        let mut child = Node::with_transform(Vec3::new(0.0, 0.0, 3.0), [0; 3], Vec3::ONE);
        child.geometry = Some(triangle_geometry(0));
        tree.add_child(root, child);

        let mesh = export_model(&tree, &ExportOptions::default()).unwrap();
        assert_eq!(mesh.bones.len(), 2);
        assert_eq!(mesh.bones[1].parent, Some(0));
        assert_eq!(mesh.submeshes.len(), 1);

        let submesh = &mesh.submeshes[0];
        assert_eq!(submesh.indices, vec![0, 1, 2]);
        assert_eq!(submesh.vertices[1].position, Vec3::new(1.0, 0.0, 3.0));
        assert_eq!(submesh.vertices[1].weights, vec![BoneWeight { bone: 1, weight: 1.0 }]);
    }

    #[test]
    fn positions_are_relative_to_the_root() {
        let mut tree = NodeTree::new();
        let mut root = Node::with_transform(Vec3::new(10.0, 0.0, 0.0), [0; 3], Vec3::ONE);
        root.geometry = Some(triangle_geometry(0));
        tree.add_root(root);

        let mesh = export_model(&tree, &ExportOptions::default()).unwrap();
        let positions: Vec<_> = mesh.submeshes[0].vertices.iter().map(|v| v.position).collect();
        assert_eq!(positions, vec![Vec3::ZERO, Vec3::X, Vec3::Y]);
    }

    #[test]
    fn failed_geometry_can_be_skipped() {
        let mut tree = NodeTree::new();
        let mut broken = triangle_geometry(0);
        broken.vertex_chunks.clear();
        let mut root = Node::default();
        root.geometry = Some(broken);
        let root = tree.add_root(root);
        let mut child = Node::default();
        child.geometry = Some(triangle_geometry(0));
        tree.add_child(root, child);

        assert!(matches!(
            export_model(&tree, &ExportOptions::default()),
            Err(DecodeError::DanglingStripReference { id: 0, .. })
        ));

        let options = ExportOptions::builder().skip_failed_geometry(true).build();
        let mesh = export_model(&tree, &options).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn skipped_geometry_leaves_nothing_behind() {
        let mut broken = triangle_geometry(0);
        broken.poly_chunks.insert(
            0,
            PolyChunk::TextureId(TextureChunk {
                id: 7,
                ..Default::default()
            }),
        );
        let PolyChunk::Strip(strip) = &mut broken.poly_chunks[1] else {
            panic!("expected a strip chunk");
        };
        strip.strips[0].indices[2] = 9;

        let options = ExportOptions::builder().skip_failed_geometry(true).build();
        let tree_with = |child_geometry: Geometry| {
            let mut tree = NodeTree::new();
            let mut root = Node::default();
            root.geometry = Some(broken.clone());
            let root = tree.add_root(root);
            let mut child = Node::default();
            child.geometry = Some(child_geometry);
            tree.add_child(root, child);
            tree
        };

        let mesh = export_model(&tree_with(triangle_geometry(0)), &options).unwrap();
        assert_eq!(mesh.materials, vec![Material::default()]);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.triangle_count(), 1);

        // The skipped node's vertex writes are gone too, so a node that only
        // draws them has nothing to reference.
        let mut draws_only = triangle_geometry(0);
        draws_only.vertex_chunks.clear();
        let mesh = export_model(&tree_with(draws_only), &options).unwrap();
        assert_eq!(mesh.triangle_count(), 0);
        assert!(mesh.materials.is_empty());
    }

    #[test]
    fn single_geometry_export() {
        let mesh = export_geometry(&triangle_geometry(4)).unwrap();
        assert_eq!(mesh.bones.len(), 1);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.materials, vec![Material::default()]);
    }
}
