//! Inverse conversion: split skinned meshes back into per-node vertex and
//! polygon chunk lists.
//!
//! Vertices rigidly bound to the node that draws them become plain
//! `Normal` (or `NormalDiffuse8`) chunks with ids counting up from 0.
//! Blended vertices get synthetic ids counting down from 4095 and are
//! written once per influencing node as `NormalNinjaFlags` chunks, in
//! visit order, so the vertex cache has summed every contribution by the
//! time the drawing node's strips reference it.

/// Material deltas and strip chunk emission
pub mod poly;
/// Weight quantization and write-status assignment
pub mod weights;

use std::collections::{BTreeMap, HashMap};

use bon::Builder;
use glam::{Mat4, Vec2};
use thiserror::Error;
use tracing::{debug, trace};

use crate::error::IResult;
use crate::export::{ExportOptions, export_model};
use crate::models::color::Color;
use crate::models::geometry::Geometry;
use crate::models::node::{NodeId, NodeTree, Visit};
use crate::models::poly_chunk::PolyChunk;
use crate::models::strip::UvPrecision;
use crate::models::vertex_chunk::{
    ChunkVertex, MAX_VERTICES_PER_CHUNK, NinjaFlags, VertexChunk, WeightStatus,
};
use crate::models::vertex_format::VertexFormat;
use crate::scene::{Material, SkinnedMesh, Vertex};

use self::poly::{material_delta, strip_chunks};
use self::weights::{quantize_weights, weight_status};

/// Highest vertex id; synthetic ids are handed out downwards from here.
pub const FIRST_SYNTHETIC_ID: u32 = 4095;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("node {node} is not in the tree")]
    UnknownNode { node: usize },
    #[error("bone {bone} does not name a node in the tree")]
    UnknownBone { bone: u32 },
    #[error("submesh uses material {material} but the mesh has {count}")]
    UnknownMaterial { material: usize, count: usize },
    #[error("triangle index {index} is out of range for {count} vertices")]
    IndexOutOfRange { index: u32, count: usize },
    #[error(
        "a vertex drawn by node {owner} is weighted to bone {bone}, which is visited after it"
    )]
    UnorderedWeights { owner: u32, bone: u32 },
    #[error("more than {} blended vertices", FIRST_SYNTHETIC_ID + 1)]
    SyntheticIdsExhausted,
    #[error("vertex id {ordinary} overlaps the blended vertex ids starting at {synthetic}")]
    IdCollision { ordinary: u32, synthetic: u32 },
    #[error("{count} vertices do not fit in 16-bit vertex ids")]
    TooManyVertices { count: usize },
}

#[derive(Builder, Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Strip UV format used for textured submeshes.
    #[builder(default)]
    pub uv_precision: UvPrecision,
}

/// A mesh to be drawn by `node`. Positions and normals are relative to the
/// tree's root node, and bone indices are depth-first visit indices, as
/// produced by [`crate::export::export_model`].
#[derive(Debug, Clone, Copy)]
pub struct NodeMesh<'a> {
    pub node: NodeId,
    pub mesh: &'a SkinnedMesh,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Nodes whose geometry was replaced.
    pub meshes: usize,
    /// Vertex-only geometries created to host blended vertices.
    pub supplementary_geometries: usize,
    pub ordinary_vertices: usize,
    pub blended_vertices: usize,
    pub lowest_synthetic_id: Option<u32>,
}

/// Exact-bits identity of an interchange vertex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VertexKey(Vec<u32>);

impl VertexKey {
    fn new(vertex: &Vertex) -> Self {
        let mut bits: Vec<u32> = vertex
            .position
            .to_array()
            .into_iter()
            .chain(vertex.normal.to_array())
            .chain(vertex.uv.to_array())
            .map(f32::to_bits)
            .collect();
        match vertex.color {
            Some(color) => bits.extend([1, color.to_argb8888()]),
            None => bits.push(0),
        }
        for weight in &vertex.weights {
            bits.extend([weight.bone, weight.weight.to_bits()]);
        }
        VertexKey(bits)
    }
}

struct SyntheticIds {
    next: Option<u32>,
    lowest: Option<u32>,
}

impl SyntheticIds {
    fn new() -> Self {
        SyntheticIds {
            next: Some(FIRST_SYNTHETIC_ID),
            lowest: None,
        }
    }

    fn allocate(&mut self) -> Result<u32, ImportError> {
        let id = self.next.ok_or(ImportError::SyntheticIdsExhausted)?;
        self.next = id.checked_sub(1);
        self.lowest = Some(id);
        Ok(id)
    }
}

/// Blended vertex writes queued for one node, by write status.
#[derive(Default)]
struct BlendedWrites {
    by_status: [Vec<ChunkVertex>; 3],
}

impl BlendedWrites {
    fn push(&mut self, status: WeightStatus, vertex: ChunkVertex) {
        let slot = match status {
            WeightStatus::Start => 0,
            WeightStatus::Middle => 1,
            WeightStatus::End => 2,
        };
        self.by_status[slot].push(vertex);
    }

    fn into_chunks(self) -> Vec<VertexChunk> {
        let statuses = [WeightStatus::Start, WeightStatus::Middle, WeightStatus::End];
        let mut chunks = Vec::new();
        for (status, vertices) in statuses.into_iter().zip(self.by_status) {
            for part in vertices.chunks(MAX_VERTICES_PER_CHUNK) {
                let mut chunk = VertexChunk::new(VertexFormat::NormalNinjaFlags, 0, part.to_vec());
                chunk.set_weight_status(status);
                chunks.push(chunk);
            }
        }
        chunks
    }
}

struct TreeInfo {
    visits: Vec<Visit>,
    visit_of: Vec<usize>,
    root_world: Mat4,
}

impl TreeInfo {
    fn new(tree: &NodeTree) -> Self {
        let visits = tree.depth_first();
        let visit_of = tree.visit_indices();
        let root_world = visits.first().map_or(Mat4::IDENTITY, |v| v.world);
        TreeInfo {
            visits,
            visit_of,
            root_world,
        }
    }

    /// Transform taking root-relative data into the space of visit `index`.
    fn root_to_local(&self, index: usize) -> Mat4 {
        self.visits[index].world.inverse() * self.root_world
    }
}

/// Everything built for one drawing node.
struct MeshImport<'a> {
    info: &'a TreeInfo,
    owner: usize,
    to_owner: Mat4,
    options: &'a ImportOptions,
    ordinary: Vec<ChunkVertex>,
    ordinary_ids: HashMap<VertexKey, u16>,
    blended_ids: HashMap<VertexKey, u32>,
    uvs: HashMap<u16, Vec2>,
    colored: bool,
}

impl<'a> MeshImport<'a> {
    fn vertex_id(
        &mut self,
        vertex: &Vertex,
        synthetic: &mut SyntheticIds,
        pending: &mut BTreeMap<usize, BlendedWrites>,
    ) -> Result<u16, ImportError> {
        let key = VertexKey::new(vertex);
        let quantized = quantize_weights(&vertex.weights);
        let rigid = match quantized.as_slice() {
            [] => true,
            [(bone, _)] => *bone as usize == self.owner,
            _ => false,
        };

        let id = if rigid {
            if let Some(&id) = self.ordinary_ids.get(&key) {
                return Ok(id);
            }
            let id = u16::try_from(self.ordinary.len()).map_err(|_| ImportError::TooManyVertices {
                count: self.ordinary.len() + 1,
            })?;
            self.colored |= vertex.color.is_some();
            self.ordinary.push(ChunkVertex {
                position: self.to_owner.transform_point3(vertex.position),
                normal: Some(self.to_owner.transform_vector3(vertex.normal)),
                diffuse: vertex.color,
                ..Default::default()
            });
            self.ordinary_ids.insert(key, id);
            id
        } else {
            if let Some(&id) = self.blended_ids.get(&key) {
                return Ok(id as u16);
            }
            for &(bone, _) in &quantized {
                if bone as usize >= self.info.visits.len() {
                    return Err(ImportError::UnknownBone { bone });
                }
                if bone as usize > self.owner {
                    return Err(ImportError::UnorderedWeights {
                        owner: self.owner as u32,
                        bone,
                    });
                }
            }

            let id = synthetic.allocate()?;
            for (position, &(bone, weight)) in quantized.iter().enumerate() {
                let status = weight_status(position, quantized.len());
                let to_local = self.info.root_to_local(bone as usize);
                trace!(id, bone, weight, ?status, "blended vertex write");
                pending.entry(bone as usize).or_default().push(
                    status,
                    ChunkVertex {
                        position: to_local.transform_point3(vertex.position),
                        normal: Some(to_local.transform_vector3(vertex.normal)),
                        ninja_flags: Some(NinjaFlags {
                            weight,
                            local_id: id as u16,
                        }),
                        ..Default::default()
                    },
                );
            }
            self.blended_ids.insert(key, id);
            id as u16
        };

        self.uvs.insert(id, vertex.uv);
        Ok(id)
    }

    fn vertex_chunks(&self) -> Vec<VertexChunk> {
        let format = if self.colored {
            VertexFormat::NormalDiffuse8
        } else {
            VertexFormat::Normal
        };
        self.ordinary
            .chunks(MAX_VERTICES_PER_CHUNK)
            .enumerate()
            .map(|(i, part)| {
                let mut vertices = part.to_vec();
                if self.colored {
                    for vertex in &mut vertices {
                        vertex.diffuse.get_or_insert(Color::WHITE);
                    }
                }
                VertexChunk::new(format, (i * MAX_VERTICES_PER_CHUNK) as u16, vertices)
            })
            .collect()
    }
}

fn import_mesh(
    info: &TreeInfo,
    owner: usize,
    mesh: &SkinnedMesh,
    options: &ImportOptions,
    synthetic: &mut SyntheticIds,
    pending: &mut BTreeMap<usize, BlendedWrites>,
    report: &mut ImportReport,
) -> Result<Geometry, ImportError> {
    let mut import = MeshImport {
        info,
        owner,
        to_owner: info.root_to_local(owner),
        options,
        ordinary: Vec::new(),
        ordinary_ids: HashMap::new(),
        blended_ids: HashMap::new(),
        uvs: HashMap::new(),
        colored: false,
    };

    let mut poly_chunks = Vec::new();
    let mut state = Material::default();
    for submesh in &mesh.submeshes {
        let material = *mesh
            .materials
            .get(submesh.material)
            .ok_or(ImportError::UnknownMaterial {
                material: submesh.material,
                count: mesh.materials.len(),
            })?;

        let ids = submesh
            .vertices
            .iter()
            .map(|vertex| import.vertex_id(vertex, synthetic, pending))
            .collect::<Result<Vec<u16>, _>>()?;
        let triangles = submesh
            .triangles()
            .map(|triangle| {
                let mut out = [0u16; 3];
                for (slot, index) in out.iter_mut().zip(triangle) {
                    *slot = *ids.get(index as usize).ok_or(ImportError::IndexOutOfRange {
                        index,
                        count: ids.len(),
                    })?;
                }
                Ok(out)
            })
            .collect::<Result<Vec<[u16; 3]>, ImportError>>()?;
        if triangles.is_empty() {
            continue;
        }

        poly_chunks.extend(material_delta(&state, &material));
        state = material;
        poly_chunks.extend(
            strip_chunks(&triangles, &import.uvs, import.options.uv_precision, &material)
                .into_iter()
                .map(PolyChunk::Strip),
        );
    }

    report.ordinary_vertices += import.ordinary.len();
    report.blended_vertices += import.blended_ids.len();
    Ok(Geometry::new(import.vertex_chunks(), poly_chunks))
}

/// Replace the geometry of every listed node with chunk lists that export
/// back to its mesh.
///
/// Each blended vertex must be drawn by a node visited no earlier than any
/// node influencing it; otherwise the vertex would be drawn before it is
/// complete and the import fails with [`ImportError::UnorderedWeights`].
/// Nodes that influence a blended vertex get its weighted writes appended
/// to their vertex list, or a vertex-only geometry when they have none.
pub fn import_meshes(
    tree: &mut NodeTree,
    meshes: &[NodeMesh<'_>],
    options: &ImportOptions,
) -> Result<ImportReport, ImportError> {
    let info = TreeInfo::new(tree);
    let mut synthetic = SyntheticIds::new();
    let mut pending: BTreeMap<usize, BlendedWrites> = BTreeMap::new();
    let mut report = ImportReport::default();

    let mut geometries = Vec::with_capacity(meshes.len());
    for NodeMesh { node, mesh } in meshes {
        let owner = *info
            .visit_of
            .get(node.0)
            .ok_or(ImportError::UnknownNode { node: node.0 })?;
        let geometry = import_mesh(
            &info,
            owner,
            mesh,
            options,
            &mut synthetic,
            &mut pending,
            &mut report,
        )?;
        geometries.push((*node, geometry));
    }

    // Checked against the geometry the tree will hold once the import lands.
    if let Some(lowest) = synthetic.lowest {
        let kept = tree
            .iter()
            .filter(|(id, _)| geometries.iter().all(|(replaced, _)| replaced != id))
            .filter_map(|(_, node)| node.geometry.as_ref());
        let highest_ordinary = kept
            .chain(geometries.iter().map(|(_, geometry)| geometry))
            .flat_map(|geometry| &geometry.vertex_chunks)
            .filter(|chunk| !chunk.format.is_weighted())
            .flat_map(|chunk| (0..chunk.vertices.len()).map(|local| chunk.vertex_id(local)))
            .max();
        if let Some(ordinary) = highest_ordinary.filter(|id| *id >= lowest) {
            return Err(ImportError::IdCollision {
                ordinary,
                synthetic: lowest,
            });
        }
    }

    for (node, geometry) in geometries {
        tree.node_mut(node).geometry = Some(geometry);
        report.meshes += 1;
    }

    for (visit, writes) in pending {
        let chunks = writes.into_chunks();
        let node = tree.node_mut(info.visits[visit].id);
        match node.geometry.as_mut() {
            Some(geometry) => {
                geometry.vertex_chunks.extend(chunks);
                geometry.update_bounds();
            }
            None => {
                node.geometry = Some(Geometry::new(chunks, Vec::new()));
                report.supplementary_geometries += 1;
            }
        }
    }

    report.lowest_synthetic_id = synthetic.lowest;
    debug!(?report, "imported meshes");
    Ok(report)
}

/// Import a single mesh drawn by the tree's root node.
pub fn import_root_mesh(
    tree: &mut NodeTree,
    mesh: &SkinnedMesh,
    options: &ImportOptions,
) -> Result<ImportReport, ImportError> {
    let node = tree.root().ok_or(ImportError::UnknownNode { node: 0 })?;
    import_meshes(tree, &[NodeMesh { node, mesh }], options)
}

/// Export the whole tree and import the result in place of every existing
/// geometry.
///
/// The mesh is drawn by the node of its highest bone, so every blended
/// vertex is complete by the time it is referenced.
pub fn reimport_model(tree: &mut NodeTree, options: &ImportOptions) -> IResult<ImportReport> {
    let mesh = export_model(tree, &ExportOptions::default())?;
    let last_bone = mesh
        .submeshes
        .iter()
        .flat_map(|s| &s.vertices)
        .flat_map(|v| &v.weights)
        .map(|w| w.bone)
        .max()
        .unwrap_or(0);
    let owner = tree
        .depth_first()
        .get(last_bone as usize)
        .map(|visit| visit.id)
        .ok_or(ImportError::UnknownBone { bone: last_bone })?;

    for (_, node) in tree.iter_mut() {
        node.geometry = None;
    }
    let report = import_meshes(tree, &[NodeMesh { node: owner, mesh: &mesh }], options)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    use crate::models::node::Node;
    use crate::scene::{BoneWeight, Submesh};

    fn vertex(position: Vec3, weights: &[(u32, f32)]) -> Vertex {
        Vertex {
            position,
            normal: Vec3::Z,
            uv: Vec2::ZERO,
            color: None,
            weights: weights
                .iter()
                .map(|&(bone, weight)| BoneWeight { bone, weight })
                .collect(),
        }
    }

    fn mesh(vertices: Vec<Vertex>, indices: Vec<u32>) -> SkinnedMesh {
        SkinnedMesh {
            bones: Vec::new(),
            materials: vec![Material::default()],
            submeshes: vec![Submesh {
                material: 0,
                vertices,
                indices,
            }],
        }
    }

    fn two_node_tree() -> (NodeTree, NodeId, NodeId) {
        let mut tree = NodeTree::new();
        let root = tree.add_root(Node::default());
        let child = tree.add_child(
            root,
            Node::with_transform(Vec3::new(0.0, 2.0, 0.0), [0; 3], Vec3::ONE),
        );
        (tree, root, child)
    }

    #[test]
    fn rigid_vertices_use_ascending_ids() {
        let (mut tree, root, _) = two_node_tree();
        let mesh = mesh(
            vec![
                vertex(Vec3::ZERO, &[]),
                vertex(Vec3::X, &[(0, 1.0)]),
                vertex(Vec3::Y, &[]),
                vertex(Vec3::ZERO, &[]),
            ],
            vec![0, 1, 2, 3, 2, 1],
        );
        let report = import_root_mesh(&mut tree, &mesh, &ImportOptions::default()).unwrap();
        assert_eq!(report.ordinary_vertices, 3);
        assert_eq!(report.blended_vertices, 0);
        assert_eq!(report.lowest_synthetic_id, None);

        let geometry = tree.node(root).geometry.as_ref().unwrap();
        assert_eq!(geometry.vertex_chunks.len(), 1);
        assert_eq!(geometry.vertex_chunks[0].format, VertexFormat::Normal);
        assert_eq!(geometry.vertex_chunks[0].vertices.len(), 3);
        let PolyChunk::Strip(strip) = &geometry.poly_chunks[0] else {
            panic!("expected strips, got {:?}", geometry.poly_chunks);
        };
        let mut triangles: Vec<u16> = strip.to_triangles();
        triangles.sort();
        assert_eq!(triangles, vec![0, 0, 1, 1, 2, 2]);
    }

    #[test]
    fn blended_vertices_get_synthetic_ids_on_every_contributor() {
        let (mut tree, root, child) = two_node_tree();
        let mesh = mesh(
            vec![
                vertex(Vec3::ZERO, &[(0, 0.5), (1, 0.5)]),
                vertex(Vec3::X, &[]),
                vertex(Vec3::Y, &[]),
            ],
            vec![0, 1, 2],
        );
        let report = import_meshes(
            &mut tree,
            &[NodeMesh { node: child, mesh: &mesh }],
            &ImportOptions::default(),
        )
        .unwrap();
        assert_eq!(report.blended_vertices, 1);
        assert_eq!(report.supplementary_geometries, 1);
        assert_eq!(report.lowest_synthetic_id, Some(4095));

        let root_geometry = tree.node(root).geometry.as_ref().unwrap();
        assert!(root_geometry.is_supplementary());
        let start = &root_geometry.vertex_chunks[0];
        assert_eq!(start.format, VertexFormat::NormalNinjaFlags);
        assert_eq!(start.weight_status(), WeightStatus::Start);
        assert_eq!(start.vertex_id(0), 4095);
        assert_eq!(start.vertices[0].ninja_flags.unwrap().weight, 128);

        let child_geometry = tree.node(child).geometry.as_ref().unwrap();
        let end = child_geometry.vertex_chunks.last().unwrap();
        assert_eq!(end.weight_status(), WeightStatus::End);
        assert_eq!(end.vertices[0].ninja_flags.unwrap().weight, 127);
        // Child-local: the child sits 2 units up.
        assert_eq!(end.vertices[0].position, Vec3::new(0.0, -2.0, 0.0));
    }

    #[test]
    fn negligible_influences_stay_rigid() {
        let (mut tree, root, _) = two_node_tree();
        // Bone 1 rounds to a zero weight byte, so the vertex is rigid to the
        // root even though bone 1 is visited after it.
        let mesh = mesh(
            vec![
                vertex(Vec3::ZERO, &[(0, 1.0), (1, 0.0001)]),
                vertex(Vec3::X, &[]),
                vertex(Vec3::Y, &[]),
            ],
            vec![0, 1, 2],
        );
        let report = import_root_mesh(&mut tree, &mesh, &ImportOptions::default()).unwrap();
        assert_eq!(report.ordinary_vertices, 3);
        assert_eq!(report.blended_vertices, 0);
        assert!(tree.node(root).geometry.is_some());
    }

    #[test]
    fn drawing_node_must_be_visited_last() {
        let (mut tree, root, _) = two_node_tree();
        let mesh = mesh(
            vec![
                vertex(Vec3::ZERO, &[(1, 1.0)]),
                vertex(Vec3::X, &[]),
                vertex(Vec3::Y, &[]),
            ],
            vec![0, 1, 2],
        );
        let err = import_meshes(
            &mut tree,
            &[NodeMesh { node: root, mesh: &mesh }],
            &ImportOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::UnorderedWeights { owner: 0, bone: 1 }));
    }

    #[test]
    fn bad_references_are_reported() {
        let (mut tree, _, _) = two_node_tree();
        let bad_index = mesh(vec![vertex(Vec3::ZERO, &[])], vec![0, 0, 3]);
        assert!(matches!(
            import_root_mesh(&mut tree, &bad_index, &ImportOptions::default()),
            Err(ImportError::IndexOutOfRange { index: 3, count: 1 })
        ));

        let bad_bone = mesh(vec![vertex(Vec3::ZERO, &[(0, 0.5), (7, 0.5)])], vec![0, 0, 0]);
        let options = ImportOptions::builder().uv_precision(UvPrecision::High).build();
        assert!(matches!(
            import_root_mesh(&mut tree, &bad_bone, &options),
            Err(ImportError::UnknownBone { bone: 7 })
        ));

        let mut bad_material = mesh(vec![vertex(Vec3::ZERO, &[])], vec![0, 0, 0]);
        bad_material.submeshes[0].material = 2;
        assert!(matches!(
            import_root_mesh(&mut tree, &bad_material, &ImportOptions::default()),
            Err(ImportError::UnknownMaterial { material: 2, count: 1 })
        ));
    }

    #[test]
    fn colliding_ids_leave_the_tree_untouched() {
        let (mut tree, root, child) = two_node_tree();
        let high = VertexChunk::new(
            VertexFormat::Normal,
            FIRST_SYNTHETIC_ID as u16,
            vec![ChunkVertex {
                normal: Some(Vec3::Z),
                ..Default::default()
            }],
        );
        tree.node_mut(root).geometry = Some(Geometry::new(vec![high], Vec::new()));

        let mesh = mesh(
            vec![
                vertex(Vec3::ZERO, &[(0, 0.5), (1, 0.5)]),
                vertex(Vec3::X, &[]),
                vertex(Vec3::Y, &[]),
            ],
            vec![0, 1, 2],
        );
        let err = import_meshes(
            &mut tree,
            &[NodeMesh { node: child, mesh: &mesh }],
            &ImportOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ImportError::IdCollision {
                ordinary: 4095,
                synthetic: 4095
            }
        ));
        assert!(tree.node(child).geometry.is_none());
    }

    #[test]
    fn blended_writes_from_an_earlier_import_are_not_ordinary_ids() {
        let (mut tree, root, child) = two_node_tree();
        let blended = mesh(
            vec![
                vertex(Vec3::ZERO, &[(0, 0.5), (1, 0.5)]),
                vertex(Vec3::X, &[]),
                vertex(Vec3::Y, &[]),
            ],
            vec![0, 1, 2],
        );
        import_meshes(
            &mut tree,
            &[NodeMesh { node: child, mesh: &blended }],
            &ImportOptions::default(),
        )
        .unwrap();

        // The root now holds a supplementary NormalNinjaFlags chunk with id
        // 4095. Importing the child again must not read that as a plain id.
        let report = import_meshes(
            &mut tree,
            &[NodeMesh { node: child, mesh: &blended }],
            &ImportOptions::default(),
        )
        .unwrap();
        assert_eq!(report.lowest_synthetic_id, Some(4095));
        assert!(tree.node(root).geometry.as_ref().unwrap().is_supplementary());
    }

    #[test]
    fn synthetic_ids_run_out() {
        let mut ids = SyntheticIds::new();
        for expected in (0..=FIRST_SYNTHETIC_ID).rev() {
            assert_eq!(ids.allocate().unwrap(), expected);
        }
        assert!(matches!(ids.allocate(), Err(ImportError::SyntheticIdsExhausted)));
        assert_eq!(ids.lowest, Some(0));
    }

    #[test]
    fn colored_vertices_keep_their_colour() {
        let (mut tree, root, _) = two_node_tree();
        let mut colored = vertex(Vec3::ZERO, &[]);
        colored.color = Some(Color::new(0x80, 1, 2, 3));
        let mesh = mesh(
            vec![colored, vertex(Vec3::X, &[]), vertex(Vec3::Y, &[])],
            vec![0, 1, 2],
        );
        import_root_mesh(&mut tree, &mesh, &ImportOptions::default()).unwrap();
        let chunk = &tree.node(root).geometry.as_ref().unwrap().vertex_chunks[0];
        assert_eq!(chunk.format, VertexFormat::NormalDiffuse8);
        assert_eq!(chunk.vertices[0].diffuse, Some(Color::new(0x80, 1, 2, 3)));
        assert_eq!(chunk.vertices[1].diffuse, Some(Color::WHITE));
    }

    #[test]
    fn reimport_replaces_every_geometry() {
        use crate::error::ErrorKind;
        use crate::models::strip::{Strip, StripChunk, StripFlags, StripFormat};

        let plain = |indices: Vec<u16>| {
            PolyChunk::Strip(StripChunk {
                format: StripFormat::Plain,
                flags: StripFlags::empty(),
                user_offset: 0,
                strips: vec![Strip::new(indices, false)],
            })
        };
        let vertices = VertexChunk::new(
            VertexFormat::Normal,
            0,
            [Vec3::ZERO, Vec3::X, Vec3::Y]
                .into_iter()
                .map(|position| ChunkVertex {
                    position,
                    normal: Some(Vec3::Z),
                    ..Default::default()
                })
                .collect(),
        );

        let (mut tree, root, child) = two_node_tree();
        tree.node_mut(child).geometry = Some(Geometry::new(vec![vertices.clone()], vec![plain(vec![0, 1, 2])]));
        let report = reimport_model(&mut tree, &ImportOptions::default()).unwrap();
        assert_eq!(report.meshes, 1);
        assert_eq!(report.ordinary_vertices, 3);
        // Every vertex is rigid to the child, so the root gets nothing.
        assert!(tree.node(root).geometry.is_none());
        let geometry = tree.node(child).geometry.as_ref().unwrap();
        assert_eq!(geometry.vertex_chunks[0].vertices[1].position, Vec3::X);

        let (mut tree, _, child) = two_node_tree();
        tree.node_mut(child).geometry = Some(Geometry::new(vec![vertices], vec![plain(vec![0, 1, 5])]));
        let err = reimport_model(&mut tree, &ImportOptions::default()).unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::Decode(crate::error::DecodeError::DanglingStripReference { id: 5, .. })
        ));
        assert!(tree.node(child).geometry.is_some());
    }
}
