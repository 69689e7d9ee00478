//! Node hierarchy: an arena of first-child/next-sibling nodes, plus the
//! on-disk node record.

use std::collections::HashSet;
use std::f32::consts::TAU;
use std::io::{self, Seek, Write};

use bitflags::bitflags;
use bon::Builder;
use glam::{Mat4, Quat, Vec3};
use tracing::{debug, warn};
use winnow::error::{ContextError, ErrMode};

use crate::data::Endian;
use crate::data::parser_utils::{WResult, parse_i32, parse_u32, parse_vec3, slice_from};
use crate::data::writer::ChunkWriter;
use crate::error::DecodeError;
use crate::models::geometry::{
    Geometry, encode_pointer, parse_geometry, resolve_pointer, write_geometry,
};

/// Size in bytes of an on-disk node record.
pub const NODE_RECORD_SIZE: usize = 52;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct NodeFlags: u32 {
        const IGNORE_TRANSLATION = 1 << 0;
        const IGNORE_ROTATION = 1 << 1;
        const IGNORE_SCALE = 1 << 2;
        const ROTATE_ZYX = 1 << 5;
    }
}

/// Index of a node in its [`NodeTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub usize);

/// Convert a binary angle (65536 units per turn) to radians.
pub fn bams_to_radians(bams: i32) -> f32 {
    bams as f32 * TAU / 65536.0
}

pub fn radians_to_bams(radians: f32) -> i32 {
    (radians * 65536.0 / TAU).round() as i32
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    pub flags: NodeFlags,
    pub position: Vec3,
    /// Euler angles in binary angle units.
    pub rotation: [i32; 3],
    pub scale: Vec3,
    pub geometry: Option<Geometry>,
    pub parent: Option<NodeId>,
    pub child: Option<NodeId>,
    pub sibling: Option<NodeId>,
}

impl Default for Node {
    fn default() -> Self {
        Node {
            flags: NodeFlags::empty(),
            position: Vec3::ZERO,
            rotation: [0; 3],
            scale: Vec3::ONE,
            geometry: None,
            parent: None,
            child: None,
            sibling: None,
        }
    }
}

impl Node {
    pub fn with_transform(position: Vec3, rotation: [i32; 3], scale: Vec3) -> Self {
        Node {
            position,
            rotation,
            scale,
            ..Default::default()
        }
    }

    /// Local transform `T * R * S`, honouring the ignore and rotation-order flags.
    pub fn local_transform(&self) -> Mat4 {
        let translation = if self.flags.contains(NodeFlags::IGNORE_TRANSLATION) {
            Vec3::ZERO
        } else {
            self.position
        };
        let scale = if self.flags.contains(NodeFlags::IGNORE_SCALE) {
            Vec3::ONE
        } else {
            self.scale
        };
        let rotation = if self.flags.contains(NodeFlags::IGNORE_ROTATION) {
            Quat::IDENTITY
        } else {
            let [x, y, z] = self.rotation.map(bams_to_radians);
            let (rx, ry, rz) = (Quat::from_rotation_x(x), Quat::from_rotation_y(y), Quat::from_rotation_z(z));
            if self.flags.contains(NodeFlags::ROTATE_ZYX) {
                rz * ry * rx
            } else {
                rx * ry * rz
            }
        };
        Mat4::from_scale_rotation_translation(scale, rotation, translation)
    }
}

/// Arena of nodes. The first node inserted is the root.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeTree {
    nodes: Vec<Node>,
}

/// One step of a depth-first walk.
#[derive(Debug, Clone, Copy)]
pub struct Visit {
    /// Visit counter. Bone weights refer to nodes by this index.
    pub index: usize,
    pub id: NodeId,
    pub world: Mat4,
}

impl NodeTree {
    pub fn new() -> Self {
        NodeTree::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> Option<NodeId> {
        (!self.nodes.is_empty()).then_some(NodeId(0))
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (NodeId, &mut Node)> {
        self.nodes
            .iter_mut()
            .enumerate()
            .map(|(i, node)| (NodeId(i), node))
    }

    fn push(&mut self, mut node: Node, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = parent;
        node.child = None;
        node.sibling = None;
        self.nodes.push(node);
        id
    }

    /// Insert the root, or a top-level sibling of the existing root.
    pub fn add_root(&mut self, node: Node) -> NodeId {
        let last_top_level = self.root().map(|root| self.last_sibling(root));
        let id = self.push(node, None);
        if let Some(last) = last_top_level {
            self.nodes[last.0].sibling = Some(id);
        }
        id
    }

    /// Append `node` as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, node: Node) -> NodeId {
        let last_child = self.nodes[parent.0].child.map(|child| self.last_sibling(child));
        let id = self.push(node, Some(parent));
        match last_child {
            Some(last) => self.nodes[last.0].sibling = Some(id),
            None => self.nodes[parent.0].child = Some(id),
        }
        id
    }

    fn last_sibling(&self, mut id: NodeId) -> NodeId {
        while let Some(next) = self.nodes[id.0].sibling {
            id = next;
        }
        id
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.nodes[id.0].child, |c| self.nodes[c.0].sibling)
    }

    /// This node's transform composed with all of its ancestors'.
    pub fn world_transform(&self, id: NodeId) -> Mat4 {
        let mut world = self.nodes[id.0].local_transform();
        let mut parent = self.nodes[id.0].parent;
        while let Some(p) = parent {
            world = self.nodes[p.0].local_transform() * world;
            parent = self.nodes[p.0].parent;
        }
        world
    }

    /// Depth-first walk from the root, children before siblings.
    pub fn depth_first(&self) -> Vec<Visit> {
        let mut visits = Vec::with_capacity(self.nodes.len());
        let Some(root) = self.root() else {
            return visits;
        };

        // (node, parent world transform)
        let mut stack = vec![(root, Mat4::IDENTITY)];
        while let Some((id, parent_world)) = stack.pop() {
            let node = &self.nodes[id.0];
            let world = parent_world * node.local_transform();
            visits.push(Visit {
                index: visits.len(),
                id,
                world,
            });
            if let Some(sibling) = node.sibling {
                stack.push((sibling, parent_world));
            }
            if let Some(child) = node.child {
                stack.push((child, world));
            }
        }
        visits
    }

    /// Map from node id to visit index.
    pub fn visit_indices(&self) -> Vec<usize> {
        let mut indices = vec![usize::MAX; self.nodes.len()];
        for visit in self.depth_first() {
            indices[visit.id.0] = visit.index;
        }
        indices
    }
}

/// How to read node records out of a file.
#[derive(Builder, Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    #[builder(default)]
    pub endian: Endian,
    /// Value subtracted from every stored pointer to get a file offset.
    #[builder(default)]
    pub key: u32,
}

/// A model read from a file. Geometry that failed to decode is left off its
/// node and reported here instead.
#[derive(Debug)]
pub struct ModelRead {
    pub tree: NodeTree,
    pub failures: Vec<(NodeId, DecodeError)>,
}

struct NodeRecord {
    flags: u32,
    geometry: u32,
    position: Vec3,
    rotation: [i32; 3],
    scale: Vec3,
    child: u32,
    sibling: u32,
}

fn parse_node_record(input: &mut &[u8], endian: Endian) -> WResult<NodeRecord> {
    Ok(NodeRecord {
        flags: parse_u32(input, endian)?,
        geometry: parse_u32(input, endian)?,
        position: parse_vec3(input, endian)?,
        rotation: [
            parse_i32(input, endian)?,
            parse_i32(input, endian)?,
            parse_i32(input, endian)?,
        ],
        scale: parse_vec3(input, endian)?,
        child: parse_u32(input, endian)?,
        sibling: parse_u32(input, endian)?,
    })
}

/// Read the node hierarchy rooted at the record at `offset`.
///
/// Node records are inserted in depth-first order, so arena ids equal visit
/// indices. A broken node record fails the whole read; a geometry that fails
/// to decode is logged and skipped.
pub fn read_model(
    file_data: &[u8],
    offset: usize,
    options: ReadOptions,
) -> Result<ModelRead, DecodeError> {
    let ReadOptions { endian, key } = options;
    let mut tree = NodeTree::new();
    let mut failures = Vec::new();
    let mut seen = HashSet::new();

    // (record offset, parent, previous sibling)
    let mut stack = vec![(offset, None::<NodeId>, None::<NodeId>)];
    while let Some((record_offset, parent, previous)) = stack.pop() {
        if !seen.insert(record_offset) {
            return Err(DecodeError::PointerCycle {
                offset: record_offset,
            });
        }

        let input = &mut slice_from(file_data, record_offset, "node record")?;
        let record = parse_node_record(input, endian).map_err(|_: ErrMode<ContextError>| {
            DecodeError::Truncated {
                offset: record_offset,
                what: "node record",
            }
        })?;

        let mut node = Node {
            flags: NodeFlags::from_bits_retain(record.flags),
            position: record.position,
            rotation: record.rotation,
            scale: record.scale,
            ..Default::default()
        };

        let geometry_offset = resolve_pointer(file_data, record_offset + 4, record.geometry, key)?;
        let mut geometry_failure = None;
        if let Some(geometry_offset) = geometry_offset {
            match parse_geometry(file_data, geometry_offset, key, endian) {
                Ok(geometry) => node.geometry = Some(geometry),
                Err(err) => geometry_failure = Some(err),
            }
        }

        let id = tree.push(node, parent);
        match previous {
            Some(previous) => tree.nodes[previous.0].sibling = Some(id),
            None => {
                if let Some(parent) = parent {
                    tree.nodes[parent.0].child = Some(id);
                }
            }
        }

        if let Some(err) = geometry_failure {
            warn!(node = id.0, offset = record_offset, "skipping geometry: {err}");
            failures.push((id, err));
        }

        let child = resolve_pointer(file_data, record_offset + 44, record.child, key)?;
        let sibling = resolve_pointer(file_data, record_offset + 48, record.sibling, key)?;
        // Pushed first so the child subtree is read before the sibling.
        if let Some(sibling) = sibling {
            stack.push((sibling, parent, Some(id)));
        }
        if let Some(child) = child {
            stack.push((child, Some(id), None));
        }
    }

    debug!(nodes = tree.len(), failures = failures.len(), "read model");
    Ok(ModelRead { tree, failures })
}

fn write_node<W: Write + Seek>(
    writer: &mut ChunkWriter<W>,
    tree: &NodeTree,
    id: NodeId,
    key: u32,
) -> io::Result<u64> {
    let node = tree.node(id);
    let child = node
        .child
        .map(|child| write_node(writer, tree, child, key))
        .transpose()?;
    let sibling = node
        .sibling
        .map(|sibling| write_node(writer, tree, sibling, key))
        .transpose()?;
    let geometry = node
        .geometry
        .as_ref()
        .map(|geometry| write_geometry(writer, geometry, key))
        .transpose()?;

    writer.align(4)?;
    let record_offset = writer.position()?;
    writer.write_u32(node.flags.bits())?;
    writer.write_u32(encode_pointer(geometry, key)?)?;
    writer.write_vec3(node.position)?;
    for angle in node.rotation {
        writer.write_i32(angle)?;
    }
    writer.write_vec3(node.scale)?;
    writer.write_u32(encode_pointer(child, key)?)?;
    writer.write_u32(encode_pointer(sibling, key)?)?;
    Ok(record_offset)
}

/// Write the whole tree as a self-contained blob. Records are laid out
/// post-order: everything a node points at precedes it, and the root record
/// comes last. Returns the root record's offset.
pub fn write_model<W: Write + Seek>(
    writer: &mut ChunkWriter<W>,
    tree: &NodeTree,
    key: u32,
) -> io::Result<u64> {
    let Some(root) = tree.root() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "cannot write an empty node tree",
        ));
    };
    // Offset 0 doubles as the null pointer, so nothing may live there.
    if writer.position()? == 0 {
        writer.write_u32(0)?;
    }
    write_node(writer, tree, root, key)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn three_level_tree() -> NodeTree {
        let mut tree = NodeTree::new();
        let root = tree.add_root(Node::with_transform(Vec3::new(1.0, 0.0, 0.0), [0; 3], Vec3::ONE));
        let a = tree.add_child(root, Node::with_transform(Vec3::new(0.0, 2.0, 0.0), [0, 0, 0x4000], Vec3::ONE));
        tree.add_child(a, Node::with_transform(Vec3::new(3.0, 0.0, 0.0), [0; 3], Vec3::splat(2.0)));
        tree.add_child(root, Node::default());
        tree
    }

    #[test]
    fn depth_first_visits_children_before_siblings() {
        let mut tree = NodeTree::new();
        let root = tree.add_root(Node::default());
        let a = tree.add_child(root, Node::default());
        let b = tree.add_child(root, Node::default());
        let a1 = tree.add_child(a, Node::default());
        let order: Vec<_> = tree.depth_first().into_iter().map(|v| v.id).collect();
        assert_eq!(order, vec![root, a, a1, b]);
        assert_eq!(tree.visit_indices(), vec![0, 1, 3, 2]);
        assert_eq!(tree.children(root).collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn world_transform_composes_ancestors() {
        let tree = three_level_tree();
        let world = tree.world_transform(NodeId(2));
        // Quarter turn about Z maps the grandchild's +X offset onto +Y.
        let origin = world.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(1.0, 5.0, 0.0)).length() < 1e-5);

        for visit in tree.depth_first() {
            let expected = tree.world_transform(visit.id);
            assert!(visit.world.abs_diff_eq(expected, 1e-6));
        }
    }

    #[test]
    fn node_flags_disable_components() {
        let mut node = Node::with_transform(Vec3::ONE, [0x4000, 0, 0], Vec3::splat(3.0));
        node.flags = NodeFlags::IGNORE_TRANSLATION | NodeFlags::IGNORE_ROTATION | NodeFlags::IGNORE_SCALE;
        assert_eq!(node.local_transform(), Mat4::IDENTITY);
    }

    #[test]
    fn rotation_order_flag() {
        let mut node = Node::with_transform(Vec3::ZERO, [0x4000, 0x4000, 0], Vec3::ONE);
        let xyz = node.local_transform().transform_vector3(Vec3::Z);
        node.flags = NodeFlags::ROTATE_ZYX;
        let zyx = node.local_transform().transform_vector3(Vec3::Z);
        assert!((xyz - zyx).length() > 0.5);
    }

    #[test]
    fn bams_conversion() {
        assert!((bams_to_radians(0x4000) - TAU / 4.0).abs() < 1e-6);
        assert_eq!(radians_to_bams(TAU / 2.0), 0x8000);
    }

    #[test]
    fn model_round_trip() {
        let tree = three_level_tree();
        for endian in [Endian::Little, Endian::Big] {
            let mut writer = ChunkWriter::new(Cursor::new(Vec::new()), endian);
            let root = write_model(&mut writer, &tree, 0x8C00_0000).unwrap();
            let bytes = writer.into_inner().into_inner();
            assert_eq!(root as usize, bytes.len() - NODE_RECORD_SIZE);

            let options = ReadOptions::builder().endian(endian).key(0x8C00_0000).build();
            let read = read_model(&bytes, root as usize, options).unwrap();
            assert!(read.failures.is_empty());
            assert_eq!(read.tree, tree);
        }
    }

    #[test]
    fn self_referencing_sibling_is_a_cycle() {
        let mut bytes = vec![0u8; 4 + NODE_RECORD_SIZE];
        // Sibling pointer of the record at 4 points back at itself.
        bytes[4 + 48..4 + 52].copy_from_slice(&4u32.to_le_bytes());
        let err = read_model(&bytes, 4, ReadOptions::default()).unwrap_err();
        assert!(matches!(err, DecodeError::PointerCycle { offset: 4 }));
    }
}
