//! The vertex cache shared by every node of one traversal.

use std::collections::HashMap;

use glam::Vec3;

use crate::models::color::Color;

/// A resolved, world-space vertex. For blended vertices `position` and
/// `normal` are the weighted sums of every contribution so far.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub color: Option<Color>,
    /// `(node visit index, weight)` in write order.
    pub weights: Vec<(u32, f32)>,
    /// Changes on every write to this id.
    pub serial: u64,
}

impl CachedVertex {
    pub fn weight_sum(&self) -> f32 {
        self.weights.iter().map(|(_, w)| w).sum()
    }
}

/// Sparse map from vertex id to cached vertex. Ids are shared between
/// nodes: a later node may overwrite or add to an id written earlier.
#[derive(Debug, Clone, Default)]
pub struct VertexCache {
    entries: HashMap<u32, CachedVertex>,
    next_serial: u64,
}

impl VertexCache {
    pub fn new() -> Self {
        VertexCache::default()
    }

    pub fn get(&self, id: u32) -> Option<&CachedVertex> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn serial(&mut self) -> u64 {
        self.next_serial += 1;
        self.next_serial
    }

    /// Replace whatever `id` held with a single contribution.
    pub fn overwrite(
        &mut self,
        id: u32,
        position: Vec3,
        normal: Vec3,
        color: Option<Color>,
        node: u32,
        weight: f32,
    ) {
        let serial = self.serial();
        self.entries.insert(
            id,
            CachedVertex {
                position,
                normal,
                color,
                weights: vec![(node, weight)],
                serial,
            },
        );
    }

    /// Add a pre-weighted contribution to an existing entry. Returns `false`
    /// when `id` has not been written yet.
    pub fn accumulate(&mut self, id: u32, position: Vec3, normal: Vec3, node: u32, weight: f32) -> bool {
        let serial = self.serial();
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        entry.position += position;
        entry.normal += normal;
        entry.weights.push((node, weight));
        entry.serial = serial;
        true
    }
}
