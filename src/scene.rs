//! Interchange data contract: skinned meshes with per-material submeshes,
//! materials with texture slots, and bones.
//!
//! These types carry no format-specific state. Forward export produces a
//! [`SkinnedMesh`]; inverse import consumes one.

use glam::{Mat4, Vec2, Vec3};

use crate::models::color::Color;
use crate::models::material::{AlphaOp, BlendModes, FilterMode, TextureChunk};
use crate::models::strip::StripFlags;

/// A bone influence. `bone` is the depth-first visit index of the node.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoneWeight {
    pub bone: u32,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub color: Option<Color>,
    /// Sorted by bone index.
    pub weights: Vec<BoneWeight>,
}

/// Texture binding of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextureSlot {
    pub id: u16,
    pub mipmap_bias: u8,
    pub clamp_u: bool,
    pub clamp_v: bool,
    pub flip_u: bool,
    pub flip_v: bool,
    pub super_sample: bool,
    pub filter: FilterMode,
}

impl TextureSlot {
    pub fn from_chunk(chunk: &TextureChunk) -> Self {
        TextureSlot {
            id: chunk.id,
            mipmap_bias: chunk.mipmap_bias,
            clamp_u: chunk.clamp_u,
            clamp_v: chunk.clamp_v,
            flip_u: chunk.flip_u,
            flip_v: chunk.flip_v,
            super_sample: chunk.super_sample,
            filter: chunk.filter,
        }
    }

    pub fn to_chunk(self) -> TextureChunk {
        TextureChunk {
            second_texture: false,
            id: self.id,
            mipmap_bias: self.mipmap_bias,
            clamp_u: self.clamp_u,
            clamp_v: self.clamp_v,
            flip_u: self.flip_u,
            flip_v: self.flip_v,
            super_sample: self.super_sample,
            filter: self.filter,
        }
    }

    /// Equal in every field except the mipmap bias.
    pub fn same_binding(&self, other: &TextureSlot) -> bool {
        TextureSlot {
            mipmap_bias: 0,
            ..*self
        } == TextureSlot {
            mipmap_bias: 0,
            ..*other
        }
    }
}

/// Material state at the time a strip was drawn. Compared by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Material {
    pub diffuse: Color,
    pub ambient: Color,
    /// Opaque; the exponent is kept separately.
    pub specular: Color,
    pub exponent: u8,
    pub src_alpha: AlphaOp,
    pub dst_alpha: AlphaOp,
    pub texture: TextureSlot,
    pub strip_flags: StripFlags,
}

impl Default for Material {
    fn default() -> Self {
        let blend = BlendModes::default();
        Material {
            diffuse: Color::MID_GREY,
            ambient: Color::MID_GREY,
            specular: Color::WHITE,
            exponent: 16,
            src_alpha: blend.src,
            dst_alpha: blend.dst,
            texture: TextureSlot::default(),
            strip_flags: StripFlags::empty(),
        }
    }
}

impl Material {
    pub fn blend(&self) -> BlendModes {
        BlendModes {
            src: self.src_alpha,
            dst: self.dst_alpha,
        }
    }

    pub fn set_blend(&mut self, blend: BlendModes) {
        self.src_alpha = blend.src;
        self.dst_alpha = blend.dst;
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Submesh {
    /// Index into [`SkinnedMesh::materials`].
    pub material: usize,
    pub vertices: Vec<Vertex>,
    /// Triangle list.
    pub indices: Vec<u32>,
}

impl Submesh {
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bone {
    /// Depth-first visit index.
    pub index: u32,
    pub parent: Option<u32>,
    pub local: Mat4,
    pub world: Mat4,
}

/// One skinned mesh with its skeleton. Positions and normals are in the
/// space of the root node.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkinnedMesh {
    pub bones: Vec<Bone>,
    pub materials: Vec<Material>,
    pub submeshes: Vec<Submesh>,
}

impl SkinnedMesh {
    pub fn triangle_count(&self) -> usize {
        self.submeshes.iter().map(|s| s.indices.len() / 3).sum()
    }

    pub fn vertex_count(&self) -> usize {
        self.submeshes.iter().map(|s| s.vertices.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_material() {
        let material = Material::default();
        assert_eq!(material.src_alpha, AlphaOp::SrcAlpha);
        assert_eq!(material.dst_alpha, AlphaOp::InverseDstAlpha);
        assert_eq!(material.diffuse.to_argb8888(), 0xFF7F_7F7F);
        assert_eq!(material.specular.to_argb8888(), 0xFFFF_FFFF);
        assert_eq!(material.texture.filter, FilterMode::Bilinear);
    }

    #[test]
    fn texture_binding_ignores_bias() {
        let a = TextureSlot {
            id: 3,
            mipmap_bias: 1,
            ..Default::default()
        };
        let b = TextureSlot {
            mipmap_bias: 7,
            ..a
        };
        assert!(a.same_binding(&b));
        assert!(!a.same_binding(&TextureSlot { id: 4, ..a }));
        assert_eq!(TextureSlot::from_chunk(&a.to_chunk()), a);
    }
}
