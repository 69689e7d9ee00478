//! Vertex chunk formats and their attribute layouts.
//!
//! Every vertex chunk type byte selects one fixed, tightly packed layout.
//! Position always comes first; the remaining attributes follow in the order
//! normal, colour(s), flags word.

/// Semantic meaning of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeSemantic {
    Position,
    Normal,
    Diffuse,
    Specular,
    UserFlags,
    NinjaFlags,
}

/// How an attribute is stored in the vertex payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeFormat {
    /// 3 x f32 = 12 bytes
    Float32x3,
    /// 4 x f32 = 16 bytes, the fourth component is padding
    Float32x4,
    /// 4 bytes, three 10-bit signed components
    PackedNormal30,
    /// 4 bytes
    Argb8888,
    /// 2 bytes
    Rgb565,
    /// 2 bytes
    Argb4444,
    /// 2 bytes, grey level in the high byte
    Intensity16,
    /// 4 bytes, opaque
    Raw32,
}

impl AttributeFormat {
    pub const fn size(self) -> usize {
        match self {
            AttributeFormat::Float32x3 => 12,
            AttributeFormat::Float32x4 => 16,
            AttributeFormat::PackedNormal30
            | AttributeFormat::Argb8888
            | AttributeFormat::Raw32 => 4,
            AttributeFormat::Rgb565 | AttributeFormat::Argb4444 | AttributeFormat::Intensity16 => 2,
        }
    }
}

/// A single vertex attribute descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub semantic: AttributeSemantic,
    pub format: AttributeFormat,
    /// Byte offset within one vertex.
    pub offset: usize,
}

/// Attribute list and stride of one vertex format.
#[derive(Debug, Clone)]
pub struct VertexLayout {
    pub attributes: Vec<VertexAttribute>,
    pub stride: usize,
}

impl VertexLayout {
    pub fn attribute(&self, semantic: AttributeSemantic) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.semantic == semantic)
    }
}

/// Vertex chunk formats, by type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum VertexFormat {
    PositionSh = 32,
    NormalSh = 33,
    Position = 34,
    PositionDiffuse8 = 35,
    PositionUserFlags = 36,
    PositionNinjaFlags = 37,
    PositionDiffuseSpecular5 = 38,
    PositionDiffuseSpecular4 = 39,
    PositionIntensity = 40,
    Normal = 41,
    NormalDiffuse8 = 42,
    NormalUserFlags = 43,
    NormalNinjaFlags = 44,
    NormalDiffuseSpecular5 = 45,
    NormalDiffuseSpecular4 = 46,
    NormalIntensity = 47,
    Normal32 = 48,
    Normal32Diffuse8 = 49,
    Normal32UserFlags = 50,
}

impl VertexFormat {
    pub const ALL: [VertexFormat; 19] = [
        VertexFormat::PositionSh,
        VertexFormat::NormalSh,
        VertexFormat::Position,
        VertexFormat::PositionDiffuse8,
        VertexFormat::PositionUserFlags,
        VertexFormat::PositionNinjaFlags,
        VertexFormat::PositionDiffuseSpecular5,
        VertexFormat::PositionDiffuseSpecular4,
        VertexFormat::PositionIntensity,
        VertexFormat::Normal,
        VertexFormat::NormalDiffuse8,
        VertexFormat::NormalUserFlags,
        VertexFormat::NormalNinjaFlags,
        VertexFormat::NormalDiffuseSpecular5,
        VertexFormat::NormalDiffuseSpecular4,
        VertexFormat::NormalIntensity,
        VertexFormat::Normal32,
        VertexFormat::Normal32Diffuse8,
        VertexFormat::Normal32UserFlags,
    ];

    pub fn from_type(chunk_type: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|f| *f as u8 == chunk_type)
    }

    pub const fn type_byte(self) -> u8 {
        self as u8
    }

    /// Formats whose flags word carries a blend weight and a local vertex id.
    pub const fn is_weighted(self) -> bool {
        matches!(
            self,
            VertexFormat::PositionNinjaFlags | VertexFormat::NormalNinjaFlags
        )
    }

    pub fn has_normal(self) -> bool {
        self.position_format_and_normal().1.is_some()
    }

    fn position_format_and_normal(self) -> (AttributeFormat, Option<AttributeFormat>) {
        use VertexFormat::*;
        match self {
            PositionSh => (AttributeFormat::Float32x4, None),
            NormalSh => (AttributeFormat::Float32x4, Some(AttributeFormat::Float32x4)),
            Position | PositionDiffuse8 | PositionUserFlags | PositionNinjaFlags
            | PositionDiffuseSpecular5 | PositionDiffuseSpecular4 | PositionIntensity => {
                (AttributeFormat::Float32x3, None)
            }
            Normal | NormalDiffuse8 | NormalUserFlags | NormalNinjaFlags
            | NormalDiffuseSpecular5 | NormalDiffuseSpecular4 | NormalIntensity => {
                (AttributeFormat::Float32x3, Some(AttributeFormat::Float32x3))
            }
            Normal32 | Normal32Diffuse8 | Normal32UserFlags => {
                (AttributeFormat::Float32x3, Some(AttributeFormat::PackedNormal30))
            }
        }
    }

    fn extras(self) -> &'static [(AttributeSemantic, AttributeFormat)] {
        use AttributeFormat as F;
        use AttributeSemantic as S;
        use VertexFormat::*;
        match self {
            PositionSh | NormalSh | Position | Normal | Normal32 => &[],
            PositionDiffuse8 | NormalDiffuse8 | Normal32Diffuse8 => &[(S::Diffuse, F::Argb8888)],
            PositionUserFlags | NormalUserFlags | Normal32UserFlags => &[(S::UserFlags, F::Raw32)],
            PositionNinjaFlags | NormalNinjaFlags => &[(S::NinjaFlags, F::Raw32)],
            PositionDiffuseSpecular5 | NormalDiffuseSpecular5 => {
                &[(S::Diffuse, F::Rgb565), (S::Specular, F::Rgb565)]
            }
            PositionDiffuseSpecular4 | NormalDiffuseSpecular4 => {
                &[(S::Diffuse, F::Argb4444), (S::Specular, F::Rgb565)]
            }
            PositionIntensity | NormalIntensity => {
                &[(S::Diffuse, F::Intensity16), (S::Specular, F::Intensity16)]
            }
        }
    }

    /// The packed attribute layout of one vertex in this format.
    pub fn layout(self) -> VertexLayout {
        let mut attributes = Vec::with_capacity(4);
        let mut offset = 0;

        let (position, normal) = self.position_format_and_normal();
        attributes.push(VertexAttribute {
            semantic: AttributeSemantic::Position,
            format: position,
            offset,
        });
        offset += position.size();

        if let Some(normal) = normal {
            attributes.push(VertexAttribute {
                semantic: AttributeSemantic::Normal,
                format: normal,
                offset,
            });
            offset += normal.size();
        }

        for &(semantic, format) in self.extras() {
            attributes.push(VertexAttribute {
                semantic,
                format,
                offset,
            });
            offset += format.size();
        }

        VertexLayout {
            attributes,
            stride: offset,
        }
    }
}

/// Unpack a 30-bit compressed normal (X bits 20-29, Y 10-19, Z 0-9, each a
/// 10-bit two's-complement value scaled by 1/1023) and renormalize it.
pub fn unpack_normal30(packed: u32) -> glam::Vec3 {
    use crate::data::bits::{BitField, sign_extend};

    let component =
        |field: BitField| sign_extend(field.unpack(packed), 10) as f32 / 1023.0;
    let n = glam::Vec3::new(
        component(BitField::new(20, 29)),
        component(BitField::new(10, 19)),
        component(BitField::new(0, 9)),
    );
    n.normalize_or_zero()
}

/// Inverse of [`unpack_normal30`]. Components are clamped to `[-511, 511]`.
pub fn pack_normal30(normal: glam::Vec3) -> u32 {
    use crate::data::bits::BitField;

    let quantize = |v: f32| ((v * 511.0).round().clamp(-511.0, 511.0) as i32 as u32) & 0x3FF;
    let mut packed = 0u32;
    BitField::new(20, 29).pack(&mut packed, quantize(normal.x));
    BitField::new(10, 19).pack(&mut packed, quantize(normal.y));
    BitField::new(0, 9).pack(&mut packed, quantize(normal.z));
    packed
}
