//! Material state carried by polygon chunks.

use bitflags::bitflags;

use crate::data::bits::BitField;
use crate::models::color::Color;

const BLEND_DST: BitField = BitField::new(0, 2);
const BLEND_SRC: BitField = BitField::new(3, 5);

const TEX_MIPMAP_BIAS: BitField = BitField::new(0, 3);
const TEX_CLAMP_U: BitField = BitField::bit(4);
const TEX_CLAMP_V: BitField = BitField::bit(5);
const TEX_FLIP_U: BitField = BitField::bit(6);
const TEX_FLIP_V: BitField = BitField::bit(7);

const TEX_ID: BitField = BitField::new(0, 12);
const TEX_SUPER_SAMPLE: BitField = BitField::bit(13);
const TEX_FILTER: BitField = BitField::new(14, 15);

const SPECULAR_EXPONENT: BitField = BitField::new(0, 4);

bitflags! {
    /// Which colours a material chunk carries. The chunk type is the base
    /// material type plus these bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct MaterialColors: u8 {
        const DIFFUSE = 0x01;
        const AMBIENT = 0x02;
        const SPECULAR = 0x04;
    }
}

/// Blend factor for source or destination alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum AlphaOp {
    Zero = 0,
    One = 1,
    OtherColor = 2,
    InverseOtherColor = 3,
    SrcAlpha = 4,
    InverseSrcAlpha = 5,
    DstAlpha = 6,
    InverseDstAlpha = 7,
}

impl AlphaOp {
    /// Decode a 3-bit field. Every value is valid.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x7 {
            0 => AlphaOp::Zero,
            1 => AlphaOp::One,
            2 => AlphaOp::OtherColor,
            3 => AlphaOp::InverseOtherColor,
            4 => AlphaOp::SrcAlpha,
            5 => AlphaOp::InverseSrcAlpha,
            6 => AlphaOp::DstAlpha,
            _ => AlphaOp::InverseDstAlpha,
        }
    }
}

/// Source/destination alpha pair stored in the flags byte of blend and
/// material chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlendModes {
    pub src: AlphaOp,
    pub dst: AlphaOp,
}

impl Default for BlendModes {
    fn default() -> Self {
        BlendModes {
            src: AlphaOp::SrcAlpha,
            dst: AlphaOp::InverseDstAlpha,
        }
    }
}

impl BlendModes {
    pub fn from_flags(flags: u8) -> Self {
        BlendModes {
            src: AlphaOp::from_bits(BLEND_SRC.unpack(flags) as u8),
            dst: AlphaOp::from_bits(BLEND_DST.unpack(flags) as u8),
        }
    }

    pub fn to_flags(self) -> u8 {
        let mut flags = 0u8;
        BLEND_SRC.pack(&mut flags, self.src as u32);
        BLEND_DST.pack(&mut flags, self.dst as u32);
        flags
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum FilterMode {
    Point = 0,
    #[default]
    Bilinear = 1,
    Trilinear = 2,
    Reserved = 3,
}

impl FilterMode {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => FilterMode::Point,
            1 => FilterMode::Bilinear,
            2 => FilterMode::Trilinear,
            _ => FilterMode::Reserved,
        }
    }
}

/// Material colour chunk (types 16-23, and 25-31 for the second texture).
///
/// The specular colour's alpha byte holds the specular exponent.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MaterialChunk {
    pub second_texture: bool,
    pub blend: BlendModes,
    pub diffuse: Option<Color>,
    pub ambient: Option<Color>,
    pub specular: Option<Color>,
}

impl MaterialChunk {
    pub const BASE_TYPE: u8 = 16;
    pub const SECOND_BASE_TYPE: u8 = 24;

    pub fn colors(&self) -> MaterialColors {
        let mut colors = MaterialColors::empty();
        colors.set(MaterialColors::DIFFUSE, self.diffuse.is_some());
        colors.set(MaterialColors::AMBIENT, self.ambient.is_some());
        colors.set(MaterialColors::SPECULAR, self.specular.is_some());
        colors
    }

    /// Chunk type byte. A second-texture material without colours would
    /// collide with the bump chunk, so it is written as a plain material.
    pub fn type_byte(&self) -> u8 {
        let colors = self.colors();
        if self.second_texture && !colors.is_empty() {
            Self::SECOND_BASE_TYPE + colors.bits()
        } else {
            Self::BASE_TYPE + colors.bits()
        }
    }
}

/// Bump-map chunk (type 24): six opaque 16-bit parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BumpChunk {
    pub flags: u8,
    pub values: [i16; 6],
}

/// Texture id chunk (types 8 and 9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextureChunk {
    pub second_texture: bool,
    pub id: u16,
    pub mipmap_bias: u8,
    pub clamp_u: bool,
    pub clamp_v: bool,
    pub flip_u: bool,
    pub flip_v: bool,
    pub super_sample: bool,
    pub filter: FilterMode,
}

impl TextureChunk {
    pub fn from_parts(second_texture: bool, flags: u8, word: u16) -> Self {
        TextureChunk {
            second_texture,
            id: TEX_ID.unpack(word) as u16,
            mipmap_bias: TEX_MIPMAP_BIAS.unpack(flags) as u8,
            clamp_u: TEX_CLAMP_U.unpack_bool(flags),
            clamp_v: TEX_CLAMP_V.unpack_bool(flags),
            flip_u: TEX_FLIP_U.unpack_bool(flags),
            flip_v: TEX_FLIP_V.unpack_bool(flags),
            super_sample: TEX_SUPER_SAMPLE.unpack_bool(word),
            filter: FilterMode::from_bits(TEX_FILTER.unpack(word) as u8),
        }
    }

    pub fn flags(&self) -> u8 {
        let mut flags = 0u8;
        TEX_MIPMAP_BIAS.pack(&mut flags, self.mipmap_bias as u32);
        TEX_CLAMP_U.pack_bool(&mut flags, self.clamp_u);
        TEX_CLAMP_V.pack_bool(&mut flags, self.clamp_v);
        TEX_FLIP_U.pack_bool(&mut flags, self.flip_u);
        TEX_FLIP_V.pack_bool(&mut flags, self.flip_v);
        flags
    }

    pub fn word(&self) -> u16 {
        let mut word = 0u16;
        TEX_ID.pack(&mut word, self.id as u32);
        TEX_SUPER_SAMPLE.pack_bool(&mut word, self.super_sample);
        TEX_FILTER.pack(&mut word, self.filter as u32);
        word
    }
}

/// Mipmap bias stored in the low nibble of a `MipmapDAdjust` flags byte.
pub fn mipmap_bias_from_flags(flags: u8) -> u8 {
    TEX_MIPMAP_BIAS.unpack(flags) as u8
}

pub fn mipmap_bias_to_flags(bias: u8) -> u8 {
    let mut flags = 0u8;
    TEX_MIPMAP_BIAS.pack(&mut flags, bias as u32);
    flags
}

/// Specular exponent stored in the low five bits of a `SpecularExponent`
/// flags byte. Larger exponents are truncated.
pub fn exponent_from_flags(flags: u8) -> u8 {
    SPECULAR_EXPONENT.unpack(flags) as u8
}

pub fn exponent_to_flags(exponent: u8) -> u8 {
    let mut flags = 0u8;
    SPECULAR_EXPONENT.pack(&mut flags, exponent as u32);
    flags
}

/// Largest exponent a `SpecularExponent` chunk can carry.
pub const MAX_FLAGS_EXPONENT: u8 = 31;
