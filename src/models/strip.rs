//! Strip chunks and strip-to-triangle expansion.

use bitflags::bitflags;
use glam::Vec2;

use crate::data::bits::BitField;
use crate::models::color::Color;

const HEADER_STRIP_COUNT: BitField = BitField::new(0, 13);
const HEADER_USER_OFFSET: BitField = BitField::new(14, 15);

/// Largest number of strips one chunk header can describe.
pub const MAX_STRIPS_PER_CHUNK: usize = (1 << 14) - 1;
/// Largest number of indices in one strip.
pub const MAX_STRIP_LEN: usize = i16::MAX as usize;

bitflags! {
    /// Render state bits carried in a strip chunk's flags byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct StripFlags: u8 {
        const IGNORE_LIGHT = 0x01;
        const IGNORE_SPECULAR = 0x02;
        const IGNORE_AMBIENT = 0x04;
        const USE_ALPHA = 0x08;
        const DOUBLE_SIDED = 0x10;
        const FLAT_SHADED = 0x20;
        const ENVIRONMENT_MAPPED = 0x40;
    }
}

/// Strip chunk formats, by type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum StripFormat {
    Plain = 64,
    Uvn = 65,
    Uvh = 66,
    Normal = 67,
    UvnNormal = 68,
    UvhNormal = 69,
    Color = 70,
    UvnColor = 71,
    UvhColor = 72,
    Plain2 = 73,
    Uvn2 = 74,
    Uvh2 = 75,
}

/// Divisor applied to stored strip UVs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "bin", derive(clap::ValueEnum))]
pub enum UvPrecision {
    /// 1/255 steps
    #[default]
    Normal,
    /// 1/1023 steps
    High,
}

impl UvPrecision {
    pub const fn scale(self) -> f32 {
        match self {
            UvPrecision::Normal => 255.0,
            UvPrecision::High => 1023.0,
        }
    }

    pub fn decode(self, raw: [i16; 2]) -> Vec2 {
        Vec2::new(raw[0] as f32, raw[1] as f32) / self.scale()
    }

    /// Quantize a UV, clamping to the representable range. Returns the
    /// encoded value and whether clamping happened.
    pub fn encode(self, uv: Vec2) -> ([i16; 2], bool) {
        let scaled = (uv * self.scale()).round();
        let clamped = scaled.clamp(Vec2::splat(i16::MIN as f32), Vec2::splat(i16::MAX as f32));
        ([clamped.x as i16, clamped.y as i16], clamped != scaled)
    }
}

impl StripFormat {
    pub const ALL: [StripFormat; 12] = [
        StripFormat::Plain,
        StripFormat::Uvn,
        StripFormat::Uvh,
        StripFormat::Normal,
        StripFormat::UvnNormal,
        StripFormat::UvhNormal,
        StripFormat::Color,
        StripFormat::UvnColor,
        StripFormat::UvhColor,
        StripFormat::Plain2,
        StripFormat::Uvn2,
        StripFormat::Uvh2,
    ];

    pub fn from_type(chunk_type: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|f| *f as u8 == chunk_type)
    }

    pub const fn type_byte(self) -> u8 {
        self as u8
    }

    pub fn uv(self) -> Option<UvPrecision> {
        use StripFormat::*;
        match self {
            Uvn | UvnNormal | UvnColor | Uvn2 => Some(UvPrecision::Normal),
            Uvh | UvhNormal | UvhColor | Uvh2 => Some(UvPrecision::High),
            Plain | Normal | Color | Plain2 => None,
        }
    }

    pub fn has_normal(self) -> bool {
        matches!(
            self,
            StripFormat::Normal | StripFormat::UvnNormal | StripFormat::UvhNormal
        )
    }

    pub fn has_color(self) -> bool {
        matches!(
            self,
            StripFormat::Color | StripFormat::UvnColor | StripFormat::UvhColor
        )
    }

    pub fn has_uv2(self) -> bool {
        matches!(self, StripFormat::Uvn2 | StripFormat::Uvh2)
    }

    pub fn is_second_texture(self) -> bool {
        matches!(
            self,
            StripFormat::Plain2 | StripFormat::Uvn2 | StripFormat::Uvh2
        )
    }

    /// 16-bit words stored per strip index, including the index itself.
    pub fn words_per_index(self) -> usize {
        let mut words = 1;
        if self.uv().is_some() {
            words += 2;
        }
        if self.has_uv2() {
            words += 2;
        }
        if self.has_normal() {
            words += 3;
        }
        if self.has_color() {
            words += 2;
        }
        words
    }

    /// Plain strip format for a UV precision, or no UVs at all.
    pub fn with_uv(uv: Option<UvPrecision>) -> Self {
        match uv {
            None => StripFormat::Plain,
            Some(UvPrecision::Normal) => StripFormat::Uvn,
            Some(UvPrecision::High) => StripFormat::Uvh,
        }
    }
}

/// One triangle strip and its per-index attributes.
///
/// Attribute vectors are either empty or hold one entry per index, depending on
/// the owning chunk's format. `user_flags` holds `user_offset` words for each
/// index from the third onwards, flattened.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Strip {
    pub reversed: bool,
    pub indices: Vec<u16>,
    pub uvs: Vec<[i16; 2]>,
    pub uv2s: Vec<[i16; 2]>,
    pub normals: Vec<[i16; 3]>,
    pub colors: Vec<Color>,
    pub user_flags: Vec<u16>,
}

impl Strip {
    pub fn new(indices: Vec<u16>, reversed: bool) -> Self {
        Strip {
            reversed,
            indices,
            ..Default::default()
        }
    }

    /// Expand into triangles as positions into this strip.
    pub fn triangle_corners(&self) -> Vec<usize> {
        strip_to_triangles(self.indices.len(), self.reversed)
    }
}

/// A strip chunk (types 64-75).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StripChunk {
    pub format: StripFormat,
    pub flags: StripFlags,
    /// Extra user words per triangle, 0-3.
    pub user_offset: u8,
    pub strips: Vec<Strip>,
}

impl StripChunk {
    pub fn header_word(&self) -> u16 {
        let mut word = 0u16;
        HEADER_STRIP_COUNT.pack(&mut word, self.strips.len() as u32);
        HEADER_USER_OFFSET.pack(&mut word, self.user_offset as u32);
        word
    }

    /// Split a header word into `(strip_count, user_offset)`.
    pub fn split_header_word(word: u16) -> (usize, u8) {
        (
            HEADER_STRIP_COUNT.unpack(word) as usize,
            HEADER_USER_OFFSET.unpack(word) as u8,
        )
    }

    /// Concatenated triangle list of every strip, as vertex ids.
    pub fn to_triangles(&self) -> Vec<u16> {
        self.strips
            .iter()
            .flat_map(|strip| {
                strip
                    .triangle_corners()
                    .into_iter()
                    .map(|corner| strip.indices[corner])
            })
            .collect()
    }
}

/// Expand a strip of `len` indices into `3 * (len - 2)` corner positions.
///
/// The first triangle is `(0, 1, 2)` when not reversed and `(0, 2, 1)` when
/// reversed; the winding then alternates with every new index.
pub fn strip_to_triangles(len: usize, reversed: bool) -> Vec<usize> {
    if len < 3 {
        return Vec::new();
    }

    let mut corners = Vec::with_capacity(3 * (len - 2));
    let mut clockwise = !reversed;
    for c in 2..len {
        let (a, b) = (c - 2, c - 1);
        if clockwise {
            corners.extend([a, b, c]);
        } else {
            corners.extend([a, c, b]);
        }
        clockwise = !clockwise;
    }
    corners
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion_length() {
        for len in 3..20 {
            assert_eq!(strip_to_triangles(len, false).len(), 3 * (len - 2));
            assert_eq!(strip_to_triangles(len, true).len(), 3 * (len - 2));
        }
        assert!(strip_to_triangles(2, false).is_empty());
        assert!(strip_to_triangles(0, true).is_empty());
    }

    #[test]
    fn expansion_alternates_winding() {
        assert_eq!(
            strip_to_triangles(5, false),
            vec![0, 1, 2, 1, 3, 2, 2, 3, 4]
        );
        assert_eq!(
            strip_to_triangles(5, true),
            vec![0, 2, 1, 1, 2, 3, 2, 4, 3]
        );
    }

    #[test]
    fn chunk_triangles_concatenate_in_strip_order() {
        let chunk = StripChunk {
            format: StripFormat::Plain,
            flags: StripFlags::empty(),
            user_offset: 0,
            strips: vec![Strip::new(vec![7, 8, 9], false), Strip::new(vec![1, 2, 3, 4], true)],
        };
        assert_eq!(chunk.to_triangles(), vec![7, 8, 9, 1, 3, 2, 2, 3, 4]);
    }

    #[test]
    fn header_word_fields() {
        let chunk = StripChunk {
            format: StripFormat::Uvn,
            flags: StripFlags::DOUBLE_SIDED,
            user_offset: 2,
            strips: vec![Strip::default(); 3],
        };
        assert_eq!(chunk.header_word(), 0x8003);
        assert_eq!(StripChunk::split_header_word(0x8003), (3, 2));
    }

    #[test]
    fn format_payload_sizes() {
        assert_eq!(StripFormat::Plain.words_per_index(), 1);
        assert_eq!(StripFormat::Uvn.words_per_index(), 3);
        assert_eq!(StripFormat::UvhNormal.words_per_index(), 6);
        assert_eq!(StripFormat::UvnColor.words_per_index(), 5);
        assert_eq!(StripFormat::Uvh2.words_per_index(), 5);
        for chunk_type in 64..=75u8 {
            assert_eq!(StripFormat::from_type(chunk_type).unwrap().type_byte(), chunk_type);
        }
    }

    #[test]
    fn uv_quantization() {
        let uv = Vec2::new(0.5, -1.0);
        let (raw, clamped) = UvPrecision::Normal.encode(uv);
        assert_eq!(raw, [128, -255]);
        assert!(!clamped);
        assert!((UvPrecision::Normal.decode(raw) - uv).length() < 1.0 / 255.0);

        let (raw, clamped) = UvPrecision::High.encode(Vec2::new(40.0, 0.0));
        assert_eq!(raw[0], i16::MAX);
        assert!(clamped);
    }
}
