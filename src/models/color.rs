//! Packed colour codecs used by vertex and polygon chunks.

use crate::data::bits::BitField;

const RGB565_B: BitField = BitField::new(0, 4);
const RGB565_G: BitField = BitField::new(5, 10);
const RGB565_R: BitField = BitField::new(11, 15);

const ARGB4444_B: BitField = BitField::new(0, 3);
const ARGB4444_G: BitField = BitField::new(4, 7);
const ARGB4444_R: BitField = BitField::new(8, 11);
const ARGB4444_A: BitField = BitField::new(12, 15);

/// An 8-bit-per-channel colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Color {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::from_argb8888(0xFFFF_FFFF);
    pub const MID_GREY: Color = Color::from_argb8888(0xFF7F_7F7F);

    pub const fn new(a: u8, r: u8, g: u8, b: u8) -> Self {
        Color { a, r, g, b }
    }

    pub const fn from_argb8888(value: u32) -> Self {
        Color {
            a: (value >> 24) as u8,
            r: (value >> 16) as u8,
            g: (value >> 8) as u8,
            b: value as u8,
        }
    }

    pub const fn to_argb8888(self) -> u32 {
        (self.a as u32) << 24 | (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }

    /// Decode R5G6B5. Alpha is opaque.
    pub fn from_rgb565(value: u16) -> Self {
        let r = RGB565_R.unpack(value) as u8;
        let g = RGB565_G.unpack(value) as u8;
        let b = RGB565_B.unpack(value) as u8;
        Color {
            a: 0xFF,
            r: (r << 3) | (r >> 2),
            g: (g << 2) | (g >> 4),
            b: (b << 3) | (b >> 2),
        }
    }

    /// Encode as R5G6B5, dropping alpha and the low channel bits.
    pub fn to_rgb565(self) -> u16 {
        let mut value = 0u16;
        RGB565_R.pack(&mut value, (self.r >> 3) as u32);
        RGB565_G.pack(&mut value, (self.g >> 2) as u32);
        RGB565_B.pack(&mut value, (self.b >> 3) as u32);
        value
    }

    pub fn from_argb4444(value: u16) -> Self {
        let expand = |field: BitField| (field.unpack(value) as u8) * 0x11;
        Color {
            a: expand(ARGB4444_A),
            r: expand(ARGB4444_R),
            g: expand(ARGB4444_G),
            b: expand(ARGB4444_B),
        }
    }

    pub fn to_argb4444(self) -> u16 {
        let mut value = 0u16;
        ARGB4444_A.pack(&mut value, (self.a >> 4) as u32);
        ARGB4444_R.pack(&mut value, (self.r >> 4) as u32);
        ARGB4444_G.pack(&mut value, (self.g >> 4) as u32);
        ARGB4444_B.pack(&mut value, (self.b >> 4) as u32);
        value
    }

    /// Grey colour from a 16-bit intensity. Only the high byte is significant.
    pub fn from_intensity(value: u16) -> Self {
        let level = (value >> 8) as u8;
        Color {
            a: 0xFF,
            r: level,
            g: level,
            b: level,
        }
    }

    pub fn to_intensity(self) -> u16 {
        let level = ((self.r as u16 + self.g as u16 + self.b as u16) / 3) as u8;
        u16::from_be_bytes([level, level])
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Color { a, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb565_channels() {
        // Pure red, green and blue land in the documented bit ranges.
        assert_eq!(Color::from_rgb565(0xF800), Color::new(0xFF, 0xFF, 0, 0));
        assert_eq!(Color::from_rgb565(0x07E0), Color::new(0xFF, 0, 0xFF, 0));
        assert_eq!(Color::from_rgb565(0x001F), Color::new(0xFF, 0, 0, 0xFF));
    }

    #[test]
    fn rgb565_reencodes_exactly() {
        for raw in [0x0000u16, 0x1234, 0x8410, 0xFFFF, 0xA5A5] {
            assert_eq!(Color::from_rgb565(raw).to_rgb565(), raw);
        }
    }

    #[test]
    fn argb4444_channels() {
        let color = Color::from_argb4444(0xF84C);
        assert_eq!(color, Color::new(0xFF, 0x88, 0x44, 0xCC));
        assert_eq!(color.to_argb4444(), 0xF84C);
    }

    #[test]
    fn argb8888_byte_order() {
        let color = Color::from_argb8888(0x80FF_4020);
        assert_eq!(color, Color::new(0x80, 0xFF, 0x40, 0x20));
        assert_eq!(color.to_argb8888(), 0x80FF_4020);
    }

    #[test]
    fn intensity_uses_high_byte() {
        assert_eq!(Color::from_intensity(0x7F12), Color::new(0xFF, 0x7F, 0x7F, 0x7F));
        assert_eq!(Color::from_intensity(0x7F12).to_intensity(), 0x7F7F);
    }
}
