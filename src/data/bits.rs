//! Sub-byte field packing for the flag bytes and words of the chunk format.
//!
//! Fields are described by an inclusive bit range where bit 0 is the least
//! significant bit. Packing never validates the value: anything wider than the
//! field is truncated to fit, which callers rely on when squeezing enums into
//! narrow fields.

/// Integer containers a [`BitField`] can operate on.
pub trait BitContainer: Copy {
    const BITS: u32;

    fn to_u32(self) -> u32;
    fn from_u32(value: u32) -> Self;
}

macro_rules! impl_bit_container {
    ($($ty:ty),*) => {
        $(
            impl BitContainer for $ty {
                const BITS: u32 = <$ty>::BITS;

                #[inline]
                fn to_u32(self) -> u32 {
                    self as u32
                }

                #[inline]
                fn from_u32(value: u32) -> Self {
                    value as $ty
                }
            }
        )*
    };
}

impl_bit_container!(u8, u16, u32);

/// An inclusive bit range `[from, to]` inside an 8, 16 or 32-bit container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    pub from: u32,
    pub to: u32,
}

impl BitField {
    pub const fn new(from: u32, to: u32) -> Self {
        BitField { from, to }
    }

    /// A single-bit field.
    pub const fn bit(at: u32) -> Self {
        BitField { from: at, to: at }
    }

    pub const fn width(&self) -> u32 {
        self.to - self.from + 1
    }

    /// Mask of the field, already shifted down to bit 0.
    pub const fn mask(&self) -> u32 {
        if self.width() >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width()) - 1
        }
    }

    /// Extract the field and shift it down to bit 0.
    #[inline]
    pub fn unpack<T: BitContainer>(&self, container: T) -> u32 {
        debug_assert!(self.to < T::BITS, "bit range exceeds container");
        (container.to_u32() >> self.from) & self.mask()
    }

    /// Merge `value` into the field, leaving the other bits of `container`
    /// untouched. Bits of `value` beyond the field width are dropped.
    #[inline]
    pub fn pack<T: BitContainer>(&self, container: &mut T, value: u32) {
        debug_assert!(self.to < T::BITS, "bit range exceeds container");
        let mask = self.mask() << self.from;
        let merged = (container.to_u32() & !mask) | ((value << self.from) & mask);
        *container = T::from_u32(merged);
    }

    #[inline]
    pub fn unpack_bool<T: BitContainer>(&self, container: T) -> bool {
        self.unpack(container) != 0
    }

    #[inline]
    pub fn pack_bool<T: BitContainer>(&self, container: &mut T, value: bool) {
        self.pack(container, value as u32);
    }
}

/// Sign-extend the low `bits` bits of `value`.
pub fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_extracts_and_shifts() {
        let field = BitField::new(4, 7);
        assert_eq!(field.unpack(0xA5u8), 0xA);
        assert_eq!(BitField::new(0, 3).unpack(0xA5u8), 0x5);
        assert_eq!(BitField::new(14, 15).unpack(0xC123u16), 3);
        assert_eq!(BitField::new(16, 23).unpack(0x00AB_1234u32), 0xAB);
    }

    #[test]
    fn pack_preserves_other_bits() {
        let mut flags = 0b1000_0001u8;
        BitField::new(3, 5).pack(&mut flags, 0b101);
        assert_eq!(flags, 0b1010_1001);

        // Rewriting the field clears what was there before.
        BitField::new(3, 5).pack(&mut flags, 0);
        assert_eq!(flags, 0b1000_0001);
    }

    #[test]
    fn pack_truncates_silently() {
        let mut word = 0u16;
        // A 16-entry value squeezed into a 2-bit field keeps only its low bits.
        BitField::new(14, 15).pack(&mut word, 0xF);
        assert_eq!(word, 0xC000);

        let mut flags = 0xFFu8;
        BitField::new(0, 3).pack(&mut flags, 0x12);
        assert_eq!(flags, 0xF2);
    }

    #[test]
    fn full_width_field() {
        let field = BitField::new(0, 31);
        let mut value = 0u32;
        field.pack(&mut value, 0xDEAD_BEEF);
        assert_eq!(value, 0xDEAD_BEEF);
        assert_eq!(field.unpack(value), 0xDEAD_BEEF);
    }

    #[test]
    fn sign_extension() {
        assert_eq!(sign_extend(0x3FF, 10), -1);
        assert_eq!(sign_extend(0x1FF, 10), 511);
        assert_eq!(sign_extend(0x200, 10), -512);
    }
}
