/// Sub-byte field packing
pub mod bits;
/// Shared winnow parsing helpers
pub mod parser_utils;
/// Endian-aware writer with size back-patching
pub mod writer;

use std::fmt;

/// Byte order of a chunk stream.
///
/// Both orders exist in the wild (little-endian on the original console,
/// big-endian on later ports). Headers are read as whole integers in stream
/// order, which is what swaps the type/flags/size byte positions between the
/// two.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "bin", derive(clap::ValueEnum))]
pub enum Endian {
    #[default]
    Little,
    Big,
}

impl From<Endian> for winnow::binary::Endianness {
    fn from(value: Endian) -> Self {
        match value {
            Endian::Little => winnow::binary::Endianness::Little,
            Endian::Big => winnow::binary::Endianness::Big,
        }
    }
}

impl fmt::Display for Endian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endian::Little => f.write_str("little"),
            Endian::Big => f.write_str("big"),
        }
    }
}
