//! Chunk type table and the two chunk header shapes.
//!
//! A *Chunk16* header is the 16-bit value `flags << 8 | type`; a *Chunk32*
//! header is the 32-bit value `size << 16 | flags << 8 | type`. Both are stored
//! in stream endianness, so the byte positions of `type`, `flags` and `size`
//! swap between little- and big-endian streams.

use std::fmt;
use std::io::{self, Seek, Write};

use crate::data::Endian;
use crate::data::parser_utils::{WResult, parse_u16, parse_u32};
use crate::data::writer::ChunkWriter;
use crate::models::material::MaterialColors;
use crate::models::strip::StripFormat;
use crate::models::vertex_format::VertexFormat;
use crate::recognized::Recognized;

pub const TYPE_NULL: u8 = 0;
pub const TYPE_BLEND_ALPHA: u8 = 1;
pub const TYPE_MIPMAP_D_ADJUST: u8 = 2;
pub const TYPE_SPECULAR_EXPONENT: u8 = 3;
pub const TYPE_CACHE_POLYGON_LIST: u8 = 4;
pub const TYPE_DRAW_POLYGON_LIST: u8 = 5;
pub const TYPE_TEXTURE_ID: u8 = 8;
pub const TYPE_TEXTURE_ID2: u8 = 9;
pub const TYPE_MATERIAL: u8 = 16;
pub const TYPE_MATERIAL_BUMP: u8 = 24;
pub const TYPE_VOLUME_FIRST: u8 = 56;
pub const TYPE_VOLUME_LAST: u8 = 58;
pub const TYPE_END: u8 = 255;

/// Decoded meaning of a chunk type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    Null,
    BlendAlpha,
    MipmapDAdjust,
    SpecularExponent,
    CachePolygonList,
    DrawPolygonList,
    TextureId { second_texture: bool },
    Material {
        colors: MaterialColors,
        second_texture: bool,
    },
    MaterialBump,
    Vertex(VertexFormat),
    Volume(u8),
    Strip(StripFormat),
    End,
}

impl ChunkKind {
    pub fn from_type(chunk_type: u8) -> Recognized<ChunkKind, u8> {
        let kind = match chunk_type {
            TYPE_NULL => ChunkKind::Null,
            TYPE_BLEND_ALPHA => ChunkKind::BlendAlpha,
            TYPE_MIPMAP_D_ADJUST => ChunkKind::MipmapDAdjust,
            TYPE_SPECULAR_EXPONENT => ChunkKind::SpecularExponent,
            TYPE_CACHE_POLYGON_LIST => ChunkKind::CachePolygonList,
            TYPE_DRAW_POLYGON_LIST => ChunkKind::DrawPolygonList,
            TYPE_TEXTURE_ID => ChunkKind::TextureId {
                second_texture: false,
            },
            TYPE_TEXTURE_ID2 => ChunkKind::TextureId {
                second_texture: true,
            },
            16..=23 => ChunkKind::Material {
                colors: MaterialColors::from_bits_truncate(chunk_type - TYPE_MATERIAL),
                second_texture: false,
            },
            TYPE_MATERIAL_BUMP => ChunkKind::MaterialBump,
            25..=31 => ChunkKind::Material {
                colors: MaterialColors::from_bits_truncate(chunk_type - TYPE_MATERIAL_BUMP),
                second_texture: true,
            },
            TYPE_VOLUME_FIRST..=TYPE_VOLUME_LAST => ChunkKind::Volume(chunk_type),
            TYPE_END => ChunkKind::End,
            other => {
                if let Some(format) = VertexFormat::from_type(other) {
                    ChunkKind::Vertex(format)
                } else if let Some(format) = StripFormat::from_type(other) {
                    ChunkKind::Strip(format)
                } else {
                    return Recognized::Unknown(other);
                }
            }
        };
        Recognized::Known(kind)
    }

    pub fn type_byte(self) -> u8 {
        match self {
            ChunkKind::Null => TYPE_NULL,
            ChunkKind::BlendAlpha => TYPE_BLEND_ALPHA,
            ChunkKind::MipmapDAdjust => TYPE_MIPMAP_D_ADJUST,
            ChunkKind::SpecularExponent => TYPE_SPECULAR_EXPONENT,
            ChunkKind::CachePolygonList => TYPE_CACHE_POLYGON_LIST,
            ChunkKind::DrawPolygonList => TYPE_DRAW_POLYGON_LIST,
            ChunkKind::TextureId { second_texture } => {
                if second_texture {
                    TYPE_TEXTURE_ID2
                } else {
                    TYPE_TEXTURE_ID
                }
            }
            ChunkKind::Material {
                colors,
                second_texture,
            } => {
                if second_texture && !colors.is_empty() {
                    TYPE_MATERIAL_BUMP + colors.bits()
                } else {
                    TYPE_MATERIAL + colors.bits()
                }
            }
            ChunkKind::MaterialBump => TYPE_MATERIAL_BUMP,
            ChunkKind::Vertex(format) => format.type_byte(),
            ChunkKind::Volume(chunk_type) => chunk_type,
            ChunkKind::Strip(format) => format.type_byte(),
            ChunkKind::End => TYPE_END,
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkKind::Vertex(format) => write!(f, "Vertex({format:?})"),
            ChunkKind::Strip(format) => write!(f, "Strip({format:?})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// A 16-bit chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk16Header {
    pub chunk_type: u8,
    pub flags: u8,
}

impl Chunk16Header {
    pub fn new(chunk_type: u8, flags: u8) -> Self {
        Chunk16Header { chunk_type, flags }
    }

    pub fn kind(&self) -> Recognized<ChunkKind, u8> {
        ChunkKind::from_type(self.chunk_type)
    }

    pub fn to_word(self) -> u16 {
        (self.flags as u16) << 8 | self.chunk_type as u16
    }

    pub fn from_word(word: u16) -> Self {
        Chunk16Header {
            chunk_type: word as u8,
            flags: (word >> 8) as u8,
        }
    }
}

/// A 32-bit chunk header. `size` counts 4-byte words of body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk32Header {
    pub chunk_type: u8,
    pub flags: u8,
    pub size: u16,
}

impl Chunk32Header {
    pub fn kind(&self) -> Recognized<ChunkKind, u8> {
        ChunkKind::from_type(self.chunk_type)
    }

    pub fn body_len(&self) -> usize {
        self.size as usize * 4
    }

    pub fn to_word(self) -> u32 {
        (self.size as u32) << 16 | (self.flags as u32) << 8 | self.chunk_type as u32
    }

    pub fn from_word(word: u32) -> Self {
        Chunk32Header {
            chunk_type: word as u8,
            flags: (word >> 8) as u8,
            size: (word >> 16) as u16,
        }
    }
}

pub fn parse_chunk16(input: &mut &[u8], endian: Endian) -> WResult<Chunk16Header> {
    parse_u16(input, endian).map(Chunk16Header::from_word)
}

pub fn parse_chunk32(input: &mut &[u8], endian: Endian) -> WResult<Chunk32Header> {
    parse_u32(input, endian).map(Chunk32Header::from_word)
}

pub fn write_chunk16<W: Write + Seek>(
    writer: &mut ChunkWriter<W>,
    header: Chunk16Header,
) -> io::Result<()> {
    writer.write_u16(header.to_word())
}

/// Terminate a polygon list.
pub fn write_end16<W: Write + Seek>(writer: &mut ChunkWriter<W>) -> io::Result<()> {
    write_chunk16(writer, Chunk16Header::new(TYPE_END, 0))
}

/// Terminate a vertex list. The sentinel is a bodiless 32-bit header.
pub fn write_end32<W: Write + Seek>(writer: &mut ChunkWriter<W>) -> io::Result<()> {
    writer.write_u32(
        Chunk32Header {
            chunk_type: TYPE_END,
            flags: 0,
            size: 0,
        }
        .to_word(),
    )
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn chunk16_byte_positions() {
        let header = Chunk16Header::new(TYPE_TEXTURE_ID, 0x23);

        let mut writer = ChunkWriter::new(Cursor::new(Vec::new()), Endian::Little);
        write_chunk16(&mut writer, header).unwrap();
        assert_eq!(writer.into_inner().into_inner(), vec![0x08, 0x23]);

        let mut writer = ChunkWriter::new(Cursor::new(Vec::new()), Endian::Big);
        write_chunk16(&mut writer, header).unwrap();
        assert_eq!(writer.into_inner().into_inner(), vec![0x23, 0x08]);
    }

    #[test]
    fn chunk16_parse_both_orders() {
        let little = [0x41u8, 0x10];
        let big = [0x10u8, 0x41];
        let expected = Chunk16Header::new(65, 0x10);
        assert_eq!(parse_chunk16(&mut &little[..], Endian::Little).unwrap(), expected);
        assert_eq!(parse_chunk16(&mut &big[..], Endian::Big).unwrap(), expected);
    }

    #[test]
    fn chunk32_parse_both_orders() {
        let little = [44u8, 0x02, 0x07, 0x00];
        let big = [0x00u8, 0x07, 0x02, 44];
        let expected = Chunk32Header {
            chunk_type: 44,
            flags: 0x02,
            size: 7,
        };
        assert_eq!(parse_chunk32(&mut &little[..], Endian::Little).unwrap(), expected);
        assert_eq!(parse_chunk32(&mut &big[..], Endian::Big).unwrap(), expected);
        assert_eq!(expected.body_len(), 28);
    }

    #[test]
    fn end_sentinels() {
        let mut writer = ChunkWriter::new(Cursor::new(Vec::new()), Endian::Big);
        write_end16(&mut writer).unwrap();
        write_end32(&mut writer).unwrap();
        assert_eq!(
            writer.into_inner().into_inner(),
            vec![0x00, 0xFF, 0x00, 0x00, 0x00, 0xFF]
        );
    }

    #[test]
    fn type_table() {
        assert_eq!(ChunkKind::from_type(0), Recognized::Known(ChunkKind::Null));
        assert_eq!(ChunkKind::from_type(255), Recognized::Known(ChunkKind::End));
        assert_eq!(
            ChunkKind::from_type(23),
            Recognized::Known(ChunkKind::Material {
                colors: MaterialColors::all(),
                second_texture: false,
            })
        );
        assert_eq!(ChunkKind::from_type(24), Recognized::Known(ChunkKind::MaterialBump));
        assert_eq!(
            ChunkKind::from_type(25),
            Recognized::Known(ChunkKind::Material {
                colors: MaterialColors::DIFFUSE,
                second_texture: true,
            })
        );
        assert_eq!(
            ChunkKind::from_type(44),
            Recognized::Known(ChunkKind::Vertex(VertexFormat::NormalNinjaFlags))
        );
        assert_eq!(
            ChunkKind::from_type(75),
            Recognized::Known(ChunkKind::Strip(StripFormat::Uvh2))
        );
        for unknown in [6u8, 7, 10, 15, 51, 55, 59, 63, 76, 254] {
            assert_eq!(ChunkKind::from_type(unknown), Recognized::Unknown(unknown));
        }
        for chunk_type in (0u8..=255).filter(|t| ChunkKind::from_type(*t).is_known()) {
            let kind = *ChunkKind::from_type(chunk_type).known().unwrap();
            assert_eq!(kind.type_byte(), chunk_type);
        }
    }
}
