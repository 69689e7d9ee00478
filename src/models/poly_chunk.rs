//! Polygon chunks: the 16-bit-header records of a geometry's polygon list.

use std::io::{self, Seek, Write};

use tracing::trace;
use variantly::Variantly;
use winnow::Parser;
use winnow::token::take;

use crate::data::Endian;
use crate::data::parser_utils::{
    WResult, offset_in, parse_i16, parse_split_u32, parse_u16, slice_from, truncated,
};
use crate::data::writer::ChunkWriter;
use crate::error::{ChunkContext, ChunkLocation, DecodeError};
use crate::models::chunk::{
    Chunk16Header, ChunkKind, TYPE_BLEND_ALPHA, TYPE_CACHE_POLYGON_LIST, TYPE_DRAW_POLYGON_LIST,
    TYPE_MATERIAL_BUMP, TYPE_MIPMAP_D_ADJUST, TYPE_SPECULAR_EXPONENT, TYPE_TEXTURE_ID,
    TYPE_TEXTURE_ID2, parse_chunk16, write_chunk16, write_end16,
};
use crate::models::color::Color;
use crate::models::material::{
    BlendModes, BumpChunk, MaterialChunk, MaterialColors, TextureChunk, exponent_from_flags,
    exponent_to_flags, mipmap_bias_from_flags, mipmap_bias_to_flags,
};
use crate::models::strip::{Strip, StripChunk, StripFlags, StripFormat};
use crate::recognized::Recognized;

/// Volume chunk, kept as opaque words so it re-encodes unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VolumeChunk {
    pub chunk_type: u8,
    pub flags: u8,
    pub words: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Variantly)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PolyChunk {
    BlendAlpha(BlendModes),
    MipmapDAdjust(u8),
    SpecularExponent(u8),
    CachePolygonList(u8),
    DrawPolygonList(u8),
    TextureId(TextureChunk),
    Material(MaterialChunk),
    Bump(BumpChunk),
    Volume(VolumeChunk),
    Strip(StripChunk),
}

impl PolyChunk {
    pub fn type_byte(&self) -> u8 {
        match self {
            PolyChunk::BlendAlpha(_) => TYPE_BLEND_ALPHA,
            PolyChunk::MipmapDAdjust(_) => TYPE_MIPMAP_D_ADJUST,
            PolyChunk::SpecularExponent(_) => TYPE_SPECULAR_EXPONENT,
            PolyChunk::CachePolygonList(_) => TYPE_CACHE_POLYGON_LIST,
            PolyChunk::DrawPolygonList(_) => TYPE_DRAW_POLYGON_LIST,
            PolyChunk::TextureId(texture) => {
                if texture.second_texture {
                    TYPE_TEXTURE_ID2
                } else {
                    TYPE_TEXTURE_ID
                }
            }
            PolyChunk::Material(material) => material.type_byte(),
            PolyChunk::Bump(_) => TYPE_MATERIAL_BUMP,
            PolyChunk::Volume(volume) => volume.chunk_type,
            PolyChunk::Strip(strip) => strip.format.type_byte(),
        }
    }
}

/// Decoded polygon list with the file offset of every chunk header.
#[derive(Debug, Clone, Default)]
pub struct PolyList {
    pub chunks: Vec<PolyChunk>,
    pub offsets: Vec<usize>,
}

fn parse_material_body(
    body: &mut &[u8],
    endian: Endian,
    flags: u8,
    colors: MaterialColors,
    second_texture: bool,
) -> WResult<MaterialChunk> {
    let mut read_color = |present: bool| -> WResult<Option<Color>> {
        if present {
            Ok(Some(Color::from_argb8888(parse_split_u32(body, endian)?)))
        } else {
            Ok(None)
        }
    };
    let diffuse = read_color(colors.contains(MaterialColors::DIFFUSE))?;
    let ambient = read_color(colors.contains(MaterialColors::AMBIENT))?;
    let specular = read_color(colors.contains(MaterialColors::SPECULAR))?;
    Ok(MaterialChunk {
        second_texture,
        blend: BlendModes::from_flags(flags),
        diffuse,
        ambient,
        specular,
    })
}

fn parse_strip_body(
    body: &mut &[u8],
    endian: Endian,
    format: StripFormat,
    flags: u8,
) -> WResult<StripChunk> {
    let (strip_count, user_offset) = StripChunk::split_header_word(parse_u16(body, endian)?);
    let mut strips = Vec::with_capacity(strip_count);

    for _ in 0..strip_count {
        let count = parse_i16(body, endian)?;
        let len = count.unsigned_abs() as usize;
        let mut strip = Strip {
            reversed: count < 0,
            ..Default::default()
        };

        for position in 0..len {
            strip.indices.push(parse_u16(body, endian)?);
            if format.uv().is_some() {
                strip.uvs.push([parse_i16(body, endian)?, parse_i16(body, endian)?]);
            }
            if format.has_uv2() {
                strip.uv2s.push([parse_i16(body, endian)?, parse_i16(body, endian)?]);
            }
            if format.has_normal() {
                strip.normals.push([
                    parse_i16(body, endian)?,
                    parse_i16(body, endian)?,
                    parse_i16(body, endian)?,
                ]);
            }
            if format.has_color() {
                strip.colors.push(Color::from_argb8888(parse_split_u32(body, endian)?));
            }
            if position >= 2 {
                for _ in 0..user_offset {
                    strip.user_flags.push(parse_u16(body, endian)?);
                }
            }
        }

        strips.push(strip);
    }

    Ok(StripChunk {
        format,
        flags: StripFlags::from_bits_retain(flags),
        user_offset,
        strips,
    })
}

/// Read a polygon list starting at `file_data[offset..]` up to its `End`
/// sentinel.
pub fn parse_poly_list(
    file_data: &[u8],
    offset: usize,
    endian: Endian,
) -> Result<PolyList, DecodeError> {
    let input = &mut slice_from(file_data, offset, "polygon list")?;
    let mut list = PolyList::default();

    loop {
        let chunk_offset = offset_in(file_data, input);
        let location = ChunkLocation::new(list.chunks.len(), Some(chunk_offset));
        let header = parse_chunk16(input, endian)
            .map_err(truncated(file_data, input, "polygon chunk header"))?;
        let flags = header.flags;

        let malformed = || DecodeError::MalformedChunkHeader {
            location,
            chunk_type: header.chunk_type,
            context: ChunkContext::PolygonList,
        };

        let kind = match header.kind() {
            Recognized::Known(ChunkKind::End) => break,
            Recognized::Known(ChunkKind::Null) => {
                trace!(offset = chunk_offset, "skipping null polygon chunk");
                continue;
            }
            Recognized::Known(ChunkKind::Vertex(_)) | Recognized::Unknown(_) => {
                return Err(malformed());
            }
            Recognized::Known(kind) => kind,
        };

        let chunk = match kind {
            ChunkKind::BlendAlpha => PolyChunk::BlendAlpha(BlendModes::from_flags(flags)),
            ChunkKind::MipmapDAdjust => PolyChunk::MipmapDAdjust(mipmap_bias_from_flags(flags)),
            ChunkKind::SpecularExponent => {
                PolyChunk::SpecularExponent(exponent_from_flags(flags))
            }
            ChunkKind::CachePolygonList => PolyChunk::CachePolygonList(flags),
            ChunkKind::DrawPolygonList => PolyChunk::DrawPolygonList(flags),
            ChunkKind::TextureId { second_texture } => {
                let word = parse_u16(input, endian)
                    .map_err(truncated(file_data, input, "texture id"))?;
                PolyChunk::TextureId(TextureChunk::from_parts(second_texture, flags, word))
            }
            ChunkKind::Material { .. }
            | ChunkKind::MaterialBump
            | ChunkKind::Volume(_)
            | ChunkKind::Strip(_) => {
                // Sized chunks: the size word counts the 16-bit words after it.
                let size = parse_u16(input, endian)
                    .map_err(truncated(file_data, input, "polygon chunk size"))?;
                let body_offset = offset_in(file_data, input);
                let body: &[u8] = take(size as usize * 2)
                    .parse_next(input)
                    .map_err(truncated(file_data, input, "polygon chunk body"))?;
                let body_truncated = |_| DecodeError::Truncated {
                    offset: body_offset,
                    what: "polygon chunk body",
                };
                let body = &mut &body[..];

                match kind {
                    ChunkKind::Material {
                        colors,
                        second_texture,
                    } => PolyChunk::Material(
                        parse_material_body(body, endian, flags, colors, second_texture)
                            .map_err(body_truncated)?,
                    ),
                    ChunkKind::MaterialBump => {
                        let mut values = [0i16; 6];
                        for value in &mut values {
                            *value = parse_i16(body, endian).map_err(body_truncated)?;
                        }
                        PolyChunk::Bump(BumpChunk { flags, values })
                    }
                    ChunkKind::Strip(format) => PolyChunk::Strip(
                        parse_strip_body(body, endian, format, flags).map_err(body_truncated)?,
                    ),
                    _ => {
                        let mut words = Vec::with_capacity(size as usize);
                        for _ in 0..size {
                            words.push(parse_u16(body, endian).map_err(body_truncated)?);
                        }
                        PolyChunk::Volume(VolumeChunk {
                            chunk_type: header.chunk_type,
                            flags,
                            words,
                        })
                    }
                }
            }
            ChunkKind::Null | ChunkKind::End | ChunkKind::Vertex(_) => return Err(malformed()),
        };

        list.chunks.push(chunk);
        list.offsets.push(chunk_offset);
    }

    Ok(list)
}

fn write_strip_body<W: Write + Seek>(
    writer: &mut ChunkWriter<W>,
    chunk: &StripChunk,
) -> io::Result<()> {
    let format = chunk.format;
    writer.write_u16(chunk.header_word())?;

    for strip in &chunk.strips {
        let len = i16::try_from(strip.indices.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("strip of {} indices is too long", strip.indices.len()),
            )
        })?;
        writer.write_i16(if strip.reversed { -len } else { len })?;

        let mut user_words = strip.user_flags.iter().copied();
        for (position, index) in strip.indices.iter().enumerate() {
            writer.write_u16(*index)?;
            if format.uv().is_some() {
                let uv = strip.uvs.get(position).copied().unwrap_or_default();
                writer.write_i16(uv[0])?;
                writer.write_i16(uv[1])?;
            }
            if format.has_uv2() {
                let uv = strip.uv2s.get(position).copied().unwrap_or_default();
                writer.write_i16(uv[0])?;
                writer.write_i16(uv[1])?;
            }
            if format.has_normal() {
                let normal = strip.normals.get(position).copied().unwrap_or_default();
                for component in normal {
                    writer.write_i16(component)?;
                }
            }
            if format.has_color() {
                let color = strip.colors.get(position).copied().unwrap_or(Color::WHITE);
                writer.write_split_u32(color.to_argb8888())?;
            }
            if position >= 2 {
                for _ in 0..chunk.user_offset {
                    writer.write_u16(user_words.next().unwrap_or(0))?;
                }
            }
        }
    }
    Ok(())
}

/// Write a polygon list and its `End` sentinel.
pub fn write_poly_list<W: Write + Seek>(
    writer: &mut ChunkWriter<W>,
    chunks: &[PolyChunk],
) -> io::Result<()> {
    for chunk in chunks {
        let chunk_type = chunk.type_byte();
        match chunk {
            PolyChunk::BlendAlpha(blend) => {
                write_chunk16(writer, Chunk16Header::new(chunk_type, blend.to_flags()))?;
            }
            PolyChunk::MipmapDAdjust(bias) => {
                write_chunk16(writer, Chunk16Header::new(chunk_type, mipmap_bias_to_flags(*bias)))?;
            }
            PolyChunk::SpecularExponent(exponent) => {
                write_chunk16(writer, Chunk16Header::new(chunk_type, exponent_to_flags(*exponent)))?;
            }
            PolyChunk::CachePolygonList(slot) | PolyChunk::DrawPolygonList(slot) => {
                write_chunk16(writer, Chunk16Header::new(chunk_type, *slot))?;
            }
            PolyChunk::TextureId(texture) => {
                write_chunk16(writer, Chunk16Header::new(chunk_type, texture.flags()))?;
                writer.write_u16(texture.word())?;
            }
            PolyChunk::Material(material) => {
                write_chunk16(writer, Chunk16Header::new(chunk_type, material.blend.to_flags()))?;
                writer.write_sized16(|w| {
                    for color in [material.diffuse, material.ambient, material.specular]
                        .into_iter()
                        .flatten()
                    {
                        w.write_split_u32(color.to_argb8888())?;
                    }
                    Ok(())
                })?;
            }
            PolyChunk::Bump(bump) => {
                write_chunk16(writer, Chunk16Header::new(chunk_type, bump.flags))?;
                writer.write_sized16(|w| {
                    for value in bump.values {
                        w.write_i16(value)?;
                    }
                    Ok(())
                })?;
            }
            PolyChunk::Volume(volume) => {
                write_chunk16(writer, Chunk16Header::new(chunk_type, volume.flags))?;
                writer.write_sized16(|w| {
                    for word in &volume.words {
                        w.write_u16(*word)?;
                    }
                    Ok(())
                })?;
            }
            PolyChunk::Strip(strip) => {
                write_chunk16(writer, Chunk16Header::new(chunk_type, strip.flags.bits()))?;
                writer.write_sized16(|w| write_strip_body(w, strip))?;
            }
        }
    }
    write_end16(writer)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::models::material::{AlphaOp, FilterMode};

    fn encode(chunks: &[PolyChunk], endian: Endian) -> Vec<u8> {
        let mut writer = ChunkWriter::new(Cursor::new(Vec::new()), endian);
        write_poly_list(&mut writer, chunks).unwrap();
        writer.into_inner().into_inner()
    }

    fn sample_chunks() -> Vec<PolyChunk> {
        let mut strip = Strip::new(vec![0, 1, 2, 3], true);
        strip.uvs = vec![[0, 0], [255, 0], [0, 255], [255, 255]];
        strip.user_flags = vec![0x1111, 0x2222];

        vec![
            PolyChunk::BlendAlpha(BlendModes {
                src: AlphaOp::One,
                dst: AlphaOp::Zero,
            }),
            PolyChunk::MipmapDAdjust(5),
            PolyChunk::SpecularExponent(12),
            PolyChunk::TextureId(TextureChunk {
                id: 5,
                clamp_u: true,
                filter: FilterMode::Trilinear,
                ..Default::default()
            }),
            PolyChunk::Material(MaterialChunk {
                second_texture: false,
                blend: BlendModes::default(),
                diffuse: Some(Color::from_argb8888(0xFF10_2030)),
                ambient: None,
                specular: Some(Color::from_argb8888(0x10FF_FFFF)),
            }),
            PolyChunk::Bump(BumpChunk {
                flags: 0,
                values: [1, -2, 3, -4, 5, -6],
            }),
            PolyChunk::Volume(VolumeChunk {
                chunk_type: 56,
                flags: 3,
                words: vec![1, 2, 3],
            }),
            PolyChunk::CachePolygonList(3),
            PolyChunk::DrawPolygonList(3),
            PolyChunk::Strip(StripChunk {
                format: StripFormat::Uvn,
                flags: StripFlags::DOUBLE_SIDED | StripFlags::USE_ALPHA,
                user_offset: 1,
                strips: vec![strip],
            }),
        ]
    }

    #[test]
    fn round_trip_both_endians() {
        let chunks = sample_chunks();
        for endian in [Endian::Little, Endian::Big] {
            let bytes = encode(&chunks, endian);
            let list = parse_poly_list(&bytes, 0, endian).unwrap();
            assert_eq!(list.chunks, chunks);
            assert_eq!(list.offsets.len(), chunks.len());
            assert_eq!(list.offsets[0], 0);
        }
    }

    #[test]
    fn strip_payload_formats_round_trip() {
        for format in StripFormat::ALL {
            let mut strip = Strip::new(vec![4, 5, 6], false);
            if format.uv().is_some() {
                strip.uvs = vec![[1, 2], [3, 4], [5, 6]];
            }
            if format.has_uv2() {
                strip.uv2s = vec![[-1, -2], [-3, -4], [-5, -6]];
            }
            if format.has_normal() {
                strip.normals = vec![[0, 32767, 0]; 3];
            }
            if format.has_color() {
                strip.colors = vec![Color::MID_GREY; 3];
            }
            let chunks = vec![PolyChunk::Strip(StripChunk {
                format,
                flags: StripFlags::empty(),
                user_offset: 0,
                strips: vec![strip],
            })];
            let bytes = encode(&chunks, Endian::Big);
            // header + size + strip header + count + payload + end
            assert_eq!(bytes.len(), 2 + 2 + 2 + 2 + 6 * format.words_per_index() + 2);
            assert_eq!(parse_poly_list(&bytes, 0, Endian::Big).unwrap().chunks, chunks);
        }
    }

    #[test]
    fn material_size_word_counts_following_words() {
        let chunks = vec![PolyChunk::Material(MaterialChunk {
            second_texture: false,
            blend: BlendModes::default(),
            diffuse: Some(Color::WHITE),
            ambient: Some(Color::WHITE),
            specular: None,
        })];
        let bytes = encode(&chunks, Endian::Little);
        assert_eq!(bytes[0], 19);
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 4);
        assert_eq!(bytes.len(), 2 + 2 + 8 + 2);
    }

    #[test]
    fn vertex_chunk_in_polygon_list_is_malformed() {
        let bytes = [8u8, 0, 5, 0, 41, 0];
        let err = parse_poly_list(&bytes, 0, Endian::Little).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MalformedChunkHeader {
                chunk_type: 41,
                context: ChunkContext::PolygonList,
                location: ChunkLocation {
                    index: 1,
                    offset: Some(4)
                },
            }
        ));
    }

    #[test]
    fn skipped_nulls_do_not_shift_locations() {
        let bytes = [0u8, 0, 0, 0, 41, 0];
        let err = parse_poly_list(&bytes, 0, Endian::Little).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MalformedChunkHeader {
                chunk_type: 41,
                location: ChunkLocation {
                    index: 0,
                    offset: Some(4)
                },
                ..
            }
        ));
    }

    #[test]
    fn null_chunks_are_skipped() {
        let mut bytes = vec![0u8, 0, 0, 0];
        bytes.extend(encode(&[PolyChunk::CachePolygonList(1)], Endian::Little));
        let list = parse_poly_list(&bytes, 0, Endian::Little).unwrap();
        assert_eq!(list.chunks, vec![PolyChunk::CachePolygonList(1)]);
        assert_eq!(list.offsets, vec![4]);
    }

    #[test]
    fn truncated_strip_reports_body_offset() {
        let chunks = sample_chunks();
        let mut bytes = encode(&chunks[9..], Endian::Little);
        // Claim one more strip than is present.
        bytes[4] += 1;
        assert!(matches!(
            parse_poly_list(&bytes, 0, Endian::Little),
            Err(DecodeError::Truncated { offset: 4, .. })
        ));
    }
}
