//! Vertex chunks: the 32-bit-header records of a geometry's vertex list.

use std::io::{self, Seek, Write};

use glam::{Vec3, Vec4};
use tracing::trace;
use winnow::Parser;
use winnow::error::{ContextError, ErrMode};
use winnow::token::take;

use crate::data::Endian;
use crate::data::bits::BitField;
use crate::data::parser_utils::{
    WResult, offset_in, parse_u16, parse_u32, parse_vec3, parse_vec4, slice_from, truncated,
};
use crate::data::writer::ChunkWriter;
use crate::error::{ChunkContext, ChunkLocation, DecodeError};
use crate::models::chunk::{ChunkKind, parse_chunk32, write_end32};
use crate::models::color::Color;
use crate::models::vertex_format::{
    AttributeFormat, AttributeSemantic, VertexFormat, pack_normal30, unpack_normal30,
};
use crate::recognized::Recognized;

/// Largest vertex count a single chunk may declare.
pub const MAX_VERTICES_PER_CHUNK: usize = 4096;

const FLAG_WEIGHT_STATUS: BitField = BitField::new(0, 1);
const FLAG_CONTINUE: BitField = BitField::bit(7);

const NINJA_LOCAL_ID: BitField = BitField::new(0, 15);
const NINJA_WEIGHT: BitField = BitField::new(16, 23);

/// Position of a weighted write in the blend sequence of one vertex id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WeightStatus {
    #[default]
    Start,
    Middle,
    End,
}

impl WeightStatus {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => WeightStatus::Start,
            1 => WeightStatus::Middle,
            // 3 is unused by producers; it continues a blend like End.
            _ => WeightStatus::End,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            WeightStatus::Start => 0,
            WeightStatus::Middle => 1,
            WeightStatus::End => 2,
        }
    }
}

/// Packed weight byte and local vertex id of a weighted vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NinjaFlags {
    pub weight: u8,
    pub local_id: u16,
}

impl NinjaFlags {
    pub fn from_raw(raw: u32) -> Self {
        NinjaFlags {
            weight: NINJA_WEIGHT.unpack(raw) as u8,
            local_id: NINJA_LOCAL_ID.unpack(raw) as u16,
        }
    }

    pub fn to_raw(self) -> u32 {
        let mut raw = 0u32;
        NINJA_WEIGHT.pack(&mut raw, self.weight as u32);
        NINJA_LOCAL_ID.pack(&mut raw, self.local_id as u32);
        raw
    }

    pub fn weight_factor(self) -> f32 {
        self.weight as f32 / 255.0
    }
}

/// One vertex as stored in a chunk. Which fields are populated depends on
/// the chunk's [`VertexFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChunkVertex {
    pub position: Vec3,
    pub normal: Option<Vec3>,
    pub diffuse: Option<Color>,
    pub specular: Option<Color>,
    pub user_flags: Option<u32>,
    pub ninja_flags: Option<NinjaFlags>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexChunk {
    pub format: VertexFormat,
    pub flags: u8,
    pub base_index: u16,
    pub vertices: Vec<ChunkVertex>,
}

impl VertexChunk {
    pub fn new(format: VertexFormat, base_index: u16, vertices: Vec<ChunkVertex>) -> Self {
        VertexChunk {
            format,
            flags: 0,
            base_index,
            vertices,
        }
    }

    pub fn weight_status(&self) -> WeightStatus {
        WeightStatus::from_bits(FLAG_WEIGHT_STATUS.unpack(self.flags) as u8)
    }

    pub fn set_weight_status(&mut self, status: WeightStatus) {
        FLAG_WEIGHT_STATUS.pack(&mut self.flags, status.bits() as u32);
    }

    pub fn is_continue(&self) -> bool {
        FLAG_CONTINUE.unpack_bool(self.flags)
    }

    pub fn set_continue(&mut self, value: bool) {
        FLAG_CONTINUE.pack_bool(&mut self.flags, value);
    }

    /// Cache id written by the vertex at `local`.
    pub fn vertex_id(&self, local: usize) -> u32 {
        let slot = match self.vertices[local].ninja_flags {
            Some(flags) if self.format.is_weighted() => flags.local_id as u32,
            _ => local as u32,
        };
        self.base_index as u32 + slot
    }
}

fn parse_vertex(input: &mut &[u8], endian: Endian, format: VertexFormat) -> WResult<ChunkVertex> {
    let mut vertex = ChunkVertex::default();
    for attribute in format.layout().attributes {
        match (attribute.semantic, attribute.format) {
            (AttributeSemantic::Position, AttributeFormat::Float32x4) => {
                vertex.position = parse_vec4(input, endian)?.truncate();
            }
            (AttributeSemantic::Position, _) => vertex.position = parse_vec3(input, endian)?,
            (AttributeSemantic::Normal, AttributeFormat::Float32x4) => {
                vertex.normal = Some(parse_vec4(input, endian)?.truncate());
            }
            (AttributeSemantic::Normal, AttributeFormat::PackedNormal30) => {
                vertex.normal = Some(unpack_normal30(parse_u32(input, endian)?));
            }
            (AttributeSemantic::Normal, _) => vertex.normal = Some(parse_vec3(input, endian)?),
            (AttributeSemantic::Diffuse | AttributeSemantic::Specular, format) => {
                let color = match format {
                    AttributeFormat::Argb8888 => Color::from_argb8888(parse_u32(input, endian)?),
                    AttributeFormat::Rgb565 => Color::from_rgb565(parse_u16(input, endian)?),
                    AttributeFormat::Argb4444 => Color::from_argb4444(parse_u16(input, endian)?),
                    _ => Color::from_intensity(parse_u16(input, endian)?),
                };
                if attribute.semantic == AttributeSemantic::Diffuse {
                    vertex.diffuse = Some(color);
                } else {
                    vertex.specular = Some(color);
                }
            }
            (AttributeSemantic::UserFlags, _) => {
                vertex.user_flags = Some(parse_u32(input, endian)?);
            }
            (AttributeSemantic::NinjaFlags, _) => {
                vertex.ninja_flags = Some(NinjaFlags::from_raw(parse_u32(input, endian)?));
            }
        }
    }
    Ok(vertex)
}

fn write_vertex<W: Write + Seek>(
    writer: &mut ChunkWriter<W>,
    format: VertexFormat,
    vertex: &ChunkVertex,
) -> io::Result<()> {
    for attribute in format.layout().attributes {
        match (attribute.semantic, attribute.format) {
            (AttributeSemantic::Position, AttributeFormat::Float32x4) => {
                writer.write_vec4(vertex.position.extend(1.0))?;
            }
            (AttributeSemantic::Position, _) => writer.write_vec3(vertex.position)?,
            (AttributeSemantic::Normal, format) => {
                let normal = vertex.normal.unwrap_or(Vec3::ZERO);
                match format {
                    AttributeFormat::Float32x4 => writer.write_vec4(Vec4::from((normal, 0.0)))?,
                    AttributeFormat::PackedNormal30 => writer.write_u32(pack_normal30(normal))?,
                    _ => writer.write_vec3(normal)?,
                }
            }
            (AttributeSemantic::Diffuse | AttributeSemantic::Specular, format) => {
                let color = if attribute.semantic == AttributeSemantic::Diffuse {
                    vertex.diffuse
                } else {
                    vertex.specular
                }
                .unwrap_or(Color::WHITE);
                match format {
                    AttributeFormat::Argb8888 => writer.write_u32(color.to_argb8888())?,
                    AttributeFormat::Rgb565 => writer.write_u16(color.to_rgb565())?,
                    AttributeFormat::Argb4444 => writer.write_u16(color.to_argb4444())?,
                    _ => writer.write_u16(color.to_intensity())?,
                }
            }
            (AttributeSemantic::UserFlags, _) => writer.write_u32(vertex.user_flags.unwrap_or(0))?,
            (AttributeSemantic::NinjaFlags, _) => {
                writer.write_u32(vertex.ninja_flags.unwrap_or_default().to_raw())?;
            }
        }
    }
    Ok(())
}

/// Decoded vertex list with the file offset of every chunk header.
#[derive(Debug, Clone, Default)]
pub struct VertexList {
    pub chunks: Vec<VertexChunk>,
    pub offsets: Vec<usize>,
}

/// Read a vertex list starting at `file_data[offset..]` up to its `End`
/// sentinel. `Null` chunks are skipped.
pub fn parse_vertex_list(
    file_data: &[u8],
    offset: usize,
    endian: Endian,
) -> Result<VertexList, DecodeError> {
    let input = &mut slice_from(file_data, offset, "vertex list")?;
    let mut list = VertexList::default();

    loop {
        let chunk_offset = offset_in(file_data, input);
        let location = ChunkLocation::new(list.chunks.len(), Some(chunk_offset));
        let header = parse_chunk32(input, endian)
            .map_err(truncated(file_data, input, "vertex chunk header"))?;

        // The size word of an `End` or foreign header is not trusted.
        let format = match header.kind() {
            Recognized::Known(ChunkKind::End) => break,
            Recognized::Known(ChunkKind::Null) => None,
            Recognized::Known(ChunkKind::Vertex(format)) => Some(format),
            _ => {
                return Err(DecodeError::MalformedChunkHeader {
                    location,
                    chunk_type: header.chunk_type,
                    context: ChunkContext::VertexList,
                });
            }
        };

        let body: &[u8] = take(header.body_len())
            .parse_next(input)
            .map_err(truncated(file_data, input, "vertex chunk body"))?;

        let Some(format) = format else {
            trace!(offset = chunk_offset, "skipping null vertex chunk");
            continue;
        };

        let body_input = &mut &body[..];
        let body_header = parse_u32(body_input, endian).map_err(|_: ErrMode<ContextError>| {
            DecodeError::Truncated {
                offset: chunk_offset + 4,
                what: "vertex chunk body header",
            }
        })?;
        let base_index = body_header as u16;
        let count = body_header >> 16;
        if count as usize > MAX_VERTICES_PER_CHUNK {
            return Err(DecodeError::OversizedVertexChunk { location, count });
        }

        let mut vertices = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let vertex_offset = chunk_offset + 4 + (body.len() - body_input.len());
            let vertex = parse_vertex(body_input, endian, format).map_err(
                |_: ErrMode<ContextError>| DecodeError::Truncated {
                    offset: vertex_offset,
                    what: "vertex",
                },
            )?;
            vertices.push(vertex);
        }

        list.chunks.push(VertexChunk {
            format,
            flags: header.flags,
            base_index,
            vertices,
        });
        list.offsets.push(chunk_offset);
    }

    Ok(list)
}

/// Write a vertex list and its `End` sentinel.
pub fn write_vertex_list<W: Write + Seek>(
    writer: &mut ChunkWriter<W>,
    chunks: &[VertexChunk],
) -> io::Result<()> {
    for chunk in chunks {
        if chunk.vertices.len() > MAX_VERTICES_PER_CHUNK {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "vertex chunk holds {} vertices, more than {MAX_VERTICES_PER_CHUNK}",
                    chunk.vertices.len()
                ),
            ));
        }
        writer.write_chunk32(chunk.format.type_byte(), chunk.flags, |w| {
            let count = chunk.vertices.len() as u32;
            w.write_u32(count << 16 | chunk.base_index as u32)?;
            for vertex in &chunk.vertices {
                write_vertex(w, chunk.format, vertex)?;
            }
            Ok(())
        })?;
    }
    write_end32(writer)
}
