//! Geometry records: a vertex list, a polygon list and a bounding sphere.

use std::io::{self, Seek, Write};

use glam::Vec3;
use winnow::error::{ContextError, ErrMode};

use crate::data::Endian;
use crate::data::parser_utils::{WResult, parse_f32, parse_u32, parse_vec3, slice_from};
use crate::data::writer::ChunkWriter;
use crate::error::DecodeError;
use crate::models::poly_chunk::{PolyChunk, parse_poly_list, write_poly_list};
use crate::models::vertex_chunk::{VertexChunk, parse_vertex_list, write_vertex_list};

/// Size in bytes of an on-disk geometry record.
pub const GEOMETRY_RECORD_SIZE: usize = 24;

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Geometry {
    pub vertex_chunks: Vec<VertexChunk>,
    pub poly_chunks: Vec<PolyChunk>,
    /// File offsets of the chunks above. Empty for geometry built in memory.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub vertex_offsets: Vec<usize>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub poly_offsets: Vec<usize>,
    pub center: Vec3,
    pub radius: f32,
}

impl Geometry {
    pub fn new(vertex_chunks: Vec<VertexChunk>, poly_chunks: Vec<PolyChunk>) -> Self {
        let mut geometry = Geometry {
            vertex_chunks,
            poly_chunks,
            ..Default::default()
        };
        geometry.update_bounds();
        geometry
    }

    /// Vertex-only geometry that exists to contribute weighted vertices to
    /// another node's mesh.
    pub fn is_supplementary(&self) -> bool {
        self.poly_chunks.is_empty() && !self.vertex_chunks.is_empty()
    }

    /// Recompute the bounding sphere from the vertex positions.
    pub fn update_bounds(&mut self) {
        let mut positions = self
            .vertex_chunks
            .iter()
            .flat_map(|chunk| chunk.vertices.iter().map(|v| v.position))
            .peekable();
        let Some(first) = positions.peek().copied() else {
            self.center = Vec3::ZERO;
            self.radius = 0.0;
            return;
        };
        let (min, max) = positions.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        self.center = (min + max) * 0.5;
        self.radius = self
            .vertex_chunks
            .iter()
            .flat_map(|chunk| chunk.vertices.iter())
            .map(|v| v.position.distance(self.center))
            .fold(0.0, f32::max);
    }
}

/// Resolve a stored pointer into a file offset. `0` is the null pointer.
pub fn resolve_pointer(
    file_data: &[u8],
    field_offset: usize,
    pointer: u32,
    key: u32,
) -> Result<Option<usize>, DecodeError> {
    if pointer == 0 {
        return Ok(None);
    }
    match pointer.checked_sub(key) {
        Some(offset) if (offset as usize) < file_data.len() => Ok(Some(offset as usize)),
        _ => Err(DecodeError::BadPointer {
            offset: field_offset,
            pointer,
            key,
        }),
    }
}

/// Encode a file offset as a pointer. Callers never pass offset 0 for a live
/// record, since 0 is reserved for null.
pub fn encode_pointer(offset: Option<u64>, key: u32) -> io::Result<u32> {
    let Some(offset) = offset else {
        return Ok(0);
    };
    u32::try_from(offset)
        .ok()
        .and_then(|offset| offset.checked_add(key))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("offset 0x{offset:X} with key 0x{key:X} does not fit a pointer"),
            )
        })
}

struct GeometryRecord {
    vertex_list: u32,
    poly_list: u32,
    center: Vec3,
    radius: f32,
}

fn parse_geometry_record(input: &mut &[u8], endian: Endian) -> WResult<GeometryRecord> {
    Ok(GeometryRecord {
        vertex_list: parse_u32(input, endian)?,
        poly_list: parse_u32(input, endian)?,
        center: parse_vec3(input, endian)?,
        radius: parse_f32(input, endian)?,
    })
}

/// Read the geometry record at `offset` and both chunk lists it points to.
pub fn parse_geometry(
    file_data: &[u8],
    offset: usize,
    key: u32,
    endian: Endian,
) -> Result<Geometry, DecodeError> {
    let input = &mut slice_from(file_data, offset, "geometry record")?;
    let record = parse_geometry_record(input, endian).map_err(|_: ErrMode<ContextError>| {
        DecodeError::Truncated {
            offset,
            what: "geometry record",
        }
    })?;

    let mut geometry = Geometry {
        center: record.center,
        radius: record.radius,
        ..Default::default()
    };

    if let Some(vertex_offset) = resolve_pointer(file_data, offset, record.vertex_list, key)? {
        let list = parse_vertex_list(file_data, vertex_offset, endian)?;
        geometry.vertex_chunks = list.chunks;
        geometry.vertex_offsets = list.offsets;
    }
    if let Some(poly_offset) = resolve_pointer(file_data, offset + 4, record.poly_list, key)? {
        let list = parse_poly_list(file_data, poly_offset, endian)?;
        geometry.poly_chunks = list.chunks;
        geometry.poly_offsets = list.offsets;
    }

    Ok(geometry)
}

/// Write both chunk lists followed by the geometry record. Returns the
/// record's offset.
pub fn write_geometry<W: Write + Seek>(
    writer: &mut ChunkWriter<W>,
    geometry: &Geometry,
    key: u32,
) -> io::Result<u64> {
    let vertex_list = if geometry.vertex_chunks.is_empty() {
        None
    } else {
        writer.align(4)?;
        let offset = writer.position()?;
        write_vertex_list(writer, &geometry.vertex_chunks)?;
        Some(offset)
    };

    let poly_list = if geometry.poly_chunks.is_empty() {
        None
    } else {
        writer.align(4)?;
        let offset = writer.position()?;
        write_poly_list(writer, &geometry.poly_chunks)?;
        Some(offset)
    };

    writer.align(4)?;
    let record_offset = writer.position()?;
    writer.write_u32(encode_pointer(vertex_list, key)?)?;
    writer.write_u32(encode_pointer(poly_list, key)?)?;
    writer.write_vec3(geometry.center)?;
    writer.write_f32(geometry.radius)?;
    Ok(record_offset)
}
