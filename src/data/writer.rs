//! Endian-aware binary writer for chunk lists.
//!
//! Chunk sizes are only known once a body has been written, so sized records
//! are written in two phases: a placeholder is reserved, the body is emitted,
//! then the writer seeks back and fills in the header.

use std::io::{self, Seek, SeekFrom, Write};

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use glam::{Vec3, Vec4};

use crate::data::Endian;

/// Writer for chunk lists and records in a fixed stream endianness.
pub struct ChunkWriter<W: Write + Seek> {
    writer: W,
    endian: Endian,
}

macro_rules! endian_write {
    ($name:ident, $method:ident, $ty:ty) => {
        pub fn $name(&mut self, value: $ty) -> io::Result<()> {
            match self.endian {
                Endian::Little => self.writer.$method::<LittleEndian>(value),
                Endian::Big => self.writer.$method::<BigEndian>(value),
            }
        }
    };
}

impl<W: Write + Seek> ChunkWriter<W> {
    pub fn new(writer: W, endian: Endian) -> Self {
        Self { writer, endian }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn position(&mut self) -> io::Result<u64> {
        self.writer.stream_position()
    }

    pub fn write_u8(&mut self, value: u8) -> io::Result<()> {
        self.writer.write_u8(value)
    }

    endian_write!(write_u16, write_u16, u16);
    endian_write!(write_i16, write_i16, i16);
    endian_write!(write_u32, write_u32, u32);
    endian_write!(write_i32, write_i32, i32);
    endian_write!(write_f32, write_f32, f32);

    pub fn write_vec3(&mut self, value: Vec3) -> io::Result<()> {
        self.write_f32(value.x)?;
        self.write_f32(value.y)?;
        self.write_f32(value.z)
    }

    pub fn write_vec4(&mut self, value: Vec4) -> io::Result<()> {
        self.write_f32(value.x)?;
        self.write_f32(value.y)?;
        self.write_f32(value.z)?;
        self.write_f32(value.w)
    }

    /// Write a 32-bit value as two 16-bit words, low word first.
    pub fn write_split_u32(&mut self, value: u32) -> io::Result<()> {
        self.write_u16(value as u16)?;
        self.write_u16((value >> 16) as u16)
    }

    /// Pad with zero bytes until the position is a multiple of `alignment`.
    pub fn align(&mut self, alignment: u64) -> io::Result<()> {
        let pos = self.position()?;
        let padding = (alignment - pos % alignment) % alignment;
        for _ in 0..padding {
            self.writer.write_u8(0)?;
        }
        Ok(())
    }

    /// Write a 32-bit chunk header (`size << 16 | flags << 8 | type`) whose
    /// size field counts the 4-byte words of the body written by `body`.
    pub fn write_chunk32<F>(&mut self, chunk_type: u8, flags: u8, body: F) -> io::Result<()>
    where
        F: FnOnce(&mut Self) -> io::Result<()>,
    {
        let header_pos = self.position()?;
        // Placeholder, patched below once the body length is known.
        self.write_u32(0)?;
        let body_start = self.position()?;
        body(self)?;
        self.align(4)?;
        let body_end = self.position()?;

        let words = (body_end - body_start) / 4;
        let size = u16::try_from(words).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("chunk body of {words} words does not fit a 16-bit size"),
            )
        })?;
        let header = (size as u32) << 16 | (flags as u32) << 8 | chunk_type as u32;

        self.writer.seek(SeekFrom::Start(header_pos))?;
        self.write_u32(header)?;
        self.writer.seek(SeekFrom::Start(body_end))?;
        Ok(())
    }

    /// Write a 16-bit size word counting the 2-byte words emitted by `body`.
    pub fn write_sized16<F>(&mut self, body: F) -> io::Result<()>
    where
        F: FnOnce(&mut Self) -> io::Result<()>,
    {
        let size_pos = self.position()?;
        self.write_u16(0)?;
        let body_start = self.position()?;
        body(self)?;
        self.align(2)?;
        let body_end = self.position()?;

        let words = (body_end - body_start) / 2;
        let size = u16::try_from(words).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("chunk body of {words} words does not fit a 16-bit size"),
            )
        })?;

        self.writer.seek(SeekFrom::Start(size_pos))?;
        self.write_u16(size)?;
        self.writer.seek(SeekFrom::Start(body_end))?;
        Ok(())
    }

    /// Overwrite a 32-bit value at `pos` and return to the current position.
    pub fn patch_u32(&mut self, pos: u64, value: u32) -> io::Result<()> {
        let current = self.position()?;
        self.writer.seek(SeekFrom::Start(pos))?;
        self.write_u32(value)?;
        self.writer.seek(SeekFrom::Start(current))?;
        Ok(())
    }

    /// Consume the writer and return the inner writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}
