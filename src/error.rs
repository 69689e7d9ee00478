use std::fmt;

use thiserror::Error;

use crate::import::ImportError;

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
}

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Import error: {0}")]
    Import(#[from] ImportError),
    #[error("IO error")]
    IoError(#[from] std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

impl std::convert::From<DecodeError> for Error {
    fn from(x: DecodeError) -> Error {
        Error { kind: x.into() }
    }
}

impl std::convert::From<ImportError> for Error {
    fn from(x: ImportError) -> Error {
        Error { kind: x.into() }
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(x: std::io::Error) -> Error {
        Error { kind: x.into() }
    }
}

pub type IResult<T> = Result<T, Error>;

/// Which chunk list a chunk was found in. Vertex and polygon lists accept
/// disjoint sets of chunk types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkContext {
    VertexList,
    PolygonList,
}

impl fmt::Display for ChunkContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkContext::VertexList => f.write_str("vertex list"),
            ChunkContext::PolygonList => f.write_str("polygon list"),
        }
    }
}

/// Position of a chunk among the decoded chunks of its list (skipped `Null`
/// chunks are not counted, so it indexes `Geometry::vertex_chunks` or
/// `poly_chunks`), plus its file offset when the list was read from bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLocation {
    pub index: usize,
    pub offset: Option<usize>,
}

impl ChunkLocation {
    pub fn new(index: usize, offset: Option<usize>) -> Self {
        ChunkLocation { index, offset }
    }
}

impl fmt::Display for ChunkLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "chunk #{} at 0x{offset:X}", self.index),
            None => write!(f, "chunk #{}", self.index),
        }
    }
}

/// Fatal conditions while decoding one geometry. None of these poison the
/// rest of a model: callers walking a hierarchy may skip the failing node.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("chunk type {chunk_type} is not valid in a {context} ({location})")]
    MalformedChunkHeader {
        location: ChunkLocation,
        chunk_type: u8,
        context: ChunkContext,
    },
    #[error("vertex chunk declares {count} vertices, more than the 4096 limit ({location})")]
    OversizedVertexChunk { location: ChunkLocation, count: u32 },
    #[error("strip references vertex id {id} which no vertex chunk has written ({location})")]
    DanglingStripReference { location: ChunkLocation, id: u32 },
    #[error("chunk type {chunk_type} found inside a cached polygon list ({location})")]
    NestedCacheViolation {
        location: ChunkLocation,
        chunk_type: u8,
    },
    #[error("unexpected end of data at 0x{offset:X} while reading {what}")]
    Truncated { offset: usize, what: &'static str },
    #[error("pointer 0x{pointer:X} at 0x{offset:X} does not resolve into the file (key 0x{key:X})")]
    BadPointer { offset: usize, pointer: u32, key: u32 },
    #[error("node record at 0x{offset:X} is reachable from itself")]
    PointerCycle { offset: usize },
}

impl DecodeError {
    /// File offset the error was raised at, if it is known.
    pub fn offset(&self) -> Option<usize> {
        match self {
            DecodeError::MalformedChunkHeader { location, .. }
            | DecodeError::OversizedVertexChunk { location, .. }
            | DecodeError::DanglingStripReference { location, .. }
            | DecodeError::NestedCacheViolation { location, .. } => location.offset,
            DecodeError::Truncated { offset, .. }
            | DecodeError::BadPointer { offset, .. }
            | DecodeError::PointerCycle { offset } => Some(*offset),
        }
    }
}
