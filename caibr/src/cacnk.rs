//! On-disk chunk file framing.
//!
//! | Offset | Size | Description                            |
//! |--------|------|----------------------------------------|
//! |      0 |    3 | Chunk file magic (CA C4 4B).           |
//! |      3 |    1 | Compression tag (0 = none, 1 = zstd).  |
//! |      4 |    8 | Payload size in bytes (u64 be).        |
//! |     12 |    n | Payload, possibly compressed.          |
//!
//! The frame never carries the chunk id. Identity is the store's
//! concern; it lives in the index and in the chunk file name.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Chunk, ChunkId, CompressedChunk, Compression, CompressionError};

/// Chunk file magic.
pub const CHUNK_MAGIC: [u8; 3] = [0xca, 0xc4, 0x4b];

/// Size of the fixed frame header.
pub const HEADER_SIZE: usize = CHUNK_MAGIC.len() + 1 + 8;

/// File extension used for stored chunks.
pub const CHUNK_FILE_EXT: &str = "cacnk";

#[derive(Debug)]
pub enum FrameError {
    NotAChunk,
    UnexpectedEnd,
    UnsupportedCompression(u8),
    Compression(CompressionError),
}

impl std::error::Error for FrameError {}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAChunk => write!(f, "is not a chunk file"),
            Self::UnexpectedEnd => write!(f, "unexpected end of chunk file"),
            Self::UnsupportedCompression(tag) => {
                write!(f, "unsupported chunk compression (tag {})", tag)
            }
            Self::Compression(err) => write!(f, "compression error: {}", err),
        }
    }
}

impl From<CompressionError> for FrameError {
    fn from(e: CompressionError) -> Self {
        Self::Compression(e)
    }
}

/// File name of a stored chunk.
pub fn file_name(id: &ChunkId) -> String {
    format!("{}.{}", id, CHUNK_FILE_EXT)
}

/// Frame a compressed chunk for on-disk storage.
pub fn encode(chunk: &CompressedChunk) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + chunk.len());
    buf.put_slice(&CHUNK_MAGIC);
    buf.put_u8(chunk.compression().tag());
    buf.put_u64(chunk.len() as u64);
    buf.put_slice(chunk.data());
    buf.freeze()
}

/// Parse a framed chunk and return the uncompressed content.
pub fn decode(mut framed: Bytes) -> Result<Chunk, FrameError> {
    if framed.len() < CHUNK_MAGIC.len() {
        return Err(FrameError::NotAChunk);
    }
    if framed[..CHUNK_MAGIC.len()] != CHUNK_MAGIC {
        return Err(FrameError::NotAChunk);
    }
    if framed.len() < HEADER_SIZE {
        return Err(FrameError::UnexpectedEnd);
    }
    framed.advance(CHUNK_MAGIC.len());
    let tag = framed.get_u8();
    let payload_size = framed.get_u64() as usize;
    if framed.remaining() != payload_size {
        return Err(FrameError::UnexpectedEnd);
    }
    let compression =
        Compression::from_tag(tag).ok_or(FrameError::UnsupportedCompression(tag))?;
    let data = compression.decompress(framed, payload_size)?;
    Ok(Chunk(data))
}
