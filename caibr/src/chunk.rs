#![allow(clippy::len_without_is_empty)]
use bytes::Bytes;

use crate::{ChunkId, Compression, CompressionError, HashSum};

/// A single chunk.
///
/// Represents a single chunk of a source stream. Is not compressed.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk(pub(crate) Bytes);

impl<T> From<T> for Chunk
where
    T: Into<bytes::Bytes>,
{
    fn from(b: T) -> Self {
        Self(b.into())
    }
}

impl Chunk {
    /// Chunk data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.0[..]
    }
    /// Size of chunk.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }
    /// Create a verified chunk by calculating its id and checksum.
    #[inline]
    pub fn verify(self) -> VerifiedChunk {
        VerifiedChunk::from(self)
    }
    /// Create a compressed chunk.
    #[inline]
    pub fn compress(self, compression: Compression) -> Result<CompressedChunk, CompressionError> {
        CompressedChunk::try_compress(compression, self)
    }
    #[inline]
    pub fn into_inner(self) -> Bytes {
        self.0
    }
}

/// A chunk with its identity and checksum computed.
#[derive(Debug, Clone)]
pub struct VerifiedChunk {
    pub(crate) chunk: Chunk,
    pub(crate) id: ChunkId,
    pub(crate) checksum: HashSum,
}

impl From<Chunk> for VerifiedChunk {
    fn from(chunk: Chunk) -> Self {
        Self::new(chunk)
    }
}

impl VerifiedChunk {
    /// Create a new verified chunk by digesting it.
    pub fn new(chunk: Chunk) -> Self {
        Self {
            id: ChunkId::from_data(chunk.data()),
            checksum: HashSum::sha256(chunk.data()),
            chunk,
        }
    }
    /// Size of chunk.
    #[inline]
    pub fn len(&self) -> usize {
        self.chunk.len()
    }
    /// Get chunk.
    #[inline]
    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }
    /// Get chunk data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.chunk.data()
    }
    /// Get id of chunk.
    #[inline]
    pub fn id(&self) -> &ChunkId {
        &self.id
    }
    /// Get checksum of chunk.
    #[inline]
    pub fn checksum(&self) -> &HashSum {
        &self.checksum
    }
    /// Split into id and chunk.
    #[inline]
    pub fn into_parts(self) -> (ChunkId, HashSum, Chunk) {
        (self.id, self.checksum, self.chunk)
    }
}

/// A compressed chunk.
#[derive(Debug, Clone)]
pub struct CompressedChunk {
    pub(crate) data: Bytes,
    pub(crate) source_size: usize,
    pub(crate) compression: Compression,
}

impl CompressedChunk {
    /// Create a compressed chunk.
    ///
    /// Falls back to storing the chunk data as is when compression does
    /// not make it smaller, so the stored payload is never bigger than
    /// the source. A stored payload is compressed if and only if it is
    /// smaller than the source size.
    pub fn try_compress(
        compression: Compression,
        chunk: Chunk,
    ) -> Result<CompressedChunk, CompressionError> {
        let source = chunk.0;
        let source_size = source.len();
        let data = compression.compress(source.clone())?;
        if data.len() < source_size {
            Ok(CompressedChunk {
                data,
                source_size,
                compression,
            })
        } else {
            Ok(CompressedChunk {
                data: source,
                source_size,
                compression: Compression::None,
            })
        }
    }
    /// Chunk data, possibly compressed.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }
    /// Size of the stored chunk data.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }
    /// Size of the chunk when decompressed.
    #[inline]
    pub fn source_size(&self) -> usize {
        self.source_size
    }
    /// Decompress the chunk.
    pub fn decompress(self) -> Result<Chunk, CompressionError> {
        let data = self
            .compression
            .decompress(self.data, self.source_size)?;
        Ok(Chunk(data))
    }
    /// Compression used for chunk.
    #[inline]
    pub fn compression(&self) -> Compression {
        self.compression
    }
    #[inline]
    pub fn into_inner(self) -> (Compression, Bytes) {
        (self.compression, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_digests() {
        let verified = Chunk::from(vec![0x41u8; 10000]).verify();
        assert_eq!(
            verified.id().to_string(),
            "5b40cbafad64f231f8396e38af5aa754eae8ce61beca208f13e4145abedee849"
        );
        assert_eq!(
            verified.checksum().to_string(),
            "85757d9ef5868bb53472a6be8d81d1e3c398546b69b107141ad336053c40cb54"
        );
    }

    #[test]
    fn compress_roundtrip() {
        let chunk = Chunk::from(vec![0x42u8; 4096]);
        let compressed = chunk.clone().compress(Compression::Zstd(1)).unwrap();
        assert!(compressed.len() < chunk.len());
        assert_eq!(compressed.source_size(), chunk.len());
        assert_eq!(compressed.decompress().unwrap(), chunk);
    }

    #[test]
    fn incompressible_stored_raw() {
        // A tiny high entropy chunk which zstd cannot shrink.
        let chunk = Chunk::from(&[0x9eu8, 0x11, 0xa0, 0x5c][..]);
        let compressed = chunk.clone().compress(Compression::Zstd(19)).unwrap();
        assert_eq!(compressed.compression(), Compression::None);
        assert_eq!(compressed.data(), chunk.data());
        assert_eq!(compressed.decompress().unwrap(), chunk);
    }
}
