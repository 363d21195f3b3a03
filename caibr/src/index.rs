//! Chunk index entity and the `.caibx`/`.caidx` file layout.
//!
//! | Field              | Size | Description                                 |
//! |--------------------|------|---------------------------------------------|
//! | magic              |    3 | CA 1B 5C (caibx) or CA 1D 5C (caidx).       |
//! | version            |    4 | Format version, currently 1 (u32 be).       |
//! | chunk count        |    4 | Number of chunk records (u32 be).           |
//! | total size         |    8 | Source stream length in bytes (u64 be).     |
//! | created at         |    8 | Unix epoch seconds (u64 be).                |
//! | checksum length    |    2 | 32 (u16 be).                                |
//! | checksum           |   32 | SHA-256 over all chunk ids in order.        |
//! | chunk records      |    n | See below.                                  |
//!
//! Each chunk record:
//!
//! | Field              | Size | Description                                 |
//! |--------------------|------|---------------------------------------------|
//! | size               |    4 | Uncompressed chunk size (u32 be).           |
//! | compressed size    |    4 | Stored payload size, may be 0 (u32 be).     |
//! | offset             |    8 | Offset in the source stream (u64 be).       |
//! | id length          |    2 | 32 (u16 be).                                |
//! | id                 |   32 | Chunk id.                                   |
//! | checksum length    |    2 | 32 (u16 be).                                |
//! | checksum           |   32 | SHA-256 over the uncompressed chunk.        |
//! | payload            |    n | Compressed payload, zstd frame or raw.      |
//!
//! A zero compressed size means the index is store backed and payloads
//! are fetched from a chunk store instead.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{ChunkId, Compression, CompressionError, HashSum};

/// Current index format version.
pub const INDEX_VERSION: u32 = 1;

/// Index file format variants. Only the magic differs; caidx marks an
/// index over an archive stream rather than a raw blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexFormat {
    Caibx,
    Caidx,
}

impl IndexFormat {
    pub const fn magic(self) -> [u8; 3] {
        match self {
            IndexFormat::Caibx => [0xca, 0x1b, 0x5c],
            IndexFormat::Caidx => [0xca, 0x1d, 0x5c],
        }
    }

    fn from_magic(magic: &[u8]) -> Option<Self> {
        match magic {
            [0xca, 0x1b, 0x5c] => Some(IndexFormat::Caibx),
            [0xca, 0x1d, 0x5c] => Some(IndexFormat::Caidx),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            IndexFormat::Caibx => "caibx",
            IndexFormat::Caidx => "caidx",
        }
    }
}

impl fmt::Display for IndexFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

#[derive(Debug)]
pub enum IndexError {
    InvalidMagic,
    UnsupportedVersion(u32),
    ChecksumMismatch,
    ChunkIdMismatch { id: ChunkId, offset: u64 },
    UnexpectedEnd,
    CorruptIndex,
    SizeMismatch { expected: u64, actual: u64 },
    NotContiguous { offset: u64 },
    Compression(CompressionError),
    IO(std::io::Error),
}

impl std::error::Error for IndexError {}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMagic => write!(f, "is not an index file"),
            Self::UnsupportedVersion(version) => {
                write!(f, "unsupported index version {}", version)
            }
            Self::ChecksumMismatch => write!(f, "index checksum mismatch"),
            Self::ChunkIdMismatch { id, offset } => {
                write!(f, "chunk id mismatch for chunk {} at offset {}", id, offset)
            }
            Self::UnexpectedEnd => write!(f, "unexpected end of index"),
            Self::CorruptIndex => write!(f, "corrupt index"),
            Self::SizeMismatch { expected, actual } => write!(
                f,
                "index total size is {} but chunk sizes sum to {}",
                expected, actual
            ),
            Self::NotContiguous { offset } => {
                write!(f, "chunk at offset {} is not contiguous", offset)
            }
            Self::Compression(err) => write!(f, "compression error: {}", err),
            Self::IO(err) => write!(f, "i/o error: {}", err),
        }
    }
}

impl From<CompressionError> for IndexError {
    fn from(e: CompressionError) -> Self {
        Self::Compression(e)
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        Self::IO(e)
    }
}

/// Description of a single chunk within an index.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexChunk {
    /// Chunk id.
    pub id: ChunkId,
    /// Size of the chunk in the source stream (uncompressed).
    pub size: u32,
    /// Byte offset of the chunk in the source stream.
    pub offset: u64,
    /// SHA-256 over the uncompressed chunk, redundant with the id.
    pub checksum: HashSum,
    /// Stored payload. Empty when the index is store backed.
    pub payload: Bytes,
}

impl IndexChunk {
    /// Offset of the first byte after this chunk.
    pub fn end_offset(&self) -> u64 {
        self.offset + u64::from(self.size)
    }

    /// Decode the embedded payload.
    ///
    /// The payload is stored raw if and only if it is exactly as big as
    /// the source chunk; anything smaller is a zstd frame.
    pub fn decode_payload(&self) -> Result<Bytes, CompressionError> {
        if self.payload.len() == self.size as usize {
            Ok(self.payload.clone())
        } else {
            Compression::Zstd(Compression::DEFAULT_ZSTD_LEVEL)
                .decompress(self.payload.clone(), self.size as usize)
        }
    }
}

/// An index describing how to rebuild a source stream from chunks.
///
/// Immutable after construction; share it by reference freely.
#[derive(Clone, Debug, PartialEq)]
pub struct Index {
    format: IndexFormat,
    total_size: u64,
    created_at: u64,
    checksum: HashSum,
    chunks: Vec<IndexChunk>,
}

impl Index {
    /// Create an index from ordered chunk descriptors.
    pub fn new(format: IndexFormat, created_at: u64, chunks: Vec<IndexChunk>) -> Self {
        let total_size = chunks.iter().map(|chunk| u64::from(chunk.size)).sum();
        let checksum = checksum_of_ids(&chunks);
        Self {
            format,
            total_size,
            created_at,
            checksum,
            chunks,
        }
    }

    pub fn format(&self) -> IndexFormat {
        self.format
    }
    /// Total size of the source stream.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
    /// Creation time as unix epoch seconds.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }
    /// SHA-256 over all chunk ids in order.
    pub fn checksum(&self) -> &HashSum {
        &self.checksum
    }
    /// Chunk descriptors in source offset order.
    pub fn chunks(&self) -> &[IndexChunk] {
        &self.chunks
    }

    /// Index file name for a source path, i.e. "{path}.caibx".
    pub fn filename_for(path: &Path, format: IndexFormat) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".");
        name.push(format.extension());
        PathBuf::from(name)
    }

    /// Find a chunk descriptor by id.
    pub fn get_by_id(&self, id: &ChunkId) -> Option<&IndexChunk> {
        self.chunks.iter().find(|chunk| chunk.id == *id)
    }

    /// Chunks intersecting the source byte range [start, end).
    pub fn get_in_range(&self, start: u64, end: u64) -> &[IndexChunk] {
        if start >= end {
            return &[];
        }
        let first = self.chunks.partition_point(|chunk| chunk.end_offset() <= start);
        let last = self.chunks.partition_point(|chunk| chunk.offset < end);
        if first >= last {
            &[]
        } else {
            &self.chunks[first..last]
        }
    }

    /// Total size of the embedded payloads.
    pub fn total_compressed_size(&self) -> u64 {
        self.chunks
            .iter()
            .map(|chunk| chunk.payload.len() as u64)
            .sum()
    }

    /// Ratio between stored payload bytes and source bytes. Only
    /// meaningful for a self contained index.
    pub fn compression_ratio(&self) -> f64 {
        if self.total_size == 0 {
            1.0
        } else {
            self.total_compressed_size() as f64 / self.total_size as f64
        }
    }

    /// Serialize to the binary index layout.
    pub fn to_bytes(&self) -> Bytes {
        let payload_size: usize = self.chunks.iter().map(|chunk| chunk.payload.len()).sum();
        let mut buf =
            BytesMut::with_capacity(HEADER_SIZE + self.chunks.len() * RECORD_SIZE + payload_size);
        buf.put_slice(&self.format.magic());
        buf.put_u32(INDEX_VERSION);
        buf.put_u32(self.chunks.len() as u32);
        buf.put_u64(self.total_size);
        buf.put_u64(self.created_at);
        buf.put_u16(HashSum::LEN as u16);
        buf.put_slice(self.checksum.as_slice());
        for chunk in &self.chunks {
            buf.put_u32(chunk.size);
            buf.put_u32(chunk.payload.len() as u32);
            buf.put_u64(chunk.offset);
            buf.put_u16(ChunkId::LEN as u16);
            buf.put_slice(chunk.id.as_slice());
            buf.put_u16(HashSum::LEN as u16);
            buf.put_slice(chunk.checksum.as_slice());
            buf.put_slice(&chunk.payload);
        }
        buf.freeze()
    }

    /// Parse an index from its binary layout.
    ///
    /// The index level checksum is recomputed here; embedded payloads
    /// are verified against their chunk ids by [`Index::validate`].
    pub fn from_bytes(bytes: Bytes) -> Result<Self, IndexError> {
        let mut buf = bytes;
        if buf.remaining() < 3 {
            return Err(IndexError::InvalidMagic);
        }
        let format = IndexFormat::from_magic(&buf[..3]).ok_or(IndexError::InvalidMagic)?;
        buf.advance(3);
        if buf.remaining() < 4 {
            return Err(IndexError::UnexpectedEnd);
        }
        let version = buf.get_u32();
        if version != INDEX_VERSION {
            return Err(IndexError::UnsupportedVersion(version));
        }
        if buf.remaining() < 4 + 8 + 8 + 2 {
            return Err(IndexError::UnexpectedEnd);
        }
        let chunk_count = buf.get_u32() as usize;
        let total_size = buf.get_u64();
        let created_at = buf.get_u64();
        let checksum_len = buf.get_u16() as usize;
        if checksum_len != HashSum::LEN {
            return Err(IndexError::CorruptIndex);
        }
        if buf.remaining() < checksum_len {
            return Err(IndexError::UnexpectedEnd);
        }
        let checksum = HashSum::try_from_slice(&buf[..checksum_len])
            .ok_or(IndexError::CorruptIndex)?;
        buf.advance(checksum_len);

        let mut chunks = Vec::with_capacity(chunk_count.min(1024 * 1024));
        for _ in 0..chunk_count {
            if buf.remaining() < RECORD_SIZE {
                return Err(IndexError::UnexpectedEnd);
            }
            let size = buf.get_u32();
            let compressed_size = buf.get_u32() as usize;
            let offset = buf.get_u64();
            let id_len = buf.get_u16() as usize;
            if id_len != ChunkId::LEN {
                return Err(IndexError::CorruptIndex);
            }
            let id = ChunkId::try_from_slice(&buf[..id_len]).ok_or(IndexError::CorruptIndex)?;
            buf.advance(id_len);
            let checksum_len = buf.get_u16() as usize;
            if checksum_len != HashSum::LEN {
                return Err(IndexError::CorruptIndex);
            }
            let chunk_checksum = HashSum::try_from_slice(&buf[..checksum_len])
                .ok_or(IndexError::CorruptIndex)?;
            buf.advance(checksum_len);
            if buf.remaining() < compressed_size {
                return Err(IndexError::UnexpectedEnd);
            }
            let payload = buf.split_to(compressed_size);
            chunks.push(IndexChunk {
                id,
                size,
                offset,
                checksum: chunk_checksum,
                payload,
            });
        }
        if buf.has_remaining() {
            return Err(IndexError::CorruptIndex);
        }
        if checksum_of_ids(&chunks) != checksum {
            return Err(IndexError::ChecksumMismatch);
        }
        Ok(Self {
            format,
            total_size,
            created_at,
            checksum,
            chunks,
        })
    }

    /// Write the serialized index.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), IndexError>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read and parse an index.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, IndexError>
    where
        R: AsyncRead + Unpin,
    {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await?;
        Self::from_bytes(Bytes::from(bytes))
    }

    /// Full validation: id checksum, chunk layout and every embedded
    /// payload against its chunk id.
    pub fn validate(&self) -> Result<(), IndexError> {
        if checksum_of_ids(&self.chunks) != self.checksum {
            return Err(IndexError::ChecksumMismatch);
        }
        let mut expected_offset = 0u64;
        for chunk in &self.chunks {
            if chunk.offset != expected_offset {
                return Err(IndexError::NotContiguous {
                    offset: chunk.offset,
                });
            }
            expected_offset += u64::from(chunk.size);
        }
        if expected_offset != self.total_size {
            return Err(IndexError::SizeMismatch {
                expected: self.total_size,
                actual: expected_offset,
            });
        }
        for chunk in &self.chunks {
            if chunk.payload.is_empty() {
                continue;
            }
            let data = chunk.decode_payload()?;
            if ChunkId::from_data(&data) != chunk.id {
                return Err(IndexError::ChunkIdMismatch {
                    id: chunk.id,
                    offset: chunk.offset,
                });
            }
        }
        Ok(())
    }
}

const HEADER_SIZE: usize = 3 + 4 + 4 + 8 + 8 + 2 + HashSum::LEN;
const RECORD_SIZE: usize = 4 + 4 + 8 + 2 + ChunkId::LEN + 2 + HashSum::LEN;

/// Seconds since the unix epoch, for stamping new indexes.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

fn checksum_of_ids(chunks: &[IndexChunk]) -> HashSum {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.id.as_slice());
    }
    HashSum::from_bytes(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Chunk;

    fn chunk_at(offset: u64, data: &[u8], embed: bool) -> IndexChunk {
        let verified = Chunk::from(data.to_vec()).verify();
        let payload = if embed {
            let compressed = verified
                .chunk()
                .clone()
                .compress(Compression::None)
                .unwrap();
            Bytes::copy_from_slice(compressed.data())
        } else {
            Bytes::new()
        };
        IndexChunk {
            id: *verified.id(),
            size: data.len() as u32,
            offset,
            checksum: *verified.checksum(),
            payload,
        }
    }

    fn test_index(embed: bool) -> Index {
        let chunks = vec![
            chunk_at(0, &[1u8; 100], embed),
            chunk_at(100, &[2u8; 200], embed),
            chunk_at(300, &[3u8; 50], embed),
        ];
        Index::new(IndexFormat::Caibx, 1700000000, chunks)
    }

    #[test]
    fn roundtrip_self_contained() {
        let index = test_index(true);
        let parsed = Index::from_bytes(index.to_bytes()).unwrap();
        assert_eq!(index, parsed);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn roundtrip_store_backed() {
        let index = test_index(false);
        let parsed = Index::from_bytes(index.to_bytes()).unwrap();
        assert_eq!(index, parsed);
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.total_compressed_size(), 0);
    }

    #[test]
    fn header_fields() {
        let index = test_index(true);
        assert_eq!(index.total_size(), 350);
        assert_eq!(index.chunk_count(), 3);
        assert_eq!(index.created_at(), 1700000000);
    }

    #[test]
    fn rejects_invalid_magic() {
        let mut bytes = test_index(true).to_bytes().to_vec();
        bytes[2] = 0x5b;
        assert!(matches!(
            Index::from_bytes(Bytes::from(bytes)),
            Err(IndexError::InvalidMagic)
        ));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = test_index(true).to_bytes().to_vec();
        // Version field directly follows the magic.
        bytes[3..7].copy_from_slice(&2u32.to_be_bytes());
        assert!(matches!(
            Index::from_bytes(Bytes::from(bytes)),
            Err(IndexError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn rejects_checksum_mismatch() {
        let mut bytes = test_index(true).to_bytes().to_vec();
        // Flip a bit inside the stored index checksum.
        let checksum_offset = 3 + 4 + 4 + 8 + 8 + 2;
        bytes[checksum_offset] ^= 0x01;
        assert!(matches!(
            Index::from_bytes(Bytes::from(bytes)),
            Err(IndexError::ChecksumMismatch)
        ));
    }

    #[test]
    fn rejects_truncated_index() {
        let bytes = test_index(true).to_bytes();
        let truncated = bytes.slice(..bytes.len() - 1);
        assert!(matches!(
            Index::from_bytes(truncated),
            Err(IndexError::UnexpectedEnd)
        ));
    }

    #[test]
    fn corrupt_payload_fails_validation() {
        let index = test_index(true);
        let mut bytes = index.to_bytes().to_vec();
        // Flip the last byte, which is inside the last chunk's payload.
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let parsed = Index::from_bytes(Bytes::from(bytes)).unwrap();
        match parsed.validate() {
            Err(IndexError::ChunkIdMismatch { offset, .. }) => assert_eq!(offset, 300),
            other => panic!("expected chunk id mismatch, got {:?}", other),
        }
    }

    #[test]
    fn caidx_magic() {
        let chunks = vec![chunk_at(0, &[9u8; 64], true)];
        let index = Index::new(IndexFormat::Caidx, 0, chunks);
        let bytes = index.to_bytes();
        assert_eq!(&bytes[..3], &[0xca, 0x1d, 0x5c]);
        assert_eq!(
            Index::from_bytes(bytes).unwrap().format(),
            IndexFormat::Caidx
        );
    }

    #[test]
    fn get_by_id_and_range() {
        let index = test_index(true);
        let second = &index.chunks()[1];
        assert_eq!(index.get_by_id(&second.id), Some(second));
        assert_eq!(index.get_by_id(&ChunkId::from_data(b"absent")), None);

        assert_eq!(index.get_in_range(0, 350).len(), 3);
        assert_eq!(index.get_in_range(0, 100).len(), 1);
        assert_eq!(index.get_in_range(99, 101).len(), 2);
        assert_eq!(index.get_in_range(100, 300).len(), 1);
        assert_eq!(index.get_in_range(350, 400).len(), 0);
        assert_eq!(index.get_in_range(10, 10).len(), 0);
    }

    #[test]
    fn filename_for_source() {
        assert_eq!(
            Index::filename_for(Path::new("/data/disk.img"), IndexFormat::Caibx),
            PathBuf::from("/data/disk.img.caibx")
        );
        assert_eq!(
            Index::filename_for(Path::new("tree.catar"), IndexFormat::Caidx),
            PathBuf::from("tree.catar.caidx")
        );
    }

    #[test]
    fn detects_gap_in_offsets() {
        let chunks = vec![chunk_at(0, &[1u8; 100], true), chunk_at(150, &[2u8; 10], true)];
        let index = Index::new(IndexFormat::Caibx, 0, chunks);
        assert!(matches!(
            index.validate(),
            Err(IndexError::NotContiguous { offset: 150 })
        ));
    }
}
