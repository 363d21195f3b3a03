use std::collections::{HashMap, HashSet};
use std::fmt;

use bytes::Bytes;
use futures_util::{future, StreamExt};
use log::*;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    cacnk,
    chunker::ChunkerConfig,
    index::unix_now,
    store::{ChunkStore, StoreError},
    CancelFlag, Chunk, ChunkId, CompressedChunk, Compression, CompressionError, Index,
    IndexChunk, IndexFormat,
};

/// Options for the chunking pipeline.
#[derive(Clone, Debug)]
pub struct ChunkOptions {
    pub chunker_config: ChunkerConfig,
    pub compression: Compression,
    pub format: IndexFormat,
    /// Number of chunks digested and compressed concurrently.
    pub num_chunk_buffers: usize,
    pub cancel: CancelFlag,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            chunker_config: ChunkerConfig::default(),
            compression: Compression::Zstd(Compression::DEFAULT_ZSTD_LEVEL),
            format: IndexFormat::Caibx,
            num_chunk_buffers: crate::default_buffer_count(),
            cancel: CancelFlag::new(),
        }
    }
}

#[derive(Debug)]
pub enum ChunkError {
    IO(std::io::Error),
    Compression(CompressionError),
    Store(StoreError),
    TaskJoin(tokio::task::JoinError),
    Cancelled,
}

impl std::error::Error for ChunkError {}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IO(err) => write!(f, "i/o error: {}", err),
            Self::Compression(err) => write!(f, "compression error: {}", err),
            Self::Store(err) => write!(f, "store error: {}", err),
            Self::TaskJoin(err) => write!(f, "error joining task: {}", err),
            Self::Cancelled => write!(f, "chunking cancelled"),
        }
    }
}

impl From<std::io::Error> for ChunkError {
    fn from(e: std::io::Error) -> Self {
        Self::IO(e)
    }
}
impl From<CompressionError> for ChunkError {
    fn from(e: CompressionError) -> Self {
        Self::Compression(e)
    }
}
impl From<StoreError> for ChunkError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Chunk a readable source into a self contained index with the
/// compressed chunk payloads embedded.
///
/// `source_size`, when known, enables the single chunk fast path for
/// sources smaller than the maximum chunk size.
pub async fn to_index<R>(
    input: R,
    source_size: Option<u64>,
    opts: &ChunkOptions,
) -> Result<Index, ChunkError>
where
    R: AsyncRead + Unpin + Send,
{
    let (records, _unique) = chunk_source(input, source_size, opts).await?;
    Ok(Index::new(opts.format, unix_now(), records))
}

/// Chunk a readable source into a chunk store and return a store backed
/// index without embedded payloads.
pub async fn to_store<R, S>(
    input: R,
    source_size: Option<u64>,
    store: &S,
    opts: &ChunkOptions,
) -> Result<Index, ChunkError>
where
    R: AsyncRead + Unpin + Send,
    S: ChunkStore + ?Sized,
{
    let (mut records, unique) = chunk_source(input, source_size, opts).await?;
    for (id, compressed) in &unique {
        if opts.cancel.is_cancelled() {
            return Err(ChunkError::Cancelled);
        }
        store.put(id, cacnk::encode(compressed)).await?;
    }
    for record in &mut records {
        record.payload = Bytes::new();
    }
    Ok(Index::new(opts.format, unix_now(), records))
}

// Chunk the source into ordered index records with embedded payloads,
// plus the compressed form of each unique chunk.
async fn chunk_source<R>(
    mut input: R,
    source_size: Option<u64>,
    opts: &ChunkOptions,
) -> Result<(Vec<IndexChunk>, HashMap<ChunkId, CompressedChunk>), ChunkError>
where
    R: AsyncRead + Unpin + Send,
{
    // A source known to be smaller than the max chunk size cannot be
    // split; skip hashing entirely.
    if let Some(size) = source_size {
        if size < opts.chunker_config.max_chunk_size() as u64 {
            return single_chunk(input, opts).await;
        }
    }
    let mut order: Vec<IndexChunk> = Vec::new();
    let mut unique: HashMap<ChunkId, CompressedChunk> = HashMap::new();
    {
        let mut seen: HashSet<ChunkId> = HashSet::new();
        let compression = opts.compression;
        let mut chunk_stream = opts
            .chunker_config
            .new_chunker(&mut input)
            .map(|result| {
                tokio::task::spawn_blocking(move || {
                    result.map(|(offset, chunk)| (offset, chunk.verify()))
                })
            })
            .buffered(opts.num_chunk_buffers)
            .filter_map(|result| {
                // Record every chunk in stream order but only pass
                // unique chunks on for compression.
                let filtered = match result {
                    Ok(Ok((offset, verified))) => {
                        order.push(IndexChunk {
                            id: *verified.id(),
                            size: verified.len() as u32,
                            offset,
                            checksum: *verified.checksum(),
                            payload: Bytes::new(),
                        });
                        if seen.insert(*verified.id()) {
                            Some(Ok(verified))
                        } else {
                            None
                        }
                    }
                    Ok(Err(err)) => Some(Err(ChunkError::IO(err))),
                    Err(err) => Some(Err(ChunkError::TaskJoin(err))),
                };
                future::ready(filtered)
            })
            .map(|result| {
                tokio::task::spawn_blocking(move || {
                    let verified = result?;
                    let compressed = verified
                        .chunk()
                        .clone()
                        .compress(compression)
                        .map_err(ChunkError::Compression)?;
                    Ok::<_, ChunkError>((*verified.id(), compressed))
                })
            })
            .buffered(opts.num_chunk_buffers);
        while let Some(result) = chunk_stream.next().await {
            if opts.cancel.is_cancelled() {
                return Err(ChunkError::Cancelled);
            }
            let (id, compressed) = result.map_err(ChunkError::TaskJoin)??;
            debug!(
                "chunk {} ({} bytes) compressed to {}",
                id,
                compressed.source_size(),
                compressed.len()
            );
            unique.insert(id, compressed);
        }
    }
    for record in &mut order {
        if let Some(compressed) = unique.get(&record.id) {
            record.payload = compressed.data.clone();
        }
    }
    Ok((order, unique))
}

async fn single_chunk<R>(
    mut input: R,
    opts: &ChunkOptions,
) -> Result<(Vec<IndexChunk>, HashMap<ChunkId, CompressedChunk>), ChunkError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut data = Vec::new();
    input.read_to_end(&mut data).await?;
    if data.is_empty() {
        return Ok((Vec::new(), HashMap::new()));
    }
    let verified = Chunk::from(data).verify();
    let compressed = verified
        .chunk()
        .clone()
        .compress(opts.compression)
        .map_err(ChunkError::Compression)?;
    let record = IndexChunk {
        id: *verified.id(),
        size: verified.len() as u32,
        offset: 0,
        checksum: *verified.checksum(),
        payload: compressed.data.clone(),
    };
    let mut unique = HashMap::new();
    unique.insert(*verified.id(), compressed);
    Ok((vec![record], unique))
}
