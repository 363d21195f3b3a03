//! Rebuild a source stream from an index, seed files and a chunk store.
mod seed;

pub use seed::Seed;

use std::collections::HashMap;
use std::fmt;
use std::io::SeekFrom;

use log::*;
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

use crate::{
    cacnk,
    store::{ChunkStore, StoreError},
    CancelFlag, ChunkId, CompressionError, Index, IndexError,
};

/// Assembly options.
#[derive(Clone, Debug)]
pub struct Options {
    /// Recompute and verify each chunk id while assembling.
    pub verify: bool,
    /// Proceed even when the index checksum does not match.
    pub force: bool,
    /// Number of chunks digested concurrently while scanning seeds.
    pub num_chunk_buffers: usize,
    pub cancel: CancelFlag,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            verify: true,
            force: false,
            num_chunk_buffers: crate::default_buffer_count(),
            cancel: CancelFlag::new(),
        }
    }
}

#[derive(Debug)]
pub enum AssembleError {
    Index(IndexError),
    Store(StoreError),
    Frame(cacnk::FrameError),
    Compression(CompressionError),
    ChunkIdMismatch { id: ChunkId, offset: u64 },
    IO(std::io::Error),
    TaskJoin(tokio::task::JoinError),
    Cancelled,
}

impl std::error::Error for AssembleError {}

impl fmt::Display for AssembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(err) => write!(f, "index error: {}", err),
            Self::Store(err) => write!(f, "store error: {}", err),
            Self::Frame(err) => write!(f, "chunk frame error: {}", err),
            Self::Compression(err) => write!(f, "compression error: {}", err),
            Self::ChunkIdMismatch { id, offset } => {
                write!(f, "chunk id mismatch for chunk {} at offset {}", id, offset)
            }
            Self::IO(err) => write!(f, "i/o error: {}", err),
            Self::TaskJoin(err) => write!(f, "error joining task: {}", err),
            Self::Cancelled => write!(f, "assembly cancelled"),
        }
    }
}

impl From<IndexError> for AssembleError {
    fn from(e: IndexError) -> Self {
        Self::Index(e)
    }
}
impl From<StoreError> for AssembleError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
impl From<cacnk::FrameError> for AssembleError {
    fn from(e: cacnk::FrameError) -> Self {
        Self::Frame(e)
    }
}
impl From<CompressionError> for AssembleError {
    fn from(e: CompressionError) -> Self {
        Self::Compression(e)
    }
}
impl From<std::io::Error> for AssembleError {
    fn from(e: std::io::Error) -> Self {
        Self::IO(e)
    }
}

/// Which sources the assembled bytes were taken from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AssembleSummary {
    /// Total bytes written to the output.
    pub written: u64,
    /// Source bytes taken from seed files.
    pub bytes_from_seeds: u64,
    /// Source bytes taken from payloads embedded in the index.
    pub bytes_from_index: u64,
    /// Source bytes fetched from the chunk store.
    pub bytes_from_store: u64,
}

/// Write the source stream described by `index` into `output`.
///
/// Chunk data is resolved by trying each seed first, then the payloads
/// embedded in the index, then the chunk store. The index is validated
/// up front; a checksum mismatch aborts unless [`Options::force`] is
/// set.
pub async fn assemble<S, I, W>(
    opts: &Options,
    index: &Index,
    store: &S,
    seeds: Vec<Seed<I>>,
    output: &mut W,
) -> Result<AssembleSummary, AssembleError>
where
    S: ChunkStore + ?Sized,
    I: AsyncRead + Unpin + Send,
    W: AsyncWrite + AsyncSeek + Unpin + Send,
{
    match index.validate() {
        Ok(()) => {}
        Err(IndexError::ChecksumMismatch) if opts.force => {
            warn!("index checksum mismatch, proceeding anyway");
        }
        Err(err) => return Err(err.into()),
    }
    let mut summary = AssembleSummary::default();
    // All offsets each chunk id has to be written to.
    let mut needed: HashMap<ChunkId, Vec<u64>> = HashMap::new();
    for chunk in index.chunks() {
        needed.entry(chunk.id).or_default().push(chunk.offset);
    }
    // Take what we can from the seeds first.
    for seed in seeds {
        if needed.is_empty() {
            break;
        }
        let (used, written) = seed.feed(opts, &mut needed, output).await?;
        summary.bytes_from_seeds += used;
        summary.written += written;
    }
    // Resolve the rest from embedded payloads or the chunk store.
    for chunk in index.chunks() {
        if opts.cancel.is_cancelled() {
            return Err(AssembleError::Cancelled);
        }
        let offsets = match needed.remove(&chunk.id) {
            Some(offsets) => offsets,
            None => continue,
        };
        let data = if chunk.payload.is_empty() {
            let framed = store.get(&chunk.id).await?;
            let data = cacnk::decode(framed)?.into_inner();
            summary.bytes_from_store += data.len() as u64;
            data
        } else {
            let data = chunk.decode_payload()?;
            summary.bytes_from_index += data.len() as u64;
            data
        };
        if opts.verify && ChunkId::from_data(&data) != chunk.id {
            return Err(AssembleError::ChunkIdMismatch {
                id: chunk.id,
                offset: chunk.offset,
            });
        }
        debug!(
            "chunk {} ({} bytes) written at {} offset(s)",
            chunk.id,
            data.len(),
            offsets.len()
        );
        write_chunk(output, &offsets, &data).await?;
        summary.written += data.len() as u64 * offsets.len() as u64;
    }
    output.flush().await?;
    Ok(summary)
}

pub(crate) async fn write_chunk<W>(
    output: &mut W,
    offsets: &[u64],
    data: &[u8],
) -> Result<(), AssembleError>
where
    W: AsyncWrite + AsyncSeek + Unpin,
{
    for &offset in offsets {
        output.seek(SeekFrom::Start(offset)).await?;
        output.write_all(data).await?;
    }
    Ok(())
}
