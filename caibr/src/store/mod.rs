//! Chunk store backends.
mod local;
mod mem;
mod timeout;

pub use local::LocalStore;
pub use mem::MemoryStore;
pub use timeout::TimeoutStore;

use core::pin::Pin;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::Stream;

use crate::ChunkId;

#[derive(Debug)]
pub enum StoreError {
    /// The chunk id is not present in the store.
    NotFound(ChunkId),
    IO(std::io::Error),
    /// Transport or backend level failure distinct from plain I/O.
    Backend(String),
    /// The per call deadline was exceeded.
    Timeout,
}

impl std::error::Error for StoreError {}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "chunk {} not found in store", id),
            Self::IO(err) => write!(f, "i/o error: {}", err),
            Self::Backend(err) => write!(f, "backend error: {}", err),
            Self::Timeout => write!(f, "store operation timed out"),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::IO(e)
    }
}

/// Statistics reported by a chunk store. Best effort; a backend may not
/// know its chunk count or total size.
#[derive(Clone, Debug)]
pub struct StoreStats {
    pub backend: &'static str,
    pub chunk_count: Option<u64>,
    pub total_bytes: Option<u64>,
}

/// Stream of chunk ids returned by [`ChunkStore::list`].
pub type IdStream<'a> = Pin<Box<dyn Stream<Item = Result<ChunkId, StoreError>> + Send + 'a>>;

/// Storage capability for chunks addressed by id.
///
/// Implementations must be safe to call concurrently; a reader must
/// never observe a partially written chunk under its final name.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Store the framed bytes of a chunk. Storing an id which already
    /// exists is a no-op success.
    async fn put(&self, id: &ChunkId, data: Bytes) -> Result<(), StoreError>;
    /// Fetch the framed bytes of a chunk, identical to what was put.
    async fn get(&self, id: &ChunkId) -> Result<Bytes, StoreError>;
    async fn exists(&self, id: &ChunkId) -> Result<bool, StoreError>;
    /// Remove a chunk. Removing an absent id is not an error.
    async fn delete(&self, id: &ChunkId) -> Result<(), StoreError>;
    /// List chunk ids, optionally filtered on a hex id prefix. Order is
    /// unspecified.
    fn list(&self, prefix: Option<String>) -> IdStream<'_>;
    async fn stats(&self) -> Result<StoreStats, StoreError>;
}
