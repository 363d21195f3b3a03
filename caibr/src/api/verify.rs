use std::collections::HashSet;
use std::fmt;

use log::*;

use crate::{
    cacnk,
    store::{ChunkStore, StoreError},
    CancelFlag, ChunkId, Index, IndexError,
};

#[derive(Debug)]
pub enum VerifyError {
    Index(IndexError),
    Store(StoreError),
    Frame(cacnk::FrameError),
    ChunkIdMismatch { id: ChunkId, offset: u64 },
    Cancelled,
}

impl std::error::Error for VerifyError {}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(err) => write!(f, "index error: {}", err),
            Self::Store(err) => write!(f, "store error: {}", err),
            Self::Frame(err) => write!(f, "chunk frame error: {}", err),
            Self::ChunkIdMismatch { id, offset } => {
                write!(f, "chunk id mismatch for chunk {} at offset {}", id, offset)
            }
            Self::Cancelled => write!(f, "verification cancelled"),
        }
    }
}

impl From<IndexError> for VerifyError {
    fn from(e: IndexError) -> Self {
        Self::Index(e)
    }
}
impl From<StoreError> for VerifyError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
impl From<cacnk::FrameError> for VerifyError {
    fn from(e: cacnk::FrameError) -> Self {
        Self::Frame(e)
    }
}

/// Validate an index and, when a store is given, fetch and verify every
/// chunk the index would need from it. Chunks with embedded payloads
/// are verified by [`Index::validate`] alone.
pub async fn verify<S>(
    index: &Index,
    store: Option<&S>,
    cancel: &CancelFlag,
) -> Result<(), VerifyError>
where
    S: ChunkStore + ?Sized,
{
    index.validate()?;
    let store = match store {
        Some(store) => store,
        None => return Ok(()),
    };
    let mut checked: HashSet<ChunkId> = HashSet::new();
    for chunk in index.chunks() {
        if cancel.is_cancelled() {
            return Err(VerifyError::Cancelled);
        }
        if !chunk.payload.is_empty() || !checked.insert(chunk.id) {
            continue;
        }
        let framed = store.get(&chunk.id).await?;
        let data = cacnk::decode(framed)?;
        if ChunkId::from_data(data.data()) != chunk.id {
            return Err(VerifyError::ChunkIdMismatch {
                id: chunk.id,
                offset: chunk.offset,
            });
        }
        debug!("chunk {} ok", chunk.id);
    }
    Ok(())
}
