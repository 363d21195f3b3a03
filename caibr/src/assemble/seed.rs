use std::collections::HashMap;

use futures_util::stream::StreamExt;
use log::*;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite};

use super::{write_chunk, AssembleError, Options};
use crate::{chunker::ChunkerConfig, ChunkId};

/// A readable which may already contain chunks an assembly needs.
///
/// The seed is scanned with the same chunker configuration that
/// produced the index; chunks whose id matches a needed chunk are
/// copied from the seed instead of being fetched from the store.
pub struct Seed<I> {
    input: I,
    chunker_config: ChunkerConfig,
}

impl<I> Seed<I> {
    pub fn new(input: I, chunker_config: ChunkerConfig) -> Self {
        Self {
            input,
            chunker_config,
        }
    }

    // Scan the seed, writing every matching chunk to output at all its
    // offsets. Returns (seed bytes used, output bytes written).
    pub(super) async fn feed<W>(
        self,
        opts: &Options,
        needed: &mut HashMap<ChunkId, Vec<u64>>,
        output: &mut W,
    ) -> Result<(u64, u64), AssembleError>
    where
        I: AsyncRead + Unpin + Send,
        W: AsyncWrite + AsyncSeek + Unpin + Send,
    {
        let Seed {
            mut input,
            chunker_config,
        } = self;
        let mut bytes_used = 0u64;
        let mut bytes_written = 0u64;
        let mut found_chunks = chunker_config
            .new_chunker(&mut input)
            .map(|result| {
                tokio::task::spawn_blocking(move || {
                    result.map(|(_offset, chunk)| chunk.verify())
                })
            })
            .buffered(opts.num_chunk_buffers)
            .map(|result| match result {
                Ok(Ok(verified)) => Ok(verified),
                Ok(Err(err)) => Err(AssembleError::IO(err)),
                Err(err) => Err(AssembleError::TaskJoin(err)),
            });
        while let Some(result) = found_chunks.next().await {
            if needed.is_empty() {
                break;
            }
            if opts.cancel.is_cancelled() {
                return Err(AssembleError::Cancelled);
            }
            let verified = result?;
            if let Some(offsets) = needed.remove(verified.id()) {
                debug!(
                    "chunk {} ({} bytes) used from seed",
                    verified.id(),
                    verified.len()
                );
                write_chunk(output, &offsets, verified.data()).await?;
                bytes_used += verified.len() as u64;
                bytes_written += verified.len() as u64 * offsets.len() as u64;
            }
        }
        Ok((bytes_used, bytes_written))
    }
}
