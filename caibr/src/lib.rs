pub mod api;
pub mod assemble;
pub mod cacnk;
mod cancel;
mod chunk;
mod chunk_id;
pub mod chunker;
mod compression;
mod hashsum;
mod index;
mod rolling_hash;
pub mod store;

pub use cancel::CancelFlag;
pub use chunk::{Chunk, CompressedChunk, VerifiedChunk};
pub use chunk_id::ChunkId;
pub use compression::{Compression, CompressionError};
pub use hashsum::HashSum;
pub use index::{Index, IndexChunk, IndexError, IndexFormat, INDEX_VERSION};
pub use rolling_hash::{BuzHash, RollingHash, WINDOW_SIZE};

// Single buffer on a single core machine, otherwise cores x 2.
pub(crate) fn default_buffer_count() -> usize {
    match num_cpus::get() {
        0 | 1 => 1,
        n => n * 2,
    }
}
