use bytes::BytesMut;

use super::{Chunker, ChunkerConfig};
use crate::{
    rolling_hash::{RollingHash, WINDOW_SIZE},
    Chunk,
};

/// Content-defined chunker driven by a rolling hash.
pub struct RollingHashChunker<H> {
    hasher: H,
    discriminator: u32,
    min_chunk_size: usize,
    max_chunk_size: usize,
    // Bytes of the current chunk already consumed from the front of the
    // scan buffer.
    offset: usize,
}

impl<H> RollingHashChunker<H> {
    pub fn new(hasher: H, config: &ChunkerConfig) -> Self {
        Self {
            hasher,
            discriminator: config.discriminator(),
            min_chunk_size: config.min_chunk_size(),
            max_chunk_size: config.max_chunk_size(),
            offset: 0,
        }
    }

    fn is_boundary(&self) -> bool
    where
        H: RollingHash,
    {
        self.hasher.sum() % self.discriminator == self.discriminator - 1
    }

    fn split(&mut self, buf: &mut BytesMut) -> Chunk
    where
        H: RollingHash,
    {
        let end = self.offset;
        self.offset = 0;
        self.hasher.reset();
        Chunk(buf.split_to(end).freeze())
    }
}

impl<H> Chunker for RollingHashChunker<H>
where
    H: RollingHash,
{
    fn next(&mut self, buf: &mut BytesMut) -> Option<Chunk> {
        // No boundary is possible before the window which ends at the
        // minimal chunk size; skip those bytes without hashing them.
        let skip_to = self.min_chunk_size - WINDOW_SIZE;
        if self.offset < skip_to {
            self.offset = std::cmp::min(skip_to, buf.len());
        }
        // Fill the window with the last bytes of the minimal possible
        // chunk. The earliest boundary candidate is the position where
        // the window gets full.
        while !self.hasher.init_done() && self.offset < buf.len() {
            self.hasher.init(buf[self.offset]);
            self.offset += 1;
            if self.hasher.init_done() && self.is_boundary() {
                return Some(self.split(buf));
            }
        }
        // Slide byte by byte until boundary or max chunk size reached.
        while self.offset < buf.len() {
            self.hasher.input(buf[self.offset]);
            self.offset += 1;
            if self.offset >= self.max_chunk_size || self.is_boundary() {
                return Some(self.split(buf));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rolling_hash::BuzHash;

    fn config() -> ChunkerConfig {
        ChunkerConfig::new(64, 256, 1024).unwrap()
    }

    fn chunk_buffer(data: &[u8]) -> Vec<usize> {
        let mut chunker = RollingHashChunker::new(BuzHash::new(), &config());
        let mut buf = BytesMut::from(data);
        let mut sizes = Vec::new();
        while let Some(chunk) = chunker.next(&mut buf) {
            sizes.push(chunk.len());
        }
        if !buf.is_empty() {
            sizes.push(buf.len());
        }
        sizes
    }

    #[test]
    fn zero_input_forces_max_size_chunks() {
        // An all zero window never matches the boundary predicate for
        // this discriminator, so every chunk is forced at max size.
        let sizes = chunk_buffer(&[0u8; 5000]);
        assert_eq!(sizes, vec![1024, 1024, 1024, 1024, 904]);
    }

    #[test]
    fn trailing_bytes_left_in_buffer() {
        let mut chunker = RollingHashChunker::new(BuzHash::new(), &config());
        let mut buf = BytesMut::from(&[0u8; 1060][..]);
        let chunk = chunker.next(&mut buf);
        assert_eq!(chunk.map(|c| c.len()), Some(1024));
        // Too little data left for another boundary scan.
        assert_eq!(chunker.next(&mut buf), None);
        assert_eq!(buf.len(), 36);
    }

    #[test]
    fn deterministic_over_split_buffers() {
        let data: Vec<u8> = {
            let mut seed: usize = 0xa3;
            (0..20000)
                .map(|v| {
                    seed ^= seed.wrapping_mul(4);
                    (seed ^ v) as u8
                })
                .collect()
        };
        let whole = chunk_buffer(&data);
        // Feed the same data a few bytes at a time.
        let mut chunker = RollingHashChunker::new(BuzHash::new(), &config());
        let mut buf = BytesMut::new();
        let mut sizes = Vec::new();
        for piece in data.chunks(7) {
            buf.extend_from_slice(piece);
            while let Some(chunk) = chunker.next(&mut buf) {
                sizes.push(chunk.len());
            }
        }
        if !buf.is_empty() {
            sizes.push(buf.len());
        }
        assert_eq!(whole, sizes);
    }
}
