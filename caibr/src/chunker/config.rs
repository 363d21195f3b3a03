use std::fmt;

use tokio::io::AsyncRead;

use crate::{
    chunker::{RollingHashChunker, StreamingChunker},
    rolling_hash::{BuzHash, WINDOW_SIZE},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    MinSizeBelowWindow(usize),
    SizesNotOrdered,
    MinSizeAboveQuarterAvg,
    MaxSizeBelowFourAvg,
    MaxSizeTooLarge,
}

impl std::error::Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MinSizeBelowWindow(min) => write!(
                f,
                "min chunk size {} is below the hash window size {}",
                min, WINDOW_SIZE
            ),
            Self::SizesNotOrdered => write!(f, "requires min < avg < max chunk size"),
            Self::MinSizeAboveQuarterAvg => {
                write!(f, "min chunk size must be at most a quarter of the average")
            }
            Self::MaxSizeBelowFourAvg => {
                write!(f, "max chunk size must be at least four times the average")
            }
            Self::MaxSizeTooLarge => write!(f, "max chunk size does not fit in 32 bits"),
        }
    }
}

/// Size parameters to use while scanning for chunk boundaries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkerConfig {
    min_chunk_size: usize,
    avg_chunk_size: usize,
    max_chunk_size: usize,
}

impl ChunkerConfig {
    /// Create a verified configuration from (min, avg, max) chunk sizes.
    pub fn new(
        min_chunk_size: usize,
        avg_chunk_size: usize,
        max_chunk_size: usize,
    ) -> Result<Self, ConfigError> {
        if min_chunk_size < WINDOW_SIZE {
            return Err(ConfigError::MinSizeBelowWindow(min_chunk_size));
        }
        if min_chunk_size >= avg_chunk_size || avg_chunk_size >= max_chunk_size {
            return Err(ConfigError::SizesNotOrdered);
        }
        if min_chunk_size > avg_chunk_size / 4 {
            return Err(ConfigError::MinSizeAboveQuarterAvg);
        }
        if max_chunk_size < 4 * avg_chunk_size {
            return Err(ConfigError::MaxSizeBelowFourAvg);
        }
        if max_chunk_size > u32::MAX as usize {
            return Err(ConfigError::MaxSizeTooLarge);
        }
        Ok(Self {
            min_chunk_size,
            avg_chunk_size,
            max_chunk_size,
        })
    }

    pub fn min_chunk_size(&self) -> usize {
        self.min_chunk_size
    }

    pub fn avg_chunk_size(&self) -> usize {
        self.avg_chunk_size
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Modulus used by the boundary predicate, derived from the target
    /// average chunk size with the casync derivation. A boundary is
    /// found where `hash % discriminator == discriminator - 1`.
    pub fn discriminator(&self) -> u32 {
        discriminator_from_avg(self.avg_chunk_size)
    }

    /// Create a chunker for the given source.
    pub fn new_chunker<R>(&self, reader: R) -> StreamingChunker<RollingHashChunker<BuzHash>, R>
    where
        R: AsyncRead + Unpin,
    {
        StreamingChunker::new(RollingHashChunker::new(BuzHash::new(), self), reader)
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: 16 * 1024,
            avg_chunk_size: 64 * 1024,
            max_chunk_size: 256 * 1024,
        }
    }
}

impl fmt::Display for ChunkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min: {}, avg: {}, max: {}",
            self.min_chunk_size, self.avg_chunk_size, self.max_chunk_size
        )
    }
}

// Matches casync's discriminator_from_avg, including the rounding mode
// (half away from zero) of the Go port.
fn discriminator_from_avg(avg: usize) -> u32 {
    let avg = avg as f64;
    (avg / (1.0 + (-0.000_000_142_888_852_1 * avg + 1.332_375_152_2))).round() as u32
}
