use bytes::Bytes;
use std::fmt;

#[derive(Debug)]
pub enum CompressionError {
    IO(std::io::Error),
    /// Well framed input whose payload failed to decompress.
    Decompression(std::io::Error),
}

impl std::error::Error for CompressionError {}

impl fmt::Display for CompressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IO(err) => write!(f, "i/o error: {}", err),
            Self::Decompression(err) => write!(f, "decompression failed: {}", err),
        }
    }
}

impl From<std::io::Error> for CompressionError {
    fn from(e: std::io::Error) -> Self {
        Self::IO(e)
    }
}

/// Compression helper type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zstd(u32),
}

impl Compression {
    /// Compression level used when none is given.
    pub const DEFAULT_ZSTD_LEVEL: u32 = 1;

    /// Wire tag used in the chunk file frame.
    pub fn tag(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Zstd(_) => 1,
        }
    }

    /// Map a wire tag back to a compression type. The level is not part
    /// of the frame and is irrelevant for decompression.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Compression::None),
            1 => Some(Compression::Zstd(Self::DEFAULT_ZSTD_LEVEL)),
            _ => None,
        }
    }

    /// Compress a block of data with set compression.
    pub fn compress(self, input: Bytes) -> Result<Bytes, CompressionError> {
        match self {
            Compression::Zstd(level) => {
                let mut result = Vec::with_capacity(input.len());
                zstd::stream::copy_encode(&input[..], &mut result, level as i32)?;
                Ok(Bytes::from(result))
            }
            Compression::None => Ok(input),
        }
    }

    /// Decompress a block of data using the set compression.
    pub fn decompress(self, input: Bytes, size_hint: usize) -> Result<Bytes, CompressionError> {
        match self {
            Compression::Zstd(_) => {
                let mut output = Vec::with_capacity(size_hint);
                zstd::stream::copy_decode(&input[..], &mut output)
                    .map_err(CompressionError::Decompression)?;
                Ok(Bytes::from(output))
            }
            Compression::None => {
                // Chunk is not compressed.
                Ok(input)
            }
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::Zstd(level) => write!(f, "zstd({})", level),
            Compression::None => write!(f, "none"),
        }
    }
}
