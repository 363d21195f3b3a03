use std::fmt;

use sha2::{Digest, Sha512};

/// Identity of a chunk.
///
/// The first 32 bytes of the SHA-512 digest over the uncompressed chunk
/// content. Plain truncation, not the SHA-512/256 variant with its own
/// initialization vector.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId([u8; 32]);

impl ChunkId {
    /// Length of a chunk id in bytes.
    pub const LEN: usize = 32;

    /// Compute the id of the given chunk content.
    pub fn from_data(data: &[u8]) -> Self {
        let digest = Sha512::digest(data);
        let mut id = [0u8; Self::LEN];
        id.copy_from_slice(&digest[..Self::LEN]);
        Self(id)
    }

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn try_from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != Self::LEN {
            return None;
        }
        let mut id = [0u8; Self::LEN];
        id.copy_from_slice(slice);
        Some(Self(id))
    }

    /// Parse from 64 lowercase or uppercase hex digits.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != Self::LEN * 2 || !s.is_ascii() {
            return None;
        }
        let mut id = [0u8; Self::LEN];
        for (index, pair) in s.as_bytes().chunks(2).enumerate() {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            id[index] = ((hi << 4) | lo) as u8;
        }
        Some(Self(id))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0[..]
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", self)
    }
}
