use std::fmt;

use sha2::{Digest, Sha256};

/// A SHA-256 checksum, used for the redundant chunk checksum and for the
/// index level checksum over all chunk ids.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HashSum([u8; 32]);

impl HashSum {
    /// Length of the checksum in bytes.
    pub const LEN: usize = 32;

    /// Digest the given data.
    pub fn sha256(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn try_from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != Self::LEN {
            return None;
        }
        let mut sum = [0u8; Self::LEN];
        sum.copy_from_slice(slice);
        Some(Self(sum))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0[..]
    }
}

impl fmt::Display for HashSum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for HashSum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashSum({})", self)
    }
}
