//! Digest newtypes and the two hash functions the chain is built on.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing hex-encoded digests.
#[derive(Error, Debug)]
pub enum HashError {
    /// Input was not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Input decoded to the wrong number of bytes.
    #[error("invalid digest length: got {got}, expected {expected}")]
    InvalidLength { got: usize, expected: usize },
}

/// Double-SHA256 of `data`, stored little-endian as the wire does.
pub fn sha256d(data: &[u8]) -> Hash256 {
    let once = Sha256::digest(data);
    let twice = Sha256::digest(once);
    let mut out = [0u8; 32];
    out.copy_from_slice(&twice);
    Hash256(out)
}

/// RIPEMD160(SHA256(data)).
pub fn hash160(data: &[u8]) -> Hash160 {
    let sha = Sha256::digest(data);
    let rip = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&rip);
    Hash160(out)
}

/// A 256-bit digest in little-endian byte order.
///
/// The derived `Ord` is a raw byte comparison, which matches the wire
/// ordering used for canonical transaction sorting. Numeric comparison of
/// the digest as a little-endian integer is a separate operation,
/// [`Hash256::cmp_numeric`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The all-zero digest.
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    /// Lowest 64 bits of the digest interpreted as a little-endian integer.
    pub fn low_u64(&self) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(b)
    }

    /// Least-significant bit of the digest as a little-endian integer.
    pub fn low_bit(&self) -> u8 {
        self.0[0] & 1
    }

    /// Compare two digests as little-endian 256-bit integers.
    pub fn cmp_numeric(&self, other: &Hash256) -> Ordering {
        for i in (0..32).rev() {
            match self.0[i].cmp(&other.0[i]) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }

    /// Whether this is the all-zero digest.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_biguint(&self) -> num_bigint::BigUint {
        num_bigint::BigUint::from_bytes_le(&self.0)
    }
}

impl fmt::Display for Hash256 {
    /// Big-endian hex, the conventional display order for block and tx ids.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rev = self.0;
        rev.reverse();
        write!(f, "{}", hex::encode(rev))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self)
    }
}

impl FromStr for Hash256 {
    type Err = HashError;

    /// Parse big-endian hex (the display order).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(HashError::InvalidLength {
                got: bytes.len(),
                expected: 32,
            });
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        out.reverse();
        Ok(Hash256(out))
    }
}

/// A 160-bit digest (Hash160 output), little-endian byte order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash160(pub [u8; 20]);

impl Hash160 {
    /// Bit 31 of 32-bit word 4 of the digest, i.e. its most significant bit.
    ///
    /// Legacy entropy-bit extraction for pre-upgrade block versions samples
    /// exactly this bit of the block signature's Hash160.
    pub fn word4_top_bit(&self) -> u8 {
        self.0[19] >> 7
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rev = self.0;
        rev.reverse();
        write!(f, "{}", hex::encode(rev))
    }
}

impl fmt::Debug for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash160({})", self)
    }
}
