//! Blocks and headers with the producing-algorithm tag.

use crate::hash::{sha256d, Hash256};
use crate::transaction::Transaction;
use std::sync::Arc;

/// Version bit distinguishing SHA256d proof-of-work headers from the
/// proof-of-stake default.
pub const VERSION_ALGO_POW_SHA256: i32 = 1 << 9;

/// Which algorithm produced (or is producing) a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algo {
    Pos,
    PowSha256,
}

/// Block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_hash: Hash256,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(80);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(self.prev_hash.as_bytes());
        buf.extend_from_slice(self.merkle_root.as_bytes());
        buf.extend_from_slice(&self.time.to_le_bytes());
        buf.extend_from_slice(&self.bits.to_le_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf
    }

    pub fn hash(&self) -> Hash256 {
        sha256d(&self.serialize())
    }

    /// Algorithm tag carried in the version bits.
    pub fn algo(&self) -> Algo {
        if self.version & VERSION_ALGO_POW_SHA256 != 0 {
            Algo::PowSha256
        } else {
            Algo::Pos
        }
    }
}

impl Default for BlockHeader {
    fn default() -> Self {
        BlockHeader {
            version: 1,
            prev_hash: Hash256::ZERO,
            merkle_root: Hash256::ZERO,
            time: 0,
            bits: 0,
            nonce: 0,
        }
    }
}

/// A block: header, ordered transactions, and the staker's header signature
/// (empty on proof-of-work blocks).
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Arc<Transaction>>,
    pub signature: Vec<u8>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// A block is proof-of-stake iff its second transaction is a coinstake.
    pub fn is_proof_of_stake(&self) -> bool {
        self.txs.len() > 1 && self.txs[1].is_coinstake()
    }

    /// Total block weight across all transactions.
    pub fn weight(&self) -> u64 {
        self.txs.iter().map(|tx| tx.weight()).sum()
    }
}
