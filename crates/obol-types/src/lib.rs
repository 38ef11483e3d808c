//! # obol-types
//!
//! Primitive chain types for the Obol node.
//!
//! This crate provides:
//! - Double-SHA256 and Hash160 digests with the chain's hex conventions
//! - Transactions carrying the PoS-family timestamp field
//! - Block headers tagged with the producing algorithm (PoS or SHA256d PoW)
//! - Minimal script handling: standard patterns, sigop counting, builders
//! - Compact difficulty targets over `BigUint`
//! - Merkle roots and the segwit coinbase commitment

mod amount;
mod block;
mod compact;
mod encode;
mod hash;
mod merkle;
mod script;
mod transaction;

pub use amount::{format_amount, Amount, CENT, COIN, MAX_MONEY};
pub use block::{Algo, Block, BlockHeader, VERSION_ALGO_POW_SHA256};
pub use compact::{compact_to_target, target_to_compact};
pub use encode::{write_compact_size, write_var_bytes};
pub use hash::{hash160, sha256d, Hash160, Hash256, HashError};
pub use merkle::{
    block_merkle_root, block_witness_merkle_root, merkle_root, witness_commitment,
    witness_commitment_script, WITNESS_COMMITMENT_HEADER,
};
pub use script::{Script, ScriptType, OP_0, OP_CHECKSIG, OP_EQUAL, OP_HASH160, OP_RETURN};
pub use transaction::{OutPoint, Transaction, TxIn, TxOut};

/// Scale factor between transaction size and weight.
pub const WITNESS_SCALE_FACTOR: u64 = 4;

/// Maximum block weight.
pub const MAX_BLOCK_WEIGHT: u64 = 4_000_000;

/// Maximum sigop cost allowed in a block.
pub const MAX_BLOCK_SIGOPS_COST: u64 = 80_000;

/// Default cap for assembled block weight.
pub const DEFAULT_BLOCK_MAX_WEIGHT: u64 = MAX_BLOCK_WEIGHT - 4_000;

/// Default minimum feerate for template inclusion, in satoshis per 1000 vbytes.
pub const DEFAULT_BLOCK_MIN_TX_FEE: Amount = 1_000;

/// Sequence number that leaves a transaction final regardless of locktime.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Locktime values below this threshold are block heights, above it unix times.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;
