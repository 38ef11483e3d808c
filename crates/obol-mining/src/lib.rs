//! # obol-mining
//!
//! Block production for the Obol node.
//!
//! This crate provides:
//! - Block template assembly: coinbase/coinstake placement, ancestor-
//!   feerate package selection under weight and sigop bounds, canonical
//!   transaction ordering, witness commitment, and the final validity gate
//! - Coinstake construction: kernel search over the wallet's stake-
//!   eligible coins, reward and treasury outputs, signing
//! - The minter: a single cooperative worker that drives template
//!   creation against wallet, mempool, chain tip and peers

mod assembler;
mod coinstake;
mod config;
mod error;
mod interfaces;
mod minter;
mod template;

pub use assembler::BlockAssembler;
pub use coinstake::CoinstakeBuilder;
pub use config::{AssemblerOptions, MintingConfig};
pub use error::{MiningError, MiningResult};
pub use interfaces::{
    AcceptAllValidity, BlockProcessor, NetworkStatus, StakeCoin, StakingWallet, TemplateValidity,
};
pub use minter::{InterruptToken, Minter, MinterOutcome};
pub use template::{BlockTemplate, TemplateEntry};

/// Weight reserved up front for the coinbase transaction.
pub const COINBASE_RESERVED_WEIGHT: u64 = 4_000;

/// Sigop cost reserved up front for the coinbase transaction.
pub const COINBASE_RESERVED_SIGOPS: u64 = 400;

/// Consecutive package failures tolerated near a full block before giving
/// up on selection.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 1_000;

/// Chain-sync progress below which minting stays suspended.
pub const MIN_SYNC_PROGRESS: f64 = 0.996;
