//! # obol-consensus
//!
//! Proof-of-stake consensus rules for the Obol chain.
//!
//! This crate provides:
//! - Network parameter sets (mainnet, testnet, regtest)
//! - The stake modifier: entropy bits, 64-round modifier generation, and
//!   the V0.3 / V0.5 kernel-modifier lookup strategies
//! - The stake kernel protocol: proof-hash evaluation and timestamp-slot
//!   grinding against the value-weighted target
//! - Block subsidy, coin-age staking rewards, and the treasury schedule
//!
//! ## Kernel protocol
//!
//! A coinstake's first input ("kernel") must satisfy
//! `H(modifier ‖ blockFromTime ‖ prevout.n ‖ prevout.hash ‖ txTime)
//! <= target x value`, so the chance of staking is proportional to the
//! value held. The modifier mixes entropy from a window of past blocks so
//! an output owner cannot precompute future proofs at confirmation time.

mod error;
mod kernel;
mod modifier;
mod params;
mod subsidy;
mod work;

pub use error::{ConsensusError, ConsensusResult};
pub use kernel::{check_coinstake_timestamp, stake_proof_hash, KernelContext};
pub use modifier::{
    check_stake_modifier_checkpoint, compute_next_stake_modifier, kernel_stake_modifier,
    selection_interval, stake_entropy_bit, stake_modifier_checksum, KernelModifier,
    ModifierStrategy, STAKE_MODIFIER_SENTINEL,
};
pub use params::{ConsensusParams, Network, TreasuryPayee, MODIFIER_INTERVAL_RATIO};
pub use subsidy::{block_subsidy, is_super_majority, treasury_payment, treasury_payouts};
pub use work::{compute_block_version, next_work_required};
