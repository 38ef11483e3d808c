//! # obol-chain
//!
//! Chain-facing contracts for the Obol proof-of-stake core.
//!
//! This crate provides:
//! - Per-block index entries carrying the stake modifier state
//! - The active-chain view trait and an in-memory implementation
//! - The UTXO view contract and the `Coin` record it serves
//! - Median-time-past and coin-age helpers
//!
//! Index entries and coins are owned by the node's chain layer; everything
//! here holds references and never mutates them.

mod error;
mod index;
mod utxo;
mod view;

pub use error::{ChainError, ChainResult};
pub use index::{
    median_time_past, BlockIndex, FLAG_GENERATED_MODIFIER, FLAG_PROOF_OF_STAKE, FLAG_STAKE_ENTROPY,
    MEDIAN_TIME_SPAN,
};
pub use utxo::{coin_age, Coin, MemoryUtxo, UtxoView};
pub use view::{ActiveChain, ChainView};
