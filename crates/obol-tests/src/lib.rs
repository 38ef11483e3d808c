//! # obol-tests
//!
//! Integration tests for the Obol proof-of-stake core.
//!
//! This crate provides cross-crate testing:
//! - A staking harness wiring chain, UTXO view, mempool and wallet fakes
//! - Deterministic generators for ids, transactions and stake coins
//! - Scenario tests for the stake modifier, kernel, assembler and minter
//! - Property-based tests for the consensus invariants

pub mod generators;
pub mod harness;

#[cfg(test)]
mod modifier_tests;

#[cfg(test)]
mod kernel_tests;

#[cfg(test)]
mod assembler_tests;



pub use generators::*;
pub use harness::*;
