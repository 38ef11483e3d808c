//! Minting and assembly configuration.

use obol_types::{Amount, DEFAULT_BLOCK_MAX_WEIGHT, DEFAULT_BLOCK_MIN_TX_FEE, MAX_BLOCK_WEIGHT};
use serde::{Deserialize, Serialize};

/// Minter configuration, mirroring the node's command-line surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintingConfig {
    /// Enable staking (`-staking`).
    pub staking: bool,
    /// Enable minting (`-minting`).
    pub minting: bool,
    /// Base pacing between mint attempts in milliseconds (`-staketimio`);
    /// the effective timeout adds `30 x sqrt(utxo count)`.
    pub stake_timeout_ms: u64,
    /// Log per-transaction fee rates during selection (`-printpriority`).
    pub print_priority: bool,
    /// Verbose stake modifier logging (`-printstakemodifier`).
    pub print_stake_modifier: bool,
}

impl Default for MintingConfig {
    fn default() -> Self {
        Self {
            staking: true,
            minting: true,
            stake_timeout_ms: 500,
            print_priority: false,
            print_stake_modifier: false,
        }
    }
}

/// Block assembly limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblerOptions {
    /// Maximum block weight (`-blockmaxweight`); clamped to
    /// `[4000, MAX_BLOCK_WEIGHT - 4000]` at use.
    pub max_weight: u64,
    /// Minimum package feerate in satoshis per 1000 vbytes
    /// (`-blockmintxfee`).
    pub min_fee_rate: Amount,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            max_weight: DEFAULT_BLOCK_MAX_WEIGHT,
            min_fee_rate: DEFAULT_BLOCK_MIN_TX_FEE,
        }
    }
}

impl AssemblerOptions {
    /// Weight cap clamped to the sane range.
    pub fn clamped_max_weight(&self) -> u64 {
        self.max_weight.clamp(4_000, MAX_BLOCK_WEIGHT - 4_000)
    }
}

/// Fee due for `size` vbytes at `rate` satoshis per 1000 vbytes, rounding
/// up from zero for nonzero sizes.
pub fn fee_for_size(rate: Amount, size: u64) -> Amount {
    let fee = rate * size as Amount / 1_000;
    if fee == 0 && size != 0 && rate > 0 {
        1
    } else {
        fee
    }
}
