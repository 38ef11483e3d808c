//! Error types for consensus evaluation.
//!
//! A kernel hash that simply fails to clear the target is a *miss*, not an
//! error; misses travel as values. The error channel carries precondition
//! violations and modifier-walk failures.

use obol_types::Hash256;
use thiserror::Error;

/// Consensus evaluation errors.
#[derive(Error, Debug)]
pub enum ConsensusError {
    /// Stake modifier walk ran off genesis.
    #[error("no generated stake modifier between genesis and the requested block")]
    StakeModifierUnavailable,

    /// V0.5 lookup: best block is still too old for the kernel timestamp.
    #[error("best block {hash} at height {height} too old for stake at time {tx_time}")]
    BestTipTooOld {
        hash: Hash256,
        height: u32,
        tx_time: u32,
    },

    /// V0.3 lookup: walked to the best block before the selection interval
    /// elapsed.
    #[error("reached best block {hash} at height {height} before modifier interval elapsed")]
    BestBlockReached { hash: Hash256, height: u32 },

    /// Kernel timestamp earlier than the staked output's block.
    #[error("kernel time {tx_time} before origin block time {block_from_time}")]
    TimestampViolation { tx_time: u32, block_from_time: u32 },

    /// Staked output does not meet the minimum age.
    #[error(
        "stake min age violation: origin time {block_from_time} + {min_age}s > kernel time {tx_time}"
    )]
    MinAgeViolation {
        block_from_time: u32,
        min_age: i64,
        tx_time: u32,
    },

    /// Staked output does not meet the minimum depth.
    #[error("stake min depth violation: depth {depth} < required {min_depth}")]
    MinDepthViolation { depth: u32, min_depth: u32 },

    /// Compact target decodes to zero, negative, overflow, or above the
    /// proof-of-stake limit.
    #[error("stake target out of range: {bits:#010x}")]
    TargetOutOfRange { bits: u32 },

    /// Search drift must be slot-aligned.
    #[error("hash drift {drift} not aligned to timestamp mask {mask:#x}")]
    MisalignedDrift { drift: u32, mask: u32 },

    /// No candidate satisfied a modifier selection round.
    #[error("no candidate selectable at modifier round {round}")]
    NoSelectableCandidate { round: usize },

    /// Modifier checksum disagrees with a hard checkpoint.
    #[error("stake modifier checkpoint mismatch at height {height}: got {got:#010x}, expected {expected:#010x}")]
    CheckpointMismatch { height: u32, got: u32, expected: u32 },
}

/// Result type for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;
