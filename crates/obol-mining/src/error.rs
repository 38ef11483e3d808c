//! Mining error types.

use thiserror::Error;

/// Mining errors.
#[derive(Error, Debug)]
pub enum MiningError {
    /// No chain tip to build on.
    #[error("no chain tip available")]
    NoChainTip,

    /// No kernel was found for this attempt; the minter retries after
    /// pacing.
    #[error("coinstake search found no kernel")]
    CoinstakeCancelled,

    /// Coinstake input signing failed.
    #[error("failed to sign coinstake input")]
    SignatureFailure,

    /// The wallet cannot produce a coinbase script; operator action is
    /// required.
    #[error("keypool ran out, please refill before restarting the minter")]
    KeypoolExhausted,

    /// The assembled block failed the final validity gate. Indicates a bug
    /// or consensus-rule drift, not a bad kernel.
    #[error("block validity check failed: {0}")]
    BlockValidity(String),

    /// Consensus evaluation error surfaced during assembly.
    #[error("consensus error: {0}")]
    Consensus(#[from] obol_consensus::ConsensusError),
}

/// Result type for mining operations.
pub type MiningResult<T> = Result<T, MiningError>;
