//! Error types for chain bookkeeping.

use obol_types::Hash256;
use thiserror::Error;

/// Chain bookkeeping errors.
#[derive(Error, Debug)]
pub enum ChainError {
    /// Entry's parent is not the current tip.
    #[error("entry {hash} at height {height} does not extend the tip")]
    DoesNotExtendTip { hash: Hash256, height: u32 },

    /// A referenced block is not indexed.
    #[error("block not indexed: {0}")]
    UnknownBlock(Hash256),
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
