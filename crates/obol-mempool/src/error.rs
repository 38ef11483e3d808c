//! Error types for the mempool.

use obol_types::Hash256;
use thiserror::Error;

/// Mempool errors.
#[derive(Error, Debug)]
pub enum MempoolError {
    /// Transaction already in the pool.
    #[error("transaction already in mempool: {0}")]
    AlreadyExists(Hash256),

    /// Transaction not found.
    #[error("transaction not in mempool: {0}")]
    NotFound(Hash256),

    /// An input double-spends another pool transaction.
    #[error("input {txid}:{vout} already spent in mempool")]
    DoubleSpend { txid: Hash256, vout: u32 },
}

/// Result type for mempool operations.
pub type MempoolResult<T> = Result<T, MempoolError>;
