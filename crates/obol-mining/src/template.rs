//! Block templates.

use obol_types::{Amount, Block, Transaction};
use std::sync::Arc;

/// Per-transaction attribution inside a template. The coinbase entry
/// carries the negated total fee (it collects what the others paid).
#[derive(Debug, Clone)]
pub struct TemplateEntry {
    pub tx: Arc<Transaction>,
    pub fee: Amount,
    pub sigop_cost: i64,
}

/// An assembled block plus the bookkeeping a miner or RPC caller needs.
/// Templates are transient: one per mint attempt, submitted or discarded.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub block: Block,
    /// One entry per block transaction, in block order.
    pub entries: Vec<TemplateEntry>,
    /// Witness commitment script bytes carried by the coinbase, empty
    /// before segwit activation.
    pub coinbase_commitment: Vec<u8>,
    pub total_fees: Amount,
    pub total_weight: u64,
    pub total_sigops: u64,
}

impl BlockTemplate {
    /// Number of selected mempool transactions (excluding coinbase and
    /// coinstake).
    pub fn mempool_tx_count(&self) -> usize {
        let reserved = if self.block.is_proof_of_stake() { 2 } else { 1 };
        self.block.txs.len().saturating_sub(reserved)
    }
}
