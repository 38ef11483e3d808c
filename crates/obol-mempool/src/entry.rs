//! Mempool entries.

use crate::ordering::AncestorFeerate;
use obol_types::{Amount, Hash256, Transaction};
use std::sync::Arc;

/// A transaction in the pool together with its cached aggregates.
///
/// The with-ancestors fields include the entry itself. Entries are
/// immutable once created; block assembly owns any temporary adjustments
/// (for ancestors it has already committed) on its own side.
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub tx: Arc<Transaction>,
    pub txid: Hash256,
    pub wtxid: Hash256,
    /// Actual fee paid.
    pub fee: Amount,
    /// Fee after local prioritisation deltas; ordering uses this.
    pub modified_fee: Amount,
    /// Virtual size.
    pub vsize: u64,
    pub weight: u64,
    pub sigop_cost: u64,
    /// Pool insertion sequence; the deterministic ordering tie-break.
    pub sequence: u64,
    /// Number of in-pool ancestors, including this entry.
    pub count_with_ancestors: u64,
    pub size_with_ancestors: u64,
    pub fees_with_ancestors: Amount,
    pub sigops_with_ancestors: u64,
}

impl MempoolEntry {
    /// Ancestor feerate key for this entry as stored.
    pub fn ancestor_feerate(&self) -> AncestorFeerate {
        AncestorFeerate::new(
            self.fees_with_ancestors,
            self.size_with_ancestors,
            self.sequence,
        )
    }

    /// Standalone feerate in satoshis per vbyte, for logging only.
    pub fn feerate_per_vb(&self) -> f64 {
        if self.vsize == 0 {
            0.0
        } else {
            self.modified_fee as f64 / self.vsize as f64
        }
    }
}
