//! Active-chain view.

use crate::error::{ChainError, ChainResult};
use crate::index::BlockIndex;
use obol_types::Hash256;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Read access to the active chain.
///
/// Implemented by the node's chain state; the in-memory [`ActiveChain`]
/// below backs tests and single-process setups. Template assembly takes a
/// consistent snapshot by cloning the tip once and walking parent links;
/// `height()` is the cheap liveness probe the kernel grind polls.
pub trait ChainView: Send + Sync {
    /// Current tip, `None` before genesis is connected.
    fn tip(&self) -> Option<Arc<BlockIndex>>;

    /// Height of the tip.
    fn height(&self) -> Option<u32>;

    /// Entry at `height` on the active chain.
    fn at_height(&self, height: u32) -> Option<Arc<BlockIndex>>;

    /// Whether `entry` lies on the active chain.
    fn contains(&self, entry: &BlockIndex) -> bool;

    /// Successor of `entry` on the active chain.
    fn next(&self, entry: &BlockIndex) -> Option<Arc<BlockIndex>>;

    /// Look up any indexed entry by hash (not restricted to the active
    /// chain).
    fn lookup(&self, hash: &Hash256) -> Option<Arc<BlockIndex>>;
}

/// In-memory active chain.
pub struct ActiveChain {
    entries: RwLock<Vec<Arc<BlockIndex>>>,
    by_hash: RwLock<HashMap<Hash256, Arc<BlockIndex>>>,
}

impl ActiveChain {
    pub fn new() -> Self {
        ActiveChain {
            entries: RwLock::new(Vec::new()),
            by_hash: RwLock::new(HashMap::new()),
        }
    }

    /// Append an entry extending the current tip.
    pub fn push(&self, entry: Arc<BlockIndex>) -> ChainResult<()> {
        let mut entries = self.entries.write();
        let extends = match entries.last() {
            None => entry.prev.is_none(),
            Some(tip) => entry
                .prev
                .as_ref()
                .map_or(false, |prev| prev.hash == tip.hash),
        };
        if !extends {
            return Err(ChainError::DoesNotExtendTip {
                hash: entry.hash,
                height: entry.height,
            });
        }
        self.by_hash.write().insert(entry.hash, Arc::clone(&entry));
        debug!(height = entry.height, hash = %entry.hash, "chain extended");
        entries.push(entry);
        Ok(())
    }

    /// Index an entry that is not part of the active chain (a fork block).
    pub fn index_side_entry(&self, entry: Arc<BlockIndex>) {
        self.by_hash.write().insert(entry.hash, entry);
    }
}

impl Default for ActiveChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainView for ActiveChain {
    fn tip(&self) -> Option<Arc<BlockIndex>> {
        self.entries.read().last().cloned()
    }

    fn height(&self) -> Option<u32> {
        self.entries.read().last().map(|e| e.height)
    }

    fn at_height(&self, height: u32) -> Option<Arc<BlockIndex>> {
        self.entries.read().get(height as usize).cloned()
    }

    fn contains(&self, entry: &BlockIndex) -> bool {
        self.entries
            .read()
            .get(entry.height as usize)
            .map_or(false, |e| e.hash == entry.hash)
    }

    fn next(&self, entry: &BlockIndex) -> Option<Arc<BlockIndex>> {
        if !self.contains(entry) {
            return None;
        }
        self.at_height(entry.height + 1)
    }

    fn lookup(&self, hash: &Hash256) -> Option<Arc<BlockIndex>> {
        self.by_hash.read().get(hash).cloned()
    }
}
