//! Transaction pool and snapshots.

use crate::entry::MempoolEntry;
use crate::error::{MempoolError, MempoolResult};
use obol_types::{Amount, Hash256, Transaction};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
struct PoolInner {
    entries: HashMap<Hash256, Arc<MempoolEntry>>,
    /// txid -> txids of in-pool transactions spending its outputs.
    children: HashMap<Hash256, Vec<Hash256>>,
    /// outpoint spender index, keyed by (txid, vout).
    spenders: HashMap<(Hash256, u32), Hash256>,
    next_sequence: u64,
}

/// Transaction mempool.
///
/// Unconfirmed parents must be in the pool before their spenders (orphans
/// are the sync layer's problem), so ancestor aggregates can be computed
/// once at insertion and frozen into the entry.
pub struct Mempool {
    inner: RwLock<PoolInner>,
}

impl Mempool {
    pub fn new() -> Self {
        Mempool {
            inner: RwLock::new(PoolInner::default()),
        }
    }

    /// Add a transaction with its fee and sigop cost.
    pub fn add(
        &self,
        tx: Arc<Transaction>,
        fee: Amount,
        sigop_cost: u64,
    ) -> MempoolResult<Arc<MempoolEntry>> {
        self.add_with_modified_fee(tx, fee, fee, sigop_cost)
    }

    /// Add a transaction whose ordering fee differs from its actual fee
    /// (local prioritisation).
    pub fn add_with_modified_fee(
        &self,
        tx: Arc<Transaction>,
        fee: Amount,
        modified_fee: Amount,
        sigop_cost: u64,
    ) -> MempoolResult<Arc<MempoolEntry>> {
        let txid = tx.txid();
        let mut inner = self.inner.write();
        if inner.entries.contains_key(&txid) {
            return Err(MempoolError::AlreadyExists(txid));
        }
        for input in &tx.inputs {
            let key = (input.prevout.txid, input.prevout.vout);
            if let Some(spender) = inner.spenders.get(&key) {
                if *spender != txid {
                    return Err(MempoolError::DoubleSpend {
                        txid: input.prevout.txid,
                        vout: input.prevout.vout,
                    });
                }
            }
        }

        // Ancestor closure through in-pool parents; inputs not in the pool
        // are confirmed outputs and contribute nothing.
        let mut ancestors: HashSet<Hash256> = HashSet::new();
        let mut stack: Vec<Hash256> = tx
            .inputs
            .iter()
            .filter(|i| inner.entries.contains_key(&i.prevout.txid))
            .map(|i| i.prevout.txid)
            .collect();
        while let Some(parent) = stack.pop() {
            if !ancestors.insert(parent) {
                continue;
            }
            let parent_entry = &inner.entries[&parent];
            for input in &parent_entry.tx.inputs {
                if inner.entries.contains_key(&input.prevout.txid) {
                    stack.push(input.prevout.txid);
                }
            }
        }

        let vsize = tx.vsize();
        let mut size_with_ancestors = vsize;
        let mut fees_with_ancestors = modified_fee;
        let mut sigops_with_ancestors = sigop_cost;
        for ancestor in &ancestors {
            let e = &inner.entries[ancestor];
            size_with_ancestors += e.vsize;
            fees_with_ancestors += e.modified_fee;
            sigops_with_ancestors += e.sigop_cost;
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        let entry = Arc::new(MempoolEntry {
            txid,
            wtxid: tx.wtxid(),
            fee,
            modified_fee,
            vsize,
            weight: tx.weight(),
            sigop_cost,
            sequence,
            count_with_ancestors: ancestors.len() as u64 + 1,
            size_with_ancestors,
            fees_with_ancestors,
            sigops_with_ancestors,
            tx,
        });

        for input in &entry.tx.inputs {
            let key = (input.prevout.txid, input.prevout.vout);
            inner.spenders.insert(key, txid);
            if inner.entries.contains_key(&input.prevout.txid) {
                inner
                    .children
                    .entry(input.prevout.txid)
                    .or_default()
                    .push(txid);
            }
        }
        inner.entries.insert(txid, Arc::clone(&entry));
        debug!(txid = %txid, count = inner.entries.len(), "transaction added to mempool");
        Ok(entry)
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.inner.read().entries.contains_key(txid)
    }

    pub fn get(&self, txid: &Hash256) -> Option<Arc<MempoolEntry>> {
        self.inner.read().entries.get(txid).cloned()
    }

    /// Remove an entry (confirmed or expired). Its descendants stay; their
    /// frozen ancestor aggregates become conservative overestimates until
    /// the pool is rebuilt, which block assembly compensates for itself.
    pub fn remove(&self, txid: &Hash256) -> MempoolResult<Arc<MempoolEntry>> {
        let mut inner = self.inner.write();
        let entry = inner
            .entries
            .remove(txid)
            .ok_or(MempoolError::NotFound(*txid))?;
        for input in &entry.tx.inputs {
            inner.spenders.remove(&(input.prevout.txid, input.prevout.vout));
        }
        inner.children.remove(txid);
        Ok(entry)
    }

    /// Immutable view for one round of block assembly: entries ordered by
    /// ancestor feerate plus the parent/child relation. Hold it only under
    /// the joint chain/mempool lock and drop it at scope end.
    pub fn snapshot(&self) -> MempoolSnapshot {
        let inner = self.inner.read();
        let mut ordered: Vec<Arc<MempoolEntry>> = inner.entries.values().cloned().collect();
        ordered.sort_by(|a, b| a.ancestor_feerate().cmp(&b.ancestor_feerate()));
        MempoolSnapshot {
            ordered,
            entries: inner.entries.clone(),
            children: inner.children.clone(),
        }
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

/// Frozen view of the pool taken under the assembly lock.
pub struct MempoolSnapshot {
    ordered: Vec<Arc<MempoolEntry>>,
    entries: HashMap<Hash256, Arc<MempoolEntry>>,
    children: HashMap<Hash256, Vec<Hash256>>,
}

impl MempoolSnapshot {
    /// Entries in descending ancestor-feerate order.
    pub fn by_ancestor_feerate(&self) -> impl Iterator<Item = &Arc<MempoolEntry>> {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn get(&self, txid: &Hash256) -> Option<&Arc<MempoolEntry>> {
        self.entries.get(txid)
    }

    /// All in-pool ancestors of `txid`, without count or size limits. The
    /// entry itself is not included.
    pub fn calculate_ancestors(&self, txid: &Hash256) -> HashSet<Hash256> {
        let mut ancestors = HashSet::new();
        let Some(entry) = self.entries.get(txid) else {
            return ancestors;
        };
        let mut stack: Vec<Hash256> = entry
            .tx
            .inputs
            .iter()
            .filter(|i| self.entries.contains_key(&i.prevout.txid))
            .map(|i| i.prevout.txid)
            .collect();
        while let Some(parent) = stack.pop() {
            if !ancestors.insert(parent) {
                continue;
            }
            for input in &self.entries[&parent].tx.inputs {
                if self.entries.contains_key(&input.prevout.txid) {
                    stack.push(input.prevout.txid);
                }
            }
        }
        ancestors
    }

    /// All in-pool descendants of `txid`; the entry itself is not
    /// included.
    pub fn calculate_descendants(&self, txid: &Hash256) -> HashSet<Hash256> {
        let mut descendants = HashSet::new();
        let mut stack: Vec<Hash256> = self.children.get(txid).cloned().unwrap_or_default();
        while let Some(child) = stack.pop() {
            if !descendants.insert(child) {
                continue;
            }
            if let Some(grandchildren) = self.children.get(&child) {
                stack.extend(grandchildren.iter().copied());
            }
        }
        descendants
    }

    /// In-pool parents of `txid` restricted to `within`, for canonical
    /// ordering of a selected set.
    pub fn parents_within(&self, txid: &Hash256, within: &HashSet<Hash256>) -> HashSet<Hash256> {
        let Some(entry) = self.entries.get(txid) else {
            return HashSet::new();
        };
        entry
            .tx
            .inputs
            .iter()
            .map(|i| i.prevout.txid)
            .filter(|parent| within.contains(parent))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obol_types::{sha256d, OutPoint, Script, TxIn, TxOut};

    /// A transaction spending the given outpoints, padded to a unique shape.
    fn tx_spending(salt: u8, prevouts: &[OutPoint]) -> Arc<Transaction> {
        let mut tx = Transaction::new(1_000_000 + salt as u32);
        for prevout in prevouts {
            tx.inputs.push(TxIn::new(*prevout));
        }
        if prevouts.is_empty() {
            tx.inputs
                .push(TxIn::new(OutPoint::new(sha256d(&[salt, 0xC0]), 0)));
        }
        tx.outputs
            .push(TxOut::new(1000, Script::new_p2pk(&[salt; 33])));
        Arc::new(tx)
    }

    #[test]
    fn test_add_get_remove() {
        let pool = Mempool::new();
        let tx = tx_spending(1, &[]);
        let entry = pool.add(Arc::clone(&tx), 500, 4).unwrap();
        assert_eq!(entry.fee, 500);
        assert!(pool.contains(&tx.txid()));

        assert!(matches!(
            pool.add(Arc::clone(&tx), 500, 4),
            Err(MempoolError::AlreadyExists(_))
        ));

        pool.remove(&tx.txid()).unwrap();
        assert!(pool.is_empty());
        assert!(matches!(
            pool.remove(&tx.txid()),
            Err(MempoolError::NotFound(_))
        ));
    }

    #[test]
    fn test_double_spend_rejected() {
        let pool = Mempool::new();
        let shared = OutPoint::new(sha256d(b"shared"), 3);
        pool.add(tx_spending(1, &[shared]), 500, 4).unwrap();
        assert!(matches!(
            pool.add(tx_spending(2, &[shared]), 900, 4),
            Err(MempoolError::DoubleSpend { .. })
        ));
    }

    #[test]
    fn test_ancestor_aggregates() {
        let pool = Mempool::new();
        let parent = tx_spending(1, &[]);
        let parent_entry = pool.add(Arc::clone(&parent), 100, 4).unwrap();

        let child = tx_spending(2, &[OutPoint::new(parent.txid(), 0)]);
        let child_entry = pool.add(Arc::clone(&child), 300, 8).unwrap();

        assert_eq!(child_entry.count_with_ancestors, 2);
        assert_eq!(child_entry.fees_with_ancestors, 400);
        assert_eq!(
            child_entry.size_with_ancestors,
            parent_entry.vsize + child_entry.vsize
        );
        assert_eq!(child_entry.sigops_with_ancestors, 12);

        let grandchild = tx_spending(3, &[OutPoint::new(child.txid(), 0)]);
        let gc_entry = pool.add(grandchild, 50, 4).unwrap();
        assert_eq!(gc_entry.count_with_ancestors, 3);
        assert_eq!(gc_entry.fees_with_ancestors, 450);
    }

    #[test]
    fn test_snapshot_ordering_by_ancestor_feerate() {
        let pool = Mempool::new();
        let cheap = tx_spending(1, &[]);
        let rich = tx_spending(2, &[]);
        pool.add(Arc::clone(&cheap), 100, 4).unwrap();
        pool.add(Arc::clone(&rich), 100_000, 4).unwrap();

        let snapshot = pool.snapshot();
        let first = snapshot.by_ancestor_feerate().next().unwrap();
        assert_eq!(first.txid, rich.txid());
    }

    #[test]
    fn test_snapshot_closures() {
        let pool = Mempool::new();
        let a = tx_spending(1, &[]);
        pool.add(Arc::clone(&a), 100, 4).unwrap();
        let b = tx_spending(2, &[OutPoint::new(a.txid(), 0)]);
        pool.add(Arc::clone(&b), 100, 4).unwrap();
        let c = tx_spending(3, &[OutPoint::new(b.txid(), 0)]);
        pool.add(Arc::clone(&c), 100, 4).unwrap();

        let snapshot = pool.snapshot();
        let ancestors = snapshot.calculate_ancestors(&c.txid());
        assert_eq!(ancestors.len(), 2);
        assert!(ancestors.contains(&a.txid()) && ancestors.contains(&b.txid()));

        let descendants = snapshot.calculate_descendants(&a.txid());
        assert_eq!(descendants.len(), 2);
        assert!(descendants.contains(&b.txid()) && descendants.contains(&c.txid()));

        let within: HashSet<Hash256> = [a.txid(), c.txid()].into_iter().collect();
        // b is outside the set, so c has no parent within it
        assert!(snapshot.parents_within(&c.txid(), &within).is_empty());
    }
}
