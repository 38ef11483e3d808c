//! Block template assembly.
//!
//! Selection walks the mempool's ancestor-feerate order, committing whole
//! packages (a transaction plus its unconfirmed ancestors) while they fit
//! under the weight and sigop bounds. Because committed ancestors shrink
//! the effective package of every descendant, a side set of "modified"
//! entries re-ranks those descendants as selection proceeds.

use crate::coinstake::CoinstakeBuilder;
use crate::config::{fee_for_size, AssemblerOptions, MintingConfig};
use crate::error::{MiningError, MiningResult};
use crate::interfaces::{StakingWallet, TemplateValidity};
use crate::template::{BlockTemplate, TemplateEntry};
use crate::{COINBASE_RESERVED_SIGOPS, COINBASE_RESERVED_WEIGHT, MAX_CONSECUTIVE_FAILURES};
use obol_chain::{median_time_past, ChainView, UtxoView};
use obol_consensus::{
    block_subsidy, compute_block_version, next_work_required, treasury_payouts, ConsensusParams,
};
use obol_mempool::{AncestorFeerate, Mempool, MempoolEntry, MempoolSnapshot};
use obol_types::{
    block_merkle_root, block_witness_merkle_root, witness_commitment, witness_commitment_script,
    Algo, Amount, Block, BlockHeader, Hash256, OutPoint, Script, Transaction, TxIn, TxOut,
    MAX_BLOCK_SIGOPS_COST, WITNESS_SCALE_FACTOR,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// A mempool entry whose ancestor package shrank because some ancestors
/// are already committed to the block.
#[derive(Clone)]
struct ModifiedEntry {
    entry: Arc<MempoolEntry>,
    size_with_ancestors: u64,
    fees_with_ancestors: Amount,
    sigops_with_ancestors: u64,
}

impl ModifiedEntry {
    fn new(entry: Arc<MempoolEntry>) -> Self {
        ModifiedEntry {
            size_with_ancestors: entry.size_with_ancestors,
            fees_with_ancestors: entry.fees_with_ancestors,
            sigops_with_ancestors: entry.sigops_with_ancestors,
            entry,
        }
    }

    fn feerate(&self) -> AncestorFeerate {
        AncestorFeerate::new(
            self.fees_with_ancestors,
            self.size_with_ancestors,
            self.entry.sequence,
        )
    }
}

/// Priority view over the modified entries, best feerate first.
#[derive(Default)]
struct ModifiedSet {
    by_score: BTreeMap<AncestorFeerate, Hash256>,
    by_txid: HashMap<Hash256, ModifiedEntry>,
}

impl ModifiedSet {
    fn contains(&self, txid: &Hash256) -> bool {
        self.by_txid.contains_key(txid)
    }

    fn best(&self) -> Option<&ModifiedEntry> {
        self.by_score
            .values()
            .next()
            .and_then(|txid| self.by_txid.get(txid))
    }

    fn remove(&mut self, txid: &Hash256) {
        if let Some(existing) = self.by_txid.remove(txid) {
            self.by_score.remove(&existing.feerate());
        }
    }

    /// Account for `included` having entered the block: shrink (or create)
    /// the modified package of `descendant`.
    fn subtract_included(&mut self, descendant: &Arc<MempoolEntry>, included: &MempoolEntry) {
        let mut modified = match self.by_txid.remove(&descendant.txid) {
            Some(existing) => {
                self.by_score.remove(&existing.feerate());
                existing
            }
            None => ModifiedEntry::new(Arc::clone(descendant)),
        };
        modified.size_with_ancestors -= included.vsize;
        modified.fees_with_ancestors -= included.modified_fee;
        modified.sigops_with_ancestors -= included.sigop_cost;
        self.by_score.insert(modified.feerate(), descendant.txid);
        self.by_txid.insert(descendant.txid, modified);
    }

    fn is_empty(&self) -> bool {
        self.by_txid.is_empty()
    }
}

/// Per-call selection state.
struct Selection<'a> {
    snapshot: &'a MempoolSnapshot,
    in_block: HashSet<Hash256>,
    failed: HashSet<Hash256>,
    modified: ModifiedSet,
    picked: Vec<Arc<MempoolEntry>>,
    block_weight: u64,
    block_sigops: u64,
    fees: Amount,
    max_weight: u64,
    min_fee_rate: Amount,
    height: u32,
    lock_time_cutoff: i64,
    include_witness: bool,
    print_priority: bool,
}

impl<'a> Selection<'a> {
    fn package_fits(&self, package_size: u64, package_sigops: u64) -> bool {
        if self.block_weight + WITNESS_SCALE_FACTOR * package_size >= self.max_weight {
            return false;
        }
        self.block_sigops + package_sigops < MAX_BLOCK_SIGOPS_COST
    }

    /// Transaction-level screen: finality at the locktime cutoff and no
    /// premature witness data.
    fn package_transactions_ok(&self, package: &[Arc<MempoolEntry>]) -> bool {
        package.iter().all(|entry| {
            entry.tx.is_final_at(self.height, self.lock_time_cutoff)
                && (self.include_witness || !entry.tx.has_witness())
        })
    }

    fn add_to_block(&mut self, entry: &Arc<MempoolEntry>) {
        self.block_weight += entry.weight;
        self.block_sigops += entry.sigop_cost;
        self.fees += entry.fee;
        self.in_block.insert(entry.txid);
        self.picked.push(Arc::clone(entry));
        self.modified.remove(&entry.txid);
        if self.print_priority {
            debug!(
                feerate = entry.feerate_per_vb(),
                txid = %entry.txid,
                "selected transaction"
            );
        }
    }

    /// Main selection loop over the feerate-ordered snapshot merged with
    /// the modified set.
    fn select_packages(&mut self) -> (usize, usize) {
        let snapshot = self.snapshot;
        let ordered: Vec<&Arc<MempoolEntry>> = snapshot.by_ancestor_feerate().collect();
        let mut i = 0usize;
        let mut packages = 0usize;
        let mut descendants_updated = 0usize;
        let mut consecutive_failures = 0u32;

        loop {
            // Skip pool entries already handled: committed, failed, or
            // re-ranked into the modified set (their cached aggregates are
            // stale there).
            while i < ordered.len() {
                let txid = &ordered[i].txid;
                if self.in_block.contains(txid)
                    || self.failed.contains(txid)
                    || self.modified.contains(txid)
                {
                    i += 1;
                } else {
                    break;
                }
            }

            // Pick the better of the next pool entry and the best
            // modified entry.
            let using_modified;
            let candidate: Arc<MempoolEntry>;
            let (package_size, package_fees, package_sigops);
            if i >= ordered.len() {
                let Some(best) = self.modified.best() else {
                    break;
                };
                using_modified = true;
                candidate = Arc::clone(&best.entry);
                package_size = best.size_with_ancestors;
                package_fees = best.fees_with_ancestors;
                package_sigops = best.sigops_with_ancestors;
            } else {
                let entry = ordered[i];
                match self.modified.best() {
                    Some(best) if best.feerate() < entry.ancestor_feerate() => {
                        using_modified = true;
                        candidate = Arc::clone(&best.entry);
                        package_size = best.size_with_ancestors;
                        package_fees = best.fees_with_ancestors;
                        package_sigops = best.sigops_with_ancestors;
                    }
                    _ => {
                        using_modified = false;
                        candidate = Arc::clone(entry);
                        package_size = entry.size_with_ancestors;
                        package_fees = entry.fees_with_ancestors;
                        package_sigops = entry.sigops_with_ancestors;
                        i += 1;
                    }
                }
            }
            debug_assert!(!self.in_block.contains(&candidate.txid));

            if package_fees < fee_for_size(self.min_fee_rate, package_size) {
                // everything else remaining pays even worse
                break;
            }

            if !self.package_fits(package_size, package_sigops) {
                if using_modified {
                    self.modified.remove(&candidate.txid);
                    self.failed.insert(candidate.txid);
                }
                consecutive_failures += 1;
                if consecutive_failures > MAX_CONSECUTIVE_FAILURES
                    && self.block_weight > self.max_weight - 4_000
                {
                    break;
                }
                continue;
            }

            // Full package: unconfirmed ancestors not yet in the block,
            // then the candidate itself.
            let mut package: Vec<Arc<MempoolEntry>> = snapshot
                .calculate_ancestors(&candidate.txid)
                .into_iter()
                .filter(|txid| !self.in_block.contains(txid))
                .filter_map(|txid| snapshot.get(&txid).cloned())
                .collect();
            package.push(Arc::clone(&candidate));

            if !self.package_transactions_ok(&package) {
                if using_modified {
                    self.modified.remove(&candidate.txid);
                    self.failed.insert(candidate.txid);
                }
                continue;
            }
            consecutive_failures = 0;

            // Ancestor-count order is a valid topological order within
            // the package.
            package.sort_by(|a, b| {
                a.count_with_ancestors
                    .cmp(&b.count_with_ancestors)
                    .then_with(|| a.txid.cmp(&b.txid))
            });
            let added: HashSet<Hash256> = package.iter().map(|e| e.txid).collect();
            for entry in &package {
                self.add_to_block(entry);
            }
            packages += 1;

            // Re-rank descendants of what was just committed.
            for entry in &package {
                for descendant_id in snapshot.calculate_descendants(&entry.txid) {
                    if added.contains(&descendant_id) {
                        continue;
                    }
                    if let Some(descendant) = snapshot.get(&descendant_id) {
                        self.modified.subtract_included(descendant, entry);
                        descendants_updated += 1;
                    }
                }
            }
        }
        (packages, descendants_updated)
    }
}

/// Canonical in-block order for the selected set: topological always, and
/// ascending witness-hash among transactions whose in-set parents are
/// already placed.
fn canonical_order(
    snapshot: &MempoolSnapshot,
    picked: Vec<Arc<MempoolEntry>>,
) -> Vec<Arc<MempoolEntry>> {
    let selected: HashSet<Hash256> = picked.iter().map(|e| e.txid).collect();
    let by_txid: HashMap<Hash256, Arc<MempoolEntry>> =
        picked.iter().map(|e| (e.txid, Arc::clone(e))).collect();

    let mut pending: HashMap<Hash256, usize> = HashMap::new();
    let mut children: HashMap<Hash256, Vec<Hash256>> = HashMap::new();
    for entry in &picked {
        let parents = snapshot.parents_within(&entry.txid, &selected);
        pending.insert(entry.txid, parents.len());
        for parent in parents {
            children.entry(parent).or_default().push(entry.txid);
        }
    }

    let mut ready: BTreeSet<(Hash256, Hash256)> = picked
        .iter()
        .filter(|e| pending[&e.txid] == 0)
        .map(|e| (e.wtxid, e.txid))
        .collect();
    let mut ordered = Vec::with_capacity(picked.len());
    while let Some(&(wtxid, txid)) = ready.iter().next() {
        ready.remove(&(wtxid, txid));
        ordered.push(Arc::clone(&by_txid[&txid]));
        for child in children.remove(&txid).unwrap_or_default() {
            let left = pending.get_mut(&child).expect("child is in the set");
            *left -= 1;
            if *left == 0 {
                let child_entry = &by_txid[&child];
                ready.insert((child_entry.wtxid, child_entry.txid));
            }
        }
    }
    debug_assert_eq!(ordered.len(), picked.len());
    ordered
}

fn legacy_tx_sigops(tx: &Transaction) -> u64 {
    let inputs: u64 = tx
        .inputs
        .iter()
        .map(|i| i.script_sig.legacy_sigop_count())
        .sum();
    let outputs: u64 = tx
        .outputs
        .iter()
        .map(|o| o.script_pubkey.legacy_sigop_count())
        .sum();
    inputs + outputs
}

/// Assembles block templates against a chain tip and mempool snapshot.
pub struct BlockAssembler {
    params: Arc<ConsensusParams>,
    chain: Arc<dyn ChainView>,
    utxo: Arc<dyn UtxoView>,
    mempool: Arc<Mempool>,
    validity: Arc<dyn TemplateValidity>,
    options: AssemblerOptions,
    config: MintingConfig,
    last_block_tx: AtomicU64,
    last_block_weight: AtomicU64,
}

impl BlockAssembler {
    pub fn new(
        params: Arc<ConsensusParams>,
        chain: Arc<dyn ChainView>,
        utxo: Arc<dyn UtxoView>,
        mempool: Arc<Mempool>,
        validity: Arc<dyn TemplateValidity>,
        options: AssemblerOptions,
        config: MintingConfig,
    ) -> Self {
        BlockAssembler {
            params,
            chain,
            utxo,
            mempool,
            validity,
            options,
            config,
            last_block_tx: AtomicU64::new(0),
            last_block_weight: AtomicU64::new(0),
        }
    }

    /// Telemetry: transaction count of the last assembled block.
    pub fn last_block_tx(&self) -> u64 {
        self.last_block_tx.load(Ordering::Relaxed)
    }

    /// Telemetry: weight of the last assembled block.
    pub fn last_block_weight(&self) -> u64 {
        self.last_block_weight.load(Ordering::Relaxed)
    }

    /// Assemble a new block on the current tip.
    ///
    /// With a wallet the template is proof-of-stake: a coinstake is
    /// searched for and spliced into slot 1, and failure to find one is
    /// [`MiningError::CoinstakeCancelled`]. Without a wallet the template
    /// is a SHA256d proof-of-work block paying `script_pub_key`.
    pub fn create_new_block(
        &self,
        script_pub_key: Script,
        wallet: Option<&dyn StakingWallet>,
        adjusted_now: i64,
    ) -> MiningResult<BlockTemplate> {
        let prev = self.chain.tip().ok_or(MiningError::NoChainTip)?;
        let height = prev.height + 1;
        let proof_of_stake = wallet.is_some();
        let algo = if proof_of_stake {
            Algo::Pos
        } else {
            Algo::PowSha256
        };

        let mut header = BlockHeader {
            version: compute_block_version(&self.params, height, algo),
            prev_hash: prev.hash,
            merkle_root: Hash256::ZERO,
            time: adjusted_now as u32,
            bits: next_work_required(&self.params, Some(&prev), algo),
            nonce: 0,
        };
        let mtp = median_time_past(&prev);
        let lock_time_cutoff = if self.params.is_csv_active(height) {
            mtp
        } else {
            header.time as i64
        };
        let include_witness = self.params.is_segwit_active(height);

        // Select packages under a pool snapshot held for this call only.
        let snapshot = self.mempool.snapshot();
        let mut selection = Selection {
            snapshot: &snapshot,
            in_block: HashSet::new(),
            failed: HashSet::new(),
            modified: ModifiedSet::default(),
            picked: Vec::new(),
            block_weight: COINBASE_RESERVED_WEIGHT,
            block_sigops: COINBASE_RESERVED_SIGOPS,
            fees: 0,
            max_weight: self.options.clamped_max_weight(),
            min_fee_rate: self.options.min_fee_rate,
            height,
            lock_time_cutoff,
            include_witness,
            print_priority: self.config.print_priority,
        };
        let (packages, descendants_updated) = selection.select_packages();
        trace!(packages, descendants_updated, "package selection done");
        let fees = selection.fees;
        let block_sigops = selection.block_sigops;
        let picked = canonical_order(&snapshot, selection.picked);
        drop(snapshot);

        // Coinbase: height tag in the script signature, output paid only
        // on the proof-of-work path.
        let mut coinbase = Transaction::new(header.time);
        let mut script_sig = Script::new();
        script_sig.push_num(height as i64);
        script_sig.push_data(&[]); // OP_0 terminator, extra nonce replaces it
        let mut coinbase_input = TxIn::new(OutPoint::null());
        coinbase_input.script_sig = script_sig;
        coinbase.inputs.push(coinbase_input);
        coinbase.outputs.push(TxOut::new(0, script_pub_key));
        if !proof_of_stake {
            coinbase.outputs[0].value = block_subsidy(&self.params, height, false, 0);
            for (script, value) in treasury_payouts(&self.params, height) {
                coinbase.outputs.push(TxOut::new(value, script));
            }
        }

        // Coinstake search; advances `header.time` to the found slot.
        let mut coinstake = None;
        if let Some(wallet) = wallet {
            let builder = CoinstakeBuilder {
                params: &self.params,
                chain: &*self.chain,
                utxo: &*self.utxo,
                wallet,
            };
            let found = builder.create(&mut header, &prev, height)?;
            match found {
                Some(tx)
                    if header.time as i64 > mtp
                        && header.time & self.params.stake_timestamp_mask == 0 =>
                {
                    coinbase.outputs[0] = TxOut::empty();
                    coinbase.outputs.truncate(1);
                    coinstake = Some(Arc::new(tx));
                }
                _ => return Err(MiningError::CoinstakeCancelled),
            }
        }

        // Witness commitment before the merkle root; the commitment output
        // changes the coinbase txid.
        let mut commitment_bytes = Vec::new();
        if include_witness {
            coinbase.inputs[0].witness = vec![vec![0u8; 32]];
            let mut staging = Block {
                header: header.clone(),
                txs: Vec::new(),
                signature: Vec::new(),
            };
            staging.txs.push(Arc::new(coinbase.clone()));
            if let Some(cs) = &coinstake {
                staging.txs.push(Arc::clone(cs));
            }
            staging.txs.extend(picked.iter().map(|e| Arc::clone(&e.tx)));
            let witness_root = block_witness_merkle_root(&staging);
            let commitment = witness_commitment(&witness_root, &[0u8; 32]);
            let commitment_script = witness_commitment_script(&commitment);
            commitment_bytes = commitment_script.as_bytes().to_vec();
            coinbase.outputs.push(TxOut::new(0, commitment_script));
        }

        if !proof_of_stake {
            // refresh the header clock for proof-of-work templates
            header.time = header.time.max((mtp + 1) as u32);
        }
        header.nonce = 0;

        let coinbase_sigops = (WITNESS_SCALE_FACTOR * legacy_tx_sigops(&coinbase)) as i64;
        let coinbase = Arc::new(coinbase);
        let mut block = Block {
            header,
            txs: Vec::with_capacity(picked.len() + 2),
            signature: Vec::new(),
        };
        let mut entries = Vec::with_capacity(picked.len() + 2);
        block.txs.push(Arc::clone(&coinbase));
        entries.push(TemplateEntry {
            tx: coinbase,
            fee: -fees,
            sigop_cost: coinbase_sigops,
        });
        if let Some(cs) = coinstake {
            block.txs.push(Arc::clone(&cs));
            entries.push(TemplateEntry {
                tx: cs,
                fee: 0,
                sigop_cost: 0,
            });
        }
        for entry in &picked {
            block.txs.push(Arc::clone(&entry.tx));
            entries.push(TemplateEntry {
                tx: Arc::clone(&entry.tx),
                fee: entry.fee,
                sigop_cost: entry.sigop_cost as i64,
            });
        }
        block.header.merkle_root = block_merkle_root(&block);

        self.last_block_tx.store(picked.len() as u64, Ordering::Relaxed);
        let total_weight = block.weight();
        self.last_block_weight.store(total_weight, Ordering::Relaxed);
        info!(
            height,
            weight = total_weight,
            txs = picked.len(),
            fees,
            sigops = block_sigops,
            "assembled block template"
        );

        self.validity
            .test_block_validity(&block, &prev)
            .map_err(MiningError::BlockValidity)?;

        Ok(BlockTemplate {
            block,
            entries,
            coinbase_commitment: commitment_bytes,
            total_fees: fees,
            total_weight,
            total_sigops: block_sigops,
        })
    }
}
