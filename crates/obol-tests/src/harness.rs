//! Staking test harness.
//!
//! Wires a synthetic active chain, UTXO view, mempool and wallet/network
//! fakes together so kernel, assembler and minter paths can run end to
//! end without a node.

use crate::generators::{seeded_id, test_pubkey};
use obol_chain::{
    ActiveChain, BlockIndex, ChainView, Coin, MemoryUtxo, FLAG_GENERATED_MODIFIER,
    FLAG_PROOF_OF_STAKE, FLAG_STAKE_ENTROPY,
};
use obol_consensus::{compute_next_stake_modifier, ConsensusParams};
use obol_mempool::Mempool;
use obol_mining::{BlockProcessor, NetworkStatus, StakeCoin, StakingWallet};
use obol_types::{Amount, Block, Hash256, OutPoint, Script, Transaction, TxOut};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A synthetic staking node: chain, UTXO set and mempool.
pub struct StakeHarness {
    pub params: Arc<ConsensusParams>,
    pub chain: Arc<ActiveChain>,
    pub utxo: Arc<MemoryUtxo>,
    pub mempool: Arc<Mempool>,
}

impl StakeHarness {
    /// A regtest harness whose chain has `blocks` entries spaced
    /// `spacing` seconds apart, the first at `base_time`. Stake modifiers
    /// are computed through the real modifier pipeline.
    pub fn regtest(blocks: u32, spacing: u32, base_time: u32) -> Self {
        let params = Arc::new(ConsensusParams::regtest());
        let chain = Arc::new(ActiveChain::new());
        let mut prev: Option<Arc<BlockIndex>> = None;
        for height in 0..blocks {
            let time = base_time + height * spacing;
            let entry = make_entry(&params, height, time, prev.clone());
            chain.push(Arc::clone(&entry)).expect("extends tip");
            prev = Some(entry);
        }
        StakeHarness {
            params,
            chain,
            utxo: Arc::new(MemoryUtxo::new()),
            mempool: Arc::new(Mempool::new()),
        }
    }

    pub fn tip(&self) -> Arc<BlockIndex> {
        self.chain.tip().expect("non-empty chain")
    }

    /// Extend the chain by one block at `time`.
    pub fn add_block(&self, time: u32) -> Arc<BlockIndex> {
        let height = self.chain.height().map_or(0, |h| h + 1);
        let entry = make_entry(&self.params, height, time, self.chain.tip());
        self.chain.push(Arc::clone(&entry)).expect("extends tip");
        entry
    }

    /// Register a stake-eligible coin created in the block at
    /// `origin_height` and return it in wallet form.
    pub fn fund_stake(&self, origin_height: u32, value: Amount, script: Script) -> StakeCoin {
        let origin = self
            .chain
            .at_height(origin_height)
            .expect("origin on chain");
        let outpoint = OutPoint::new(seeded_id(u64::from(origin_height) << 16 | 0xC0), 0);
        let output = TxOut::new(value, script);
        self.utxo.insert(
            outpoint,
            Coin {
                output: output.clone(),
                height: origin_height,
                tx_time: origin.time,
                is_coinbase: false,
                is_coinstake: false,
            },
        );
        StakeCoin { outpoint, output }
    }
}

fn make_entry(
    params: &ConsensusParams,
    height: u32,
    time: u32,
    prev: Option<Arc<BlockIndex>>,
) -> Arc<BlockIndex> {
    let (modifier, generated) =
        compute_next_stake_modifier(params, prev.as_ref()).expect("modifier computable");
    let hash = seeded_id(u64::from(height));
    let mut flags = FLAG_PROOF_OF_STAKE;
    if hash.low_bit() == 1 {
        flags |= FLAG_STAKE_ENTROPY;
    }
    if generated {
        flags |= FLAG_GENERATED_MODIFIER;
    }
    Arc::new(BlockIndex::new(
        hash,
        height,
        1,
        time,
        0x207f_ffff,
        prev,
        modifier,
        0,
        Hash256::ZERO,
        flags,
    ))
}

/// Wallet fake: a fixed coin list, lockable, with a controllable keypool.
pub struct TestWallet {
    pub coins: RwLock<Vec<StakeCoin>>,
    pub locked: AtomicBool,
    pub keypool_empty: AtomicBool,
}

impl TestWallet {
    pub fn new(coins: Vec<StakeCoin>) -> Self {
        TestWallet {
            coins: RwLock::new(coins),
            locked: AtomicBool::new(false),
            keypool_empty: AtomicBool::new(false),
        }
    }
}

impl StakingWallet for TestWallet {
    fn select_stake_coins(&self) -> Vec<StakeCoin> {
        self.coins.read().clone()
    }

    fn available_coin_count(&self) -> usize {
        self.coins.read().len()
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    fn coinbase_script(&self) -> Option<Script> {
        if self.keypool_empty.load(Ordering::SeqCst) {
            None
        } else {
            Some(Script::new_p2pk(&test_pubkey(0x77)))
        }
    }

    fn pubkey_for_hash(&self, _key_hash: &[u8; 20]) -> Option<Vec<u8>> {
        Some(test_pubkey(0x42))
    }

    fn sign_input(
        &self,
        tx: &mut Transaction,
        index: usize,
        _script: &Script,
        _value: Amount,
    ) -> bool {
        let mut sig = Script::new();
        sig.push_data(&[0xAB; 71]);
        tx.inputs[index].script_sig = sig;
        true
    }

    fn sign_block(&self, block: &mut Block) -> bool {
        block.signature = vec![0xCD; 64];
        true
    }
}

/// Network fake with adjustable peer count and sync progress.
pub struct TestNetwork {
    pub peers: AtomicUsize,
    pub ibd: AtomicBool,
    pub progress: RwLock<f64>,
}

impl TestNetwork {
    pub fn online() -> Self {
        TestNetwork {
            peers: AtomicUsize::new(8),
            ibd: AtomicBool::new(false),
            progress: RwLock::new(1.0),
        }
    }
}

impl NetworkStatus for TestNetwork {
    fn peer_count(&self) -> usize {
        self.peers.load(Ordering::SeqCst)
    }

    fn is_initial_block_download(&self) -> bool {
        self.ibd.load(Ordering::SeqCst)
    }

    fn verification_progress(&self) -> f64 {
        *self.progress.read()
    }
}

/// Block processor fake that records everything it is handed.
#[derive(Default)]
pub struct CollectingProcessor {
    pub blocks: RwLock<Vec<Block>>,
}

impl CollectingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processed(&self) -> usize {
        self.blocks.read().len()
    }
}

impl BlockProcessor for CollectingProcessor {
    fn process_new_block(&self, block: &Block, _force_processing: bool) -> bool {
        self.blocks.write().push(block.clone());
        true
    }
}
