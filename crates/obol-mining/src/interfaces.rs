//! Contracts consumed from the wallet, network and validation layers.
//!
//! This core never implements these; it drives them. Implementations are
//! expected to be internally synchronized.

use obol_chain::BlockIndex;
use obol_types::{Amount, Block, OutPoint, Script, Transaction, TxOut};
use std::sync::Arc;

/// A wallet coin eligible for staking.
#[derive(Debug, Clone)]
pub struct StakeCoin {
    pub outpoint: OutPoint,
    pub output: TxOut,
}

/// Wallet operations the minter and coinstake builder need.
pub trait StakingWallet: Send + Sync {
    /// Spendable coins eligible for staking, in the wallet's own order;
    /// the first kernel hit wins.
    fn select_stake_coins(&self) -> Vec<StakeCoin>;

    /// Total spendable coin count, used to derive the minter pacing.
    fn available_coin_count(&self) -> usize;

    fn is_locked(&self) -> bool;

    /// Script for the coinbase output; `None` means the keypool is empty.
    fn coinbase_script(&self) -> Option<Script>;

    /// Public key for a key-hash destination the wallet owns.
    fn pubkey_for_hash(&self, key_hash: &[u8; 20]) -> Option<Vec<u8>>;

    /// Sign input `index` of `tx` against `script` with SIGHASH_ALL.
    fn sign_input(
        &self,
        tx: &mut Transaction,
        index: usize,
        script: &Script,
        value: Amount,
    ) -> bool;

    /// Sign a proof-of-stake block header with the staking key.
    fn sign_block(&self, block: &mut Block) -> bool;
}

/// Peer and sync state gates for the minter.
pub trait NetworkStatus: Send + Sync {
    fn peer_count(&self) -> usize;
    fn is_initial_block_download(&self) -> bool;
    /// Estimated verification progress in `[0, 1]`.
    fn verification_progress(&self) -> f64;
}

/// Hand-off of a freshly minted block to the node's validation pipeline.
/// Called outside any chain or mempool lock; the processor reacquires
/// them itself.
pub trait BlockProcessor: Send + Sync {
    fn process_new_block(&self, block: &Block, force_processing: bool) -> bool;
}

/// Final template gate: full block-validity test minus PoW and merkle
/// checks (the template's merkle root is refreshed by the extra-nonce
/// step afterwards).
pub trait TemplateValidity: Send + Sync {
    fn test_block_validity(&self, block: &Block, prev: &Arc<BlockIndex>) -> Result<(), String>;
}

/// Validity gate that accepts everything; for tests and bring-up.
pub struct AcceptAllValidity;

impl TemplateValidity for AcceptAllValidity {
    fn test_block_validity(&self, _block: &Block, _prev: &Arc<BlockIndex>) -> Result<(), String> {
        Ok(())
    }
}
