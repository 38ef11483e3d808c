//! The stake minter worker.
//!
//! A single cooperative task that waits for the node to be ready (wallet
//! unlocked, peers present, chain synced), builds a proof-of-stake
//! template, signs it, and hands it to the block processor. All waits go
//! through the interrupt token so shutdown unwinds the worker from any
//! sleep.

use crate::assembler::BlockAssembler;
use crate::config::MintingConfig;
use crate::error::MiningError;
use crate::interfaces::{BlockProcessor, NetworkStatus, StakingWallet};
use crate::MIN_SYNC_PROGRESS;
use obol_chain::ChainView;
use obol_consensus::ConsensusParams;
use obol_types::{format_amount, Block, Hash256, Script};
use parking_lot::RwLock;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MSG_LOCKED: &str = "Minting suspended due to locked wallet.";
const MSG_SYNCING: &str = "Minting suspended while synchronizing.";
const MSG_DISABLED: &str = "Minting disabled by configuration.";
const MSG_KEYPOOL: &str = "Minting suspended due to block creation failure.";

/// Cooperative cancellation handle shared between the node and the
/// minter. Sleeps return `false` when interrupted.
#[derive(Clone, Default)]
pub struct InterruptToken(CancellationToken);

impl InterruptToken {
    pub fn new() -> Self {
        InterruptToken(CancellationToken::new())
    }

    pub fn interrupt(&self) {
        self.0.cancel();
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Sleep for `duration`; `false` means the token fired first.
    pub async fn sleep_for(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.0.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

/// How a minter run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinterOutcome {
    /// Minting was off in the configuration; the worker never started.
    Disabled,
    /// The interrupt token fired; clean shutdown.
    Interrupted,
    /// The wallet keypool is exhausted; operator action required.
    FatalKeypool,
}

/// The stake minter.
///
/// Owns the coinstake search watermarks and the extra-nonce state that a
/// per-process implementation would keep in globals.
pub struct Minter {
    config: MintingConfig,
    params: Arc<ConsensusParams>,
    chain: Arc<dyn ChainView>,
    wallet: Arc<dyn StakingWallet>,
    network: Arc<dyn NetworkStatus>,
    processor: Arc<dyn BlockProcessor>,
    assembler: Arc<BlockAssembler>,
    interrupt: InterruptToken,
    /// User-visible status line.
    status: RwLock<String>,
    // search watermarks, telemetry only
    last_search_time: i64,
    last_search_interval: i64,
    // extra nonce state for the coinbase script
    extra_nonce: u32,
    extra_nonce_prev: Hash256,
}

impl Minter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: MintingConfig,
        params: Arc<ConsensusParams>,
        chain: Arc<dyn ChainView>,
        wallet: Arc<dyn StakingWallet>,
        network: Arc<dyn NetworkStatus>,
        processor: Arc<dyn BlockProcessor>,
        assembler: Arc<BlockAssembler>,
        interrupt: InterruptToken,
    ) -> Self {
        Minter {
            config,
            params,
            chain,
            wallet,
            network,
            processor,
            assembler,
            interrupt,
            status: RwLock::new(String::new()),
            last_search_time: 0,
            last_search_interval: 0,
            extra_nonce: 0,
            extra_nonce_prev: Hash256::ZERO,
        }
    }

    /// Current user-visible status string.
    pub fn status(&self) -> String {
        self.status.read().clone()
    }

    fn set_status(&self, message: &str) {
        let mut status = self.status.write();
        if *status != message {
            *status = message.to_string();
        }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    /// Pacing between mint attempts: the configured base plus
    /// `30 x sqrt(utxo count)` milliseconds.
    fn pos_timeout(&self) -> Duration {
        let utxos = self.wallet.available_coin_count();
        let ms = self.config.stake_timeout_ms + 30 * (utxos as f64).sqrt() as u64;
        Duration::from_millis(ms)
    }

    /// Refresh the coinbase script signature with the next extra nonce and
    /// rebuild the merkle root. The nonce restarts whenever the parent
    /// changes.
    fn increment_extra_nonce(&mut self, block: &mut Block, height: u32) {
        if self.extra_nonce_prev != block.header.prev_hash {
            self.extra_nonce = 0;
            self.extra_nonce_prev = block.header.prev_hash;
        }
        self.extra_nonce += 1;

        let mut coinbase = (*block.txs[0]).clone();
        let mut script_sig = Script::new();
        script_sig.push_num(height as i64);
        script_sig.push_num(self.extra_nonce as i64);
        coinbase.inputs[0].script_sig = script_sig;
        debug_assert!(coinbase.inputs[0].script_sig.len() <= 100);
        block.txs[0] = Arc::new(coinbase);
        block.header.merkle_root = obol_types::block_merkle_root(block);
    }

    /// Submit a minted block, reporting a stale tip instead of processing.
    fn process_found_block(&self, block: &Block) -> bool {
        let reward = if block.is_proof_of_stake() {
            block.txs[1].value_out()
        } else {
            block.txs[0].value_out()
        };
        info!(
            hash = %block.hash(),
            generated = %format_amount(reward),
            "proof-of-stake block found"
        );
        let tip = self.chain.tip();
        if tip.map_or(true, |tip| tip.hash != block.header.prev_hash) {
            warn!("generated block is stale");
            return false;
        }
        if !self.processor.process_new_block(block, true) {
            warn!("block not accepted by processor");
            return false;
        }
        true
    }

    /// Run the minter until interrupted.
    pub async fn run(mut self) -> MinterOutcome {
        if !self.config.minting || !self.config.staking {
            self.set_status(MSG_DISABLED);
            info!("proof-of-stake minter disabled");
            return MinterOutcome::Disabled;
        }
        let pacing = self.pos_timeout();
        info!(
            timeout_ms = pacing.as_millis() as u64,
            utxos = self.wallet.available_coin_count(),
            "stake minter started"
        );

        loop {
            // readiness gates
            while self.wallet.is_locked() {
                self.set_status(MSG_LOCKED);
                if !self.interrupt.sleep_for(Duration::from_secs(3)).await {
                    return MinterOutcome::Interrupted;
                }
            }
            if !self.params.is_regtest() {
                while self.network.peer_count() == 0 || self.network.is_initial_block_download() {
                    if !self.interrupt.sleep_for(Duration::from_secs(10)).await {
                        return MinterOutcome::Interrupted;
                    }
                }
                while self.network.verification_progress() < MIN_SYNC_PROGRESS {
                    debug!(
                        progress = self.network.verification_progress(),
                        "minter sleeping during sync"
                    );
                    self.set_status(MSG_SYNCING);
                    if !self.interrupt.sleep_for(Duration::from_secs(10)).await {
                        return MinterOutcome::Interrupted;
                    }
                }
            }
            self.set_status("");

            // one mint attempt per pass, paced below
            let Some(coinbase_script) = self.wallet.coinbase_script() else {
                self.set_status(MSG_KEYPOOL);
                error!("keypool ran out, please refill before restarting the minter");
                let _ = self.interrupt.sleep_for(Duration::from_secs(10)).await;
                return MinterOutcome::FatalKeypool;
            };
            let Some(prev) = self.chain.tip() else {
                if !self.interrupt.sleep_for(pacing).await {
                    return MinterOutcome::Interrupted;
                }
                continue;
            };

            let search_time = Self::now();
            if search_time <= self.last_search_time {
                if !self.interrupt.sleep_for(pacing).await {
                    return MinterOutcome::Interrupted;
                }
                continue;
            }
            self.last_search_interval = search_time - self.last_search_time;
            self.last_search_time = search_time;

            let template = self.assembler.create_new_block(
                coinbase_script,
                Some(&*self.wallet),
                search_time,
            );
            let mut block = match template {
                Ok(template) => template.block,
                Err(MiningError::CoinstakeCancelled) => {
                    if !self.interrupt.sleep_for(pacing).await {
                        return MinterOutcome::Interrupted;
                    }
                    continue;
                }
                Err(err) => {
                    // block-validity failures land here: log and retry
                    // after pacing, the next tip usually clears them
                    error!(error = %err, "block creation failed");
                    if !self.interrupt.sleep_for(pacing).await {
                        return MinterOutcome::Interrupted;
                    }
                    continue;
                }
            };

            self.increment_extra_nonce(&mut block, prev.height + 1);
            if self.config.print_stake_modifier {
                info!(
                    modifier = format_args!("{:016x}", prev.stake_modifier),
                    height = prev.height,
                    "stake modifier in effect at mint"
                );
            }

            if block.is_proof_of_stake() {
                if !self.wallet.sign_block(&mut block) {
                    warn!("failed to sign proof-of-stake block");
                    if !self.interrupt.sleep_for(pacing).await {
                        return MinterOutcome::Interrupted;
                    }
                    continue;
                }
                self.process_found_block(&block);
                // rest after a successful mint; nearby slots are spent
                let rest = Duration::from_secs(60 + rand::thread_rng().gen_range(0..4));
                if !self.interrupt.sleep_for(rest).await {
                    return MinterOutcome::Interrupted;
                }
            }

            if !self.interrupt.sleep_for(pacing).await {
                return MinterOutcome::Interrupted;
            }
        }
    }
}
