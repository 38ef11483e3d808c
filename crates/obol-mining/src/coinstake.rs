//! Coinstake construction.

use crate::error::{MiningError, MiningResult};
use crate::interfaces::{StakeCoin, StakingWallet};
use obol_chain::{coin_age, BlockIndex, ChainView, UtxoView};
use obol_consensus::{block_subsidy, treasury_payouts, ConsensusParams, KernelContext};
use obol_types::{BlockHeader, Script, ScriptType, Transaction, TxIn, TxOut};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of evaluating one candidate coin.
enum CoinVerdict {
    /// Kernel found, coinstake built and signed.
    Built(Transaction),
    /// This coin is unusable; try the next one.
    Skip,
    /// The whole attempt is pointless (non-positive reward, broken coin
    /// age); cancel and retry after pacing.
    Abort,
}

/// Builds and signs the coinstake transaction for one mint attempt.
///
/// Candidate coins are tried in wallet order; the first kernel hit wins.
/// `create` mutates the block header time to the next timestamp slot
/// before searching, so on success the header already satisfies the
/// coinstake timestamp protocol.
pub struct CoinstakeBuilder<'a> {
    pub params: &'a ConsensusParams,
    pub chain: &'a dyn ChainView,
    pub utxo: &'a dyn UtxoView,
    pub wallet: &'a dyn StakingWallet,
}

impl<'a> CoinstakeBuilder<'a> {
    /// Attempt a coinstake on top of `prev` for the block carried by
    /// `header`.
    ///
    /// `Ok(None)` means no kernel this round (or the tip moved, or the
    /// reward came out non-positive): the caller cancels this template
    /// and retries after pacing. Errors are reserved for signing failure.
    pub fn create(
        &self,
        header: &mut BlockHeader,
        prev: &Arc<BlockIndex>,
        height: u32,
    ) -> MiningResult<Option<Transaction>> {
        let coins = self.wallet.select_stake_coins();
        if coins.is_empty() {
            debug!("no stake-eligible coins");
            return Ok(None);
        }

        // Quantize the block time up to the next timestamp slot.
        let mask = self.params.stake_timestamp_mask;
        while header.time & mask != 0 {
            header.time += 1;
        }

        let min_age = self.params.stake_min_age(height);
        let min_depth = self.params.stake_min_depth(height);
        for candidate in &coins {
            if self.chain.height() != Some(prev.height) {
                debug!("tip moved, abandoning coinstake attempt");
                return Ok(None);
            }
            match self.try_coin(candidate, header, prev, height, min_age, min_depth)? {
                CoinVerdict::Built(tx) => return Ok(Some(tx)),
                CoinVerdict::Skip => continue,
                CoinVerdict::Abort => return Ok(None),
            }
        }
        Ok(None)
    }

    /// Evaluate one candidate coin.
    fn try_coin(
        &self,
        candidate: &StakeCoin,
        header: &BlockHeader,
        prev: &Arc<BlockIndex>,
        height: u32,
        min_age: i64,
        min_depth: u32,
    ) -> MiningResult<CoinVerdict> {
        // Re-read from the UTXO view: the wallet list may be stale.
        let Some(coin) = self.utxo.coin(&candidate.outpoint) else {
            warn!(outpoint = ?candidate.outpoint, "stake input missing from UTXO set");
            return Ok(CoinVerdict::Skip);
        };
        let Some(block_from) = self.chain.at_height(coin.height) else {
            warn!(height = coin.height, "origin block not on active chain");
            return Ok(CoinVerdict::Skip);
        };
        if block_from.time as i64 + min_age > header.time as i64
            || height - block_from.height < min_depth
        {
            return Ok(CoinVerdict::Skip);
        }

        let context = KernelContext {
            params: self.params,
            chain: self.chain,
            prev,
            block_from: &block_from,
            stake_out: &coin.output,
            outpoint: candidate.outpoint,
        };
        let hit = match context.check(header.bits, header.time) {
            Ok((hit, _proof)) => hit,
            Err(err) => {
                // precondition or target trouble for this coin only
                warn!(error = %err, outpoint = ?candidate.outpoint, "kernel check rejected coin");
                return Ok(CoinVerdict::Skip);
            }
        };
        if !hit {
            return Ok(CoinVerdict::Skip);
        }
        debug!(outpoint = ?candidate.outpoint, "kernel found");

        let kernel_script = coin.output.script_pubkey.clone();
        let Some(output_script) = self.output_script_for(&kernel_script) else {
            return Ok(CoinVerdict::Skip);
        };

        let mut coinstake = Transaction::new(header.time);
        coinstake
            .inputs
            .push(TxIn::new(candidate.outpoint));
        coinstake.outputs.push(TxOut::empty());

        let Some(age) = coin_age(
            &coinstake,
            self.utxo,
            header.time,
            self.params.stake_max_age(height),
        ) else {
            warn!("failed to calculate coin age");
            return Ok(CoinVerdict::Abort);
        };
        let reward = block_subsidy(self.params, height, true, age);
        if reward <= 0 {
            debug!(coin_age = age, "refusing mint with zero or negative reward");
            return Ok(CoinVerdict::Abort);
        }
        let credit = coin.output.value + reward;
        coinstake.outputs.push(TxOut::new(credit, output_script));

        for (script, value) in treasury_payouts(self.params, height) {
            coinstake.outputs.push(TxOut::new(value, script));
        }

        if !self
            .wallet
            .sign_input(&mut coinstake, 0, &kernel_script, coin.output.value)
        {
            return Err(MiningError::SignatureFailure);
        }
        info!(
            height,
            credit,
            reward,
            coin_age = age,
            "coinstake created"
        );
        Ok(CoinVerdict::Built(coinstake))
    }

    /// Destination for the staked credit. P2PK kernels pay back to the
    /// same script; key-hash kernels are rewritten to pay-to-pubkey for
    /// the same owner; anything else is unsupported.
    fn output_script_for(&self, kernel_script: &Script) -> Option<Script> {
        let (script_type, solutions) = kernel_script.solver();
        match script_type {
            ScriptType::PubKey => Some(kernel_script.clone()),
            ScriptType::PubKeyHash | ScriptType::WitnessV0KeyHash => {
                let hash: [u8; 20] = solutions.first()?.as_slice().try_into().ok()?;
                match self.wallet.pubkey_for_hash(&hash) {
                    Some(pubkey) => Some(Script::new_p2pk(&pubkey)),
                    None => {
                        debug!("no key for kernel key-hash");
                        None
                    }
                }
            }
            _ => {
                debug!(?script_type, "unsupported kernel script type");
                None
            }
        }
    }
}
