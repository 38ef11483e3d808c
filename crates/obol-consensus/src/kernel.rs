//! Stake kernel hash protocol.
//!
//! The kernel (input 0 of a coinstake) must satisfy
//! `proofHash <= target x weight` where the proof hash commits to the
//! stake modifier, the origin block time, the outpoint, and the kernel
//! timestamp. Block and transaction hashes are deliberately absent from
//! the commitment: they can be ground in bulk, which would degrade the
//! scheme back into proof-of-work.

use crate::error::{ConsensusError, ConsensusResult};
use crate::modifier::kernel_stake_modifier;
use crate::params::ConsensusParams;
use num_bigint::BigUint;
use num_traits::Zero;
use obol_chain::{BlockIndex, ChainView};
use obol_types::{compact_to_target, sha256d, Algo, Hash256, OutPoint, TxOut};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Pre-upgrade networks with this genesis admit any historic proof hash.
const LEGACY_BYPASS_GENESIS: &str =
    "f4bbfc518aa3622dbeb8d2818a606b82c2b8b1ac2f28553ebdb6fc04d7abaccf";

/// The kernel proof hash.
///
/// `sha256d(modifier ‖ blockFromTime ‖ prevout.n ‖ prevout.hash ‖ txTime)`,
/// all integers little-endian.
pub fn stake_proof_hash(
    modifier: u64,
    block_from_time: u32,
    outpoint: &OutPoint,
    tx_time: u32,
) -> Hash256 {
    let mut data = Vec::with_capacity(52);
    data.extend_from_slice(&modifier.to_le_bytes());
    data.extend_from_slice(&block_from_time.to_le_bytes());
    data.extend_from_slice(&outpoint.vout.to_le_bytes());
    data.extend_from_slice(outpoint.txid.as_bytes());
    data.extend_from_slice(&tx_time.to_le_bytes());
    sha256d(&data)
}

/// Coinstake timestamp protocol: the transaction carries the block time.
pub fn check_coinstake_timestamp(block_time: i64, tx_time: i64) -> bool {
    block_time == tx_time
}

fn stake_target_hit(proof: &Hash256, value: i64, target: &BigUint, new_weight: bool) -> bool {
    // weight equals the staked value; the legacy protocol used a
    // hundredth of it (coin-day scaling)
    let weight = if new_weight { value } else { value / 100 };
    if weight <= 0 {
        return false;
    }
    proof.to_biguint() <= target * BigUint::from(weight as u64)
}

/// A candidate kernel bound to its chain context.
pub struct KernelContext<'a> {
    pub params: &'a ConsensusParams,
    pub chain: &'a dyn ChainView,
    /// Tip the prospective block builds on.
    pub prev: &'a Arc<BlockIndex>,
    /// Block containing the staked output.
    pub block_from: &'a Arc<BlockIndex>,
    /// The staked output itself.
    pub stake_out: &'a TxOut,
    /// Outpoint of the staked output.
    pub outpoint: OutPoint,
}

impl<'a> KernelContext<'a> {
    fn height_current(&self) -> u32 {
        self.prev.height + 1
    }

    /// Shared precondition screen: timestamp ordering, minimum age,
    /// minimum depth.
    fn check_preconditions(&self, tx_time: u32) -> ConsensusResult<()> {
        let block_from_time = self.block_from.time;
        if tx_time < block_from_time {
            return Err(ConsensusError::TimestampViolation {
                tx_time,
                block_from_time,
            });
        }
        let height = self.height_current();
        let min_age = self.params.stake_min_age(height);
        if block_from_time as i64 + min_age > tx_time as i64 {
            return Err(ConsensusError::MinAgeViolation {
                block_from_time,
                min_age,
                tx_time,
            });
        }
        let depth = height - self.block_from.height;
        let min_depth = self.params.stake_min_depth(height);
        if depth < min_depth {
            return Err(ConsensusError::MinDepthViolation { depth, min_depth });
        }
        Ok(())
    }

    /// Decode and range-check the compact target.
    fn decode_target(&self, bits: u32) -> ConsensusResult<BigUint> {
        let (target, negative, overflow) = compact_to_target(bits);
        if negative || overflow || target.is_zero() || &target > self.params.pow_limit(Algo::Pos) {
            return Err(ConsensusError::TargetOutOfRange { bits });
        }
        Ok(target)
    }

    /// Modifier lookup with walk failures downgraded to a miss, matching
    /// the protocol: a node behind on the chain cannot distinguish a bad
    /// kernel from an unanswerable one.
    fn modifier_or_miss(&self, tx_time: u32) -> ConsensusResult<Option<u64>> {
        match kernel_stake_modifier(
            self.params,
            self.chain,
            self.prev,
            self.block_from,
            tx_time,
        ) {
            Ok(found) => {
                trace!(
                    modifier = format_args!("{:016x}", found.modifier),
                    modifier_height = found.height,
                    from_height = self.block_from.height,
                    "kernel modifier"
                );
                Ok(Some(found.modifier))
            }
            Err(
                err @ (ConsensusError::BestTipTooOld { .. }
                | ConsensusError::BestBlockReached { .. }
                | ConsensusError::StakeModifierUnavailable),
            ) => {
                warn!(error = %err, "failed to get kernel stake modifier");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Evaluate a finished candidate at `tx_time`.
    ///
    /// Returns the hit/miss verdict with the proof hash. Precondition
    /// violations and out-of-range targets are errors; a failed modifier
    /// walk is a miss.
    pub fn check(&self, bits: u32, tx_time: u32) -> ConsensusResult<(bool, Hash256)> {
        self.check_preconditions(tx_time)?;
        let target = self.decode_target(bits)?;
        let Some(modifier) = self.modifier_or_miss(tx_time)? else {
            return Ok((false, Hash256::ZERO));
        };

        let proof = stake_proof_hash(modifier, self.block_from.time, &self.outpoint, tx_time);
        let height = self.height_current();
        let new_weight = self.params.is_kernel_v05(height);
        let mut hit = stake_target_hit(&proof, self.stake_out.value, &target, new_weight);
        if !hit
            && height < self.params.mandatory_upgrade_block[0]
            && self.params.genesis_hash
                == Hash256::from_str(LEGACY_BYPASS_GENESIS).expect("valid hash")
        {
            // Historic blocks from old wallets predate the kernel checks.
            hit = true;
        }
        debug!(
            protocol = if new_weight { "0.5" } else { "0.3" },
            modifier = format_args!("{:016x}", modifier),
            block_from_time = self.block_from.time,
            prevout = %self.outpoint.txid,
            n = self.outpoint.vout,
            tx_time,
            proof = %proof,
            hit,
            "kernel check"
        );
        Ok((hit, proof))
    }

    /// Grind `tx_time` upward across `[base, base + drift]` in
    /// timestamp-slot steps; the first hit is the lowest passing slot.
    ///
    /// Returns `None` on exhaustion, and aborts early (also `None`) when
    /// the active chain tip moves mid-search.
    pub fn search(
        &self,
        bits: u32,
        tx_time_base: u32,
        drift: u32,
    ) -> ConsensusResult<Option<(u32, Hash256)>> {
        self.check_preconditions(tx_time_base)?;
        let target = self.decode_target(bits)?;
        let mask = self.params.stake_timestamp_mask;
        if drift & mask != 0 {
            return Err(ConsensusError::MisalignedDrift { drift, mask });
        }
        let Some(modifier) = self.modifier_or_miss(tx_time_base)? else {
            return Ok(None);
        };

        let height = self.height_current();
        let new_weight = self.params.is_kernel_v05(height);
        let step = if new_weight { mask + 1 } else { 1 };
        let start_height = self.prev.height;

        let mut offset = 0u32;
        while offset <= drift {
            if self.chain.height() != Some(start_height) {
                trace!("tip moved during kernel search, aborting");
                return Ok(None);
            }
            let try_time = tx_time_base + offset;
            let proof = stake_proof_hash(modifier, self.block_from.time, &self.outpoint, try_time);
            if stake_target_hit(&proof, self.stake_out.value, &target, new_weight) {
                debug!(
                    tx_time = try_time,
                    proof = %proof,
                    "kernel search hit"
                );
                return Ok(Some((try_time, proof)));
            }
            offset += step;
        }
        Ok(None)
    }
}
