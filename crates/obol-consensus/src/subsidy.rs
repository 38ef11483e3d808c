//! Block rewards and the treasury schedule.

use crate::params::ConsensusParams;
use obol_chain::BlockIndex;
use obol_types::{Amount, Script, CENT, COIN};
use std::sync::Arc;
use tracing::trace;

/// Base proof-of-work subsidy at `height`, before the treasury split.
fn base_subsidy(params: &ConsensusParams, height: u32) -> Amount {
    let halvings = height / params.subsidy_halving_interval;
    if halvings >= 64 {
        return 0;
    }
    (50 * COIN) >> halvings
}

/// Block subsidy.
///
/// Proof-of-work blocks earn the halving-schedule subsidy. Proof-of-stake
/// blocks earn interest on the coin age their kernel consumed: one cent
/// per coin-year, computed in coin-days.
pub fn block_subsidy(
    params: &ConsensusParams,
    height: u32,
    proof_of_stake: bool,
    coin_age: u64,
) -> Amount {
    if proof_of_stake {
        let reward = (coin_age as i128 * 33 / (365 * 33 + 8)) as Amount * CENT;
        trace!(height, coin_age, reward, "stake reward");
        reward
    } else {
        base_subsidy(params, height)
    }
}

/// Treasury payment due at `height`: zero except at cycle boundaries,
/// where one cycle's worth of the treasury share falls due at once.
pub fn treasury_payment(params: &ConsensusParams, height: u32) -> Amount {
    if height < params.treasury_start_height || params.treasury_payees.is_empty() {
        return 0;
    }
    if (height - params.treasury_start_height) % params.treasury_cycle_blocks != 0 {
        return 0;
    }
    let per_block = base_subsidy(params, height) * params.treasury_total_percent as Amount / 100;
    per_block * params.treasury_cycle_blocks as Amount
}

/// Treasury outputs due at `height`, in payee-table order. Each payee
/// receives `floor(payment x percent / 100)`; rounding dust stays with
/// the block producer.
pub fn treasury_payouts(params: &ConsensusParams, height: u32) -> Vec<(Script, Amount)> {
    let payment = treasury_payment(params, height);
    if payment <= 0 {
        return Vec::new();
    }
    params
        .treasury_payees
        .iter()
        .map(|payee| (payee.script.clone(), payment * payee.percent as Amount / 100))
        .collect()
}

/// Rolling version vote: whether at least `required` of the last
/// `to_check` proof-of-stake blocks before `start` carry `min_version`.
pub fn is_super_majority(
    min_version: i32,
    start: Option<&Arc<BlockIndex>>,
    required: u32,
    to_check: u32,
) -> bool {
    let mut found = 0u32;
    let mut checked = 0u32;
    let mut cursor = start.cloned();
    while let Some(entry) = cursor {
        if checked >= to_check || found >= required {
            break;
        }
        if entry.is_proof_of_stake() {
            if entry.version >= min_version {
                found += 1;
            }
            checked += 1;
        }
        cursor = entry.prev.clone();
    }
    found >= required
}
