//! Kernel protocol scenario tests.

use crate::generators::test_pubkey;
use crate::harness::StakeHarness;
use obol_chain::ChainView;
use obol_consensus::{ConsensusError, KernelContext};
use obol_types::{Script, COIN};

const BASE_TIME: u32 = 1_000_000;

/// Harness with a kernel origin comfortably older than min-age while the
/// tip stays fresh enough for the V0.5 modifier guard.
fn staking_harness() -> StakeHarness {
    // 240 blocks x 32 s ~ 2 hours of history on regtest (1 h min age)
    StakeHarness::regtest(240, 32, BASE_TIME)
}

#[test]
fn test_min_age_boundary_is_exact() {
    let harness = staking_harness();
    let coin = harness.fund_stake(5, 900 * COIN, Script::new_p2pk(&test_pubkey(1)));
    let tip = harness.tip();
    let block_from = harness.chain.at_height(5).unwrap();
    let context = KernelContext {
        params: &harness.params,
        chain: &*harness.chain,
        prev: &tip,
        block_from: &block_from,
        stake_out: &coin.output,
        outpoint: coin.outpoint,
    };
    let bits = tip.bits;
    let min_age = harness.params.stake_min_age(tip.height + 1) as u32;

    // one second shy of min-age: precondition violation
    assert!(matches!(
        context.check(bits, block_from.time + min_age - 1),
        Err(ConsensusError::MinAgeViolation { .. })
    ));

    // exactly min-age (and min-depth satisfied): hashing proceeds
    let (hit, proof) = context.check(bits, block_from.time + min_age).unwrap();
    assert!(hit, "regtest limit target accepts any kernel");
    assert!(!proof.is_zero());
}

#[test]
fn test_search_returns_slot_at_or_below_passing_time() {
    let harness = staking_harness();
    let coin = harness.fund_stake(5, 900 * COIN, Script::new_p2pk(&test_pubkey(2)));
    let tip = harness.tip();
    let block_from = harness.chain.at_height(5).unwrap();
    let context = KernelContext {
        params: &harness.params,
        chain: &*harness.chain,
        prev: &tip,
        block_from: &block_from,
        stake_out: &coin.output,
        outpoint: coin.outpoint,
    };
    let bits = tip.bits;
    let slot = harness.params.stake_timestamp_mask + 1;
    let base = block_from.time + harness.params.stake_min_age(tip.height + 1) as u32;

    // pick a time known to pass, then search a window containing it
    let (hit, _) = context.check(bits, base + 2 * slot).unwrap();
    assert!(hit);
    let (found, proof) = context
        .search(bits, base, 4 * slot)
        .unwrap()
        .expect("window contains a passing slot");
    assert!(found <= base + 2 * slot);
    let (check_hit, check_proof) = context.check(bits, found).unwrap();
    assert!(check_hit);
    assert_eq!(proof, check_proof);
}

#[test]
fn test_search_aborts_on_tip_advance() {
    let harness = staking_harness();
    let coin = harness.fund_stake(5, 900 * COIN, Script::new_p2pk(&test_pubkey(3)));
    let tip = harness.tip();
    let block_from = harness.chain.at_height(5).unwrap();
    let base = block_from.time + harness.params.stake_min_age(tip.height + 1) as u32;

    // the tip advances before the grind starts consuming slots
    harness.add_block(tip.time + 32);

    let context = KernelContext {
        params: &harness.params,
        chain: &*harness.chain,
        prev: &tip,
        block_from: &block_from,
        stake_out: &coin.output,
        outpoint: coin.outpoint,
    };
    let found = context
        .search(tip.bits, base, 16 * (harness.params.stake_timestamp_mask + 1))
        .unwrap();
    assert!(found.is_none(), "grind must abort once the height changes");
}

#[test]
fn test_timestamp_before_origin_block_rejected() {
    let harness = staking_harness();
    let coin = harness.fund_stake(100, 900 * COIN, Script::new_p2pk(&test_pubkey(4)));
    let tip = harness.tip();
    let block_from = harness.chain.at_height(100).unwrap();
    let context = KernelContext {
        params: &harness.params,
        chain: &*harness.chain,
        prev: &tip,
        block_from: &block_from,
        stake_out: &coin.output,
        outpoint: coin.outpoint,
    };
    assert!(matches!(
        context.check(tip.bits, block_from.time - 1),
        Err(ConsensusError::TimestampViolation { .. })
    ));
}
