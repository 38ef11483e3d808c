//! Block assembly scenario tests.

use crate::generators::{child_tx, padded_tx, standalone_tx, test_pubkey};
use crate::harness::{StakeHarness, TestWallet};
use obol_chain::median_time_past;
use obol_mining::{
    AcceptAllValidity, AssemblerOptions, BlockAssembler, MiningError, MintingConfig,
};
use obol_types::{
    Hash256, Script, Transaction, MAX_BLOCK_SIGOPS_COST, OP_RETURN, WITNESS_COMMITMENT_HEADER,
};
use std::sync::Arc;

const BASE_TIME: u32 = 1_000_000;

fn assembler_for(harness: &StakeHarness, options: AssemblerOptions) -> BlockAssembler {
    BlockAssembler::new(
        Arc::clone(&harness.params),
        harness.chain.clone(),
        harness.utxo.clone(),
        Arc::clone(&harness.mempool),
        Arc::new(AcceptAllValidity),
        options,
        MintingConfig::default(),
    )
}

fn pow_script() -> Script {
    Script::new_p2pk(&test_pubkey(0x50))
}

/// Times after the tip so templates satisfy the median-time-past rule.
fn template_now(harness: &StakeHarness) -> i64 {
    harness.tip().time as i64 + 600
}

// ============================================================================
// Proof-of-work template shape
// ============================================================================

#[test]
fn test_pow_template_has_paying_coinbase() {
    let harness = StakeHarness::regtest(20, 32, BASE_TIME);
    let assembler = assembler_for(&harness, AssemblerOptions::default());
    let template = assembler
        .create_new_block(pow_script(), None, template_now(&harness))
        .unwrap();

    let block = &template.block;
    assert!(!block.is_proof_of_stake());
    assert!(block.txs[0].is_coinbase());
    assert!(block.txs[0].value_out() > 0);
    assert_eq!(block.header.prev_hash, harness.tip().hash);
    assert_eq!(
        block.header.merkle_root,
        obol_types::block_merkle_root(block)
    );
    // coinbase entry carries the negated fee total
    assert_eq!(template.entries[0].fee, -template.total_fees);
}

#[test]
fn test_witness_commitment_present_when_segwit_active() {
    let harness = StakeHarness::regtest(20, 32, BASE_TIME);
    let assembler = assembler_for(&harness, AssemblerOptions::default());
    let template = assembler
        .create_new_block(pow_script(), None, template_now(&harness))
        .unwrap();

    assert!(!template.coinbase_commitment.is_empty());
    assert_eq!(template.coinbase_commitment[0], OP_RETURN);
    assert_eq!(
        &template.coinbase_commitment[2..6],
        &WITNESS_COMMITMENT_HEADER
    );
    // the commitment rides on the last coinbase output
    let coinbase = &template.block.txs[0];
    assert_eq!(
        coinbase.outputs.last().unwrap().script_pubkey.as_bytes(),
        template.coinbase_commitment.as_slice()
    );
}

// ============================================================================
// Package selection
// ============================================================================

#[test]
fn test_selection_prefers_higher_feerate() {
    let harness = StakeHarness::regtest(20, 32, BASE_TIME);
    let low = standalone_tx(10_000);
    let high = standalone_tx(20_000);
    harness.mempool.add(Arc::clone(&low), 2_000, 4).unwrap();
    harness.mempool.add(Arc::clone(&high), 50_000, 4).unwrap();

    let assembler = assembler_for(&harness, AssemblerOptions::default());
    let template = assembler
        .create_new_block(pow_script(), None, template_now(&harness))
        .unwrap();

    let position = |txid| {
        template
            .block
            .txs
            .iter()
            .position(|tx| tx.txid() == txid)
            .expect("selected")
    };
    assert_eq!(template.mempool_tx_count(), 2);
    assert_eq!(template.total_fees, 52_000);
    // both made it; canonical ordering decides final placement
    position(low.txid());
    position(high.txid());
}

#[test]
fn test_package_fee_floor_stops_selection() {
    // a tx paying just under the floor must not be included
    let harness = StakeHarness::regtest(20, 32, BASE_TIME);
    let tx = padded_tx(250);
    let below_floor = tx.vsize() as i64 - 1;
    harness.mempool.add(Arc::clone(&tx), below_floor, 4).unwrap();

    let options = AssemblerOptions {
        min_fee_rate: 1_000, // 1 sat/vbyte
        ..Default::default()
    };
    let assembler = assembler_for(&harness, options);
    let template = assembler
        .create_new_block(pow_script(), None, template_now(&harness))
        .unwrap();

    assert_eq!(template.mempool_tx_count(), 0);
    assert_eq!(template.total_fees, 0);
}

#[test]
fn test_child_rides_with_parent_package() {
    let harness = StakeHarness::regtest(20, 32, BASE_TIME);
    // parent alone pays nothing; the child's package feerate carries both
    let parent = standalone_tx(100_000);
    let child = child_tx(&parent, 50_000);
    harness.mempool.add(Arc::clone(&parent), 0, 4).unwrap();
    harness.mempool.add(Arc::clone(&child), 60_000, 4).unwrap();

    let assembler = assembler_for(&harness, AssemblerOptions::default());
    let template = assembler
        .create_new_block(pow_script(), None, template_now(&harness))
        .unwrap();

    let txids: Vec<Hash256> = template.block.txs.iter().map(|tx| tx.txid()).collect();
    let parent_at = txids.iter().position(|t| *t == parent.txid()).unwrap();
    let child_at = txids.iter().position(|t| *t == child.txid()).unwrap();
    assert!(parent_at < child_at, "parent must precede its spender");
}

#[test]
fn test_weight_and_sigop_bounds_hold() {
    let harness = StakeHarness::regtest(20, 32, BASE_TIME);
    for _ in 0..60 {
        let tx = padded_tx(600);
        let fee = tx.vsize() as i64 * 3;
        harness.mempool.add(tx, fee, 8).unwrap();
    }

    // tight weight budget forces selection to stop early
    let options = AssemblerOptions {
        max_weight: 40_000,
        ..Default::default()
    };
    let assembler = assembler_for(&harness, options);
    let template = assembler
        .create_new_block(pow_script(), None, template_now(&harness))
        .unwrap();

    assert!(template.mempool_tx_count() > 0);
    assert!(template.mempool_tx_count() < 60);
    assert!(template.total_weight <= 40_000);
    assert!(template.total_sigops < MAX_BLOCK_SIGOPS_COST);
}

// ============================================================================
// Canonical ordering
// ============================================================================

#[test]
fn test_topology_beats_witness_hash_order() {
    let harness = StakeHarness::regtest(20, 32, BASE_TIME);

    // hunt for a parent/child pair where the child's wtxid sorts FIRST,
    // so witness-hash order alone would put it before its parent
    let mut pair = None;
    for value in 1_000..2_000 {
        let parent = standalone_tx(value);
        let child = child_tx(&parent, 100);
        if child.wtxid() < parent.wtxid() {
            pair = Some((parent, child));
            break;
        }
    }
    let (parent, child) = pair.expect("some pair collides within the range");

    harness.mempool.add(Arc::clone(&parent), 30_000, 4).unwrap();
    harness.mempool.add(Arc::clone(&child), 30_000, 4).unwrap();

    let assembler = assembler_for(&harness, AssemblerOptions::default());
    let template = assembler
        .create_new_block(pow_script(), None, template_now(&harness))
        .unwrap();

    let txids: Vec<Hash256> = template.block.txs.iter().map(|tx| tx.txid()).collect();
    let parent_at = txids.iter().position(|t| *t == parent.txid()).unwrap();
    let child_at = txids.iter().position(|t| *t == child.txid()).unwrap();
    assert!(
        parent_at < child_at,
        "topological order must override witness-hash order"
    );
}

#[test]
fn test_unrelated_transactions_sort_by_witness_hash() {
    let harness = StakeHarness::regtest(20, 32, BASE_TIME);
    let mut txs: Vec<Arc<Transaction>> = (0..5).map(|_| standalone_tx(5_000)).collect();
    for tx in &txs {
        harness.mempool.add(Arc::clone(tx), 10_000, 4).unwrap();
    }

    let assembler = assembler_for(&harness, AssemblerOptions::default());
    let template = assembler
        .create_new_block(pow_script(), None, template_now(&harness))
        .unwrap();

    txs.sort_by_key(|tx| tx.wtxid());
    let selected: Vec<Hash256> = template.block.txs[1..].iter().map(|tx| tx.wtxid()).collect();
    let expected: Vec<Hash256> = txs.iter().map(|tx| tx.wtxid()).collect();
    assert_eq!(selected, expected);
}

// ============================================================================
// Proof-of-stake path
// ============================================================================

#[test]
fn test_pos_template_requires_kernel() {
    // no stake coins: the attempt cancels instead of emitting a template
    let harness = StakeHarness::regtest(20, 32, BASE_TIME);
    let wallet = TestWallet::new(Vec::new());
    let assembler = assembler_for(&harness, AssemblerOptions::default());
    let result = assembler.create_new_block(
        Script::new(),
        Some(&wallet),
        template_now(&harness),
    );
    assert!(matches!(result, Err(MiningError::CoinstakeCancelled)));
}

#[test]
fn test_pos_template_shape_and_timestamps() {
    let harness = StakeHarness::regtest(240, 32, BASE_TIME);
    // big enough that ~2 hours of coin age still earns a positive reward
    let coin = harness.fund_stake(
        5,
        2_000_000 * obol_types::COIN,
        Script::new_p2pk(&test_pubkey(9)),
    );
    let wallet = TestWallet::new(vec![coin]);
    let assembler = assembler_for(&harness, AssemblerOptions::default());

    let prev = harness.tip();
    let now = prev.time as i64 + 120;
    let template = assembler
        .create_new_block(Script::new(), Some(&wallet), now)
        .unwrap();
    let block = &template.block;

    assert!(block.is_proof_of_stake());
    // the coinbase output collapses to the empty marker
    assert!(block.txs[0].is_coinbase());
    assert_eq!(block.txs[0].outputs[0].value, 0);
    // coinstake timestamp protocol
    let coinstake = &block.txs[1];
    assert_eq!(block.header.time, coinstake.n_time);
    assert_eq!(
        block.header.time & harness.params.stake_timestamp_mask,
        0
    );
    assert!((block.header.time as i64) > median_time_past(&prev));
}
