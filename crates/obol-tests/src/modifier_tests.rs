//! Stake modifier scenario tests.

use crate::generators::seeded_id;
use obol_chain::{BlockIndex, FLAG_GENERATED_MODIFIER, FLAG_PROOF_OF_STAKE, FLAG_STAKE_ENTROPY};
use obol_consensus::{
    compute_next_stake_modifier, stake_entropy_bit, stake_modifier_checksum, ConsensusParams,
    STAKE_MODIFIER_SENTINEL,
};
use obol_types::{Block, BlockHeader, Hash256};
use std::sync::Arc;

fn mainnet_entry(
    params: &ConsensusParams,
    height: u32,
    time: u32,
    prev: Option<Arc<BlockIndex>>,
) -> Arc<BlockIndex> {
    let (modifier, generated) =
        compute_next_stake_modifier(params, prev.as_ref()).expect("computable");
    let hash = seeded_id(0xA000 + u64::from(height));
    let mut flags = FLAG_PROOF_OF_STAKE;
    if hash.low_bit() == 1 {
        flags |= FLAG_STAKE_ENTROPY;
    }
    if generated {
        flags |= FLAG_GENERATED_MODIFIER;
    }
    Arc::new(BlockIndex::new(
        hash, height, 1, time, 0x1e0f_ffff, prev, modifier, 0, Hash256::ZERO, flags,
    ))
}

fn mainnet_chain(times: &[u32]) -> (ConsensusParams, Arc<BlockIndex>) {
    let params = ConsensusParams::mainnet();
    let mut prev: Option<Arc<BlockIndex>> = None;
    for (height, &time) in times.iter().enumerate() {
        prev = Some(mainnet_entry(&params, height as u32, time, prev.clone()));
    }
    (params, prev.expect("non-empty"))
}

// ============================================================================
// Genesis and first-block modifiers
// ============================================================================

#[test]
fn test_genesis_modifier_is_zero_and_generated() {
    let params = ConsensusParams::mainnet();
    let (modifier, generated) = compute_next_stake_modifier(&params, None).unwrap();
    assert_eq!(modifier, 0);
    assert!(generated);
}

#[test]
fn test_first_block_gets_sentinel_modifier() {
    let (_, genesis) = mainnet_chain(&[1_000_000]);
    let params = ConsensusParams::mainnet();
    let (modifier, generated) = compute_next_stake_modifier(&params, Some(&genesis)).unwrap();
    assert_eq!(modifier, STAKE_MODIFIER_SENTINEL);
    assert!(generated);
}

// ============================================================================
// Modifier interval stability
// ============================================================================

#[test]
fn test_same_interval_inherits_modifier() {
    // two consecutive blocks inside one 60 s window: the second inherits
    let (params, tip) = mainnet_chain(&[1_000_000, 1_000_020, 1_000_030]);
    assert!(!tip.generated_stake_modifier());
    assert_eq!(
        tip.stake_modifier,
        tip.prev.as_ref().unwrap().stake_modifier
    );

    let (modifier, generated) = compute_next_stake_modifier(&params, Some(&tip)).unwrap();
    // the tip's window still has not rolled over
    assert_eq!(modifier, tip.stake_modifier);
    assert!(!generated);
}

#[test]
fn test_new_interval_regenerates_modifier() {
    let times: Vec<u32> = (0..80).map(|i| 1_000_000 + i * 80).collect();
    let (params, tip) = mainnet_chain(&times);
    let (_, generated) = compute_next_stake_modifier(&params, Some(&tip)).unwrap();
    assert!(generated, "80 s spacing crosses a 60 s window every block");
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_modifier_identical_on_recomputation() {
    let times: Vec<u32> = (0..100).map(|i| 1_000_000 + i * 80).collect();
    let (params, tip) = mainnet_chain(&times);
    let first = compute_next_stake_modifier(&params, Some(&tip)).unwrap();
    for _ in 0..5 {
        // shuffle RNG differs per call; results may not
        assert_eq!(compute_next_stake_modifier(&params, Some(&tip)).unwrap(), first);
    }
}

// ============================================================================
// Entropy bits
// ============================================================================

#[test]
fn test_entropy_bit_follows_block_hash_on_new_versions() {
    let params = ConsensusParams::mainnet();
    let mut block = Block {
        header: BlockHeader {
            version: params.upgrade_block_version[1],
            ..BlockHeader::default()
        },
        txs: Vec::new(),
        signature: vec![1, 2, 3],
    };
    assert_eq!(stake_entropy_bit(&params, &block), block.hash().low_bit());

    // old versions sample the signature hash instead; flipping the
    // signature may flip the bit, flipping the header cannot
    block.header.version = 1;
    let old_bit = stake_entropy_bit(&params, &block);
    block.header.nonce += 1;
    assert_eq!(stake_entropy_bit(&params, &block), old_bit);
}

// ============================================================================
// Checksums
// ============================================================================

#[test]
fn test_checksum_rolls_forward() {
    let proof = seeded_id(77);
    let genesis_sum = stake_modifier_checksum(None, FLAG_GENERATED_MODIFIER, &proof, 0);
    let child_sum = stake_modifier_checksum(
        Some(genesis_sum),
        FLAG_GENERATED_MODIFIER | FLAG_PROOF_OF_STAKE,
        &proof,
        STAKE_MODIFIER_SENTINEL,
    );
    assert_ne!(genesis_sum, child_sum);
    // stable across recomputation
    assert_eq!(
        child_sum,
        stake_modifier_checksum(
            Some(genesis_sum),
            FLAG_GENERATED_MODIFIER | FLAG_PROOF_OF_STAKE,
            &proof,
            STAKE_MODIFIER_SENTINEL,
        )
    );
}
