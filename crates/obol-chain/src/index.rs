//! Per-block index entries.

use obol_types::Hash256;
use std::sync::Arc;

/// Entry flag: block is proof-of-stake.
pub const FLAG_PROOF_OF_STAKE: u8 = 1 << 0;

/// Entry flag: the block's stake entropy bit is set.
pub const FLAG_STAKE_ENTROPY: u8 = 1 << 1;

/// Entry flag: a fresh stake modifier was generated at this block.
pub const FLAG_GENERATED_MODIFIER: u8 = 1 << 2;

/// Number of ancestor timestamps feeding the median-time-past.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// Per-block index record.
///
/// The stake modifier, the generated-modifier flag and the entropy bit are
/// persisted with the block index by the chain layer and must be stable
/// across restarts; this core reads them through `Arc` links and never
/// mutates an indexed entry.
#[derive(Debug)]
pub struct BlockIndex {
    pub hash: Hash256,
    pub height: u32,
    pub version: i32,
    pub time: u32,
    pub bits: u32,
    /// Parent link; `None` only for genesis.
    pub prev: Option<Arc<BlockIndex>>,
    /// 64-bit stake modifier in effect at this block.
    pub stake_modifier: u64,
    /// 32-bit checksum of the modifier state, for checkpointing.
    pub stake_modifier_checksum: u32,
    /// Kernel proof hash for PoS blocks, zero otherwise.
    pub proof_hash: Hash256,
    flags: u8,
}

impl BlockIndex {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hash: Hash256,
        height: u32,
        version: i32,
        time: u32,
        bits: u32,
        prev: Option<Arc<BlockIndex>>,
        stake_modifier: u64,
        stake_modifier_checksum: u32,
        proof_hash: Hash256,
        flags: u8,
    ) -> Self {
        BlockIndex {
            hash,
            height,
            version,
            time,
            bits,
            prev,
            stake_modifier,
            stake_modifier_checksum,
            proof_hash,
            flags,
        }
    }

    pub fn is_proof_of_stake(&self) -> bool {
        self.flags & FLAG_PROOF_OF_STAKE != 0
    }

    /// The entropy bit contributed to future stake modifiers.
    pub fn stake_entropy_bit(&self) -> u64 {
        ((self.flags & FLAG_STAKE_ENTROPY) >> 1) as u64
    }

    /// Whether a fresh modifier was generated at this block.
    pub fn generated_stake_modifier(&self) -> bool {
        self.flags & FLAG_GENERATED_MODIFIER != 0
    }

    pub fn block_time(&self) -> i64 {
        self.time as i64
    }

    /// Walk the parent links to the ancestor at `height`.
    pub fn ancestor(self: &Arc<Self>, height: u32) -> Option<Arc<BlockIndex>> {
        if height > self.height {
            return None;
        }
        let mut cursor = Arc::clone(self);
        while cursor.height > height {
            cursor = Arc::clone(cursor.prev.as_ref()?);
        }
        Some(cursor)
    }
}

/// Median of the last [`MEDIAN_TIME_SPAN`] block times ending at `entry`.
pub fn median_time_past(entry: &Arc<BlockIndex>) -> i64 {
    let mut times = Vec::with_capacity(MEDIAN_TIME_SPAN);
    let mut cursor = Some(Arc::clone(entry));
    while let Some(index) = cursor {
        times.push(index.block_time());
        if times.len() == MEDIAN_TIME_SPAN {
            break;
        }
        cursor = index.prev.clone();
    }
    times.sort_unstable();
    times[times.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use obol_types::sha256d;

    fn chain_of(times: &[u32]) -> Arc<BlockIndex> {
        let mut prev: Option<Arc<BlockIndex>> = None;
        for (height, &time) in times.iter().enumerate() {
            let entry = BlockIndex::new(
                sha256d(&(height as u32).to_le_bytes()),
                height as u32,
                1,
                time,
                0x1e0fffff,
                prev.clone(),
                0,
                0,
                Hash256::ZERO,
                if height == 0 { FLAG_GENERATED_MODIFIER } else { 0 },
            );
            prev = Some(Arc::new(entry));
        }
        prev.expect("non-empty chain")
    }

    #[test]
    fn test_ancestor_walk() {
        let tip = chain_of(&[0, 10, 20, 30, 40]);
        assert_eq!(tip.height, 4);
        let second = tip.ancestor(1).unwrap();
        assert_eq!(second.time, 10);
        assert!(tip.ancestor(5).is_none());
        assert_eq!(tip.ancestor(4).unwrap().hash, tip.hash);
    }

    #[test]
    fn test_median_time_past_short_chain() {
        let tip = chain_of(&[5, 1, 9]);
        // sorted [1, 5, 9] -> median 5
        assert_eq!(median_time_past(&tip), 5);
    }

    #[test]
    fn test_median_time_past_window_is_eleven() {
        let times: Vec<u32> = (0..20).map(|i| i * 100).collect();
        let tip = chain_of(&times);
        // last 11 times are 900..=1900, median is 1400
        assert_eq!(median_time_past(&tip), 1400);
    }

    #[test]
    fn test_entropy_bit_flag() {
        let entry = BlockIndex::new(
            sha256d(b"x"),
            0,
            1,
            0,
            0,
            None,
            0,
            0,
            Hash256::ZERO,
            FLAG_STAKE_ENTROPY | FLAG_PROOF_OF_STAKE,
        );
        assert_eq!(entry.stake_entropy_bit(), 1);
        assert!(entry.is_proof_of_stake());
        assert!(!entry.generated_stake_modifier());
    }
}
