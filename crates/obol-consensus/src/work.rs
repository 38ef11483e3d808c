//! Header version computation and the template difficulty shim.
//!
//! Full retargeting belongs to the chain layer; template assembly only
//! needs a concrete compact target, which it takes from the most recent
//! header of the same algorithm.

use crate::params::ConsensusParams;
use obol_chain::BlockIndex;
use obol_types::{target_to_compact, Algo, VERSION_ALGO_POW_SHA256};
use std::sync::Arc;

/// Version for a new block at `height` produced by `algo`.
pub fn compute_block_version(params: &ConsensusParams, height: u32, algo: Algo) -> i32 {
    let base = if height >= params.mandatory_upgrade_block[1] {
        params.upgrade_block_version[1]
    } else if height >= params.mandatory_upgrade_block[0] {
        params.upgrade_block_version[0]
    } else {
        4
    };
    match algo {
        Algo::Pos => base,
        Algo::PowSha256 => base | VERSION_ALGO_POW_SHA256,
    }
}

/// Compact target for the next block of `algo` on top of `prev`: the last
/// same-algorithm header's target, or the algorithm's proof limit when
/// there is none.
pub fn next_work_required(
    params: &ConsensusParams,
    prev: Option<&Arc<BlockIndex>>,
    algo: Algo,
) -> u32 {
    let wanted_pos = algo == Algo::Pos;
    let mut cursor = prev.cloned();
    while let Some(entry) = cursor {
        if entry.is_proof_of_stake() == wanted_pos {
            return entry.bits;
        }
        cursor = entry.prev.clone();
    }
    target_to_compact(params.pow_limit(algo))
}
