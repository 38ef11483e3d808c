//! Merkle roots and the segwit coinbase commitment.

use crate::block::Block;
use crate::hash::{sha256d, Hash256};
use crate::script::{Script, OP_RETURN};

/// Commitment header bytes preceding the witness root hash in the coinbase
/// commitment output.
pub const WITNESS_COMMITMENT_HEADER: [u8; 4] = [0xaa, 0x21, 0xa9, 0xed];

fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut concat = [0u8; 64];
    concat[..32].copy_from_slice(left.as_bytes());
    concat[32..].copy_from_slice(right.as_bytes());
    sha256d(&concat)
}

/// Root of the merkle tree over `hashes`, duplicating the last element of
/// odd rows.
pub fn merkle_root(hashes: &[Hash256]) -> Hash256 {
    match hashes.len() {
        0 => Hash256::ZERO,
        1 => hashes[0],
        _ => {
            let mut row = Vec::with_capacity((hashes.len() + 1) / 2);
            for pair in hashes.chunks(2) {
                let right = pair.get(1).unwrap_or(&pair[0]);
                row.push(hash_pair(&pair[0], right));
            }
            merkle_root(&row)
        }
    }
}

/// Merkle root over the block's transaction ids.
pub fn block_merkle_root(block: &Block) -> Hash256 {
    let txids: Vec<Hash256> = block.txs.iter().map(|tx| tx.txid()).collect();
    merkle_root(&txids)
}

/// Merkle root over witness ids, with the coinbase slot zeroed.
pub fn block_witness_merkle_root(block: &Block) -> Hash256 {
    let mut hashes = Vec::with_capacity(block.txs.len());
    for (i, tx) in block.txs.iter().enumerate() {
        hashes.push(if i == 0 { Hash256::ZERO } else { tx.wtxid() });
    }
    merkle_root(&hashes)
}

/// The witness commitment: double-SHA256 of the witness root and the
/// coinbase witness nonce.
pub fn witness_commitment(witness_root: &Hash256, nonce: &[u8; 32]) -> Hash256 {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(witness_root.as_bytes());
    data[32..].copy_from_slice(nonce);
    sha256d(&data)
}

/// Build the coinbase output script that carries the witness commitment.
pub fn witness_commitment_script(commitment: &Hash256) -> Script {
    let mut payload = Vec::with_capacity(36);
    payload.extend_from_slice(&WITNESS_COMMITMENT_HEADER);
    payload.extend_from_slice(commitment.as_bytes());
    let mut script = Script::from_bytes(vec![OP_RETURN]);
    script.push_data(&payload);
    script
}
