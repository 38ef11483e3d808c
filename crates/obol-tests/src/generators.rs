//! Deterministic test data generators.

use obol_types::{sha256d, Amount, Hash256, OutPoint, Script, Transaction, TxIn, TxOut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Global counter for unique id generation.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A unique 32-byte id.
pub fn unique_id() -> Hash256 {
    let counter = ID_COUNTER.fetch_add(1, Ordering::SeqCst);
    sha256d(&counter.to_le_bytes())
}

/// A deterministic id derived from a seed.
pub fn seeded_id(seed: u64) -> Hash256 {
    sha256d(&[b"seed", seed.to_le_bytes().as_slice()].concat())
}

/// A unique outpoint referencing nothing in particular.
pub fn unique_outpoint() -> OutPoint {
    OutPoint::new(unique_id(), 0)
}

/// A compressed-pubkey-shaped blob for P2PK scripts.
pub fn test_pubkey(seed: u8) -> Vec<u8> {
    let mut key = vec![0x02u8];
    key.extend_from_slice(&[seed; 32]);
    key
}

/// A standalone transaction spending a confirmed (non-mempool) outpoint.
pub fn standalone_tx(value: Amount) -> Arc<Transaction> {
    let mut tx = Transaction::new(1_000_000);
    tx.inputs.push(TxIn::new(unique_outpoint()));
    tx.outputs
        .push(TxOut::new(value, Script::new_p2pk(&test_pubkey(1))));
    Arc::new(tx)
}

/// A transaction spending output 0 of `parent`.
pub fn child_tx(parent: &Transaction, value: Amount) -> Arc<Transaction> {
    let mut tx = Transaction::new(1_000_001);
    tx.inputs
        .push(TxIn::new(OutPoint::new(parent.txid(), 0)));
    tx.outputs
        .push(TxOut::new(value, Script::new_p2pk(&test_pubkey(2))));
    Arc::new(tx)
}

/// A transaction padded with script-sig bytes until its virtual size
/// reaches at least `target_vsize`.
pub fn padded_tx(target_vsize: u64) -> Arc<Transaction> {
    let mut tx = Transaction::new(1_000_002);
    let mut input = TxIn::new(unique_outpoint());
    let base = {
        let mut probe = tx.clone();
        probe.inputs.push(input.clone());
        probe
            .outputs
            .push(TxOut::new(1_000, Script::new_p2pk(&test_pubkey(3))));
        probe.vsize()
    };
    if target_vsize > base + 2 {
        let mut filler = Script::new();
        filler.push_data(&vec![0x51u8; (target_vsize - base - 2) as usize]);
        input.script_sig = filler;
    }
    tx.inputs.push(input);
    tx.outputs
        .push(TxOut::new(1_000, Script::new_p2pk(&test_pubkey(3))));
    Arc::new(tx)
}
