//! Transactions with the PoS-family timestamp field.

use crate::amount::Amount;
use crate::encode::{write_compact_size, write_var_bytes};
use crate::hash::{sha256d, Hash256};
use crate::script::Script;
use crate::{LOCKTIME_THRESHOLD, SEQUENCE_FINAL, WITNESS_SCALE_FACTOR};

/// Reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Hash256, vout: u32) -> Self {
        OutPoint { txid, vout }
    }

    /// The null outpoint used by coinbase inputs.
    pub fn null() -> Self {
        OutPoint {
            txid: Hash256::ZERO,
            vout: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.vout == u32::MAX
    }
}

/// Transaction input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
    /// Witness stack; empty when the input has no witness.
    pub witness: Vec<Vec<u8>>,
}

impl TxIn {
    pub fn new(prevout: OutPoint) -> Self {
        TxIn {
            prevout,
            script_sig: Script::new(),
            sequence: SEQUENCE_FINAL,
            witness: Vec::new(),
        }
    }
}

/// Transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: Amount,
    pub script_pubkey: Script,
}

impl TxOut {
    pub fn new(value: Amount, script_pubkey: Script) -> Self {
        TxOut {
            value,
            script_pubkey,
        }
    }

    /// The empty output marking a coinstake's first slot.
    pub fn empty() -> Self {
        TxOut {
            value: 0,
            script_pubkey: Script::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }
}

/// A transaction. `n_time` is the PoS-family timestamp inherited by this
/// chain; for a coinstake it must equal the block time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub n_time: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn new(n_time: u32) -> Self {
        Transaction {
            version: 1,
            n_time,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }

    /// A coinbase has exactly one input and that input is null.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// A coinstake spends at least one real output and its first output is
    /// the empty marker, with at least one further output carrying value.
    pub fn is_coinstake(&self) -> bool {
        !self.inputs.is_empty()
            && !self.inputs[0].prevout.is_null()
            && self.outputs.len() >= 2
            && self.outputs[0].is_empty()
    }

    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|i| !i.witness.is_empty())
    }

    /// Sum of output values.
    pub fn value_out(&self) -> Amount {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Serialize in consensus format, optionally with witness data.
    pub fn serialize(&self, with_witness: bool) -> Vec<u8> {
        let with_witness = with_witness && self.has_witness();
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.n_time.to_le_bytes());
        if with_witness {
            buf.push(0x00); // segwit marker
            buf.push(0x01); // flag
        }
        write_compact_size(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            buf.extend_from_slice(input.prevout.txid.as_bytes());
            buf.extend_from_slice(&input.prevout.vout.to_le_bytes());
            write_var_bytes(&mut buf, input.script_sig.as_bytes());
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_compact_size(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            buf.extend_from_slice(&output.value.to_le_bytes());
            write_var_bytes(&mut buf, output.script_pubkey.as_bytes());
        }
        if with_witness {
            for input in &self.inputs {
                write_compact_size(&mut buf, input.witness.len() as u64);
                for item in &input.witness {
                    write_var_bytes(&mut buf, item);
                }
            }
        }
        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }

    /// Transaction id: double-SHA256 of the witness-stripped serialization.
    pub fn txid(&self) -> Hash256 {
        sha256d(&self.serialize(false))
    }

    /// Witness transaction id: double-SHA256 of the full serialization.
    /// Equal to [`Transaction::txid`] for transactions without witnesses.
    pub fn wtxid(&self) -> Hash256 {
        sha256d(&self.serialize(true))
    }

    /// Size of the witness-stripped serialization.
    pub fn base_size(&self) -> usize {
        self.serialize(false).len()
    }

    /// Size of the full serialization.
    pub fn total_size(&self) -> usize {
        self.serialize(true).len()
    }

    /// Block weight contribution: witness bytes count once, the rest four
    /// times.
    pub fn weight(&self) -> u64 {
        let base = self.base_size() as u64;
        let total = self.total_size() as u64;
        base * (WITNESS_SCALE_FACTOR - 1) + total
    }

    /// Virtual size: weight scaled back to bytes, rounded up.
    pub fn vsize(&self) -> u64 {
        (self.weight() + WITNESS_SCALE_FACTOR - 1) / WITNESS_SCALE_FACTOR
    }

    /// Locktime finality at a given height and time cutoff.
    pub fn is_final_at(&self, height: u32, time_cutoff: i64) -> bool {
        if self.lock_time == 0 {
            return true;
        }
        let cutoff = if self.lock_time < LOCKTIME_THRESHOLD {
            height as i64
        } else {
            time_cutoff
        };
        if (self.lock_time as i64) < cutoff {
            return true;
        }
        self.inputs.iter().all(|i| i.sequence == SEQUENCE_FINAL)
    }
}
