//! # obol-mempool
//!
//! Transaction mempool for the Obol node.
//!
//! This crate provides:
//! - Entries with cached size/fee/sigop aggregates, both standalone and
//!   with all unconfirmed ancestors
//! - Ancestor-feerate ordering (cross-multiplied, never divides)
//! - Ancestor and descendant closure calculation
//! - Immutable snapshots that block assembly borrows for the duration of
//!   one template and drops at scope end

mod entry;
mod error;
mod ordering;
mod pool;

pub use entry::MempoolEntry;
pub use error::{MempoolError, MempoolResult};
pub use ordering::AncestorFeerate;
pub use pool::{Mempool, MempoolSnapshot};
