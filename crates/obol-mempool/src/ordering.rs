//! Ancestor-feerate ordering.

use obol_types::Amount;
use std::cmp::Ordering;

/// Feerate of a transaction package (a tx with its unconfirmed ancestors),
/// plus the insertion sequence used as the deterministic tie-break.
///
/// Comparisons cross-multiply so no division is involved:
/// `a >= b  <=>  a.fees x b.size >= b.fees x a.size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AncestorFeerate {
    /// Modified fees of the package.
    pub fees: Amount,
    /// Virtual size of the package.
    pub size: u64,
    /// Insertion sequence of the representative entry.
    pub sequence: u64,
}

impl AncestorFeerate {
    pub fn new(fees: Amount, size: u64, sequence: u64) -> Self {
        AncestorFeerate {
            fees,
            size,
            sequence,
        }
    }

    /// Whether this package pays at least as well as `other`.
    pub fn better_or_equal(&self, other: &AncestorFeerate) -> bool {
        self.fees as i128 * other.size as i128 >= other.fees as i128 * self.size as i128
    }
}

impl PartialOrd for AncestorFeerate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AncestorFeerate {
    /// Orders best-first: higher feerate, then earlier insertion.
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.fees as i128 * other.size as i128;
        let rhs = other.fees as i128 * self.size as i128;
        rhs.cmp(&lhs).then(self.sequence.cmp(&other.sequence))
    }
}
