//! Monetary amounts in satoshis.

/// A monetary amount in satoshis. Signed so fee arithmetic and the
/// "zero or negative reward" check stay simple.
pub type Amount = i64;

/// One coin in satoshis.
pub const COIN: Amount = 100_000_000;

/// One cent in satoshis.
pub const CENT: Amount = 1_000_000;

/// Upper sanity bound for any single amount.
pub const MAX_MONEY: Amount = 50_000_000 * COIN;

/// Render an amount as a decimal coin string, e.g. `12.03400000`.
pub fn format_amount(amount: Amount) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:08}", sign, abs / COIN as u64, abs % COIN as u64)
}
