//! Compact difficulty target encoding (the header `nBits` field).

use num_bigint::BigUint;
use num_traits::Zero;

/// Decode a compact target. Returns `(target, negative, overflow)`;
/// consensus code must reject negative, zero, or overflowing targets.
pub fn compact_to_target(bits: u32) -> (BigUint, bool, bool) {
    let size = (bits >> 24) as u32;
    let mut word = bits & 0x007f_ffff;
    let mut target;
    if size <= 3 {
        word >>= 8 * (3 - size);
        target = BigUint::from(word);
    } else {
        target = BigUint::from(word);
        target <<= 8 * (size - 3);
    }
    let negative = word != 0 && (bits & 0x0080_0000) != 0;
    let overflow = word != 0 && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));
    (target, negative, overflow)
}

/// Encode a target in compact form.
pub fn target_to_compact(target: &BigUint) -> u32 {
    if target.is_zero() {
        return 0;
    }
    let mut size = ((target.bits() + 7) / 8) as u32;
    let mut word: u32 = if size <= 3 {
        let low = target.iter_u64_digits().next().unwrap_or(0) as u32;
        low << (8 * (3 - size))
    } else {
        let shifted: BigUint = target >> (8 * (size - 3));
        shifted.iter_u64_digits().next().unwrap_or(0) as u32
    };
    // keep the sign bit clear
    if word & 0x0080_0000 != 0 {
        word >>= 8;
        size += 1;
    }
    (size << 24) | word
}
