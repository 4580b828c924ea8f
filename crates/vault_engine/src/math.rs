//! Vault arithmetic - no unwrap, no panics, no lossy casts
//!
//! Share conversions multiply two 18-decimal quantities, which overflows
//! `u128` long before balances get large. `mul_div_floor` / `mul_div_ceil`
//! widen the product to `U256` and divide back down, returning `None` only
//! when the divisor is zero or the quotient does not fit in `u128`.

use alloy_primitives::U256;

/// Basis point denominator (10000 bps = 100%)
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Add u128 with saturation at MAX
pub fn add_u128(a: u128, b: u128) -> u128 {
    a.saturating_add(b)
}

/// Subtract u128 with saturation at 0
pub fn sub_u128(a: u128, b: u128) -> u128 {
    a.saturating_sub(b)
}

/// Minimum of two u128
pub fn min_u128(a: u128, b: u128) -> u128 {
    if a < b { a } else { b }
}

/// a * b / d as (quotient, remainder), with the product held in a U256.
/// None if d == 0 or the quotient does not fit in u128.
fn mul_div(a: u128, b: u128, d: u128) -> Option<(u128, u128)> {
    if d == 0 {
        return None;
    }
    let (q, r) = (U256::from(a) * U256::from(b)).div_rem(U256::from(d));
    Some((u128::try_from(q).ok()?, u128::try_from(r).ok()?))
}

/// floor(a * b / d)
pub fn mul_div_floor(a: u128, b: u128, d: u128) -> Option<u128> {
    mul_div(a, b, d).map(|(q, _)| q)
}

/// ceil(a * b / d)
pub fn mul_div_ceil(a: u128, b: u128, d: u128) -> Option<u128> {
    let (q, r) = mul_div(a, b, d)?;
    if r == 0 {
        Some(q)
    } else {
        q.checked_add(1)
    }
}

/// amount * bps / 10000, rounded down
pub fn apply_bps(amount: u128, bps: u16) -> Option<u128> {
    mul_div_floor(amount, bps as u128, BPS_DENOMINATOR)
}

/// floor(profit * elapsed / period) for elapsed <= period.
///
/// Split as (p / c) * e + (p % c) * e / c so neither term can overflow:
/// the first is at most p, the second is below c * e < 2^128.
pub fn pro_rata(profit: u128, elapsed: u64, period: u64) -> u128 {
    if period == 0 {
        return profit;
    }
    let elapsed = elapsed.min(period) as u128;
    let period = period as u128;

    let whole = (profit / period) * elapsed;
    let part = (profit % period) * elapsed / period;
    whole + part
}
