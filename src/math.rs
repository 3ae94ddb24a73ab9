//! Constant-product math shared by the pool and the route finder.
//!
//! ## Rounding
//!
//! Every division floors, except [`amount_in`] which rounds up. Both
//! directions favour the pool, so repeated rounding can never be used to
//! extract value.
//!
//! ## Fee precision
//!
//! Fee rates are expressed in units of 1/[`FEE_PRECISION`] (bps of bps) so a
//! tier discount applied to the base fee never has to be rounded:
//!
//! ```text
//! fee = base_fee_bps * (10_000 - discount_bps)          // in 1e-8 units
//! net = amount_in * (FEE_PRECISION - fee) / FEE_PRECISION
//! out = net * reserve_out / (reserve_in + net)
//! ```
//!
//! ## Example
//!
//! ```
//! use dark_amm::math::{amount_out, effective_fee};
//!
//! // 0.3% fee, no discount
//! let fee = effective_fee(30, 0);
//! assert_eq!(amount_out(1_000, 100_000, 50_000, fee).unwrap(), 493);
//! ```

use crate::error::{AmmError, Result};
use crate::types::price::BPS_DENOMINATOR;

/// Shares permanently locked at the burn address on the first deposit.
pub const MINIMUM_LIQUIDITY: u64 = 1_000;

/// Denominator of an effective fee rate (10^8).
pub const FEE_PRECISION: u64 = BPS_DENOMINATOR * BPS_DENOMINATOR;

/// Largest discount a trader can hold; a 100% discount is never granted.
pub const MAX_DISCOUNT_BPS: u16 = 9_999;

/// Integer square root (Newton's method). Returns floor(√n).
pub fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    let mut x = n;
    let mut y = x / 2 + 1;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

/// floor(a * b / c), or `None` on zero divisor or a result above `u64`.
pub fn mul_div(a: u64, b: u64, c: u64) -> Option<u64> {
    if c == 0 {
        return None;
    }
    let r = (a as u128) * (b as u128) / (c as u128);
    u64::try_from(r).ok()
}

/// Constant product of two reserves.
#[inline]
pub fn k(reserve_a: u64, reserve_b: u64) -> u128 {
    (reserve_a as u128) * (reserve_b as u128)
}

/// Effective fee in 1/[`FEE_PRECISION`] units after a tier discount.
pub fn effective_fee(base_fee_bps: u16, discount_bps: u16) -> u64 {
    let discount = discount_bps.min(MAX_DISCOUNT_BPS) as u64;
    (base_fee_bps as u64) * (BPS_DENOMINATOR - discount)
}

/// Input left after the fee is taken.
pub fn net_input(amount_in: u64, fee: u64) -> Result<u64> {
    let keep = FEE_PRECISION.checked_sub(fee).ok_or(AmmError::Overflow)?;
    mul_div(amount_in, keep, FEE_PRECISION).ok_or(AmmError::Overflow)
}

/// Output of a constant-product swap after fees (floor).
pub fn amount_out(amount_in: u64, reserve_in: u64, reserve_out: u64, fee: u64) -> Result<u64> {
    if amount_in == 0 {
        return Err(AmmError::InsufficientInputAmount);
    }
    if reserve_in == 0 || reserve_out == 0 {
        return Err(AmmError::InsufficientLiquidity);
    }
    let net = net_input(amount_in, fee)? as u128;
    let numerator = net * reserve_out as u128;
    let denominator = reserve_in as u128 + net;
    Ok((numerator / denominator) as u64)
}

/// Input required to receive exactly `amount_out` (rounded up).
pub fn amount_in(amount_out: u64, reserve_in: u64, reserve_out: u64, fee: u64) -> Result<u64> {
    if amount_out == 0 {
        return Err(AmmError::InsufficientOutputAmount);
    }
    if reserve_in == 0 || reserve_out == 0 || amount_out >= reserve_out {
        return Err(AmmError::InsufficientLiquidity);
    }
    let net_needed = (reserve_in as u128) * (amount_out as u128)
        / (reserve_out - amount_out) as u128
        + 1;
    let keep = FEE_PRECISION.checked_sub(fee).ok_or(AmmError::Overflow)? as u128;
    let gross = net_needed
        .checked_mul(FEE_PRECISION as u128)
        .ok_or(AmmError::Overflow)?
        / keep
        + 1;
    u64::try_from(gross).map_err(|_| AmmError::Overflow)
}

/// Amount of the second asset matching `amount_a` at the current ratio.
pub fn quote(amount_a: u64, reserve_a: u64, reserve_b: u64) -> Result<u64> {
    if amount_a == 0 {
        return Err(AmmError::InsufficientAmount);
    }
    if reserve_a == 0 || reserve_b == 0 {
        return Err(AmmError::InsufficientLiquidity);
    }
    mul_div(amount_a, reserve_b, reserve_a).ok_or(AmmError::Overflow)
}

/// Drop in pool spot price, in bps, when `amount_in` is added to
/// `reserve_in` and `amount_out` leaves `reserve_out`.
///
/// Compares `(reserve_out - amount_out) / (reserve_in + amount_in)` with
/// `reserve_out / reserve_in`. Rounds towards a larger impact.
pub fn price_impact_bps(reserve_in: u64, reserve_out: u64, amount_in: u64, amount_out: u64) -> u64 {
    const SCALE: u128 = 1_000_000_000_000_000_000;
    let balance_in = reserve_in as u128 + amount_in as u128;
    if reserve_out == 0 || balance_in == 0 {
        return 0;
    }
    let balance_out = reserve_out.saturating_sub(amount_out) as u128;
    // post / pre = (balance_out / reserve_out) * (reserve_in / balance_in)
    let out_ratio = balance_out * SCALE / reserve_out as u128;
    let in_ratio = reserve_in as u128 * SCALE / balance_in;
    let retained = out_ratio * in_ratio / SCALE;
    ((SCALE - retained.min(SCALE)) * BPS_DENOMINATOR as u128 / SCALE) as u64
}

/// Post-swap invariant check.
///
/// The input-side balance is adjusted by the fee that stayed in the pool;
/// the adjusted product must not fall below the pre-swap product.
pub fn check_invariant(
    reserve_in: u64,
    reserve_out: u64,
    balance_in: u64,
    balance_out: u64,
    fee_amount: u64,
) -> Result<()> {
    let adjusted_in = balance_in
        .checked_sub(fee_amount)
        .ok_or(AmmError::InvariantViolated)?;
    if k(adjusted_in, balance_out) < k(reserve_in, reserve_out) {
        return Err(AmmError::InvariantViolated);
    }
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================
