//! Fixed-point price and amount utilities.
//!
//! ## Overview
//!
//! Amounts are integer base units (`u64`). Prices reported by the oracle are
//! ratios of reserves scaled by [`SCALE`] (10^8), the same scale the rest of
//! the kernel uses, so no floating point ever enters consensus-relevant math.
//!
//! Human-facing amounts ("1.5 tokens") are converted to base units with an
//! explicit decimals count via `rust_decimal`.
//!
//! ## Examples
//!
//! ```
//! use dark_amm::types::price::{to_base_units, from_base_units};
//!
//! // 1.5 of an 18-decimal token is too large for u64, 6 decimals is fine
//! assert_eq!(to_base_units("1.5", 6), Some(1_500_000));
//! assert_eq!(from_base_units(1_500_000, 6), "1.500000");
//! ```

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Scaling factor for oracle prices: 10^8
pub const SCALE: u64 = 100_000_000;

/// Basis point denominator (100% = 10_000 bps)
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Largest decimals count accepted by the conversions (10^19 > u64::MAX)
pub const MAX_DECIMALS: u32 = 19;

// ============================================================================
// Amount conversion
// ============================================================================

fn unit(decimals: u32) -> Option<Decimal> {
    if decimals > MAX_DECIMALS {
        return None;
    }
    10u64.checked_pow(decimals).map(Decimal::from)
}

/// Convert a human-readable decimal amount to integer base units.
///
/// Digits beyond `decimals` places are truncated, never rounded up, so a
/// converted amount never exceeds what the user typed.
///
/// # Returns
///
/// * `None` - If parsing fails, the value is negative, or it overflows `u64`
///
/// # Example
///
/// ```
/// use dark_amm::types::price::to_base_units;
///
/// assert_eq!(to_base_units("100", 8), Some(10_000_000_000));
/// assert_eq!(to_base_units("0.123456789", 8), Some(12_345_678));
/// assert_eq!(to_base_units("-1", 8), None);
/// ```
pub fn to_base_units(s: &str, decimals: u32) -> Option<u64> {
    let d = Decimal::from_str(s.trim()).ok()?;
    decimal_to_base_units(d, decimals)
}

/// Convert a Decimal amount to integer base units (truncating).
pub fn decimal_to_base_units(d: Decimal, decimals: u32) -> Option<u64> {
    if d.is_sign_negative() {
        return None;
    }
    let scaled = d.checked_mul(unit(decimals)?)?;
    scaled.trunc().to_u64()
}

/// Convert base units to a Decimal with `decimals` fractional digits.
pub fn base_units_to_decimal(value: u64, decimals: u32) -> Decimal {
    let mut d = Decimal::from(value);
    // set_scale only fails above 28, MAX_DECIMALS keeps us well inside
    if d.set_scale(decimals.min(MAX_DECIMALS)).is_err() {
        return Decimal::ZERO;
    }
    d
}

/// Format base units as a decimal string with exactly `decimals` places.
pub fn from_base_units(value: u64, decimals: u32) -> String {
    let decimals = decimals.min(MAX_DECIMALS);
    format!("{:.*}", decimals as usize, base_units_to_decimal(value, decimals))
}

// ============================================================================
// Oracle prices
// ============================================================================

/// Spot price of one unit of `base` in units of `quote`, scaled by [`SCALE`].
///
/// Returns `None` if `base_reserve` is zero.
pub fn scaled_price(quote_reserve: u64, base_reserve: u64) -> Option<u128> {
    if base_reserve == 0 {
        return None;
    }
    Some((quote_reserve as u128) * (SCALE as u128) / (base_reserve as u128))
}

/// Convert a [`SCALE`]d price to a Decimal for display.
pub fn price_to_decimal(price: u128) -> Decimal {
    Decimal::from_u128(price)
        .and_then(|p| p.checked_div(Decimal::from(SCALE)))
        .unwrap_or(Decimal::MAX)
}

// ============================================================================
// Unit Tests
// ============================================================================
