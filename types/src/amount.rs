//! Token amounts and fixed-point helpers.
//!
//! Amounts are raw integer units (`u128`) to avoid floating-point error.
//! All arithmetic that can overflow goes through the checked helpers here.

/// Raw token units.
pub type Amount = u128;

/// Basis-point denominator (10000 = 100%).
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Seconds in a 365-day year, the accrual period for ROI rates.
pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// `floor(value * numerator / denominator)`, or `None` on overflow or a zero
/// denominator.
pub fn mul_div_floor(value: Amount, numerator: u128, denominator: u128) -> Option<Amount> {
    if denominator == 0 {
        return None;
    }
    value.checked_mul(numerator).map(|product| product / denominator)
}

/// Apply a basis-point haircut: `floor(value * (10000 - bps) / 10000)`.
pub fn apply_bps_haircut(value: Amount, bps: u32) -> Option<Amount> {
    let keep = BPS_DENOMINATOR.checked_sub(u128::from(bps))?;
    mul_div_floor(value, keep, BPS_DENOMINATOR)
}
