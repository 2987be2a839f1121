//! Fixed-point rate arithmetic
//!
//! Reward rates are reward-token units per deposited unit per tick, scaled by
//! [`PRECISION`]. Products of amount × ticks × rate exceed 128 bits long before
//! the final division, so the multiply-then-divide step goes through a big
//! integer whenever the narrow product overflows.

use num_bigint::BigUint;
use thiserror::Error;

use crate::Amount;

/// Fixed-point scale for reward rates (10^36)
pub const PRECISION: u128 = 1_000_000_000_000_000_000_000_000_000_000_000_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Division by zero")]
    DivisionByZero,
}

/// `a * b / denom`, truncating, with a 256-bit-plus intermediate.
pub fn mul_div(a: u128, b: u128, denom: u128) -> Result<u128, MathError> {
    if denom == 0 {
        return Err(MathError::DivisionByZero);
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / denom);
    }

    let wide = BigUint::from(a) * BigUint::from(b) / BigUint::from(denom);
    u128::try_from(wide).map_err(|_| MathError::Overflow)
}

/// Converts "`reward` units per `per` deposited units per tick" to a scaled rate.
pub fn rate_from_ratio(reward: Amount, per: Amount) -> Result<u128, MathError> {
    mul_div(reward, PRECISION, per)
}
