//! Reward pools

use serde::{Deserialize, Serialize};
use stake_core::{rate_from_ratio, Address, Amount, PRECISION};

use crate::error::{Result, StakingError};

/// One deposited token and the reward it earns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub token: Address,
    /// Reward-token units per deposited unit per tick, scaled by 10^36
    pub reward_rate: u128,
}

impl Pool {
    pub fn new(token: Address, reward_rate: u128) -> Result<Self> {
        if reward_rate == 0 {
            return Err(StakingError::InvalidPool(format!("{} has a zero reward rate", token)));
        }
        Ok(Self { token, reward_rate })
    }

    /// `reward` reward-token units per `per` deposited units per tick
    pub fn from_ratio(token: Address, reward: Amount, per: Amount) -> Result<Self> {
        if per == 0 {
            return Err(StakingError::InvalidPool(format!("{} rate has a zero denominator", token)));
        }
        let rate = rate_from_ratio(reward, per)?;
        Self::new(token, rate)
    }

    /// Rate as a float, for display only
    pub fn rate_f64(&self) -> f64 {
        self.reward_rate as f64 / PRECISION as f64
    }
}
