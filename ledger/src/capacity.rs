//! Deposit capacity policy
//!
//! Pure evaluation of the two per-token limits:
//! - an absolute limit on the token's total deposits across all accounts
//! - a proportional cap tying an account's deposit of this token to its
//!   deposit of an anchor token
//!
//! Both checks are independent and both must pass.

use serde::{Deserialize, Serialize};
use stake_core::{mul_div, Address, Amount, MathError};
use thiserror::Error;

use crate::error::{LedgerError, Result};

/// `deposited(token) <= deposited(anchor_token) * self_multiplier / anchor_multiplier`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProportionalCap {
    pub anchor_token: Address,
    pub anchor_multiplier: Amount,
    pub self_multiplier: Amount,
}

impl ProportionalCap {
    /// Total amount the account may hold given its anchor deposit (truncating).
    pub fn allowance(&self, anchor_deposited: Amount) -> std::result::Result<Amount, MathError> {
        mul_div(anchor_deposited, self.self_multiplier, self.anchor_multiplier)
    }

    pub fn headroom(
        &self,
        anchor_deposited: Amount,
        deposited: Amount,
    ) -> std::result::Result<Amount, MathError> {
        Ok(self.allowance(anchor_deposited)?.saturating_sub(deposited))
    }
}

/// Active rules for one token. At most one of each kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityRule {
    pub global_limit: Option<Amount>,
    pub proportional: Option<ProportionalCap>,
}

/// The ledger figures a capacity decision depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacitySnapshot {
    /// Total deposited of the token across all accounts
    pub total: Amount,
    /// The account's current deposit of the token
    pub deposited: Amount,
    /// The account's current deposit of the anchor token (0 without a cap)
    pub anchor_deposited: Amount,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapacityViolation {
    #[error("limit of {limit} reached (total {total}, requested {requested})")]
    GlobalLimit {
        limit: Amount,
        total: Amount,
        requested: Amount,
    },

    #[error("capped by {anchor_token}: headroom {headroom}, requested {requested}")]
    Proportional {
        anchor_token: Address,
        headroom: Amount,
        requested: Amount,
    },
}

impl CapacityRule {
    pub fn is_empty(&self) -> bool {
        self.global_limit.is_none() && self.proportional.is_none()
    }

    /// Remaining room under the absolute limit, if one is set.
    pub fn global_headroom(&self, total: Amount) -> Option<Amount> {
        self.global_limit.map(|limit| limit.saturating_sub(total))
    }

    /// Largest additional deposit both rules would accept. `Amount::MAX` when
    /// the token is unconstrained.
    pub fn max_additional(&self, snapshot: &CapacitySnapshot) -> Result<Amount> {
        let mut max = self.global_headroom(snapshot.total).unwrap_or(Amount::MAX);
        if let Some(cap) = &self.proportional {
            max = max.min(cap.headroom(snapshot.anchor_deposited, snapshot.deposited)?);
        }
        Ok(max)
    }

    /// Fails with `CapacityExceeded` if depositing `requested` would break a rule.
    pub fn check_additional_deposit(&self, snapshot: &CapacitySnapshot, requested: Amount) -> Result<()> {
        if let Some(limit) = self.global_limit {
            let exceeds = snapshot
                .total
                .checked_add(requested)
                .map_or(true, |after| after > limit);
            if exceeds {
                return Err(LedgerError::CapacityExceeded(CapacityViolation::GlobalLimit {
                    limit,
                    total: snapshot.total,
                    requested,
                }));
            }
        }

        if let Some(cap) = &self.proportional {
            let headroom = cap.headroom(snapshot.anchor_deposited, snapshot.deposited)?;
            if requested > headroom {
                return Err(LedgerError::CapacityExceeded(CapacityViolation::Proportional {
                    anchor_token: cap.anchor_token.clone(),
                    headroom,
                    requested,
                }));
            }
        }

        Ok(())
    }
}
