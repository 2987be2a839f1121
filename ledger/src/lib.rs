//! Stake Deposit Ledger
//!
//! Custody of deposited principal with full balance history:
//! - per (token, account) checkpoints and per-token totals
//! - absolute and proportional deposit capacity rules
//! - a single trustee allowed to return principal on a depositor's behalf
//! - historical-balance reward integrals for the reward program

pub mod capacity;
pub mod error;
pub mod ledger;

pub use capacity::{CapacityRule, CapacitySnapshot, CapacityViolation, ProportionalCap};
pub use error::{LedgerError, Result};
pub use ledger::{DepositLedger, LedgerConfig};
