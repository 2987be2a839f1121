//! Error kinds shared across the ledger and the reward program

use serde::{Deserialize, Serialize};
use std::fmt;

/// Distinguishable failure kinds. Every crate error maps onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Unauthorized,
    CapacityExceeded,
    TransferFailed,
    InsufficientBalance,
    ProgramNotActive,
    ProgramAlreadyStarted,
    NothingToWithdraw,
    NothingToHarvest,
    InvalidInput,
    Arithmetic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::CapacityExceeded => "capacity exceeded",
            ErrorKind::TransferFailed => "transfer failed",
            ErrorKind::InsufficientBalance => "insufficient balance",
            ErrorKind::ProgramNotActive => "program not active",
            ErrorKind::ProgramAlreadyStarted => "program already started",
            ErrorKind::NothingToWithdraw => "nothing to withdraw",
            ErrorKind::NothingToHarvest => "nothing to harvest",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::Arithmetic => "arithmetic error",
        };
        f.write_str(name)
    }
}
