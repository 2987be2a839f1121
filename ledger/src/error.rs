//! Deposit ledger error types

use stake_core::{Address, Amount, CheckpointError, ErrorKind, MathError, TransferError};
use thiserror::Error;

use crate::capacity::CapacityViolation;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Unauthorized: {caller} may not {action}")]
    Unauthorized { caller: Address, action: &'static str },

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(CapacityViolation),

    #[error("Token transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    #[error("Insufficient deposit: requested {requested}, available {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    #[error("Nothing to withdraw for {0}")]
    NothingToWithdraw(Address),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid capacity rule: {0}")]
    InvalidRule(String),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Math(#[from] MathError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Unauthorized { .. } => ErrorKind::Unauthorized,
            LedgerError::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            LedgerError::TransferFailed(_) => ErrorKind::TransferFailed,
            LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            LedgerError::NothingToWithdraw(_) => ErrorKind::NothingToWithdraw,
            LedgerError::InvalidAmount(_) | LedgerError::InvalidRule(_) => ErrorKind::InvalidInput,
            LedgerError::Checkpoint(CheckpointError::TickRegression { .. }) => ErrorKind::InvalidInput,
            LedgerError::Checkpoint(CheckpointError::Math(_)) | LedgerError::Math(_) => {
                ErrorKind::Arithmetic
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
