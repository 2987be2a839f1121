//! Reward program error types

use stake_core::{Address, ErrorKind, MathError, Tick, TransferError};
use stake_ledger::LedgerError;
use thiserror::Error;

use crate::program::ProgramPhase;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakingError {
    #[error("Unauthorized: {caller} may not {action}")]
    Unauthorized { caller: Address, action: &'static str },

    #[error("Program already started at tick {start_tick} (now {tick})")]
    ProgramAlreadyStarted { start_tick: Tick, tick: Tick },

    #[error("Program not active: {phase:?} at tick {tick}")]
    ProgramNotActive { phase: ProgramPhase, tick: Tick },

    #[error("Program runs until tick {end_tick} (now {tick})")]
    ProgramNotEnded { end_tick: Tick, tick: Tick },

    #[error("Nothing to withdraw for {0}")]
    NothingToWithdraw(Address),

    #[error("Nothing to harvest for {0}")]
    NothingToHarvest(Address),

    #[error("Invalid pool: {0}")]
    InvalidPool(String),

    #[error("Invalid program configuration: {0}")]
    InvalidConfig(String),

    #[error("Program is bound to ledger {expected}, got {actual}")]
    LedgerMismatch { expected: Address, actual: Address },

    #[error("Reward transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Math(#[from] MathError),
}

impl StakingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StakingError::Unauthorized { .. } => ErrorKind::Unauthorized,
            StakingError::ProgramAlreadyStarted { .. } => ErrorKind::ProgramAlreadyStarted,
            StakingError::ProgramNotActive { .. } | StakingError::ProgramNotEnded { .. } => {
                ErrorKind::ProgramNotActive
            }
            StakingError::NothingToWithdraw(_) => ErrorKind::NothingToWithdraw,
            StakingError::NothingToHarvest(_) => ErrorKind::NothingToHarvest,
            StakingError::InvalidPool(_)
            | StakingError::InvalidConfig(_)
            | StakingError::LedgerMismatch { .. } => ErrorKind::InvalidInput,
            StakingError::TransferFailed(_) => ErrorKind::TransferFailed,
            StakingError::Ledger(e) => e.kind(),
            StakingError::Math(_) => ErrorKind::Arithmetic,
        }
    }
}

pub type Result<T> = std::result::Result<T, StakingError>;
