//! Stake Reward Program
//!
//! Multi-pool reward scheduling on top of the deposit ledger:
//! - pools pairing a deposited token with a fixed-point reward rate
//! - program lifecycle with start, soft lock, extension and termination
//! - per-account settlements and reward payouts from the admin's allowance
//! - TOML program configuration

pub mod config;
pub mod error;
pub mod pool;
pub mod program;

pub use config::{ConfigError, PoolConfig, ProgramConfig, ProgramSetup};
pub use error::{Result, StakingError};
pub use pool::Pool;
pub use program::{ProgramPhase, StakingProgram, WithdrawReceipt};
