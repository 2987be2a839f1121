//! Stake Core Library
//!
//! Shared primitives for the deposit ledger and the reward program:
//! - account/token addresses and the logical tick counter
//! - fixed-point rate arithmetic (scale 10^36)
//! - append-only balance checkpoints with historical queries
//! - the token collaborator interface and an in-memory implementation

pub mod address;
pub mod checkpoint;
pub mod context;
pub mod error;
pub mod fixed;
pub mod token;

pub use address::Address;
pub use checkpoint::{Checkpoint, CheckpointError, CheckpointLog, Recorded};
pub use context::CallContext;
pub use error::ErrorKind;
pub use fixed::{mul_div, rate_from_ratio, MathError, PRECISION};
pub use token::{MemoryBank, TokenBank, TransferError};

/// Logical time unit supplied by the environment (e.g. a block height)
pub type Tick = u64;

/// Token amount in the token's smallest unit
pub type Amount = u128;
