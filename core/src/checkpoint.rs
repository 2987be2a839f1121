//! Append-only balance history
//!
//! A [`CheckpointLog`] records `(tick, balance_after)` for every balance change
//! of one (token, account) pair. The balance in effect at tick `t` is the
//! balance of the last checkpoint with `tick <= t`, or zero before the first.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Amount, MathError, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub tick: Tick,
    pub balance: Amount,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("Tick {tick} precedes last checkpoint at tick {last}")]
    TickRegression { tick: Tick, last: Tick },

    #[error(transparent)]
    Math(#[from] MathError),
}

/// What [`CheckpointLog::record`] did, so the change can be undone exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Appended,
    Replaced(Checkpoint),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointLog {
    entries: Vec<Checkpoint>,
}

impl CheckpointLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Checkpoint] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current balance (balance after the most recent change)
    pub fn latest(&self) -> Amount {
        self.entries.last().map(|c| c.balance).unwrap_or(0)
    }

    /// Fails if `tick` is older than the last checkpoint.
    pub fn ensure_recordable(&self, tick: Tick) -> Result<(), CheckpointError> {
        match self.entries.last() {
            Some(last) if tick < last.tick => Err(CheckpointError::TickRegression {
                tick,
                last: last.tick,
            }),
            _ => Ok(()),
        }
    }

    /// Record a new balance at `tick`. A second change within the same tick
    /// replaces that tick's checkpoint so ticks stay strictly increasing.
    pub fn record(&mut self, tick: Tick, balance: Amount) -> Result<Recorded, CheckpointError> {
        self.ensure_recordable(tick)?;

        match self.entries.last_mut() {
            Some(last) if last.tick == tick => {
                let previous = *last;
                last.balance = balance;
                Ok(Recorded::Replaced(previous))
            }
            _ => {
                self.entries.push(Checkpoint { tick, balance });
                Ok(Recorded::Appended)
            }
        }
    }

    /// Reverts the most recent [`record`](Self::record).
    pub fn undo(&mut self, recorded: Recorded) {
        match recorded {
            Recorded::Appended => {
                self.entries.pop();
            }
            Recorded::Replaced(previous) => {
                if let Some(last) = self.entries.last_mut() {
                    *last = previous;
                }
            }
        }
    }

    /// Number of checkpoints with `tick <= t`.
    fn settled_count(&self, t: Tick) -> usize {
        self.entries.partition_point(|c| c.tick <= t)
    }

    /// Balance in effect at `tick`
    pub fn balance_at(&self, tick: Tick) -> Amount {
        match self.settled_count(tick) {
            0 => 0,
            n => self.entries[n - 1].balance,
        }
    }

    /// Sum of `balance × ticks held` over `[from, to)`.
    ///
    /// Binary-searches the balance in effect at `from`, then walks only the
    /// checkpoints inside the interval. The balance after the last checkpoint
    /// extends to `to`. Returns 0 for an empty or inverted interval.
    pub fn integral(&self, from: Tick, to: Tick) -> Result<u128, MathError> {
        if to <= from {
            return Ok(0);
        }

        let start = self.settled_count(from);
        let mut balance = match start {
            0 => 0,
            n => self.entries[n - 1].balance,
        };
        let mut cursor = from;
        let mut acc: u128 = 0;

        for checkpoint in self.entries[start..].iter().take_while(|c| c.tick < to) {
            acc = add_segment(acc, balance, checkpoint.tick - cursor)?;
            cursor = checkpoint.tick;
            balance = checkpoint.balance;
        }

        add_segment(acc, balance, to - cursor)
    }
}

fn add_segment(acc: u128, balance: Amount, span: Tick) -> Result<u128, MathError> {
    balance
        .checked_mul(u128::from(span))
        .and_then(|segment| acc.checked_add(segment))
        .ok_or(MathError::Overflow)
}
