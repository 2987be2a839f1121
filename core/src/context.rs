//! Per-call environment: who is calling and at which tick

use crate::{Address, Tick};

/// Supplied by the environment for every external call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub tick: Tick,
}

impl CallContext {
    pub fn new(caller: impl Into<Address>, tick: Tick) -> Self {
        Self {
            caller: caller.into(),
            tick,
        }
    }

    /// Same tick, different caller. Used when one component calls another.
    pub fn as_caller(&self, caller: &Address) -> Self {
        Self {
            caller: caller.clone(),
            tick: self.tick,
        }
    }
}
