//! Opaque account and token identities

use serde::{Deserialize, Serialize};
use std::fmt;

/// An account or contract identity. Used only as a map key; carries no state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(id: impl Into<String>) -> Self {
        Address(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(id: &str) -> Self {
        Address::new(id)
    }
}

impl From<String> for Address {
    fn from(id: String) -> Self {
        Address(id)
    }
}
