//! Reward program configuration
//!
//! Example `program.toml`:
//!
//! ```toml
//! [program]
//! address = "staking"
//! admin = "owner"
//! ledger = "deposits"
//! reward_token = "REWARD"
//! start_tick = 100
//! end_tick = 1100
//! soft_lock_tick = 700
//!
//! [[pools]]
//! token = "T1"
//! reward = 1
//! per = 1000
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use stake_core::{Address, Amount, CallContext, Tick};

use crate::error::StakingError;
use crate::program::StakingProgram;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<StakingError> for ConfigError {
    fn from(e: StakingError) -> Self {
        ConfigError::Invalid(e.to_string())
    }
}

/// Fixed parameters of a reward program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramConfig {
    /// Identity the program uses towards the ledger and the reward token
    pub address: Address,
    pub admin: Address,
    /// Ledger whose balance history drives rewards
    pub ledger: Address,
    pub reward_token: Address,
    pub start_tick: Tick,
    pub end_tick: Tick,
    pub soft_lock_tick: Tick,
}

impl ProgramConfig {
    pub fn validate(&self) -> Result<(), StakingError> {
        if self.start_tick >= self.end_tick {
            return Err(StakingError::InvalidConfig(format!(
                "start tick {} must be before end tick {}",
                self.start_tick, self.end_tick
            )));
        }
        if self.soft_lock_tick < self.start_tick {
            return Err(StakingError::InvalidConfig(format!(
                "soft lock tick {} precedes start tick {}",
                self.soft_lock_tick, self.start_tick
            )));
        }
        if self.address == self.admin {
            return Err(StakingError::InvalidConfig(
                "program address and admin must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pool entry expressed as a reward ratio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub token: Address,
    /// Reward-token units paid per `per` deposited units per tick
    pub reward: Amount,
    pub per: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramSetup {
    pub program: ProgramConfig,
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
}

impl ProgramSetup {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let setup: ProgramSetup = toml::from_str(contents)?;
        setup.program.validate()?;
        Ok(setup)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Creates the program and registers every configured pool as the admin,
    /// before the start tick.
    pub fn build(&self) -> Result<StakingProgram, ConfigError> {
        let mut program = StakingProgram::new(self.program.clone())?;
        if !self.pools.is_empty() && self.program.start_tick == 0 {
            return Err(ConfigError::Invalid(
                "pools need a start tick after 0".to_string(),
            ));
        }

        let ctx = CallContext::new(self.program.admin.clone(), 0);
        for pool in &self.pools {
            program.add_pool_ratio(&ctx, pool.token.clone(), pool.reward, pool.per)?;
        }
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[program]
address = "staking"
admin = "owner"
ledger = "deposits"
reward_token = "REWARD"
start_tick = 100
end_tick = 1100
soft_lock_tick = 700

[[pools]]
token = "T1"
reward = 1
per = 1000

[[pools]]
token = "T2"
reward = 2
per = 500
"#;

    #[test]
    fn test_parse_and_build() {
        let setup = ProgramSetup::from_toml_str(SAMPLE).unwrap();
        assert_eq!(setup.program.start_tick, 100);
        assert_eq!(setup.pools.len(), 2);

        let program = setup.build().unwrap();
        assert_eq!(program.pool_length(), 2);
        assert_eq!(program.end_tick(), 1100);
        assert_eq!(program.soft_lock_tick(), 700);
        assert_eq!(program.pool_info(1).unwrap().token, Address::new("T2"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let setup = ProgramSetup::load(file.path()).unwrap();
        assert_eq!(setup.program.reward_token, Address::new("REWARD"));
    }

    #[test]
    fn test_missing_file() {
        let err = ProgramSetup::load("/nonexistent/program.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = ProgramSetup::from_toml_str("[program]\nstart_tick = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_bounds() {
        let bad = SAMPLE.replace("end_tick = 1100", "end_tick = 100");
        let err = ProgramSetup::from_toml_str(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let bad = SAMPLE.replace("soft_lock_tick = 700", "soft_lock_tick = 50");
        assert!(matches!(
            ProgramSetup::from_toml_str(&bad),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_duplicate_pool_rejected_on_build() {
        let dup = format!("{}\n[[pools]]\ntoken = \"T1\"\nreward = 3\nper = 1\n", SAMPLE);
        let setup = ProgramSetup::from_toml_str(&dup).unwrap();
        assert!(matches!(setup.build(), Err(ConfigError::Invalid(_))));
    }
}
