//! Stake scenario simulator
//!
//! Loads TOML scenarios and replays them against an in-memory token bank,
//! deposit ledger and reward program.

pub mod scenario;

pub use scenario::{
    run, AccountReport, Action, Approval, Event, Mint, Report, Scenario, ScenarioError,
    Simulation, Step,
};
