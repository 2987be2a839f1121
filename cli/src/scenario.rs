//! Scenario files and their replay
//!
//! A scenario fixes the ledger and program identities, the pools, the initial
//! token balances and approvals, and a tick-ordered list of calls. Replaying
//! it drives a [`DepositLedger`] and a [`StakingProgram`] over a
//! [`MemoryBank`]. Refused calls are recorded in the report rather than
//! aborting the run, so scenarios can exercise failure paths too.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use stake_core::{Address, Amount, CallContext, MemoryBank, Tick, TokenBank, TransferError};
use stake_ledger::{DepositLedger, LedgerConfig, LedgerError};
use stake_program::{
    ConfigError, PoolConfig, ProgramConfig, ProgramPhase, ProgramSetup, StakingError,
    StakingProgram,
};

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Step {step} at tick {tick} goes back in time (previous tick {previous})")]
    TickOrder { step: usize, tick: Tick, previous: Tick },

    #[error("Scenario setup failed: {0}")]
    Setup(String),
}

impl From<LedgerError> for ScenarioError {
    fn from(e: LedgerError) -> Self {
        ScenarioError::Setup(e.to_string())
    }
}

impl From<StakingError> for ScenarioError {
    fn from(e: StakingError) -> Self {
        ScenarioError::Setup(e.to_string())
    }
}

impl From<TransferError> for ScenarioError {
    fn from(e: TransferError) -> Self {
        ScenarioError::Setup(e.to_string())
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub ledger: LedgerConfig,
    pub program: ProgramConfig,
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
    #[serde(default)]
    pub mint: Vec<Mint>,
    #[serde(default)]
    pub approve: Vec<Approval>,
    /// Make the program the ledger's trustee before the first step
    #[serde(default = "default_true")]
    pub trust_program: bool,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Mint {
    pub token: Address,
    pub to: Address,
    pub amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Approval {
    pub token: Address,
    pub owner: Address,
    pub spender: Address,
    pub amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub tick: Tick,
    pub caller: Address,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    /// Ledger deposit
    Deposit { token: Address, amount: Amount },
    /// Ledger withdrawal without reward
    WithdrawAll,
    /// Program withdrawal: reward plus principal
    Withdraw,
    Harvest,
    Extend { ticks: Tick },
    Terminate,
    SetLimit { token: Address, limit: Amount },
    Cap {
        anchor: Address,
        anchor_multiplier: Amount,
        token: Address,
        self_multiplier: Amount,
    },
    ClearCaps { token: Address },
    /// Records the caller's pending reward
    Pending,
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::Deposit { .. } => "deposit",
            Action::WithdrawAll => "withdraw-all",
            Action::Withdraw => "withdraw",
            Action::Harvest => "harvest",
            Action::Extend { .. } => "extend",
            Action::Terminate => "terminate",
            Action::SetLimit { .. } => "set-limit",
            Action::Cap { .. } => "cap",
            Action::ClearCaps { .. } => "clear-caps",
            Action::Pending => "pending",
        }
    }
}

impl Scenario {
    pub fn from_toml_str(contents: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = toml::from_str(contents)?;
        scenario.check_tick_order()?;
        Ok(scenario)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    fn check_tick_order(&self) -> Result<(), ScenarioError> {
        let mut previous = 0;
        for (step, s) in self.steps.iter().enumerate() {
            if s.tick < previous {
                return Err(ScenarioError::TickOrder {
                    step,
                    tick: s.tick,
                    previous,
                });
            }
            previous = s.tick;
        }
        Ok(())
    }

    /// Everyone the report should cover: mint recipients and callers, minus
    /// the ledger and program themselves.
    fn participants(&self) -> BTreeSet<Address> {
        let mut accounts: BTreeSet<Address> = self
            .mint
            .iter()
            .map(|m| m.to.clone())
            .chain(self.steps.iter().map(|s| s.caller.clone()))
            .collect();
        accounts.remove(&self.ledger.address);
        accounts.remove(&self.program.address);
        accounts
    }
}

/// Result of one replayed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub step: usize,
    pub tick: Tick,
    pub caller: Address,
    pub action: &'static str,
    pub ok: bool,
    pub outcome: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountReport {
    pub account: Address,
    pub deposits: Vec<(Address, Amount)>,
    pub pending: Amount,
    pub reward_balance: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub final_tick: Tick,
    pub end_tick: Tick,
    pub phase: ProgramPhase,
    pub paid_out: Amount,
    pub forfeited: Amount,
    pub events: Vec<Event>,
    pub accounts: Vec<AccountReport>,
}

pub struct Simulation {
    bank: MemoryBank,
    ledger: DepositLedger,
    program: StakingProgram,
    tick: Tick,
    events: Vec<Event>,
}

impl Simulation {
    pub fn new(scenario: &Scenario) -> Result<Self, ScenarioError> {
        if scenario.program.ledger != scenario.ledger.address {
            return Err(ScenarioError::Setup(format!(
                "program is bound to ledger {} but the scenario ledger is {}",
                scenario.program.ledger, scenario.ledger.address
            )));
        }

        let program = ProgramSetup {
            program: scenario.program.clone(),
            pools: scenario.pools.clone(),
        }
        .build()?;

        let mut ledger = DepositLedger::new(scenario.ledger.clone());
        if scenario.trust_program {
            let admin = CallContext::new(scenario.ledger.admin.clone(), 0);
            ledger.set_trustee(&admin, scenario.program.address.clone())?;
        }

        let mut bank = MemoryBank::new();
        for mint in &scenario.mint {
            bank.mint(&mint.token, &mint.to, mint.amount)?;
        }
        for approval in &scenario.approve {
            bank.approve(
                &approval.token,
                &approval.owner,
                &approval.spender,
                approval.amount,
            );
        }

        info!(
            "Scenario ready: {} pools, {} mints, {} approvals",
            program.pool_length(),
            scenario.mint.len(),
            scenario.approve.len()
        );

        Ok(Self {
            bank,
            ledger,
            program,
            tick: 0,
            events: Vec::new(),
        })
    }

    pub fn bank(&self) -> &MemoryBank {
        &self.bank
    }

    pub fn ledger(&self) -> &DepositLedger {
        &self.ledger
    }

    pub fn program(&self) -> &StakingProgram {
        &self.program
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Replays one step and records its outcome.
    pub fn apply(&mut self, index: usize, step: &Step) -> Result<&Event, ScenarioError> {
        if step.tick < self.tick {
            return Err(ScenarioError::TickOrder {
                step: index,
                tick: step.tick,
                previous: self.tick,
            });
        }
        self.tick = step.tick;

        let ctx = CallContext::new(step.caller.clone(), step.tick);
        let outcome = self.dispatch(&ctx, &step.action);
        debug!("Step {} {}: {:?}", index, step.action.name(), outcome);

        let (ok, outcome) = match outcome {
            Ok(text) => (true, text),
            Err(text) => (false, text),
        };
        self.events.push(Event {
            step: index,
            tick: step.tick,
            caller: step.caller.clone(),
            action: step.action.name(),
            ok,
            outcome,
        });
        Ok(&self.events[self.events.len() - 1])
    }

    fn dispatch(&mut self, ctx: &CallContext, action: &Action) -> Result<String, String> {
        let Self {
            bank,
            ledger,
            program,
            ..
        } = self;

        match action {
            Action::Deposit { token, amount } => ledger
                .deposit(ctx, bank, token, *amount)
                .map(|balance| format!("deposited {} {} (balance {})", amount, token, balance))
                .map_err(|e| e.to_string()),
            Action::WithdrawAll => ledger
                .withdraw_all(ctx, bank)
                .map(|returned| format!("returned {}", describe(&returned)))
                .map_err(|e| e.to_string()),
            Action::Withdraw => program
                .withdraw(ctx, ledger, bank)
                .map(|receipt| {
                    format!(
                        "reward {}, forfeited {}, returned {}",
                        receipt.reward,
                        receipt.forfeited,
                        describe(&receipt.principal)
                    )
                })
                .map_err(|e| e.to_string()),
            Action::Harvest => program
                .harvest(ctx, ledger, bank)
                .map(|reward| format!("harvested {}", reward))
                .map_err(|e| e.to_string()),
            Action::Extend { ticks } => program
                .extend(ctx, *ticks)
                .map(|_| format!("end tick now {}", program.end_tick()))
                .map_err(|e| e.to_string()),
            Action::Terminate => program
                .terminate(ctx)
                .map(|_| format!("end tick now {}", program.end_tick()))
                .map_err(|e| e.to_string()),
            Action::SetLimit { token, limit } => ledger
                .set_global_limit(ctx, token, *limit)
                .map(|_| format!("{} limited to {}", token, limit))
                .map_err(|e| e.to_string()),
            Action::Cap {
                anchor,
                anchor_multiplier,
                token,
                self_multiplier,
            } => ledger
                .set_proportional_cap(ctx, anchor, *anchor_multiplier, token, *self_multiplier)
                .map(|_| {
                    format!(
                        "{} capped at {}/{} of {}",
                        token, self_multiplier, anchor_multiplier, anchor
                    )
                })
                .map_err(|e| e.to_string()),
            Action::ClearCaps { token } => ledger
                .clear_capacity_rules(ctx, token)
                .map(|_| format!("{} unconstrained", token))
                .map_err(|e| e.to_string()),
            Action::Pending => program
                .pending(ledger, &ctx.caller, ctx.tick)
                .map(|pending| format!("pending {}", pending))
                .map_err(|e| e.to_string()),
        }
    }

    pub fn report(&self, accounts: &BTreeSet<Address>) -> Result<Report, ScenarioError> {
        let reward_token = self.program.reward_token();
        let accounts = accounts
            .iter()
            .map(|account| -> Result<AccountReport, ScenarioError> {
                let deposits = self
                    .ledger
                    .tokens_of(account)
                    .iter()
                    .map(|token| (token.clone(), self.ledger.deposited(token, account)))
                    .collect();
                Ok(AccountReport {
                    account: account.clone(),
                    deposits,
                    pending: self.program.pending(&self.ledger, account, self.tick)?,
                    reward_balance: self.bank.balance_of(reward_token, account),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Report {
            final_tick: self.tick,
            end_tick: self.program.end_tick(),
            phase: self.program.phase(self.tick),
            paid_out: self.program.paid_out(),
            forfeited: self.program.forfeited(),
            events: self.events.clone(),
            accounts,
        })
    }
}

fn describe(amounts: &[(Address, Amount)]) -> String {
    amounts
        .iter()
        .map(|(token, amount)| format!("{} {}", amount, token))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Replays every step of `scenario` and reports the final state.
pub fn run(scenario: &Scenario) -> Result<Report, ScenarioError> {
    let mut simulation = Simulation::new(scenario)?;
    for (index, step) in scenario.steps.iter().enumerate() {
        simulation.apply(index, step)?;
    }
    simulation.report(&scenario.participants())
}
