//! Checkpointed deposit ledger
//!
//! Holds deposited principal per (token, account) as an append-only
//! [`CheckpointLog`], keeps a running total per token, enforces the capacity
//! policy, and lets a single trustee debit any depositor on their behalf.
//!
//! Every mutating operation commits its internal state before calling the
//! token bank and undoes that commit if the bank refuses the transfer.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use stake_core::{
    mul_div, Address, Amount, CallContext, Checkpoint, CheckpointLog, MathError, Recorded, Tick,
    TokenBank, TransferError, PRECISION,
};

use crate::capacity::{CapacityRule, CapacitySnapshot, ProportionalCap};
use crate::error::{LedgerError, Result};

/// Construction-time identity of a ledger instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Custody address that holds deposited tokens in the bank
    pub address: Address,
    /// May configure capacity rules and the trustee
    pub admin: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositLedger {
    config: LedgerConfig,
    trustee: Option<Address>,
    /// token -> account -> balance history
    logs: HashMap<Address, HashMap<Address, CheckpointLog>>,
    /// Tokens each account has ever deposited, in first-deposit order
    account_tokens: HashMap<Address, Vec<Address>>,
    totals: HashMap<Address, Amount>,
    rules: HashMap<Address, CapacityRule>,
}

/// Everything needed to reverse one committed balance change.
struct Undo {
    token: Address,
    account: Address,
    recorded: Recorded,
    total_before: Amount,
    first_deposit: bool,
}

impl DepositLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            trustee: None,
            logs: HashMap::new(),
            account_tokens: HashMap::new(),
            totals: HashMap::new(),
            rules: HashMap::new(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn address(&self) -> &Address {
        &self.config.address
    }

    pub fn admin(&self) -> &Address {
        &self.config.admin
    }

    pub fn trustee(&self) -> Option<&Address> {
        self.trustee.as_ref()
    }

    // ---- administration ----

    fn ensure_admin(&self, ctx: &CallContext, action: &'static str) -> Result<()> {
        if ctx.caller != self.config.admin {
            return Err(LedgerError::Unauthorized {
                caller: ctx.caller.clone(),
                action,
            });
        }
        Ok(())
    }

    /// Replaces the trustee. Only one trustee exists at a time.
    pub fn set_trustee(&mut self, ctx: &CallContext, trustee: Address) -> Result<()> {
        self.ensure_admin(ctx, "set the trustee")?;
        info!("Ledger {} trustee set to {}", self.config.address, trustee);
        self.trustee = Some(trustee);
        Ok(())
    }

    pub fn set_global_limit(&mut self, ctx: &CallContext, token: &Address, limit: Amount) -> Result<()> {
        self.ensure_admin(ctx, "set a deposit limit")?;
        self.rules.entry(token.clone()).or_default().global_limit = Some(limit);
        info!("Deposit limit for {} set to {}", token, limit);
        Ok(())
    }

    /// Caps each account's deposit of `token` at
    /// `deposited(anchor_token) * self_multiplier / anchor_multiplier`.
    pub fn set_proportional_cap(
        &mut self,
        ctx: &CallContext,
        anchor_token: &Address,
        anchor_multiplier: Amount,
        token: &Address,
        self_multiplier: Amount,
    ) -> Result<()> {
        self.ensure_admin(ctx, "set a proportional cap")?;
        if anchor_multiplier == 0 || self_multiplier == 0 {
            return Err(LedgerError::InvalidRule("multipliers must be non-zero".to_string()));
        }
        if anchor_token == token {
            return Err(LedgerError::InvalidRule(format!("{} cannot be capped by itself", token)));
        }

        self.rules.entry(token.clone()).or_default().proportional = Some(ProportionalCap {
            anchor_token: anchor_token.clone(),
            anchor_multiplier,
            self_multiplier,
        });
        info!(
            "Deposits of {} capped at {}/{} of {}",
            token, self_multiplier, anchor_multiplier, anchor_token
        );
        Ok(())
    }

    pub fn clear_capacity_rules(&mut self, ctx: &CallContext, token: &Address) -> Result<()> {
        self.ensure_admin(ctx, "clear capacity rules")?;
        self.rules.remove(token);
        info!("Capacity rules for {} cleared", token);
        Ok(())
    }

    pub fn capacity_rule(&self, token: &Address) -> Option<&CapacityRule> {
        self.rules.get(token)
    }

    // ---- queries ----

    fn log(&self, token: &Address, account: &Address) -> Option<&CheckpointLog> {
        self.logs.get(token).and_then(|accounts| accounts.get(account))
    }

    /// Current deposit of `token` by `account`
    pub fn deposited(&self, token: &Address, account: &Address) -> Amount {
        self.log(token, account).map(CheckpointLog::latest).unwrap_or(0)
    }

    pub fn total(&self, token: &Address) -> Amount {
        self.totals.get(token).copied().unwrap_or(0)
    }

    pub fn tokens_of(&self, account: &Address) -> &[Address] {
        self.account_tokens
            .get(account)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn checkpoints(&self, token: &Address, account: &Address) -> &[Checkpoint] {
        self.log(token, account)
            .map(CheckpointLog::entries)
            .unwrap_or(&[])
    }

    pub fn balance_at(&self, token: &Address, account: &Address, tick: Tick) -> Amount {
        self.log(token, account)
            .map(|log| log.balance_at(tick))
            .unwrap_or(0)
    }

    pub fn capacity_snapshot(&self, token: &Address, account: &Address) -> CapacitySnapshot {
        let anchor_deposited = self
            .rules
            .get(token)
            .and_then(|rule| rule.proportional.as_ref())
            .map(|cap| self.deposited(&cap.anchor_token, account))
            .unwrap_or(0);

        CapacitySnapshot {
            total: self.total(token),
            deposited: self.deposited(token, account),
            anchor_deposited,
        }
    }

    /// Largest amount `account` could deposit right now. `Amount::MAX` if unconstrained.
    pub fn max_deposit(&self, token: &Address, account: &Address) -> Result<Amount> {
        match self.rules.get(token) {
            Some(rule) => rule.max_additional(&self.capacity_snapshot(token, account)),
            None => Ok(Amount::MAX),
        }
    }

    /// `Σ balance × ticks held` over `[from, to)`, unscaled.
    pub fn accrued(&self, token: &Address, account: &Address, from: Tick, to: Tick) -> Result<u128> {
        match self.log(token, account) {
            Some(log) => Ok(log.integral(from, to)?),
            None => Ok(0),
        }
    }

    /// Reward for holding `token` over `[from, to)` at fixed-point `rate`.
    ///
    /// The exact balance integral is scaled down once for the whole interval,
    /// so splitting an interval can only lose reward to truncation. Callers
    /// settling in several steps may receive less than a single settlement.
    pub fn calc_reward(
        &self,
        token: &Address,
        account: &Address,
        rate: u128,
        from: Tick,
        to: Tick,
    ) -> Result<Amount> {
        let integral = self.accrued(token, account, from, to)?;
        let reward = mul_div(integral, rate, PRECISION)?;
        debug!(
            "Reward {} for {} on {} over [{}, {})",
            reward, account, token, from, to
        );
        Ok(reward)
    }

    // ---- balance changes ----

    /// Pulls `amount` of `token` from the caller into custody.
    /// Returns the caller's new deposit.
    pub fn deposit(
        &mut self,
        ctx: &CallContext,
        bank: &mut dyn TokenBank,
        token: &Address,
        amount: Amount,
    ) -> Result<Amount> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount("deposit must be positive".to_string()));
        }

        let account = &ctx.caller;
        let snapshot = self.capacity_snapshot(token, account);
        if let Some(rule) = self.rules.get(token) {
            if let Err(e) = rule.check_additional_deposit(&snapshot, amount) {
                debug!("Deposit of {} {} by {} refused: {}", amount, token, account, e);
                return Err(e);
            }
        }

        let balance = snapshot.deposited.checked_add(amount).ok_or(MathError::Overflow)?;
        let total = snapshot.total.checked_add(amount).ok_or(MathError::Overflow)?;
        let undo = self.apply(token, account, ctx.tick, balance, total)?;

        let custody = self.config.address.clone();
        if let Err(e) = bank.transfer_from(token, &custody, account, &custody, amount) {
            warn!("Deposit of {} {} by {} rolled back: {}", amount, token, account, e);
            self.revert(undo);
            return Err(e.into());
        }

        info!(
            "{} deposited {} {} at tick {} (balance {}, total {})",
            account, amount, token, ctx.tick, balance, total
        );
        Ok(balance)
    }

    /// Returns the caller's full deposit of every token, without touching any
    /// reward bookkeeping. Returns what was sent, per token.
    pub fn withdraw_all(
        &mut self,
        ctx: &CallContext,
        bank: &mut dyn TokenBank,
    ) -> Result<Vec<(Address, Amount)>> {
        let account = ctx.caller.clone();
        let holdings: Vec<(Address, Amount)> = self
            .tokens_of(&account)
            .iter()
            .map(|token| (token.clone(), self.deposited(token, &account)))
            .filter(|(_, amount)| *amount > 0)
            .collect();

        if holdings.is_empty() {
            return Err(LedgerError::NothingToWithdraw(account));
        }

        let custody = self.config.address.clone();
        for (token, amount) in &holdings {
            let available = bank.balance_of(token, &custody);
            if available < *amount {
                return Err(TransferError::InsufficientBalance {
                    token: token.clone(),
                    account: custody,
                    requested: *amount,
                    available,
                }
                .into());
            }
        }

        let mut undos = Vec::with_capacity(holdings.len());
        for (token, amount) in &holdings {
            let committed = self
                .total(token)
                .checked_sub(*amount)
                .ok_or(LedgerError::Math(MathError::Overflow))
                .and_then(|total| self.apply(token, &account, ctx.tick, 0, total));
            match committed {
                Ok(undo) => undos.push(undo),
                Err(e) => {
                    self.revert_all(undos);
                    return Err(e);
                }
            }
        }

        for (sent, (token, amount)) in holdings.iter().enumerate() {
            if let Err(e) = bank.transfer(token, &custody, &account, *amount) {
                warn!(
                    "Withdrawal of {} {} by {} failed after {} transfers: {}",
                    amount, token, account, sent, e
                );
                self.revert_all(undos.split_off(sent));
                return Err(e.into());
            }
            info!("{} withdrew {} {} at tick {}", account, amount, token, ctx.tick);
        }

        Ok(holdings)
    }

    /// Trustee-only: debits `amount` of `account`'s deposit and sends it to
    /// `recipient`.
    pub fn trustee_debit(
        &mut self,
        ctx: &CallContext,
        bank: &mut dyn TokenBank,
        token: &Address,
        account: &Address,
        amount: Amount,
        recipient: &Address,
    ) -> Result<()> {
        if self.trustee.as_ref() != Some(&ctx.caller) {
            return Err(LedgerError::Unauthorized {
                caller: ctx.caller.clone(),
                action: "debit deposits as trustee",
            });
        }
        if amount == 0 {
            return Err(LedgerError::InvalidAmount("debit must be positive".to_string()));
        }

        let available = self.deposited(token, account);
        if amount > available {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        let total = self.total(token).checked_sub(amount).ok_or(MathError::Overflow)?;
        let undo = self.apply(token, account, ctx.tick, available - amount, total)?;

        let custody = self.config.address.clone();
        if let Err(e) = bank.transfer(token, &custody, recipient, amount) {
            warn!(
                "Trustee debit of {} {} from {} rolled back: {}",
                amount, token, account, e
            );
            self.revert(undo);
            return Err(e.into());
        }

        info!(
            "Trustee {} debited {} {} from {} to {} at tick {}",
            ctx.caller, amount, token, account, recipient, ctx.tick
        );
        Ok(())
    }

    fn apply(
        &mut self,
        token: &Address,
        account: &Address,
        tick: Tick,
        balance: Amount,
        total: Amount,
    ) -> Result<Undo> {
        let log = self
            .logs
            .entry(token.clone())
            .or_default()
            .entry(account.clone())
            .or_default();
        let recorded = log.record(tick, balance)?;

        let total_before = self.totals.insert(token.clone(), total).unwrap_or(0);

        let tokens = self.account_tokens.entry(account.clone()).or_default();
        let first_deposit = !tokens.contains(token);
        if first_deposit {
            tokens.push(token.clone());
        }

        Ok(Undo {
            token: token.clone(),
            account: account.clone(),
            recorded,
            total_before,
            first_deposit,
        })
    }

    fn revert(&mut self, undo: Undo) {
        if let Some(log) = self
            .logs
            .get_mut(&undo.token)
            .and_then(|accounts| accounts.get_mut(&undo.account))
        {
            log.undo(undo.recorded);
        }
        self.totals.insert(undo.token.clone(), undo.total_before);
        if undo.first_deposit {
            if let Some(tokens) = self.account_tokens.get_mut(&undo.account) {
                tokens.retain(|t| t != &undo.token);
            }
        }
    }

    fn revert_all(&mut self, undos: Vec<Undo>) {
        for undo in undos.into_iter().rev() {
            self.revert(undo);
        }
    }
}
