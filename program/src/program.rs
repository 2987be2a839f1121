//! Multi-pool reward program
//!
//! Turns the deposit ledger's balance history into reward-token payouts over
//! the window `[start_tick, end_tick)`. The program keeps no copy of anyone's
//! principal: each pool's reward is the ledger's balance integral since the
//! account's last settlement, so deposits and withdrawals made directly on the
//! ledger are reflected automatically.
//!
//! Lifecycle: `Unstarted -> Active -> Ended`, or `Active -> Terminated` when
//! the administrator cuts the program short.
//!
//! Soft lock: a `withdraw` in `[soft_lock_tick, end_tick)` returns principal
//! but forfeits the reward it settles.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use stake_core::{Address, Amount, CallContext, MathError, Tick, TokenBank, TransferError};
use stake_ledger::{DepositLedger, LedgerError};

use crate::config::ProgramConfig;
use crate::error::{Result, StakingError};
use crate::pool::Pool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgramPhase {
    /// Before `start_tick`; pools may still be added
    Unstarted,
    /// Accruing; may be extended or terminated
    Active,
    /// Cut short by the administrator; accrues until the truncated end
    Terminated,
    /// Past `end_tick`; rewards are frozen and harvestable
    Ended,
}

/// Outcome of a [`StakingProgram::withdraw`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawReceipt {
    pub reward: Amount,
    pub forfeited: Amount,
    pub principal: Vec<(Address, Amount)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingProgram {
    config: ProgramConfig,
    pools: Vec<Pool>,
    end_tick: Tick,
    terminated_at: Option<Tick>,
    /// account -> last settled tick per pool index
    settlements: HashMap<Address, Vec<Tick>>,
    paid_out: Amount,
    forfeited: Amount,
}

/// Program bookkeeping an account's payout touches, for rollback.
struct SettlementSnapshot {
    account: Address,
    settlements: Option<Vec<Tick>>,
    paid_out: Amount,
    forfeited: Amount,
}

impl StakingProgram {
    pub fn new(config: ProgramConfig) -> Result<Self> {
        config.validate()?;
        let end_tick = config.end_tick;
        Ok(Self {
            config,
            pools: Vec::new(),
            end_tick,
            terminated_at: None,
            settlements: HashMap::new(),
            paid_out: 0,
            forfeited: 0,
        })
    }

    // ---- read surface ----

    pub fn config(&self) -> &ProgramConfig {
        &self.config
    }

    pub fn address(&self) -> &Address {
        &self.config.address
    }

    pub fn reward_token(&self) -> &Address {
        &self.config.reward_token
    }

    pub fn start_tick(&self) -> Tick {
        self.config.start_tick
    }

    pub fn end_tick(&self) -> Tick {
        self.end_tick
    }

    pub fn soft_lock_tick(&self) -> Tick {
        self.config.soft_lock_tick
    }

    /// Total reward paid to participants so far
    pub fn paid_out(&self) -> Amount {
        self.paid_out
    }

    /// Total reward withheld by soft-lock withdrawals
    pub fn forfeited(&self) -> Amount {
        self.forfeited
    }

    pub fn pool_length(&self) -> usize {
        self.pools.len()
    }

    pub fn pool_info(&self, index: usize) -> Option<&Pool> {
        self.pools.get(index)
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    pub fn terminated_at(&self) -> Option<Tick> {
        self.terminated_at
    }

    pub fn phase(&self, tick: Tick) -> ProgramPhase {
        if tick < self.config.start_tick {
            ProgramPhase::Unstarted
        } else if self.terminated_at.is_some() {
            ProgramPhase::Terminated
        } else if tick < self.end_tick {
            ProgramPhase::Active
        } else {
            ProgramPhase::Ended
        }
    }

    pub fn in_soft_lock(&self, tick: Tick) -> bool {
        tick >= self.config.soft_lock_tick && tick < self.end_tick
    }

    /// Whether `account`'s balance of `token` went down at a soft-locked tick
    /// after `from`. Covers exits through the ledger as well as through
    /// [`withdraw`](Self::withdraw).
    pub fn exited_in_soft_lock(
        &self,
        ledger: &DepositLedger,
        token: &Address,
        account: &Address,
        from: Tick,
    ) -> bool {
        let entries = ledger.checkpoints(token, account);
        let first = entries.partition_point(|c| c.tick <= from);
        let mut previous = match first {
            0 => 0,
            n => entries[n - 1].balance,
        };

        for checkpoint in entries[first..].iter().take_while(|c| c.tick < self.end_tick) {
            if checkpoint.balance < previous && self.in_soft_lock(checkpoint.tick) {
                return true;
            }
            previous = checkpoint.balance;
        }
        false
    }

    /// Tick up to which `pool` has been settled for `account`
    pub fn last_settled(&self, account: &Address, pool: usize) -> Tick {
        self.settlements
            .get(account)
            .and_then(|ticks| ticks.get(pool))
            .copied()
            .unwrap_or(self.config.start_tick)
    }

    /// Reward accrues up to the current tick, never past the end.
    fn accrual_end(&self, tick: Tick) -> Tick {
        tick.min(self.end_tick)
    }

    /// Unsettled reward per pool, in pool order.
    pub fn pending_by_pool(
        &self,
        ledger: &DepositLedger,
        account: &Address,
        tick: Tick,
    ) -> Result<Vec<Amount>> {
        self.ensure_ledger(ledger)?;
        let to = self.accrual_end(tick);

        self.pools
            .iter()
            .enumerate()
            .map(|(index, pool)| -> Result<Amount> {
                let from = self.last_settled(account, index);
                Ok(ledger.calc_reward(&pool.token, account, pool.reward_rate, from, to)?)
            })
            .collect()
    }

    /// Unsettled reward across all pools, before any soft-lock forfeiture
    pub fn pending(&self, ledger: &DepositLedger, account: &Address, tick: Tick) -> Result<Amount> {
        sum(self.pending_by_pool(ledger, account, tick)?)
    }

    // ---- administration ----

    fn ensure_admin(&self, ctx: &CallContext, action: &'static str) -> Result<()> {
        if ctx.caller != self.config.admin {
            return Err(StakingError::Unauthorized {
                caller: ctx.caller.clone(),
                action,
            });
        }
        Ok(())
    }

    fn ensure_ledger(&self, ledger: &DepositLedger) -> Result<()> {
        if ledger.address() != &self.config.ledger {
            return Err(StakingError::LedgerMismatch {
                expected: self.config.ledger.clone(),
                actual: ledger.address().clone(),
            });
        }
        Ok(())
    }

    /// Lifecycle gate for `extend` and `terminate`. A terminated program is
    /// not active even during its final tick, so `Terminated` is terminal.
    fn ensure_active(&self, tick: Tick) -> Result<()> {
        match self.phase(tick) {
            ProgramPhase::Active => Ok(()),
            phase => Err(StakingError::ProgramNotActive { phase, tick }),
        }
    }

    /// Adds a pool earning `reward_rate` (scaled by 10^36). Only possible
    /// before the program starts.
    pub fn add_pool(&mut self, ctx: &CallContext, token: Address, reward_rate: u128) -> Result<()> {
        self.ensure_admin(ctx, "add a pool")?;
        let pool = Pool::new(token, reward_rate)?;
        self.push_pool(ctx, pool)
    }

    /// Adds a pool paying `reward` reward-token units per `per` deposited
    /// units per tick.
    pub fn add_pool_ratio(
        &mut self,
        ctx: &CallContext,
        token: Address,
        reward: Amount,
        per: Amount,
    ) -> Result<()> {
        self.ensure_admin(ctx, "add a pool")?;
        let pool = Pool::from_ratio(token, reward, per)?;
        self.push_pool(ctx, pool)
    }

    fn push_pool(&mut self, ctx: &CallContext, pool: Pool) -> Result<()> {
        if ctx.tick >= self.config.start_tick {
            return Err(StakingError::ProgramAlreadyStarted {
                start_tick: self.config.start_tick,
                tick: ctx.tick,
            });
        }
        if self.pools.iter().any(|p| p.token == pool.token) {
            return Err(StakingError::InvalidPool(format!(
                "{} already has a pool",
                pool.token
            )));
        }

        info!(
            "Pool {} added for {} at rate {}",
            self.pools.len(),
            pool.token,
            pool.rate_f64()
        );
        self.pools.push(pool);
        Ok(())
    }

    /// Pushes `end_tick` back by `extra_ticks`. Only while active.
    pub fn extend(&mut self, ctx: &CallContext, extra_ticks: Tick) -> Result<()> {
        self.ensure_admin(ctx, "extend the program")?;
        self.ensure_active(ctx.tick)?;

        self.end_tick = self
            .end_tick
            .checked_add(extra_ticks)
            .ok_or(MathError::Overflow)?;
        info!("Program extended by {} ticks to {}", extra_ticks, self.end_tick);
        Ok(())
    }

    /// Ends the program after the current tick. Only while active.
    pub fn terminate(&mut self, ctx: &CallContext) -> Result<()> {
        self.ensure_admin(ctx, "terminate the program")?;
        self.ensure_active(ctx.tick)?;

        self.end_tick = ctx.tick + 1;
        self.terminated_at = Some(ctx.tick);
        info!("Program terminated at tick {}, ends at {}", ctx.tick, self.end_tick);
        Ok(())
    }

    // ---- participant operations ----

    /// Settles every pool the caller holds principal in, pays the reward (or
    /// forfeits it inside the soft lock), and returns all principal of those
    /// pools through the ledger's trustee path. Allowed at any tick.
    pub fn withdraw(
        &mut self,
        ctx: &CallContext,
        ledger: &mut DepositLedger,
        bank: &mut dyn TokenBank,
    ) -> Result<WithdrawReceipt> {
        self.ensure_ledger(ledger)?;
        let account = ctx.caller.clone();
        let settle_to = self.accrual_end(ctx.tick);

        let mut holdings = Vec::new();
        for (index, pool) in self.pools.iter().enumerate() {
            let principal = ledger.deposited(&pool.token, &account);
            if principal == 0 {
                continue;
            }
            let from = self.last_settled(&account, index);
            let reward = ledger.calc_reward(&pool.token, &account, pool.reward_rate, from, settle_to)?;
            let locked = self.in_soft_lock(ctx.tick)
                || self.exited_in_soft_lock(ledger, &pool.token, &account, from);
            debug!(
                "{} settles {} on pool {} over [{}, {}) (locked: {})",
                account, reward, index, from, settle_to, locked
            );
            holdings.push((index, pool.token.clone(), principal, reward, locked));
        }

        if holdings.is_empty() {
            return Err(StakingError::NothingToWithdraw(account));
        }

        let reward = sum(holdings.iter().filter(|h| !h.4).map(|h| h.3))?;
        let forfeited = sum(holdings.iter().filter(|h| h.4).map(|h| h.3))?;

        if ledger.trustee() != Some(&self.config.address) {
            return Err(LedgerError::Unauthorized {
                caller: self.config.address.clone(),
                action: "debit deposits as trustee",
            }
            .into());
        }
        for (_, token, principal, _, _) in &holdings {
            let available = bank.balance_of(token, ledger.address());
            if available < *principal {
                return Err(TransferError::InsufficientBalance {
                    token: token.clone(),
                    account: ledger.address().clone(),
                    requested: *principal,
                    available,
                }
                .into());
            }
        }
        self.ensure_payable(bank, reward)?;
        let paid_out = self.paid_out.checked_add(reward).ok_or(MathError::Overflow)?;
        let total_forfeited = self.forfeited.checked_add(forfeited).ok_or(MathError::Overflow)?;

        let snapshot = self.snapshot(&account);
        for (index, _, _, _, _) in &holdings {
            self.settle(&account, *index, settle_to);
        }
        self.paid_out = paid_out;
        self.forfeited = total_forfeited;

        if let Err(e) = self.pay(bank, &account, reward) {
            self.restore(snapshot);
            return Err(e.into());
        }
        if forfeited > 0 {
            info!(
                "{} withdrew inside the soft lock, forfeiting {} reward",
                account, forfeited
            );
        }

        // settlement is final from here; a refused principal transfer leaves
        // the remaining deposits on the ledger
        let program_ctx = ctx.as_caller(&self.config.address);
        let mut principal = Vec::with_capacity(holdings.len());
        for (_, token, amount, _, _) in &holdings {
            if let Err(e) = ledger.trustee_debit(&program_ctx, bank, token, &account, *amount, &account) {
                let kept = holdings
                    .iter()
                    .skip(principal.len())
                    .map(|(_, token, amount, _, _)| format!("{} {}", amount, token))
                    .collect::<Vec<_>>();
                warn!(
                    "{} was paid {} reward but principal [{}] stays on the ledger: {}",
                    account,
                    reward,
                    kept.join(", "),
                    e
                );
                return Err(e.into());
            }
            principal.push((token.clone(), *amount));
        }

        Ok(WithdrawReceipt {
            reward,
            forfeited,
            principal,
        })
    }

    /// Pays all unsettled reward once the program has ended and returns the
    /// amount paid. Principal stays on the ledger. Pools the account left
    /// during the soft lock, by any path, are settled but forfeited.
    pub fn harvest(
        &mut self,
        ctx: &CallContext,
        ledger: &DepositLedger,
        bank: &mut dyn TokenBank,
    ) -> Result<Amount> {
        self.ensure_ledger(ledger)?;
        if ctx.tick < self.end_tick {
            return Err(StakingError::ProgramNotEnded {
                end_tick: self.end_tick,
                tick: ctx.tick,
            });
        }

        let account = ctx.caller.clone();
        let by_pool = self.pending_by_pool(ledger, &account, ctx.tick)?;
        if by_pool.iter().all(|pending| *pending == 0) {
            return Err(StakingError::NothingToHarvest(account));
        }

        let mut reward: Amount = 0;
        let mut forfeited: Amount = 0;
        for (index, pending) in by_pool.into_iter().enumerate() {
            let from = self.last_settled(&account, index);
            let target = if self.exited_in_soft_lock(ledger, &self.pools[index].token, &account, from) {
                &mut forfeited
            } else {
                &mut reward
            };
            *target = target.checked_add(pending).ok_or(MathError::Overflow)?;
        }

        self.ensure_payable(bank, reward)?;
        let paid_out = self.paid_out.checked_add(reward).ok_or(MathError::Overflow)?;
        let total_forfeited = self.forfeited.checked_add(forfeited).ok_or(MathError::Overflow)?;

        let snapshot = self.snapshot(&account);
        let end_tick = self.end_tick;
        for index in 0..self.pools.len() {
            self.settle(&account, index, end_tick);
        }
        self.paid_out = paid_out;
        self.forfeited = total_forfeited;

        if let Err(e) = self.pay(bank, &account, reward) {
            self.restore(snapshot);
            return Err(e.into());
        }
        if forfeited > 0 {
            info!(
                "{} left during the soft lock, forfeiting {} reward at harvest",
                account, forfeited
            );
        }
        Ok(reward)
    }

    // ---- internals ----

    /// Advances a settlement; never moves it backwards.
    fn settle(&mut self, account: &Address, pool: usize, tick: Tick) {
        let start = self.config.start_tick;
        let ticks = self.settlements.entry(account.clone()).or_default();
        if ticks.len() < self.pools.len() {
            ticks.resize(self.pools.len(), start);
        }
        if let Some(settled) = ticks.get_mut(pool) {
            *settled = (*settled).max(tick);
        }
    }

    fn snapshot(&self, account: &Address) -> SettlementSnapshot {
        SettlementSnapshot {
            account: account.clone(),
            settlements: self.settlements.get(account).cloned(),
            paid_out: self.paid_out,
            forfeited: self.forfeited,
        }
    }

    fn restore(&mut self, snapshot: SettlementSnapshot) {
        match snapshot.settlements {
            Some(ticks) => {
                self.settlements.insert(snapshot.account, ticks);
            }
            None => {
                self.settlements.remove(&snapshot.account);
            }
        }
        self.paid_out = snapshot.paid_out;
        self.forfeited = snapshot.forfeited;
    }

    /// Fails before any state change if the administrator cannot fund `amount`.
    fn ensure_payable(&self, bank: &dyn TokenBank, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }

        let token = &self.config.reward_token;
        let admin = &self.config.admin;
        let allowed = bank.allowance(token, admin, &self.config.address);
        if allowed < amount {
            return Err(TransferError::InsufficientAllowance {
                token: token.clone(),
                owner: admin.clone(),
                spender: self.config.address.clone(),
                requested: amount,
                allowed,
            }
            .into());
        }

        let available = bank.balance_of(token, admin);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                token: token.clone(),
                account: admin.clone(),
                requested: amount,
                available,
            }
            .into());
        }
        Ok(())
    }

    /// Moves `amount` reward tokens from the administrator to `to`.
    fn pay(
        &self,
        bank: &mut dyn TokenBank,
        to: &Address,
        amount: Amount,
    ) -> std::result::Result<(), TransferError> {
        if amount == 0 {
            return Ok(());
        }
        match bank.transfer_from(
            &self.config.reward_token,
            &self.config.address,
            &self.config.admin,
            to,
            amount,
        ) {
            Ok(()) => {
                info!("Paid {} {} to {}", amount, self.config.reward_token, to);
                Ok(())
            }
            Err(e) => {
                warn!("Reward payment of {} to {} failed: {}", amount, to, e);
                Err(e)
            }
        }
    }
}

fn sum(amounts: impl IntoIterator<Item = Amount>) -> Result<Amount> {
    amounts
        .into_iter()
        .try_fold(0u128, |acc, amount| acc.checked_add(amount))
        .ok_or_else(|| MathError::Overflow.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stake_core::{ErrorKind, PRECISION};

    fn program() -> StakingProgram {
        StakingProgram::new(ProgramConfig {
            address: Address::new("staking"),
            admin: Address::new("owner"),
            ledger: Address::new("deposits"),
            reward_token: Address::new("REWARD"),
            start_tick: 100,
            end_tick: 1100,
            soft_lock_tick: 700,
        })
        .unwrap()
    }

    fn owner(tick: Tick) -> CallContext {
        CallContext::new("owner", tick)
    }

    #[test]
    fn test_phases() {
        let mut program = program();
        assert_eq!(program.phase(99), ProgramPhase::Unstarted);
        assert_eq!(program.phase(100), ProgramPhase::Active);
        assert_eq!(program.phase(1099), ProgramPhase::Active);
        assert_eq!(program.phase(1100), ProgramPhase::Ended);

        program.terminate(&owner(300)).unwrap();
        assert_eq!(program.end_tick(), 301);
        assert_eq!(program.phase(300), ProgramPhase::Terminated);
        assert_eq!(program.phase(5000), ProgramPhase::Terminated);
    }

    #[test]
    fn test_add_pool_before_start_only() {
        let mut program = program();

        program.add_pool_ratio(&owner(99), Address::new("T1"), 1, 1000).unwrap();
        assert_eq!(program.pool_length(), 1);
        assert_eq!(
            program.pool_info(0),
            Some(&Pool::new(Address::new("T1"), PRECISION / 1000).unwrap())
        );

        let dup = program.add_pool(&owner(99), Address::new("T1"), 5).unwrap_err();
        assert_eq!(dup.kind(), ErrorKind::InvalidInput);
        let zero = program.add_pool(&owner(99), Address::new("T3"), 0).unwrap_err();
        assert_eq!(zero.kind(), ErrorKind::InvalidInput);

        let err = program
            .add_pool_ratio(&owner(100), Address::new("T2"), 2, 500)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProgramAlreadyStarted);
    }

    #[test]
    fn test_admin_only() {
        let mut program = program();
        let alice = CallContext::new("alice", 50);

        let err = program.add_pool_ratio(&alice, Address::new("T1"), 1, 1000).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        let alice = CallContext::new("alice", 150);
        assert_eq!(program.extend(&alice, 10).unwrap_err().kind(), ErrorKind::Unauthorized);
        assert_eq!(program.terminate(&alice).unwrap_err().kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_extend_and_terminate_need_active_program() {
        let mut program = program();
        assert!(matches!(
            program.extend(&owner(50), 10),
            Err(StakingError::ProgramNotActive {
                phase: ProgramPhase::Unstarted,
                ..
            })
        ));

        program.extend(&owner(150), 500).unwrap();
        assert_eq!(program.end_tick(), 1600);

        program.terminate(&owner(199)).unwrap();
        assert_eq!(program.end_tick(), 200);
        // refused even within the final tick
        assert_eq!(program.extend(&owner(199), 1).unwrap_err().kind(), ErrorKind::ProgramNotActive);
        assert_eq!(program.terminate(&owner(199)).unwrap_err().kind(), ErrorKind::ProgramNotActive);
    }

    #[test]
    fn test_extend_after_end_refused() {
        let mut program = program();
        let err = program.extend(&owner(1100), 10).unwrap_err();
        assert!(matches!(
            err,
            StakingError::ProgramNotActive {
                phase: ProgramPhase::Ended,
                tick: 1100
            }
        ));
    }

    #[test]
    fn test_soft_lock_window() {
        let program = program();
        assert!(!program.in_soft_lock(699));
        assert!(program.in_soft_lock(700));
        assert!(program.in_soft_lock(1099));
        assert!(!program.in_soft_lock(1100));
    }

    #[test]
    fn test_settlement_defaults_to_start_and_never_regresses() {
        let mut program = program();
        program.add_pool_ratio(&owner(1), Address::new("T1"), 1, 1000).unwrap();
        let alice = Address::new("alice");

        assert_eq!(program.last_settled(&alice, 0), 100);
        program.settle(&alice, 0, 50);
        assert_eq!(program.last_settled(&alice, 0), 100);
        program.settle(&alice, 0, 400);
        assert_eq!(program.last_settled(&alice, 0), 400);
    }
}
