//! Soft lock, direct ledger withdrawals and payout failures

use stake_core::{
    Address, Amount, CallContext, ErrorKind, MemoryBank, TokenBank, TransferError,
};
use stake_ledger::{DepositLedger, LedgerConfig};
use stake_program::{ProgramConfig, StakingError, StakingProgram, WithdrawReceipt};

fn addr(id: &str) -> Address {
    Address::new(id)
}

/// Bank that refuses every movement of one token.
struct RefusingBank {
    inner: MemoryBank,
    refused: Option<Address>,
}

impl RefusingBank {
    fn check(&self, token: &Address) -> Result<(), TransferError> {
        if self.refused.as_ref() == Some(token) {
            return Err(TransferError::Rejected(format!("{} is frozen", token)));
        }
        Ok(())
    }
}

impl TokenBank for RefusingBank {
    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.check(token)?;
        self.inner.transfer_from(token, spender, owner, to, amount)
    }

    fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.check(token)?;
        self.inner.transfer(token, from, to, amount)
    }

    fn balance_of(&self, token: &Address, account: &Address) -> Amount {
        self.inner.balance_of(token, account)
    }

    fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> Amount {
        self.inner.allowance(token, owner, spender)
    }
}

/// Program over [100, 1100) with the soft lock from 700; alice holds
/// 1000 T1 from tick 50.
fn setup(reward_allowance: Amount) -> (RefusingBank, DepositLedger, StakingProgram) {
    let mut inner = MemoryBank::new();
    inner.mint(&addr("T1"), &addr("alice"), 1000).unwrap();
    inner.approve(&addr("T1"), &addr("alice"), &addr("deposits"), 1000);
    inner.mint(&addr("REWARD"), &addr("owner"), 100_000).unwrap();
    inner.approve(&addr("REWARD"), &addr("owner"), &addr("staking"), reward_allowance);
    let mut bank = RefusingBank {
        inner,
        refused: None,
    };

    let mut ledger = DepositLedger::new(LedgerConfig {
        address: addr("deposits"),
        admin: addr("owner"),
    });
    ledger
        .set_trustee(&CallContext::new("owner", 0), addr("staking"))
        .unwrap();
    ledger
        .deposit(&CallContext::new("alice", 50), &mut bank, &addr("T1"), 1000)
        .unwrap();

    let mut program = StakingProgram::new(ProgramConfig {
        address: addr("staking"),
        admin: addr("owner"),
        ledger: addr("deposits"),
        reward_token: addr("REWARD"),
        start_tick: 100,
        end_tick: 1100,
        soft_lock_tick: 700,
    })
    .unwrap();
    program
        .add_pool_ratio(&CallContext::new("owner", 0), addr("T1"), 1, 1000)
        .unwrap();

    (bank, ledger, program)
}

fn withdraw_at(
    tick: u64,
    bank: &mut RefusingBank,
    ledger: &mut DepositLedger,
    program: &mut StakingProgram,
) -> stake_program::Result<WithdrawReceipt> {
    program.withdraw(&CallContext::new("alice", tick), ledger, bank)
}

#[test]
fn test_withdraw_before_soft_lock_pays() {
    let (mut bank, mut ledger, mut program) = setup(10_000);

    let receipt = withdraw_at(699, &mut bank, &mut ledger, &mut program).unwrap();
    assert_eq!(receipt.reward, 599);
    assert_eq!(receipt.forfeited, 0);
    assert_eq!(bank.balance_of(&addr("REWARD"), &addr("alice")), 599);
    assert_eq!(program.forfeited(), 0);
}

#[test]
fn test_withdraw_inside_soft_lock_forfeits() {
    let (mut bank, mut ledger, mut program) = setup(10_000);
    assert!(program.in_soft_lock(800));

    let receipt = withdraw_at(800, &mut bank, &mut ledger, &mut program).unwrap();
    assert_eq!(receipt.reward, 0);
    assert_eq!(receipt.forfeited, 700);
    assert_eq!(receipt.principal, vec![(addr("T1"), 1000)]);

    assert_eq!(bank.balance_of(&addr("REWARD"), &addr("alice")), 0);
    assert_eq!(bank.balance_of(&addr("T1"), &addr("alice")), 1000);
    assert_eq!(program.forfeited(), 700);
    assert_eq!(program.paid_out(), 0);

    // the forfeited span is settled and cannot be harvested later
    assert_eq!(program.pending(&ledger, &addr("alice"), 1100).unwrap(), 0);
}

#[test]
fn test_withdraw_at_end_pays_full_window() {
    let (mut bank, mut ledger, mut program) = setup(10_000);

    let receipt = withdraw_at(1100, &mut bank, &mut ledger, &mut program).unwrap();
    assert_eq!(receipt.reward, 1000);
    assert_eq!(program.paid_out(), 1000);
}

#[test]
fn test_terminated_program_has_no_soft_lock_left() {
    let (mut bank, mut ledger, mut program) = setup(10_000);
    program.terminate(&CallContext::new("owner", 399)).unwrap();

    let receipt = withdraw_at(800, &mut bank, &mut ledger, &mut program).unwrap();
    assert_eq!(receipt.reward, 300);
    assert_eq!(receipt.forfeited, 0);
}

#[test]
fn test_direct_ledger_withdrawal_keeps_earned_reward() {
    let (mut bank, mut ledger, mut program) = setup(10_000);

    ledger
        .withdraw_all(&CallContext::new("alice", 400), &mut bank)
        .unwrap();
    assert_eq!(bank.balance_of(&addr("T1"), &addr("alice")), 1000);

    // accrual stopped at 400
    assert_eq!(program.pending(&ledger, &addr("alice"), 900).unwrap(), 300);

    let err = withdraw_at(500, &mut bank, &mut ledger, &mut program).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NothingToWithdraw);

    let harvested = program
        .harvest(&CallContext::new("alice", 1100), &ledger, &mut bank)
        .unwrap();
    assert_eq!(harvested, 300);
}

#[test]
fn test_direct_ledger_exit_inside_soft_lock_forfeits_at_harvest() {
    let (mut bank, mut ledger, mut program) = setup(10_000);

    ledger
        .withdraw_all(&CallContext::new("alice", 800), &mut bank)
        .unwrap();
    assert!(program.exited_in_soft_lock(&ledger, &addr("T1"), &addr("alice"), 100));
    assert_eq!(program.pending(&ledger, &addr("alice"), 1100).unwrap(), 700);

    let harvested = program
        .harvest(&CallContext::new("alice", 1100), &ledger, &mut bank)
        .unwrap();
    assert_eq!(harvested, 0);
    assert_eq!(program.forfeited(), 700);
    assert_eq!(program.paid_out(), 0);
    assert_eq!(bank.balance_of(&addr("REWARD"), &addr("alice")), 0);

    let err = program
        .harvest(&CallContext::new("alice", 1100), &ledger, &mut bank)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NothingToHarvest);
}

#[test]
fn test_redeposit_after_soft_lock_exit_still_forfeits() {
    let (mut bank, mut ledger, mut program) = setup(10_000);

    ledger
        .withdraw_all(&CallContext::new("alice", 800), &mut bank)
        .unwrap();
    bank.inner
        .approve(&addr("T1"), &addr("alice"), &addr("deposits"), 1000);
    ledger
        .deposit(&CallContext::new("alice", 900), &mut bank, &addr("T1"), 1000)
        .unwrap();

    let receipt = withdraw_at(1100, &mut bank, &mut ledger, &mut program).unwrap();
    assert_eq!(receipt.reward, 0);
    assert_eq!(receipt.forfeited, 900);
    assert_eq!(receipt.principal, vec![(addr("T1"), 1000)]);
    assert_eq!(program.forfeited(), 900);
    assert_eq!(bank.balance_of(&addr("T1"), &addr("alice")), 1000);
}

#[test]
fn test_soft_lock_exit_after_termination_is_not_locked() {
    let (mut bank, mut ledger, mut program) = setup(10_000);
    program.terminate(&CallContext::new("owner", 399)).unwrap();

    ledger
        .withdraw_all(&CallContext::new("alice", 800), &mut bank)
        .unwrap();
    let harvested = program
        .harvest(&CallContext::new("alice", 900), &ledger, &mut bank)
        .unwrap();
    assert_eq!(harvested, 300);
    assert_eq!(program.forfeited(), 0);
}

#[test]
fn test_refused_principal_after_payout_keeps_settlement() {
    let (mut bank, mut ledger, mut program) = setup(10_000);
    bank.refused = Some(addr("T1"));

    let err = withdraw_at(300, &mut bank, &mut ledger, &mut program).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransferFailed);

    // reward went out, principal stayed on the ledger
    assert_eq!(bank.balance_of(&addr("REWARD"), &addr("alice")), 200);
    assert_eq!(program.paid_out(), 200);
    assert_eq!(program.last_settled(&addr("alice"), 0), 300);
    assert_eq!(ledger.deposited(&addr("T1"), &addr("alice")), 1000);

    bank.refused = None;
    let receipt = withdraw_at(400, &mut bank, &mut ledger, &mut program).unwrap();
    assert_eq!(receipt.reward, 100);
    assert_eq!(receipt.principal, vec![(addr("T1"), 1000)]);
}

#[test]
fn test_insufficient_allowance_changes_nothing() {
    let (mut bank, mut ledger, mut program) = setup(10);

    let err = withdraw_at(300, &mut bank, &mut ledger, &mut program).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransferFailed);
    assert!(matches!(
        err,
        StakingError::TransferFailed(TransferError::InsufficientAllowance { allowed: 10, .. })
    ));

    assert_eq!(ledger.deposited(&addr("T1"), &addr("alice")), 1000);
    assert_eq!(program.last_settled(&addr("alice"), 0), 100);
    assert_eq!(program.pending(&ledger, &addr("alice"), 300).unwrap(), 200);
    assert_eq!(program.paid_out(), 0);
}

#[test]
fn test_refused_payout_restores_settlement() {
    let (mut bank, mut ledger, mut program) = setup(10_000);
    bank.refused = Some(addr("REWARD"));

    let err = withdraw_at(300, &mut bank, &mut ledger, &mut program).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransferFailed);
    assert_eq!(ledger.deposited(&addr("T1"), &addr("alice")), 1000);
    assert_eq!(program.last_settled(&addr("alice"), 0), 100);
    assert_eq!(program.paid_out(), 0);

    let err = program
        .harvest(&CallContext::new("alice", 1100), &ledger, &mut bank)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransferFailed);
    assert_eq!(program.pending(&ledger, &addr("alice"), 1100).unwrap(), 1000);

    bank.refused = None;
    let harvested = program
        .harvest(&CallContext::new("alice", 1100), &ledger, &mut bank)
        .unwrap();
    assert_eq!(harvested, 1000);
}

#[test]
fn test_withdraw_requires_trustee() {
    let (mut bank, mut ledger, mut program) = setup(10_000);
    ledger
        .set_trustee(&CallContext::new("owner", 200), addr("someone-else"))
        .unwrap();

    let err = withdraw_at(300, &mut bank, &mut ledger, &mut program).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(program.last_settled(&addr("alice"), 0), 100);
    assert_eq!(bank.balance_of(&addr("REWARD"), &addr("alice")), 0);
}

#[test]
fn test_foreign_ledger_rejected() {
    let (mut bank, _ledger, mut program) = setup(10_000);
    let mut other = DepositLedger::new(LedgerConfig {
        address: addr("other-deposits"),
        admin: addr("owner"),
    });

    let err = withdraw_at(300, &mut bank, &mut other, &mut program).unwrap_err();
    assert!(matches!(err, StakingError::LedgerMismatch { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}
