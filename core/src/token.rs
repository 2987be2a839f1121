//! Fungible token collaborator
//!
//! The ledger and the reward program never hold balances of their own; they
//! move tokens through a [`TokenBank`]. [`MemoryBank`] is a multi-token,
//! in-process implementation with standard mint/approve/transfer semantics.

use std::collections::HashMap;
use thiserror::Error;

use crate::{Address, Amount};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Insufficient {token} balance for {account}: requested {requested}, available {available}")]
    InsufficientBalance {
        token: Address,
        account: Address,
        requested: Amount,
        available: Amount,
    },

    #[error("Insufficient {token} allowance from {owner} to {spender}: requested {requested}, allowed {allowed}")]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        requested: Amount,
        allowed: Amount,
    },

    #[error("Transfer rejected: {0}")]
    Rejected(String),
}

/// Standard fungible-token operations, keyed by token address.
///
/// Implementations must be all-or-nothing: an `Err` means no balance moved.
pub trait TokenBank {
    /// `spender` moves `amount` of `owner`'s tokens to `to`, consuming allowance.
    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError>;

    /// `from` moves `amount` of its own tokens to `to`.
    fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError>;

    fn balance_of(&self, token: &Address, account: &Address) -> Amount;

    fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> Amount;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBank {
    balances: HashMap<Address, HashMap<Address, Amount>>,
    allowances: HashMap<Address, HashMap<(Address, Address), Amount>>,
    supplies: HashMap<Address, Amount>,
}

impl MemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, token: &Address, to: &Address, amount: Amount) -> Result<(), TransferError> {
        let supply = self.supplies.entry(token.clone()).or_insert(0);
        *supply = supply
            .checked_add(amount)
            .ok_or_else(|| TransferError::Rejected(format!("{} supply overflow", token)))?;

        let balance = self
            .balances
            .entry(token.clone())
            .or_default()
            .entry(to.clone())
            .or_insert(0);
        *balance += amount;
        Ok(())
    }

    /// Sets (not adds to) the allowance `owner` grants `spender`.
    pub fn approve(&mut self, token: &Address, owner: &Address, spender: &Address, amount: Amount) {
        self.allowances
            .entry(token.clone())
            .or_default()
            .insert((owner.clone(), spender.clone()), amount);
    }

    pub fn total_supply(&self, token: &Address) -> Amount {
        self.supplies.get(token).copied().unwrap_or(0)
    }

    fn debit_credit(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let available = self.balance_of(token, from);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                token: token.clone(),
                account: from.clone(),
                requested: amount,
                available,
            });
        }

        let holders = self.balances.entry(token.clone()).or_default();
        holders.insert(from.clone(), available - amount);
        *holders.entry(to.clone()).or_insert(0) += amount;
        Ok(())
    }
}

impl TokenBank for MemoryBank {
    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let allowed = self.allowance(token, owner, spender);
        if allowed < amount {
            return Err(TransferError::InsufficientAllowance {
                token: token.clone(),
                owner: owner.clone(),
                spender: spender.clone(),
                requested: amount,
                allowed,
            });
        }

        self.debit_credit(token, owner, to, amount)?;
        self.approve(token, owner, spender, allowed - amount);
        Ok(())
    }

    fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.debit_credit(token, from, to, amount)
    }

    fn balance_of(&self, token: &Address, account: &Address) -> Amount {
        self.balances
            .get(token)
            .and_then(|holders| holders.get(account))
            .copied()
            .unwrap_or(0)
    }

    fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(token)
            .and_then(|grants| grants.get(&(owner.clone(), spender.clone())))
            .copied()
            .unwrap_or(0)
    }
}
