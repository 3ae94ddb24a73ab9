//! Collaborator interfaces consumed by the pool and the router.
//!
//! ## Asset ledger
//!
//! The fungible-asset ledger is owned by the host. The kernel only moves
//! balances through [`AssetLedger`] and never assumes a transfer delivered
//! the stated amount: pools and the router measure balance deltas.
//!
//! Every state-changing kernel call opens a [`Checkpoint`] and either
//! commits it or reverts to it, so a failing call leaves balances untouched.
//! Checkpoints nest (a routed swap wraps the per-pool swaps it performs).
//!
//! ## Fee discounts
//!
//! [`FeeDiscountOracle`] reports a trader's fee discount in basis points.
//! `None` means the registry is unavailable and the discount is zero.

use std::collections::BTreeMap;

use crate::error::{AmmError, Result};
use crate::types::price::BPS_DENOMINATOR;
use crate::types::{Address, AssetId};

/// Position in a ledger's undo journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// Fungible-asset ledger collaborator.
pub trait AssetLedger {
    fn balance_of(&self, asset: AssetId, holder: Address) -> u64;

    fn total_supply(&self, asset: AssetId) -> u64;

    /// Move `amount` from `from` to `to`. Non-standard assets may deliver
    /// less than `amount`; callers measure the recipient's balance delta.
    fn transfer(&mut self, asset: AssetId, from: Address, to: Address, amount: u64) -> Result<()>;

    fn mint(&mut self, asset: AssetId, to: Address, amount: u64) -> Result<()>;

    fn burn(&mut self, asset: AssetId, from: Address, amount: u64) -> Result<()>;

    /// Open a nested checkpoint.
    fn checkpoint(&mut self) -> Checkpoint;

    /// Keep every change made since `cp` and close it.
    fn commit(&mut self, cp: Checkpoint);

    /// Undo every change made since `cp` and close it.
    fn revert_to(&mut self, cp: Checkpoint);
}

/// Run `f` inside a ledger checkpoint: commit on `Ok`, revert on `Err`.
pub fn atomically<L, T, F>(ledger: &mut L, f: F) -> Result<T>
where
    L: AssetLedger + ?Sized,
    F: FnOnce(&mut L) -> Result<T>,
{
    let cp = ledger.checkpoint();
    match f(ledger) {
        Ok(value) => {
            ledger.commit(cp);
            Ok(value)
        }
        Err(err) => {
            ledger.revert_to(cp);
            Err(err)
        }
    }
}

/// Staking-tier fee discount registry.
pub trait FeeDiscountOracle {
    /// Discount in bps, `[0, 10_000)`; `None` if unavailable.
    fn discount_bps(&self, trader: Address) -> Option<u16>;
}

/// Fixed discount table, for tests and single-node deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscounts {
    discounts: BTreeMap<Address, u16>,
}

impl StaticDiscounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, trader: Address, discount_bps: u16) -> Self {
        self.set(trader, discount_bps);
        self
    }

    pub fn set(&mut self, trader: Address, discount_bps: u16) {
        self.discounts.insert(trader, discount_bps);
    }
}

impl FeeDiscountOracle for StaticDiscounts {
    fn discount_bps(&self, trader: Address) -> Option<u16> {
        Some(self.discounts.get(&trader).copied().unwrap_or(0))
    }
}

// ============================================================================
// In-memory ledger
// ============================================================================

#[derive(Debug, Clone)]
enum JournalEntry {
    Balance { key: (AssetId, Address), previous: u64 },
    Supply { asset: AssetId, previous: u64 },
}

/// Reference [`AssetLedger`] with an undo journal.
///
/// Assets registered with a transfer fee model fee-on-transfer tokens: the
/// recipient is credited `amount - fee` and the fee is destroyed.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    balances: BTreeMap<(AssetId, Address), u64>,
    supplies: BTreeMap<AssetId, u64>,
    transfer_fee_bps: BTreeMap<AssetId, u16>,
    journal: Vec<JournalEntry>,
    open_checkpoints: usize,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge `fee_bps` on every transfer of `asset`.
    pub fn set_transfer_fee(&mut self, asset: AssetId, fee_bps: u16) {
        self.transfer_fee_bps.insert(asset, fee_bps.min(BPS_DENOMINATOR as u16));
    }

    /// Number of checkpoints not yet committed or reverted.
    pub fn open_checkpoints(&self) -> usize {
        self.open_checkpoints
    }

    fn set_balance(&mut self, asset: AssetId, holder: Address, value: u64) {
        let key = (asset, holder);
        let previous = self.balances.get(&key).copied().unwrap_or(0);
        if self.open_checkpoints > 0 {
            self.journal.push(JournalEntry::Balance { key, previous });
        }
        if value == 0 {
            self.balances.remove(&key);
        } else {
            self.balances.insert(key, value);
        }
    }

    fn set_supply(&mut self, asset: AssetId, value: u64) {
        let previous = self.supplies.get(&asset).copied().unwrap_or(0);
        if self.open_checkpoints > 0 {
            self.journal.push(JournalEntry::Supply { asset, previous });
        }
        self.supplies.insert(asset, value);
    }

    fn debit(&mut self, asset: AssetId, holder: Address, amount: u64) -> Result<()> {
        let available = self.balance_of(asset, holder);
        let remaining = available.checked_sub(amount).ok_or(AmmError::InsufficientBalance {
            asset,
            holder,
            available,
            required: amount,
        })?;
        self.set_balance(asset, holder, remaining);
        Ok(())
    }

    fn credit(&mut self, asset: AssetId, holder: Address, amount: u64) -> Result<()> {
        let balance = self
            .balance_of(asset, holder)
            .checked_add(amount)
            .ok_or(AmmError::Overflow)?;
        self.set_balance(asset, holder, balance);
        Ok(())
    }
}

impl AssetLedger for InMemoryLedger {
    fn balance_of(&self, asset: AssetId, holder: Address) -> u64 {
        self.balances.get(&(asset, holder)).copied().unwrap_or(0)
    }

    fn total_supply(&self, asset: AssetId) -> u64 {
        self.supplies.get(&asset).copied().unwrap_or(0)
    }

    fn transfer(&mut self, asset: AssetId, from: Address, to: Address, amount: u64) -> Result<()> {
        if amount == 0 || from == to {
            return Ok(());
        }
        let fee_bps = self.transfer_fee_bps.get(&asset).copied().unwrap_or(0) as u128;
        let fee = ((amount as u128) * fee_bps / BPS_DENOMINATOR as u128) as u64;

        atomically(self, |ledger| {
            ledger.debit(asset, from, amount)?;
            ledger.credit(asset, to, amount - fee)?;
            if fee > 0 {
                let supply = ledger.total_supply(asset).saturating_sub(fee);
                ledger.set_supply(asset, supply);
            }
            Ok(())
        })
    }

    fn mint(&mut self, asset: AssetId, to: Address, amount: u64) -> Result<()> {
        let supply = self
            .total_supply(asset)
            .checked_add(amount)
            .ok_or(AmmError::Overflow)?;
        self.credit(asset, to, amount)?;
        self.set_supply(asset, supply);
        Ok(())
    }

    fn burn(&mut self, asset: AssetId, from: Address, amount: u64) -> Result<()> {
        self.debit(asset, from, amount)?;
        let supply = self.total_supply(asset).saturating_sub(amount);
        self.set_supply(asset, supply);
        Ok(())
    }

    fn checkpoint(&mut self) -> Checkpoint {
        self.open_checkpoints += 1;
        Checkpoint(self.journal.len())
    }

    fn commit(&mut self, _cp: Checkpoint) {
        self.open_checkpoints = self.open_checkpoints.saturating_sub(1);
        if self.open_checkpoints == 0 {
            self.journal.clear();
        }
    }

    fn revert_to(&mut self, cp: Checkpoint) {
        while self.journal.len() > cp.0 {
            match self.journal.pop() {
                Some(JournalEntry::Balance { key, previous }) => {
                    if previous == 0 {
                        self.balances.remove(&key);
                    } else {
                        self.balances.insert(key, previous);
                    }
                }
                Some(JournalEntry::Supply { asset, previous }) => {
                    self.supplies.insert(asset, previous);
                }
                None => break,
            }
        }
        self.open_checkpoints = self.open_checkpoints.saturating_sub(1);
        if self.open_checkpoints == 0 {
            self.journal.clear();
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
