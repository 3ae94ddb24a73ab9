//! Flash loans as an explicit two-phase protocol.
//!
//! ```text
//! lend ──► LoanHandle ──► (caller uses the assets) ──► settle
//! ```
//!
//! While a loan is outstanding the pool is locked: every other mutating
//! call fails with [`AmmError::Locked`]. [`Pool::settle`] checks that each
//! lent asset's pool balance is back to its pre-loan level plus the fee,
//! folds the surplus into the reserves and releases the lock.
//!
//! [`Pool::flash_loan`] runs all three steps with the caller's logic as a
//! continuation and reverts the ledger and the lock if any step fails.

use tracing::{info, warn};

use crate::error::{AmmError, Result};
use crate::ledger::{atomically, AssetLedger};
use crate::pool::Pool;
use crate::types::price::BPS_DENOMINATOR;
use crate::types::{Address, Env};

/// Proof of an outstanding loan. Consumed by [`Pool::settle`].
#[derive(Debug, PartialEq, Eq)]
pub struct LoanHandle {
    id: u64,
    pool: Address,
    borrower: Address,
    amount_a: u64,
    amount_b: u64,
    fee_a: u64,
    fee_b: u64,
    balance_a_before: u64,
    balance_b_before: u64,
}

impl LoanHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn borrower(&self) -> Address {
        self.borrower
    }

    pub fn amounts(&self) -> (u64, u64) {
        (self.amount_a, self.amount_b)
    }

    pub fn fees(&self) -> (u64, u64) {
        (self.fee_a, self.fee_b)
    }

    /// Amounts that must be returned to the pool, fee included.
    pub fn repayment(&self) -> (u64, u64) {
        (
            self.amount_a.saturating_add(self.fee_a),
            self.amount_b.saturating_add(self.fee_b),
        )
    }
}

/// What a settled loan added to the reserves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashSettlement {
    pub gain_a: u64,
    pub gain_b: u64,
}

impl Pool {
    /// Flash fee on `amount`, rounded up so no loan is free.
    pub fn flash_fee(&self, amount: u64) -> u64 {
        let numerator = amount as u128 * self.config.flash_fee_bps as u128;
        let fee = numerator.div_ceil(BPS_DENOMINATOR as u128);
        u64::try_from(fee).unwrap_or(u64::MAX)
    }

    /// Send `amount_a` / `amount_b` to `borrower` and lock the pool.
    pub fn lend(
        &mut self,
        ledger: &mut dyn AssetLedger,
        borrower: Address,
        amount_a: u64,
        amount_b: u64,
    ) -> Result<LoanHandle> {
        self.ensure_unlocked()?;
        if amount_a == 0 && amount_b == 0 {
            return Err(AmmError::ZeroAmount);
        }
        if (amount_a > 0 && amount_a >= self.reserve_a) || (amount_b > 0 && amount_b >= self.reserve_b) {
            return Err(AmmError::InsufficientLiquidity);
        }

        let (pool, token_a, token_b) = (self.address, self.token_a, self.token_b);
        let balance_a_before = ledger.balance_of(token_a, pool);
        let balance_b_before = ledger.balance_of(token_b, pool);
        atomically(ledger, |ledger| {
            ledger.transfer(token_a, pool, borrower, amount_a)?;
            ledger.transfer(token_b, pool, borrower, amount_b)
        })?;

        let id = self.next_loan_id;
        self.next_loan_id += 1;
        self.loan = Some(id);

        info!(pool = %pool, borrower = %borrower, loan_id = id, amount_a, amount_b, "flash loan opened");
        Ok(LoanHandle {
            id,
            pool,
            borrower,
            amount_a,
            amount_b,
            fee_a: self.flash_fee(amount_a),
            fee_b: self.flash_fee(amount_b),
            balance_a_before,
            balance_b_before,
        })
    }

    /// Verify repayment, fold the surplus into the reserves and unlock.
    ///
    /// On failure the loan stays open; the caller is expected to abort the
    /// surrounding transaction.
    pub fn settle(&mut self, ledger: &dyn AssetLedger, env: Env, handle: LoanHandle) -> Result<FlashSettlement> {
        let not_repaid = AmmError::FlashLoanNotRepaid { loan_id: handle.id };
        if self.loan != Some(handle.id) || handle.pool != self.address {
            return Err(not_repaid);
        }

        let balance_a = ledger.balance_of(self.token_a, self.address);
        let balance_b = ledger.balance_of(self.token_b, self.address);
        let required_a = handle.balance_a_before.checked_add(handle.fee_a).ok_or(AmmError::Overflow)?;
        let required_b = handle.balance_b_before.checked_add(handle.fee_b).ok_or(AmmError::Overflow)?;
        if balance_a < required_a || balance_b < required_b {
            warn!(pool = %self.address, loan_id = handle.id, balance_a, balance_b, required_a, required_b, "flash loan not repaid");
            return Err(not_repaid);
        }

        let gain_a = balance_a - handle.balance_a_before;
        let gain_b = balance_b - handle.balance_b_before;
        let reserve_a = self.reserve_a.checked_add(gain_a).ok_or(AmmError::Overflow)?;
        let reserve_b = self.reserve_b.checked_add(gain_b).ok_or(AmmError::Overflow)?;

        // commit
        self.twap.update(self.reserve_a, self.reserve_b, env.timestamp);
        self.reserve_a = reserve_a;
        self.reserve_b = reserve_b;
        self.last_update_time = env.timestamp;
        self.loan = None;

        info!(pool = %self.address, loan_id = handle.id, gain_a, gain_b, "flash loan settled");
        Ok(FlashSettlement { gain_a, gain_b })
    }

    /// Lend, run `continuation`, settle; revert everything on failure.
    pub fn flash_loan<F>(
        &mut self,
        ledger: &mut dyn AssetLedger,
        env: Env,
        borrower: Address,
        amount_a: u64,
        amount_b: u64,
        continuation: F,
    ) -> Result<FlashSettlement>
    where
        F: FnOnce(&mut dyn AssetLedger, &LoanHandle) -> Result<()>,
    {
        let prior_loan = self.loan;
        let prior_next_id = self.next_loan_id;
        let cp = ledger.checkpoint();

        let result = self
            .lend(ledger, borrower, amount_a, amount_b)
            .and_then(|handle| {
                continuation(&mut *ledger, &handle)?;
                self.settle(&*ledger, env, handle)
            });

        match result {
            Ok(settlement) => {
                ledger.commit(cp);
                Ok(settlement)
            }
            Err(err) => {
                ledger.revert_to(cp);
                self.loan = prior_loan;
                self.next_loan_id = prior_next_id;
                warn!(pool = %self.address, borrower = %borrower, error = %err, "flash loan reverted");
                Err(err)
            }
        }
    }
}
