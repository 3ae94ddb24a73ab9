//! External liquidity venues.
//!
//! An [`ExternalVenue`] is any liquidity source outside the native pools
//! that can quote a single hop and execute it against the shared ledger.
//! The router never trusts the reported output: it measures the
//! recipient's balance change.

use std::fmt;

use tracing::debug;

use crate::error::{AmmError, Result};
use crate::ledger::{atomically, AssetLedger};
use crate::math::mul_div;
use crate::types::price::BPS_DENOMINATOR;
use crate::types::{Address, AssetId};

/// Adapter for an external liquidity source.
pub trait ExternalVenue: fmt::Debug {
    fn name(&self) -> &str;

    /// Fixed gas estimate used to break ties between equal quotes.
    fn gas_estimate(&self) -> u64;

    /// Output for `amount_in`; an error or zero means "no quote".
    fn quote(&self, ledger: &dyn AssetLedger, token_in: AssetId, token_out: AssetId, amount_in: u64) -> Result<u64>;

    /// Take `amount_in` from `payer` and deliver `token_out` to `recipient`.
    /// Returns the amount the venue claims to have sent.
    fn execute(
        &mut self,
        ledger: &mut dyn AssetLedger,
        payer: Address,
        recipient: Address,
        token_in: AssetId,
        token_out: AssetId,
        amount_in: u64,
    ) -> Result<u64>;
}

/// Venue that trades one pair at a fixed rate from its own inventory.
///
/// `shortfall_bps` makes it deliver less than it quotes, which is how a
/// misbehaving venue looks to the router.
#[derive(Debug, Clone)]
pub struct FixedRateVenue {
    name: String,
    address: Address,
    token_in: AssetId,
    token_out: AssetId,
    rate_num: u64,
    rate_den: u64,
    gas: u64,
    shortfall_bps: u16,
}

impl FixedRateVenue {
    /// `amount_out = amount_in * rate_num / rate_den`
    pub fn new(
        name: impl Into<String>,
        address: Address,
        token_in: AssetId,
        token_out: AssetId,
        rate_num: u64,
        rate_den: u64,
        gas: u64,
    ) -> Self {
        Self {
            name: name.into(),
            address,
            token_in,
            token_out,
            rate_num,
            rate_den,
            gas,
            shortfall_bps: 0,
        }
    }

    pub fn with_shortfall(mut self, shortfall_bps: u16) -> Self {
        self.shortfall_bps = shortfall_bps.min(BPS_DENOMINATOR as u16);
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn rate_out(&self, amount_in: u64) -> Result<u64> {
        mul_div(amount_in, self.rate_num, self.rate_den)
            .ok_or_else(|| AmmError::AdapterFailed(format!("{}: rate overflow", self.name)))
    }
}

impl ExternalVenue for FixedRateVenue {
    fn name(&self) -> &str {
        &self.name
    }

    fn gas_estimate(&self) -> u64 {
        self.gas
    }

    fn quote(&self, ledger: &dyn AssetLedger, token_in: AssetId, token_out: AssetId, amount_in: u64) -> Result<u64> {
        if token_in != self.token_in || token_out != self.token_out {
            return Err(AmmError::AdapterFailed(format!("{}: unsupported pair", self.name)));
        }
        let out = self.rate_out(amount_in)?;
        let inventory = ledger.balance_of(self.token_out, self.address);
        if out > inventory {
            return Err(AmmError::AdapterFailed(format!("{}: inventory {} below {}", self.name, inventory, out)));
        }
        Ok(out)
    }

    fn execute(
        &mut self,
        ledger: &mut dyn AssetLedger,
        payer: Address,
        recipient: Address,
        token_in: AssetId,
        token_out: AssetId,
        amount_in: u64,
    ) -> Result<u64> {
        let quoted = self.quote(ledger, token_in, token_out, amount_in)?;
        let withheld = mul_div(quoted, self.shortfall_bps as u64, BPS_DENOMINATOR).unwrap_or(0);
        let delivered = quoted - withheld;
        let venue = self.address;
        atomically(ledger, |ledger| {
            ledger.transfer(token_in, payer, venue, amount_in)?;
            ledger.transfer(token_out, venue, recipient, delivered)
        })?;
        debug!(venue = %self.name, amount_in, quoted, delivered, "external venue executed");
        Ok(quoted)
    }
}
