//! Constant-product reserve ledger for one asset pair.
//!
//! ## Atomicity
//!
//! Every mutating call runs in two phases:
//!
//! 1. **Compute**: validate inputs, quote, move assets through the ledger
//!    inside a checkpoint. Any failure reverts the checkpoint and returns
//!    before the pool has been touched.
//! 2. **Commit**: infallible field updates (TWAP, rewards, shares,
//!    reserves, volume statistics).
//!
//! A failing call therefore leaves both the ledger and the pool exactly as
//! they were.
//!
//! ## Example
//!
//! ```
//! use dark_amm::config::PoolConfig;
//! use dark_amm::ledger::{AssetLedger, InMemoryLedger};
//! use dark_amm::pool::{AddLiquidity, Pool, SwapParams};
//! use dark_amm::types::{Address, AssetId, Env};
//!
//! let (a, b) = (AssetId(1), AssetId(2));
//! let alice = Address(10);
//! let mut ledger = InMemoryLedger::new();
//! ledger.mint(a, alice, 200_000).unwrap();
//! ledger.mint(b, alice, 100_000).unwrap();
//!
//! let mut pool = Pool::new(Address(500), a, b, PoolConfig::default()).unwrap();
//! let env = Env::new(1, 1_000);
//! let added = pool
//!     .add_liquidity(&mut ledger, env, alice, AddLiquidity::new(100_000, 50_000, alice, 2_000))
//!     .unwrap();
//! assert_eq!(added.shares, 69_710);
//!
//! let out = pool
//!     .swap(&mut ledger, env, alice, SwapParams::exact_in(1_000, true, 0, alice, 2_000))
//!     .unwrap();
//! assert_eq!(out.amount_out, 493);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::PoolConfig;
use crate::error::{AmmError, Result};
use crate::ledger::{atomically, AssetLedger, FeeDiscountOracle};
use crate::math::{self, isqrt, mul_div, MINIMUM_LIQUIDITY};
use crate::pool::rewards::{LiquidityPosition, RewardAccrual};
use crate::pool::twap::{TwapAccumulator, TwapPrice};
use crate::types::price::scaled_price;
use crate::types::{Address, AssetId, Env, PoolSnapshot, VolumeWindow};

/// Traders tracked before expired volume windows are pruned.
const VOLUME_PRUNE_THRESHOLD: usize = 4_096;

/// Discount registry shared between pools.
pub type SharedDiscountOracle = Arc<dyn FeeDiscountOracle + Send + Sync>;

// ============================================================================
// Call parameters and results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddLiquidity {
    pub amount_a_desired: u64,
    pub amount_b_desired: u64,
    pub amount_a_min: u64,
    pub amount_b_min: u64,
    /// Receives the minted shares
    pub to: Address,
    pub deadline: u64,
}

impl AddLiquidity {
    /// Deposit with no lower bounds.
    pub fn new(amount_a: u64, amount_b: u64, to: Address, deadline: u64) -> Self {
        Self {
            amount_a_desired: amount_a,
            amount_b_desired: amount_b,
            amount_a_min: 0,
            amount_b_min: 0,
            to,
            deadline,
        }
    }

    pub fn with_minimums(mut self, amount_a_min: u64, amount_b_min: u64) -> Self {
        self.amount_a_min = amount_a_min;
        self.amount_b_min = amount_b_min;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidityAdded {
    pub amount_a: u64,
    pub amount_b: u64,
    pub shares: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveLiquidity {
    pub shares: u64,
    pub amount_a_min: u64,
    pub amount_b_min: u64,
    /// Receives the withdrawn assets
    pub to: Address,
    pub deadline: u64,
}

impl RemoveLiquidity {
    pub fn new(shares: u64, to: Address, deadline: u64) -> Self {
        Self {
            shares,
            amount_a_min: 0,
            amount_b_min: 0,
            to,
            deadline,
        }
    }

    pub fn with_minimums(mut self, amount_a_min: u64, amount_b_min: u64) -> Self {
        self.amount_a_min = amount_a_min;
        self.amount_b_min = amount_b_min;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidityRemoved {
    pub amount_a: u64,
    pub amount_b: u64,
    pub shares: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapParams {
    pub amount_in: u64,
    /// True if asset A is sold for asset B
    pub a_in: bool,
    pub min_amount_out: u64,
    pub to: Address,
    pub deadline: u64,
}

impl SwapParams {
    pub fn exact_in(amount_in: u64, a_in: bool, min_amount_out: u64, to: Address, deadline: u64) -> Self {
        Self {
            amount_in,
            a_in,
            min_amount_out,
            to,
            deadline,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapOutcome {
    pub token_in: AssetId,
    pub token_out: AssetId,
    /// Amount the pool actually received (balance delta)
    pub amount_in: u64,
    pub amount_out: u64,
    /// Part of the input retained as LP fee
    pub fee_amount: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reserves {
    pub reserve_a: u64,
    pub reserve_b: u64,
    pub last_update_time: u64,
}

// ============================================================================
// Pool
// ============================================================================

#[derive(Clone)]
pub struct Pool {
    pub(super) address: Address,
    pub(super) token_a: AssetId,
    pub(super) token_b: AssetId,
    pub(super) reserve_a: u64,
    pub(super) reserve_b: u64,
    pub(super) share_supply: u64,
    pub(super) k_last: u128,
    pub(super) last_update_time: u64,
    pub(super) twap: TwapAccumulator,
    pub(super) rewards: RewardAccrual,
    pub(super) positions: BTreeMap<Address, LiquidityPosition>,
    pub(super) trader_volume: BTreeMap<Address, VolumeWindow>,
    pub(super) global_volume: VolumeWindow,
    pub(super) config: PoolConfig,
    pub(super) oracle: Option<SharedDiscountOracle>,
    /// Id of the outstanding flash loan, if any
    pub(super) loan: Option<u64>,
    pub(super) next_loan_id: u64,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("address", &self.address)
            .field("token_a", &self.token_a)
            .field("token_b", &self.token_b)
            .field("reserve_a", &self.reserve_a)
            .field("reserve_b", &self.reserve_b)
            .field("share_supply", &self.share_supply)
            .field("k_last", &self.k_last)
            .field("positions", &self.positions.len())
            .field("loan", &self.loan)
            .finish()
    }
}

impl Pool {
    /// Create an empty pool for `(token_a, token_b)` held at `address`.
    pub fn new(address: Address, token_a: AssetId, token_b: AssetId, config: PoolConfig) -> Result<Self> {
        if token_a == token_b {
            return Err(AmmError::IdenticalAssets(token_a));
        }
        config.validate()?;
        Ok(Self {
            address,
            token_a,
            token_b,
            reserve_a: 0,
            reserve_b: 0,
            share_supply: 0,
            k_last: 0,
            last_update_time: 0,
            twap: TwapAccumulator::new(config.twap_window_secs, config.twap_max_observations),
            rewards: RewardAccrual::new(config.reward_rate_per_day),
            positions: BTreeMap::new(),
            trader_volume: BTreeMap::new(),
            global_volume: VolumeWindow::default(),
            config,
            oracle: None,
            loan: None,
            next_loan_id: 1,
        })
    }

    pub fn with_discount_oracle(mut self, oracle: SharedDiscountOracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn set_discount_oracle(&mut self, oracle: Option<SharedDiscountOracle>) {
        self.oracle = oracle;
    }

    // ========================================================================
    // Read-only views
    // ========================================================================

    #[inline]
    pub fn address(&self) -> Address {
        self.address
    }

    #[inline]
    pub fn token_a(&self) -> AssetId {
        self.token_a
    }

    #[inline]
    pub fn token_b(&self) -> AssetId {
        self.token_b
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn get_reserves(&self) -> Reserves {
        Reserves {
            reserve_a: self.reserve_a,
            reserve_b: self.reserve_b,
            last_update_time: self.last_update_time,
        }
    }

    #[inline]
    pub fn share_supply(&self) -> u64 {
        self.share_supply
    }

    #[inline]
    pub fn k_last(&self) -> u128 {
        self.k_last
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.loan.is_some()
    }

    pub fn has_liquidity(&self) -> bool {
        self.reserve_a > 0 && self.reserve_b > 0
    }

    pub fn contains(&self, asset: AssetId) -> bool {
        asset == self.token_a || asset == self.token_b
    }

    /// Direction flag for selling `token_in`: true if it is asset A.
    pub fn direction(&self, token_in: AssetId) -> Result<bool> {
        if token_in == self.token_a {
            Ok(true)
        } else if token_in == self.token_b {
            Ok(false)
        } else {
            Err(AmmError::UnknownAsset(token_in))
        }
    }

    /// The pair asset opposite `asset`.
    pub fn other(&self, asset: AssetId) -> Result<AssetId> {
        Ok(if self.direction(asset)? { self.token_b } else { self.token_a })
    }

    /// `(reserve_in, reserve_out)` for a swap direction.
    pub fn reserves_for(&self, a_in: bool) -> (u64, u64) {
        if a_in {
            (self.reserve_a, self.reserve_b)
        } else {
            (self.reserve_b, self.reserve_a)
        }
    }

    /// Provider's position; zeroed if it never deposited.
    pub fn position(&self, owner: Address) -> LiquidityPosition {
        self.positions.get(&owner).copied().unwrap_or_default()
    }

    /// Spot price of asset A in units of asset B, scaled by 10^8.
    pub fn spot_price(&self) -> Option<u128> {
        scaled_price(self.reserve_b, self.reserve_a)
    }

    /// Windowed average prices from the TWAP accumulator.
    pub fn twap_price(&self, now: u64) -> Result<TwapPrice> {
        self.twap.average(self.reserve_a, self.reserve_b, now)
    }

    pub fn twap(&self) -> &TwapAccumulator {
        &self.twap
    }

    pub fn rewards(&self) -> &RewardAccrual {
        &self.rewards
    }

    /// Pending rewards including the tail not yet folded into the position.
    pub fn get_pending_rewards(&self, provider: Address, now: u64) -> u64 {
        match self.positions.get(&provider) {
            Some(position) => self.rewards.pending(position, now, self.share_supply),
            None => 0,
        }
    }

    /// Input volume `trader` has swapped through this pool in the current day.
    pub fn trader_volume(&self, trader: Address, now: u64) -> u128 {
        self.trader_volume
            .get(&trader)
            .map(|w| w.rolled(now).spent)
            .unwrap_or(0)
    }

    pub fn global_volume(&self, now: u64) -> u128 {
        self.global_volume.rolled(now).spent
    }

    /// Drop per-trader windows that have rolled over at `now`.
    pub fn prune_volume(&mut self, now: u64) {
        self.trader_volume.retain(|_, window| !window.is_expired(now));
    }

    pub fn tracked_traders(&self) -> usize {
        self.trader_volume.len()
    }

    /// Pool state for verification and hashing.
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            token_a: self.token_a.0,
            token_b: self.token_b.0,
            reserve_a: self.reserve_a,
            reserve_b: self.reserve_b,
            share_supply: self.share_supply,
            k_last: self.k_last,
            price_a_cumulative: self.twap.price_a_cumulative,
            price_b_cumulative: self.twap.price_b_cumulative,
            last_update_time: self.last_update_time,
        }
    }

    pub fn state_root(&self) -> [u8; 32] {
        self.snapshot().state_root()
    }

    // ========================================================================
    // Quoting
    // ========================================================================

    /// Effective fee for `trader` in 1/`FEE_PRECISION` units.
    pub fn fee_for(&self, trader: Address) -> u64 {
        let discount = self
            .oracle
            .as_ref()
            .and_then(|oracle| oracle.discount_bps(trader))
            .unwrap_or(0);
        math::effective_fee(self.config.base_fee_bps, discount)
    }

    /// Output for `amount_in` against the given reserves at `trader`'s fee.
    pub fn get_amount_out(&self, amount_in: u64, reserve_in: u64, reserve_out: u64, trader: Address) -> Result<u64> {
        math::amount_out(amount_in, reserve_in, reserve_out, self.fee_for(trader))
    }

    /// Input needed for `amount_out` against the given reserves (rounded up).
    pub fn get_amount_in(&self, amount_out: u64, reserve_in: u64, reserve_out: u64, trader: Address) -> Result<u64> {
        math::amount_in(amount_out, reserve_in, reserve_out, self.fee_for(trader))
    }

    /// Output for selling `amount_in` of `token_in` against live reserves.
    pub fn quote_out(&self, token_in: AssetId, amount_in: u64, trader: Address) -> Result<u64> {
        let (reserve_in, reserve_out) = self.reserves_for(self.direction(token_in)?);
        self.get_amount_out(amount_in, reserve_in, reserve_out, trader)
    }

    /// Output a [`Pool::swap`] of `amount_in` would produce right now, with
    /// the same lock, liquidity and price-impact checks but no minimum.
    pub fn simulate_swap(&self, token_in: AssetId, amount_in: u64, trader: Address) -> Result<u64> {
        self.ensure_unlocked()?;
        let a_in = self.direction(token_in)?;
        if !self.has_liquidity() {
            return Err(AmmError::NoLiquidity);
        }
        let (reserve_in, reserve_out) = self.reserves_for(a_in);
        guarded_amount_out(
            amount_in,
            reserve_in,
            reserve_out,
            self.fee_for(trader),
            0,
            self.config.max_price_impact_bps as u64,
        )
    }

    // ========================================================================
    // Liquidity
    // ========================================================================

    /// Deposit both assets and mint shares to `params.to`.
    ///
    /// On an empty pool the desired amounts are taken as-is and
    /// `sqrt(a * b) - MINIMUM_LIQUIDITY` shares are minted, the remainder
    /// being locked at the burn address. Otherwise the deposit is fitted to
    /// the current ratio.
    pub fn add_liquidity(
        &mut self,
        ledger: &mut dyn AssetLedger,
        env: Env,
        provider: Address,
        params: AddLiquidity,
    ) -> Result<LiquidityAdded> {
        self.ensure_unlocked()?;
        env.check_deadline(params.deadline)?;
        if params.amount_a_desired == 0 || params.amount_b_desired == 0 {
            return Err(AmmError::ZeroAmount);
        }
        if self.share_supply > 0 && !self.has_liquidity() {
            return Err(AmmError::NoLiquidity);
        }

        let (amount_a, amount_b) = self.optimal_amounts(&params)?;
        let fee_shares = self.protocol_fee_shares();
        let supply = self.share_supply.checked_add(fee_shares).ok_or(AmmError::Overflow)?;
        let (pool, token_a, token_b) = (self.address, self.token_a, self.token_b);
        let (reserve_a, reserve_b) = (self.reserve_a, self.reserve_b);

        let staged = atomically(ledger, |ledger| {
            let received_a = pull(ledger, token_a, provider, pool, amount_a)?;
            let received_b = pull(ledger, token_b, provider, pool, amount_b)?;

            let (shares, locked) = if supply == 0 {
                // sqrt of a u64 product always fits in u64
                let root = isqrt(math::k(received_a, received_b)) as u64;
                if root <= MINIMUM_LIQUIDITY {
                    return Err(AmmError::InsufficientLiquidityMinted);
                }
                (root - MINIMUM_LIQUIDITY, MINIMUM_LIQUIDITY)
            } else {
                let by_a = mul_div(received_a, supply, reserve_a).ok_or(AmmError::Overflow)?;
                let by_b = mul_div(received_b, supply, reserve_b).ok_or(AmmError::Overflow)?;
                (by_a.min(by_b), 0)
            };
            if shares == 0 {
                return Err(AmmError::InsufficientLiquidityMinted);
            }
            supply
                .checked_add(shares + locked)
                .ok_or(AmmError::Overflow)?;
            let new_reserve_a = reserve_a.checked_add(received_a).ok_or(AmmError::Overflow)?;
            let new_reserve_b = reserve_b.checked_add(received_b).ok_or(AmmError::Overflow)?;
            Ok((received_a, received_b, shares, locked, new_reserve_a, new_reserve_b))
        })?;
        let (received_a, received_b, shares, locked, new_reserve_a, new_reserve_b) = staged;

        // commit
        let now = env.timestamp;
        self.twap.update(self.reserve_a, self.reserve_b, now);
        self.accrue_position(params.to, now);
        self.mint_protocol_fee(fee_shares, now);
        if locked > 0 {
            self.credit_shares(Address::BURN, locked, now);
        }
        self.credit_shares(params.to, shares, now);
        self.reserve_a = new_reserve_a;
        self.reserve_b = new_reserve_b;
        self.refresh_k_last();
        self.last_update_time = now;

        info!(
            pool = %self.address,
            provider = %provider,
            to = %params.to,
            amount_a = received_a,
            amount_b = received_b,
            shares,
            "liquidity added"
        );
        Ok(LiquidityAdded {
            amount_a: received_a,
            amount_b: received_b,
            shares,
        })
    }

    /// Burn `params.shares` of `owner`'s shares and send the pro-rata
    /// reserves to `params.to`.
    pub fn remove_liquidity(
        &mut self,
        ledger: &mut dyn AssetLedger,
        env: Env,
        owner: Address,
        params: RemoveLiquidity,
    ) -> Result<LiquidityRemoved> {
        if owner == Address::BURN {
            return Err(AmmError::LockedShares);
        }
        self.ensure_unlocked()?;
        env.check_deadline(params.deadline)?;
        if params.shares == 0 {
            return Err(AmmError::ZeroAmount);
        }
        let held = self.position(owner).shares;
        if params.shares > held {
            return Err(AmmError::InsufficientShares {
                owner,
                held,
                requested: params.shares,
            });
        }

        let fee_shares = self.protocol_fee_shares();
        let supply = self.share_supply.checked_add(fee_shares).ok_or(AmmError::Overflow)?;
        let amount_a = mul_div(params.shares, self.reserve_a, supply).ok_or(AmmError::Overflow)?;
        let amount_b = mul_div(params.shares, self.reserve_b, supply).ok_or(AmmError::Overflow)?;
        if amount_a == 0 || amount_b == 0 {
            return Err(AmmError::InsufficientLiquidityBurned);
        }
        if amount_a < params.amount_a_min || amount_b < params.amount_b_min {
            return Err(AmmError::InsufficientAmount);
        }

        let (pool, token_a, token_b) = (self.address, self.token_a, self.token_b);
        atomically(ledger, |ledger| {
            ledger.transfer(token_a, pool, params.to, amount_a)?;
            ledger.transfer(token_b, pool, params.to, amount_b)
        })?;

        // commit
        let now = env.timestamp;
        self.twap.update(self.reserve_a, self.reserve_b, now);
        self.accrue_position(owner, now);
        self.mint_protocol_fee(fee_shares, now);
        if let Some(position) = self.positions.get_mut(&owner) {
            position.shares -= params.shares;
        }
        self.share_supply -= params.shares;
        self.reserve_a -= amount_a;
        self.reserve_b -= amount_b;
        self.refresh_k_last();
        self.last_update_time = now;

        info!(
            pool = %self.address,
            owner = %owner,
            to = %params.to,
            amount_a,
            amount_b,
            shares = params.shares,
            "liquidity removed"
        );
        Ok(LiquidityRemoved {
            amount_a,
            amount_b,
            shares: params.shares,
        })
    }

    /// Move shares between providers, accruing rewards for both first.
    pub fn transfer_shares(&mut self, env: Env, from: Address, to: Address, shares: u64) -> Result<()> {
        if from == Address::BURN {
            return Err(AmmError::LockedShares);
        }
        self.ensure_unlocked()?;
        if shares == 0 {
            return Err(AmmError::ZeroAmount);
        }
        let held = self.position(from).shares;
        if shares > held {
            return Err(AmmError::InsufficientShares {
                owner: from,
                held,
                requested: shares,
            });
        }
        if from == to {
            return Ok(());
        }

        let now = env.timestamp;
        self.accrue_position(from, now);
        self.accrue_position(to, now);
        if let Some(position) = self.positions.get_mut(&from) {
            position.shares -= shares;
        }
        if let Some(position) = self.positions.get_mut(&to) {
            position.shares += shares;
        }
        debug!(pool = %self.address, from = %from, to = %to, shares, "shares transferred");
        Ok(())
    }

    // ========================================================================
    // Swap
    // ========================================================================

    /// Sell `params.amount_in` of one asset for the other.
    ///
    /// The output is quoted on the amount the pool actually received, so
    /// fee-on-transfer assets are priced on what arrived.
    pub fn swap(
        &mut self,
        ledger: &mut dyn AssetLedger,
        env: Env,
        trader: Address,
        params: SwapParams,
    ) -> Result<SwapOutcome> {
        self.ensure_unlocked()?;
        env.check_deadline(params.deadline)?;
        if params.amount_in == 0 {
            return Err(AmmError::InsufficientInputAmount);
        }
        if !self.has_liquidity() {
            return Err(AmmError::NoLiquidity);
        }

        let (token_in, token_out) = if params.a_in {
            (self.token_a, self.token_b)
        } else {
            (self.token_b, self.token_a)
        };
        let (reserve_in, reserve_out) = self.reserves_for(params.a_in);
        let fee = self.fee_for(trader);
        let max_impact = self.config.max_price_impact_bps as u64;
        let quoted = guarded_amount_out(params.amount_in, reserve_in, reserve_out, fee, params.min_amount_out, max_impact)?;
        let pool = self.address;

        let staged = atomically(ledger, |ledger| {
            let received = pull(ledger, token_in, trader, pool, params.amount_in)?;
            let amount_out = if received == params.amount_in {
                quoted
            } else {
                guarded_amount_out(received, reserve_in, reserve_out, fee, params.min_amount_out, max_impact)?
            };
            ledger.transfer(token_out, pool, params.to, amount_out)?;

            let balance_in = reserve_in.checked_add(received).ok_or(AmmError::Overflow)?;
            let balance_out = reserve_out.checked_sub(amount_out).ok_or(AmmError::InsufficientLiquidity)?;
            let fee_amount = received - math::net_input(received, fee)?;
            math::check_invariant(reserve_in, reserve_out, balance_in, balance_out, fee_amount)?;
            Ok((received, amount_out, fee_amount, balance_in, balance_out))
        })?;
        let (received, amount_out, fee_amount, balance_in, balance_out) = staged;

        // commit
        let now = env.timestamp;
        self.twap.update(self.reserve_a, self.reserve_b, now);
        if params.a_in {
            self.reserve_a = balance_in;
            self.reserve_b = balance_out;
        } else {
            self.reserve_b = balance_in;
            self.reserve_a = balance_out;
        }
        let window = self.trader_volume.get(&trader).copied().unwrap_or_else(|| VolumeWindow::new(now));
        self.trader_volume.insert(trader, window.record(now, received as u128));
        if self.trader_volume.len() > VOLUME_PRUNE_THRESHOLD {
            self.prune_volume(now);
        }
        self.global_volume = self.global_volume.record(now, received as u128);
        self.last_update_time = now;

        info!(
            pool = %self.address,
            trader = %trader,
            token_in = %token_in,
            token_out = %token_out,
            amount_in = received,
            amount_out,
            fee_amount,
            "swap"
        );
        Ok(SwapOutcome {
            token_in,
            token_out,
            amount_in: received,
            amount_out,
            fee_amount,
        })
    }

    // ========================================================================
    // Rewards
    // ========================================================================

    /// Mint `provider`'s pending rewards in the reward asset.
    pub fn claim_rewards(&mut self, ledger: &mut dyn AssetLedger, env: Env, provider: Address) -> Result<u64> {
        self.ensure_unlocked()?;
        let now = env.timestamp;
        let amount = self.get_pending_rewards(provider, now);
        if amount == 0 {
            return Ok(0);
        }
        let asset = self
            .config
            .reward_asset
            .ok_or_else(|| AmmError::InvalidConfig("rewards accrued without a reward asset".to_string()))?;
        atomically(ledger, |ledger| ledger.mint(asset, provider, amount))?;

        // commit
        self.accrue_position(provider, now);
        if let Some(position) = self.positions.get_mut(&provider) {
            position.pending_rewards = 0;
        }
        self.rewards.total_claimed = self.rewards.total_claimed.saturating_add(amount);

        info!(pool = %self.address, provider = %provider, amount, "rewards claimed");
        Ok(amount)
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Set reserves to the pool's measured balances.
    pub fn sync(&mut self, ledger: &dyn AssetLedger, env: Env) -> Result<()> {
        self.ensure_unlocked()?;
        let balance_a = ledger.balance_of(self.token_a, self.address);
        let balance_b = ledger.balance_of(self.token_b, self.address);
        self.twap.update(self.reserve_a, self.reserve_b, env.timestamp);
        self.reserve_a = balance_a;
        self.reserve_b = balance_b;
        self.last_update_time = env.timestamp;
        debug!(pool = %self.address, reserve_a = balance_a, reserve_b = balance_b, "synced");
        Ok(())
    }

    /// Send balances held above the reserves to `to`.
    pub fn skim(&mut self, ledger: &mut dyn AssetLedger, to: Address) -> Result<(u64, u64)> {
        self.ensure_unlocked()?;
        let excess_a = ledger.balance_of(self.token_a, self.address).saturating_sub(self.reserve_a);
        let excess_b = ledger.balance_of(self.token_b, self.address).saturating_sub(self.reserve_b);
        let (pool, token_a, token_b) = (self.address, self.token_a, self.token_b);
        atomically(ledger, |ledger| {
            ledger.transfer(token_a, pool, to, excess_a)?;
            ledger.transfer(token_b, pool, to, excess_b)
        })?;
        Ok((excess_a, excess_b))
    }

    // ========================================================================
    // Internal
    // ========================================================================

    pub(super) fn ensure_unlocked(&self) -> Result<()> {
        if self.loan.is_some() {
            return Err(AmmError::Locked);
        }
        Ok(())
    }

    fn optimal_amounts(&self, params: &AddLiquidity) -> Result<(u64, u64)> {
        if !self.has_liquidity() {
            return Ok((params.amount_a_desired, params.amount_b_desired));
        }
        let b_optimal = math::quote(params.amount_a_desired, self.reserve_a, self.reserve_b)?;
        if b_optimal <= params.amount_b_desired {
            if b_optimal < params.amount_b_min {
                return Err(AmmError::InsufficientAmount);
            }
            return Ok((params.amount_a_desired, b_optimal));
        }
        let a_optimal = math::quote(params.amount_b_desired, self.reserve_b, self.reserve_a)?;
        if a_optimal > params.amount_a_desired || a_optimal < params.amount_a_min {
            return Err(AmmError::InsufficientAmount);
        }
        Ok((a_optimal, params.amount_b_desired))
    }

    /// Shares owed to the protocol for fee growth since the last liquidity
    /// event: one sixth of the growth in `sqrt(k)`.
    fn protocol_fee_shares(&self) -> u64 {
        if self.config.protocol_fee_to.is_none() || self.k_last == 0 {
            return 0;
        }
        let root_k = isqrt(math::k(self.reserve_a, self.reserve_b));
        let root_k_last = isqrt(self.k_last);
        if root_k <= root_k_last {
            return 0;
        }
        let numerator = self.share_supply as u128 * (root_k - root_k_last);
        let denominator = root_k * 5 + root_k_last;
        u64::try_from(numerator / denominator).unwrap_or(0)
    }

    fn mint_protocol_fee(&mut self, fee_shares: u64, now: u64) {
        if fee_shares == 0 {
            return;
        }
        if let Some(fee_to) = self.config.protocol_fee_to {
            self.credit_shares(fee_to, fee_shares, now);
            debug!(pool = %self.address, fee_to = %fee_to, shares = fee_shares, "protocol fee minted");
        }
    }

    fn refresh_k_last(&mut self) {
        self.k_last = if self.config.protocol_fee_to.is_some() {
            math::k(self.reserve_a, self.reserve_b)
        } else {
            0
        };
    }

    fn accrue_position(&mut self, owner: Address, now: u64) {
        let supply = self.share_supply;
        let position = self
            .positions
            .entry(owner)
            .or_insert_with(|| LiquidityPosition::new(now));
        self.rewards.accrue(position, now, supply);
    }

    fn credit_shares(&mut self, owner: Address, shares: u64, now: u64) {
        self.accrue_position(owner, now);
        if let Some(position) = self.positions.get_mut(&owner) {
            position.shares = position.shares.saturating_add(shares);
        }
        self.share_supply = self.share_supply.saturating_add(shares);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Transfer `amount` of `asset` into `pool` and return what actually arrived.
fn pull(ledger: &mut dyn AssetLedger, asset: AssetId, from: Address, pool: Address, amount: u64) -> Result<u64> {
    let before = ledger.balance_of(asset, pool);
    ledger.transfer(asset, from, pool, amount)?;
    Ok(ledger.balance_of(asset, pool).saturating_sub(before))
}

/// Quote plus the zero-output, price-impact and slippage checks.
fn guarded_amount_out(
    amount_in: u64,
    reserve_in: u64,
    reserve_out: u64,
    fee: u64,
    min_amount_out: u64,
    max_impact_bps: u64,
) -> Result<u64> {
    let amount_out = math::amount_out(amount_in, reserve_in, reserve_out, fee)?;
    if amount_out == 0 {
        return Err(AmmError::InsufficientOutputAmount);
    }
    let impact_bps = math::price_impact_bps(reserve_in, reserve_out, amount_in, amount_out);
    if impact_bps > max_impact_bps {
        return Err(AmmError::ExcessivePriceImpact {
            impact_bps,
            max_bps: max_impact_bps,
        });
    }
    if amount_out < min_amount_out {
        return Err(AmmError::SlippageExceeded {
            minimum: min_amount_out,
            actual: amount_out,
        });
    }
    Ok(amount_out)
}

// ============================================================================
// Unit Tests
// ============================================================================
