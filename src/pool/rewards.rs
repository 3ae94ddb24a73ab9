//! Liquidity-provider reward streaming.
//!
//! A pool streams `rate_per_day` reward units across its whole share
//! supply. A position's share of the stream accrues lazily, whenever the
//! position is touched:
//!
//! ```text
//! accrued = elapsed * rate_per_day * shares / (86_400 * total_shares)
//! ```

use crate::types::SECONDS_PER_DAY;

/// A provider's stake in one pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiquidityPosition {
    pub shares: u64,
    /// Time up to which rewards have been accrued into `pending_rewards`
    pub last_reward_time: u64,
    pub pending_rewards: u64,
}

impl LiquidityPosition {
    pub fn new(now: u64) -> Self {
        Self {
            shares: 0,
            last_reward_time: now,
            pending_rewards: 0,
        }
    }
}

/// Reward stream parameters plus running totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewardAccrual {
    pub rate_per_day: u64,
    pub total_accrued: u64,
    pub total_claimed: u64,
}

impl RewardAccrual {
    pub fn new(rate_per_day: u64) -> Self {
        Self {
            rate_per_day,
            total_accrued: 0,
            total_claimed: 0,
        }
    }

    /// Rewards earned by `position` between its last accrual and `now`,
    /// given the pool's current share supply. Floors.
    pub fn earned(&self, position: &LiquidityPosition, now: u64, total_shares: u64) -> u64 {
        if self.rate_per_day == 0 || position.shares == 0 || total_shares == 0 {
            return 0;
        }
        let elapsed = now.saturating_sub(position.last_reward_time) as u128;
        let rate = self.rate_per_day as u128;
        let shares = position.shares as u128;
        let denominator = SECONDS_PER_DAY as u128 * total_shares as u128;

        let earned = match elapsed.checked_mul(rate).and_then(|x| x.checked_mul(shares)) {
            Some(numerator) => numerator / denominator,
            // rate * shares always fits; divide before the time factor
            None => (rate * shares / total_shares as u128).saturating_mul(elapsed)
                / SECONDS_PER_DAY as u128,
        };
        u64::try_from(earned).unwrap_or(u64::MAX)
    }

    /// Fold everything earned up to `now` into `pending_rewards`.
    pub fn accrue(&mut self, position: &mut LiquidityPosition, now: u64, total_shares: u64) {
        let earned = self.earned(position, now, total_shares);
        position.pending_rewards = position.pending_rewards.saturating_add(earned);
        position.last_reward_time = position.last_reward_time.max(now);
        self.total_accrued = self.total_accrued.saturating_add(earned);
    }

    /// Pending plus the not-yet-accrued tail.
    pub fn pending(&self, position: &LiquidityPosition, now: u64, total_shares: u64) -> u64 {
        position
            .pending_rewards
            .saturating_add(self.earned(position, now, total_shares))
    }
}
