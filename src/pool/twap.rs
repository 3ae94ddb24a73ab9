//! Time-weighted average price accumulator.
//!
//! ## Design
//!
//! Two cumulative price integrals are advanced on every reserve change,
//! using the reserves as they stood *before* the change:
//!
//! ```text
//! price_a_cumulative += (reserve_b * SCALE / reserve_a) * elapsed
//! price_b_cumulative += (reserve_a * SCALE / reserve_b) * elapsed
//! ```
//!
//! Accumulators wrap on overflow; readers always take differences with
//! `wrapping_sub`, which stays correct across a wrap.
//!
//! A bounded ring of observations lets a reader average over a recent
//! window without keeping history of its own. A single block can move the
//! spot price arbitrarily, but it only contributes `elapsed` seconds to the
//! integral, which bounds how far it can drag the average.

use std::collections::VecDeque;

use tracing::debug;

use crate::error::{AmmError, Result};
use crate::types::price::scaled_price;

/// Accumulator values at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub timestamp: u64,
    pub price_a_cumulative: u128,
    pub price_b_cumulative: u128,
}

/// Windowed average prices, scaled by 10^8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwapPrice {
    /// Average price of asset A in units of asset B
    pub price_a: u128,
    /// Average price of asset B in units of asset A
    pub price_b: u128,
    /// Seconds actually covered by the average
    pub interval: u64,
}

#[derive(Debug, Clone)]
pub struct TwapAccumulator {
    pub price_a_cumulative: u128,
    pub price_b_cumulative: u128,
    pub last_update_time: u64,
    observations: VecDeque<Observation>,
    max_observations: usize,
    window_secs: u64,
}

impl TwapAccumulator {
    pub fn new(window_secs: u64, max_observations: usize) -> Self {
        Self {
            price_a_cumulative: 0,
            price_b_cumulative: 0,
            last_update_time: 0,
            observations: VecDeque::with_capacity(max_observations),
            max_observations: max_observations.max(2),
            window_secs,
        }
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    pub fn observations(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    /// Cumulative values as they would be at `now` given the current
    /// reserves, without mutating anything.
    pub fn current_cumulatives(&self, reserve_a: u64, reserve_b: u64, now: u64) -> (u128, u128) {
        let elapsed = now.saturating_sub(self.last_update_time) as u128;
        let mut a = self.price_a_cumulative;
        let mut b = self.price_b_cumulative;
        if elapsed > 0 {
            if let (Some(pa), Some(pb)) =
                (scaled_price(reserve_b, reserve_a), scaled_price(reserve_a, reserve_b))
            {
                a = a.wrapping_add(pa.wrapping_mul(elapsed));
                b = b.wrapping_add(pb.wrapping_mul(elapsed));
            }
        }
        (a, b)
    }

    /// Advance the integrals to `now` using the pre-change reserves.
    pub fn update(&mut self, reserve_a: u64, reserve_b: u64, now: u64) {
        if now <= self.last_update_time && !self.observations.is_empty() {
            return;
        }
        let (a, b) = self.current_cumulatives(reserve_a, reserve_b, now);
        self.price_a_cumulative = a;
        self.price_b_cumulative = b;
        self.last_update_time = now;

        self.observations.push_back(Observation {
            timestamp: now,
            price_a_cumulative: a,
            price_b_cumulative: b,
        });
        if self.observations.len() > self.max_observations {
            self.observations.pop_front();
        }
        debug!(now, price_a_cumulative = a, price_b_cumulative = b, "twap updated");
    }

    /// Average prices over (at least) the configured window ending at `now`.
    ///
    /// Uses the newest observation at or before `now - window`; if every
    /// retained observation is younger, the oldest one is used and the
    /// reported `interval` is shorter than the window.
    pub fn average(&self, reserve_a: u64, reserve_b: u64, now: u64) -> Result<TwapPrice> {
        let window_start = now.saturating_sub(self.window_secs);
        let start = self
            .observations
            .iter()
            .rev()
            .find(|o| o.timestamp <= window_start)
            .or_else(|| self.observations.front())
            .ok_or(AmmError::TwapUnavailable)?;

        let interval = now.saturating_sub(start.timestamp);
        if interval == 0 {
            return Err(AmmError::TwapUnavailable);
        }
        let (a, b) = self.current_cumulatives(reserve_a, reserve_b, now);
        Ok(TwapPrice {
            price_a: a.wrapping_sub(start.price_a_cumulative) / interval as u128,
            price_b: b.wrapping_sub(start.price_b_cumulative) / interval as u128,
            interval,
        })
    }
}
