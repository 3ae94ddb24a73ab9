//! Router policy guards: replay delay and daily volume caps.
//!
//! Both guards split into a read-only `check` that returns what would be
//! written, and an `apply`/`record` step the router runs only after the
//! swap has fully succeeded.

use std::collections::HashMap;

use tracing::warn;

use crate::error::{AmmError, Result};
use crate::types::{compute_hash, Address, VolumeWindow};

/// Entries kept before stale MEV keys are pruned.
const MEV_PRUNE_THRESHOLD: usize = 4_096;

/// Users tracked before expired volume windows are pruned.
const VOLUME_PRUNE_THRESHOLD: usize = 4_096;

pub type MevKey = [u8; 32];

/// SHA-256 over `caller || nonce`.
pub fn mev_key(caller: Address, nonce: u64) -> MevKey {
    let mut preimage = [0u8; 16];
    preimage[..8].copy_from_slice(&caller.to_bytes());
    preimage[8..].copy_from_slice(&nonce.to_le_bytes());
    compute_hash(&preimage)
}

// ============================================================================
// MEV guard
// ============================================================================

/// Rejects a `(caller, nonce)` key seen within the last `delay_blocks`.
#[derive(Debug, Clone, Default)]
pub struct MevGuard {
    delay_blocks: u64,
    last_seen: HashMap<MevKey, u64>,
}

impl MevGuard {
    pub fn new(delay_blocks: u64) -> Self {
        Self {
            delay_blocks,
            last_seen: HashMap::new(),
        }
    }

    pub fn check(&self, key: &MevKey, block: u64) -> Result<()> {
        if let Some(&last_block) = self.last_seen.get(key) {
            if block < last_block.saturating_add(self.delay_blocks) {
                warn!(last_block, block, "mev guard rejected request");
                return Err(AmmError::MevProtectionActive { last_block });
            }
        }
        Ok(())
    }

    pub fn record(&mut self, key: MevKey, block: u64) {
        self.last_seen.insert(key, block);
        if self.last_seen.len() > MEV_PRUNE_THRESHOLD {
            self.prune(block);
        }
    }

    /// Forget keys whose delay has elapsed at `block`.
    pub fn prune(&mut self, block: u64) {
        let delay = self.delay_blocks;
        self.last_seen
            .retain(|_, last| block < last.saturating_add(delay));
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

// ============================================================================
// Volume guard
// ============================================================================

/// Windows as they will be after an admitted swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeTicket {
    user: Address,
    now: u64,
    user_window: VolumeWindow,
    global_window: VolumeWindow,
}

/// Per-user and global daily volume, in native-asset units.
#[derive(Debug, Clone, Default)]
pub struct VolumeGuard {
    user_cap: Option<u64>,
    global_cap: Option<u64>,
    users: HashMap<Address, VolumeWindow>,
    global: VolumeWindow,
}

impl VolumeGuard {
    pub fn new(user_cap: Option<u64>, global_cap: Option<u64>) -> Self {
        Self {
            user_cap,
            global_cap,
            users: HashMap::new(),
            global: VolumeWindow::default(),
        }
    }

    /// Admit `amount` for `user` at `now`, or fail with the cap it breaks.
    pub fn check(&self, user: Address, amount: u128, now: u64) -> Result<VolumeTicket> {
        let user_window = self
            .users
            .get(&user)
            .copied()
            .unwrap_or_else(|| VolumeWindow::new(now));

        let user_window = match self.user_cap {
            Some(cap) => user_window.try_spend(now, amount, cap as u128).ok_or_else(|| {
                warn!(user = %user, amount, cap, "daily volume cap exceeded");
                AmmError::DailyVolumeExceeded { user }
            })?,
            None => user_window.record(now, amount),
        };
        let global_window = match self.global_cap {
            Some(cap) => self.global.try_spend(now, amount, cap as u128).ok_or_else(|| {
                warn!(amount, cap, "global volume cap exceeded");
                AmmError::GlobalLimitExceeded
            })?,
            None => self.global.record(now, amount),
        };

        Ok(VolumeTicket {
            user,
            now,
            user_window,
            global_window,
        })
    }

    pub fn apply(&mut self, ticket: VolumeTicket) {
        self.users.insert(ticket.user, ticket.user_window);
        self.global = ticket.global_window;
        if self.users.len() > VOLUME_PRUNE_THRESHOLD {
            self.prune(ticket.now);
        }
    }

    /// Forget users whose window has rolled over at `now`; they would
    /// start from zero anyway.
    pub fn prune(&mut self, now: u64) {
        self.users.retain(|_, window| !window.is_expired(now));
    }

    pub fn tracked_users(&self) -> usize {
        self.users.len()
    }

    pub fn user_spent(&self, user: Address, now: u64) -> u128 {
        self.users.get(&user).map(|w| w.rolled(now).spent).unwrap_or(0)
    }

    pub fn global_spent(&self, now: u64) -> u128 {
        self.global.rolled(now).spent
    }

    /// Remaining user allowance; `None` when uncapped.
    pub fn user_remaining(&self, user: Address, now: u64) -> Option<u128> {
        let cap = self.user_cap? as u128;
        Some(match self.users.get(&user) {
            Some(window) => window.remaining(now, cap),
            None => cap,
        })
    }
}
