//! Identifier newtypes and the host execution environment.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AmmError, Result};

/// Fungible asset identifier as known to the asset ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct AssetId(pub u64);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset:{}", self.0)
    }
}

/// Account identifier (traders, providers, pools, fee collectors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address(pub u64);

impl Address {
    /// Holder of the permanently locked minimum liquidity.
    pub const BURN: Address = Address(0);

    /// Little-endian bytes, used when hashing keys.
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// Opaque handle to a pool inside a [`PoolRepository`](crate::pool::PoolRepository).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolId(pub usize);

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool:{}", self.0)
    }
}

/// Identifier of a registered external venue adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AdapterId(pub u32);

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "venue:{}", self.0)
    }
}

/// Host-supplied execution environment for one call.
///
/// The host sequences calls in a total order; `block_number` and
/// `timestamp` (seconds) never decrease between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Env {
    pub block_number: u64,
    pub timestamp: u64,
}

impl Env {
    pub fn new(block_number: u64, timestamp: u64) -> Self {
        Self { block_number, timestamp }
    }

    /// Fail if `deadline` is already behind this call's timestamp.
    pub fn check_deadline(&self, deadline: u64) -> Result<()> {
        if self.timestamp > deadline {
            return Err(AmmError::ExpiredDeadline {
                deadline,
                now: self.timestamp,
            });
        }
        Ok(())
    }
}
