//! Swap receipts and pool snapshots.
//!
//! Both types are SSZ-encoded so that a pool's state root is identical on
//! every node that replays the same call sequence.

use ssz_rs::prelude::*;
use sha2::{Digest, Sha256};

use crate::types::RouteKind;

/// Result of one routed swap, emitted by the router.
///
/// ## Example
///
/// ```
/// use dark_amm::types::SwapReceipt;
///
/// let receipt = SwapReceipt::default();
/// assert_eq!(receipt.route_kind(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, SimpleSerialize)]
pub struct SwapReceipt {
    /// Trader that paid the input
    pub caller: u64,

    /// Recipient of the output
    pub recipient: u64,

    pub token_in: u64,
    pub token_out: u64,

    /// Gross input, including the protocol fee
    pub amount_in: u64,

    /// Output measured at the recipient
    pub amount_out: u64,

    /// Protocol fee charged in `token_in`
    pub protocol_fee: u64,

    /// Portion of the protocol fee destroyed
    pub fee_burned: u64,

    /// 0 = native pool, 1 = bridge hop, 2 = external adapter
    pub route_kind_raw: u8,

    pub hop_count: u8,

    pub block_number: u64,
    pub timestamp: u64,
}

impl SwapReceipt {
    /// Encode a [`RouteKind`] tag for SSZ.
    pub fn encode_route_kind(kind: RouteKind) -> u8 {
        match kind {
            RouteKind::NativePool => 0,
            RouteKind::BridgeHop { .. } => 1,
            RouteKind::ExternalAdapter { .. } => 2,
        }
    }

    pub fn route_kind(&self) -> u8 {
        self.route_kind_raw
    }

    /// Output received per unit of input, scaled by 10^8.
    pub fn execution_price(&self) -> Option<u128> {
        crate::types::price::scaled_price(self.amount_out, self.amount_in)
    }

    /// SHA-256 of the SSZ encoding.
    pub fn digest(&self) -> [u8; 32] {
        match ssz_rs::serialize(self) {
            Ok(bytes) => compute_hash(&bytes),
            Err(_) => [0u8; 32],
        }
    }
}

/// Verifiable summary of a pool's state.
#[derive(Debug, Clone, PartialEq, Eq, Default, SimpleSerialize)]
pub struct PoolSnapshot {
    pub token_a: u64,
    pub token_b: u64,
    pub reserve_a: u64,
    pub reserve_b: u64,
    pub share_supply: u64,
    pub k_last: u128,
    pub price_a_cumulative: u128,
    pub price_b_cumulative: u128,
    pub last_update_time: u64,
}

impl PoolSnapshot {
    /// SHA-256 over the SSZ encoding of this snapshot.
    pub fn state_root(&self) -> [u8; 32] {
        match ssz_rs::serialize(self) {
            Ok(bytes) => compute_hash(&bytes),
            Err(_) => [0u8; 32],
        }
    }

    /// State root as a hex string
    pub fn state_root_hex(&self) -> String {
        hex::encode(self.state_root())
    }

    /// Constant product of the snapshot reserves.
    pub fn k(&self) -> u128 {
        (self.reserve_a as u128) * (self.reserve_b as u128)
    }
}

/// Compute SHA-256 hash of the given data
pub fn compute_hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

// ============================================================================
// Unit Tests
// ============================================================================
