//! Route types produced by the route finder.
//!
//! A [`Route`] is an immutable quote: the asset path, the execution target
//! for each hop, the output expected from live reserves when it was built,
//! and a gas estimate used to break ties.

use crate::types::{AdapterId, AssetId, PoolId};

/// Gas estimate for a single native pool hop.
pub const NATIVE_HOP_GAS: u64 = 90_000;

/// Gas estimate for a two-hop path through the bridge asset.
pub const BRIDGE_HOP_GAS: u64 = 160_000;

/// Closed set of route shapes the router knows how to quote and execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    /// Direct swap against the pair's native pool
    NativePool,
    /// Two native pool hops through a bridge asset
    BridgeHop { bridge: AssetId },
    /// Delegated to a registered external venue
    ExternalAdapter { id: AdapterId },
}

/// Execution target of a single hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Venue {
    Pool(PoolId),
    Adapter(AdapterId),
}

/// A candidate or chosen route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub kind: RouteKind,
    /// Assets visited in order, `path[0]` in and `path[n]` out
    pub path: Vec<AssetId>,
    /// One venue per hop (`venues.len() == path.len() - 1`)
    pub venues: Vec<Venue>,
    pub expected_output: u64,
    pub gas_estimate: u64,
}

impl Route {
    pub fn token_in(&self) -> AssetId {
        self.path[0]
    }

    pub fn token_out(&self) -> AssetId {
        self.path[self.path.len() - 1]
    }

    pub fn hop_count(&self) -> usize {
        self.venues.len()
    }

    /// True if `self` should be preferred over `other`: strictly greater
    /// output, or equal output with a strictly lower gas estimate.
    pub fn beats(&self, other: &Route) -> bool {
        self.expected_output > other.expected_output
            || (self.expected_output == other.expected_output
                && self.gas_estimate < other.gas_estimate)
    }
}
