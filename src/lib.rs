//! # Dark AMM
//!
//! Constant-product exchange kernel with a routing layer.
//!
//! ## Architecture
//!
//! The kernel consists of:
//! - **Types**: identifiers, routes, volume windows, SSZ receipts and snapshots
//! - **Pool**: reserve ledger with TWAP oracle, reward streaming and flash loans
//! - **Router**: route discovery, MEV and volume guards, protocol fee split
//! - **Ledger**: the asset-ledger and fee-discount collaborators
//!
//! ## Design Principles
//!
//! 1. **Determinism**: identical call sequences produce identical state roots
//! 2. **No Floating Point**: integer amounts, `u128` products, 10^8-scaled prices
//! 3. **All or Nothing**: a failing call leaves pools, guards and balances untouched
//! 4. **Synchronous Execution**: one writer, no async, no locks

// ============================================================================
// Module declarations
// ============================================================================

/// Core data types: identifiers, routes, receipts
pub mod types;

/// Constant-product math
pub mod math;

/// Error taxonomy
pub mod error;

/// TOML configuration
pub mod config;

/// Asset ledger and fee-discount collaborators
pub mod ledger;

/// Liquidity pools and the pool registry
pub mod pool;

/// Route finder and swap router
pub mod router;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use config::{AmmConfig, PoolConfig, RouterConfig};
pub use error::{AmmError, ErrorKind, Result};
pub use ledger::{AssetLedger, FeeDiscountOracle, InMemoryLedger, StaticDiscounts};
pub use pool::{Pool, PoolRegistry, PoolRepository};
pub use router::{ExternalVenue, RouteFinder, SwapRequest, SwapRouter};
pub use types::{Address, AssetId, Env, PoolSnapshot, Route, RouteKind, SwapReceipt};
