//! Swap routing.
//!
//! ## Per-call pipeline
//!
//! 1. **Validate**: deadline, non-zero amount, distinct assets
//! 2. **MEV guard**: `SHA-256(caller || nonce)` may not repeat within the
//!    configured block delay
//! 3. **Volume guard**: per-user and global daily caps in native units
//! 4. **Route**: best of direct pool, bridge hop and external venues,
//!    quoted on the input net of the protocol fee
//! 5. **Execute**: hops run in order, each on the previous hop's measured
//!    output
//! 6. **Fee**: native-asset fees are partly burned, the rest forwarded
//!
//! Guard state and the route cache are only written once the swap has
//! succeeded; pool state on the route is restored and the ledger reverted
//! otherwise.
//!
//! ## Example
//!
//! ```
//! use dark_amm::config::{PoolConfig, RouterConfig};
//! use dark_amm::ledger::{AssetLedger, InMemoryLedger};
//! use dark_amm::pool::{AddLiquidity, PoolRegistry};
//! use dark_amm::router::{SwapRequest, SwapRouter};
//! use dark_amm::types::{Address, AssetId, Env};
//!
//! let (native, usdc) = (AssetId(1), AssetId(2));
//! let (lp, trader) = (Address(10), Address(11));
//! let mut ledger = InMemoryLedger::new();
//! ledger.mint(native, lp, 1_000_000).unwrap();
//! ledger.mint(usdc, lp, 1_000_000).unwrap();
//! ledger.mint(native, trader, 10_000).unwrap();
//!
//! let mut router = SwapRouter::new(RouterConfig::default(), PoolRegistry::new(PoolConfig::default())).unwrap();
//! router.create_pool(native, usdc).unwrap();
//! router
//!     .pool_mut(native, usdc)
//!     .unwrap()
//!     .add_liquidity(&mut ledger, Env::new(1, 1), lp, AddLiquidity::new(1_000_000, 1_000_000, lp, 10))
//!     .unwrap();
//!
//! let request = SwapRequest::new(trader, native, usdc, 10_000, 9_000, 1, 10);
//! let receipt = router.swap(&mut ledger, Env::new(2, 2), request).unwrap();
//! assert!(receipt.amount_out >= 9_000);
//! ```

pub mod finder;
pub mod guards;
pub mod venue;
mod swap;

pub use finder::{QuoteContext, RouteFinder};
pub use guards::{mev_key, MevGuard, VolumeGuard, VolumeTicket};
pub use swap::{SwapRequest, SwapRouter};
pub use venue::{ExternalVenue, FixedRateVenue};
