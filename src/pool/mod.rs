//! Liquidity pools.
//!
//! ## Components
//!
//! - [`Pool`]: constant-product reserve ledger for one pair
//! - [`TwapAccumulator`]: cumulative price integrals and observation ring
//! - [`RewardAccrual`]: per-position reward streaming
//! - [`LoanHandle`]: two-phase flash loans on a pool
//! - [`PoolRegistry`]: slab-backed [`PoolRepository`]
//!
//! ## Operations
//!
//! | Operation | Locks | Touches |
//! |-----------|-------|---------|
//! | `add_liquidity` | - | reserves, shares, TWAP, rewards |
//! | `remove_liquidity` | - | reserves, shares, TWAP, rewards |
//! | `swap` | - | reserves, TWAP, volume |
//! | `claim_rewards` | - | rewards |
//! | `lend` / `settle` | yes | reserves, TWAP |

mod pair;
pub mod flash;
pub mod registry;
pub mod rewards;
pub mod twap;

pub use flash::{FlashSettlement, LoanHandle};
pub use pair::{
    AddLiquidity, LiquidityAdded, LiquidityRemoved, Pool, RemoveLiquidity, Reserves, SharedDiscountOracle,
    SwapOutcome, SwapParams,
};
pub use registry::{pool_address, sort_pair, PoolRegistry, PoolRepository};
pub use rewards::{LiquidityPosition, RewardAccrual};
pub use twap::{Observation, TwapAccumulator, TwapPrice};
