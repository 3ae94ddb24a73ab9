//! Core data types for the AMM kernel
//!
//! ## Types
//!
//! - [`AssetId`], [`Address`], [`PoolId`], [`AdapterId`]: identifiers
//! - [`Env`]: block number and timestamp supplied by the host
//! - [`Route`], [`RouteKind`], [`Venue`]: route finder output
//! - [`VolumeWindow`]: rolling one-day volume counter
//! - [`SwapReceipt`], [`PoolSnapshot`]: SSZ-encoded results and state
//!
//! ## Fixed-Point Arithmetic
//!
//! Amounts are integer base units stored as `u64`; every product is taken
//! in `u128`. Oracle prices are scaled by 10^8 (see [`price::SCALE`]).

mod ids;
mod receipt;
mod route;
mod volume;
pub mod price;

pub use ids::{AdapterId, Address, AssetId, Env, PoolId};
pub use receipt::{compute_hash, PoolSnapshot, SwapReceipt};
pub use route::{Route, RouteKind, Venue, BRIDGE_HOP_GAS, NATIVE_HOP_GAS};
pub use volume::{VolumeWindow, SECONDS_PER_DAY};
