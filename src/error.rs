//! Error taxonomy for the AMM kernel.
//!
//! Every failure is an atomic revert: an operation that returns `Err` leaves
//! pools, guards and ledger balances exactly as they were before the call.
//!
//! Variants are grouped by [`ErrorKind`] in the order they are checked:
//! input validation, then liquidity/invariant checks, then policy limits,
//! then route discovery.

use thiserror::Error;

use crate::types::{AssetId, Address};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AmmError>;

/// Coarse classification of an [`AmmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Rejected before any state was read
    Validation,
    /// Reserves, shares or the constant-product invariant
    Liquidity,
    /// Numerically possible but not currently permitted
    Policy,
    /// No executable route
    Routing,
    /// Asset ledger collaborator failure
    Ledger,
    /// Invalid or unreadable configuration
    Config,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmmError {
    // ------------------------------------------------------------------
    // Input validation
    // ------------------------------------------------------------------
    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("assets must be different (got {0} twice)")]
    IdenticalAssets(AssetId),

    #[error("deadline {deadline} has passed (now {now})")]
    ExpiredDeadline { deadline: u64, now: u64 },

    #[error("input amount is zero or too small")]
    InsufficientInputAmount,

    #[error("output amount is zero or below the requested minimum")]
    InsufficientOutputAmount,

    #[error("asset {0} is not part of this pool")]
    UnknownAsset(AssetId),

    #[error("shares held by the burn address are locked")]
    LockedShares,

    // ------------------------------------------------------------------
    // Liquidity / invariant
    // ------------------------------------------------------------------
    #[error("insufficient liquidity for this trade")]
    InsufficientLiquidity,

    #[error("pool has no liquidity")]
    NoLiquidity,

    #[error("deposit or withdrawal amount violates the requested bounds")]
    InsufficientAmount,

    #[error("deposit would mint zero liquidity shares")]
    InsufficientLiquidityMinted,

    #[error("withdrawal would return zero of an asset")]
    InsufficientLiquidityBurned,

    #[error("{owner} holds {held} shares, requested {requested}")]
    InsufficientShares { owner: Address, held: u64, requested: u64 },

    #[error("constant-product invariant violated")]
    InvariantViolated,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("pool is locked by an outstanding flash loan")]
    Locked,

    #[error("flash loan {loan_id} was not repaid with fee")]
    FlashLoanNotRepaid { loan_id: u64 },

    #[error("no TWAP observation interval is available yet")]
    TwapUnavailable,

    // ------------------------------------------------------------------
    // Policy limits
    // ------------------------------------------------------------------
    #[error("output {actual} below minimum {minimum}")]
    SlippageExceeded { minimum: u64, actual: u64 },

    #[error("price impact {impact_bps} bps exceeds limit {max_bps} bps")]
    ExcessivePriceImpact { impact_bps: u64, max_bps: u64 },

    #[error("request replayed within the MEV delay (last block {last_block})")]
    MevProtectionActive { last_block: u64 },

    #[error("daily volume cap exceeded for {user}")]
    DailyVolumeExceeded { user: Address },

    #[error("global daily volume cap exceeded")]
    GlobalLimitExceeded,

    // ------------------------------------------------------------------
    // Routing / registry
    // ------------------------------------------------------------------
    #[error("no valid route from {token_in} to {token_out}")]
    NoValidRoute { token_in: AssetId, token_out: AssetId },

    #[error("pool not found for pair ({0}, {1})")]
    PoolNotFound(AssetId, AssetId),

    #[error("pool already exists for pair ({0}, {1})")]
    PoolExists(AssetId, AssetId),

    #[error("external venue {0} is not registered")]
    UnknownAdapter(u32),

    #[error("external venue failed: {0}")]
    AdapterFailed(String),

    // ------------------------------------------------------------------
    // Ledger
    // ------------------------------------------------------------------
    #[error("{holder} holds {available} of asset {asset}, needs {required}")]
    InsufficientBalance {
        asset: AssetId,
        holder: Address,
        available: u64,
        required: u64,
    },

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AmmError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        use AmmError::*;
        match self {
            ZeroAmount
            | IdenticalAssets(_)
            | ExpiredDeadline { .. }
            | InsufficientInputAmount
            | InsufficientOutputAmount
            | UnknownAsset(_)
            | LockedShares => ErrorKind::Validation,

            InsufficientLiquidity
            | NoLiquidity
            | InsufficientAmount
            | InsufficientLiquidityMinted
            | InsufficientLiquidityBurned
            | InsufficientShares { .. }
            | InvariantViolated
            | Overflow
            | Locked
            | FlashLoanNotRepaid { .. }
            | TwapUnavailable => ErrorKind::Liquidity,

            SlippageExceeded { .. }
            | ExcessivePriceImpact { .. }
            | MevProtectionActive { .. }
            | DailyVolumeExceeded { .. }
            | GlobalLimitExceeded => ErrorKind::Policy,

            NoValidRoute { .. }
            | PoolNotFound(..)
            | PoolExists(..)
            | UnknownAdapter(_)
            | AdapterFailed(_) => ErrorKind::Routing,

            InsufficientBalance { .. } => ErrorKind::Ledger,

            InvalidConfig(_) => ErrorKind::Config,
        }
    }
}

impl From<toml::de::Error> for AmmError {
    fn from(err: toml::de::Error) -> Self {
        AmmError::InvalidConfig(err.to_string())
    }
}

impl From<toml::ser::Error> for AmmError {
    fn from(err: toml::ser::Error) -> Self {
        AmmError::InvalidConfig(err.to_string())
    }
}

impl From<std::io::Error> for AmmError {
    fn from(err: std::io::Error) -> Self {
        AmmError::InvalidConfig(err.to_string())
    }
}
