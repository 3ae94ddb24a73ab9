//! Pool and router configuration.
//!
//! Loaded from TOML; every field has a default so a partial file is valid.
//!
//! ```toml
//! [pool]
//! base_fee_bps = 30
//! max_price_impact_bps = 1000
//! reward_asset = 9
//! reward_rate_per_day = 86400
//!
//! [router]
//! native_asset = 1
//! bridge_asset = 1
//! protocol_fee_bps = 5
//! burn_rate_bps = 5000
//! fee_collector = 99
//! user_daily_cap = 1000000000
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AmmError, Result};
use crate::types::price::BPS_DENOMINATOR;
use crate::types::{Address, AssetId};

/// Highest swap, flash or protocol fee accepted: 1000 bps = 10%
pub const MAX_FEE_BPS: u16 = 1_000;

/// Per-pool parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Swap fee before tier discounts
    pub base_fee_bps: u16,
    /// Largest price impact a single swap may cause (10_000 disables)
    pub max_price_impact_bps: u16,
    /// Asset minted to liquidity providers as rewards
    pub reward_asset: Option<AssetId>,
    /// Reward units streamed per day across the whole share supply
    pub reward_rate_per_day: u64,
    /// Averaging window of the TWAP oracle
    pub twap_window_secs: u64,
    /// Observations retained for the TWAP window
    pub twap_max_observations: usize,
    pub flash_fee_bps: u16,
    /// Receives the protocol's share of fee growth as minted shares
    pub protocol_fee_to: Option<Address>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_fee_bps: 30,
            max_price_impact_bps: 1_000,
            reward_asset: None,
            reward_rate_per_day: 0,
            twap_window_secs: 1_800,
            twap_max_observations: 64,
            flash_fee_bps: 9,
            protocol_fee_to: None,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_fee_bps > MAX_FEE_BPS {
            return Err(invalid(format!("base_fee_bps {} above {}", self.base_fee_bps, MAX_FEE_BPS)));
        }
        if self.flash_fee_bps > MAX_FEE_BPS {
            return Err(invalid(format!("flash_fee_bps {} above {}", self.flash_fee_bps, MAX_FEE_BPS)));
        }
        if self.max_price_impact_bps == 0 || self.max_price_impact_bps as u64 > BPS_DENOMINATOR {
            return Err(invalid("max_price_impact_bps must be in 1..=10000".to_string()));
        }
        if self.twap_window_secs == 0 {
            return Err(invalid("twap_window_secs must be positive".to_string()));
        }
        if self.twap_max_observations < 2 {
            return Err(invalid("twap_max_observations must be at least 2".to_string()));
        }
        if self.reward_rate_per_day > 0 && self.reward_asset.is_none() {
            return Err(invalid("reward_rate_per_day set without reward_asset".to_string()));
        }
        Ok(())
    }
}

/// Swap router parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Platform asset: volume is measured in it and its fees are burned
    pub native_asset: AssetId,
    /// Intermediate asset for two-hop routes
    pub bridge_asset: Option<AssetId>,
    pub protocol_fee_bps: u16,
    /// Share of a native-asset protocol fee that is burned
    pub burn_rate_bps: u16,
    pub fee_collector: Address,
    /// Blocks before the same (caller, nonce) key may execute again
    pub mev_delay_blocks: u64,
    /// Per-user daily volume in native units; `None` is unlimited
    pub user_daily_cap: Option<u64>,
    /// Global daily volume in native units; `None` is unlimited
    pub global_daily_cap: Option<u64>,
    /// Route cache lifetime; 0 disables caching
    pub route_cache_ttl_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            native_asset: AssetId(1),
            bridge_asset: None,
            protocol_fee_bps: 5,
            burn_rate_bps: 5_000,
            fee_collector: Address(1),
            mev_delay_blocks: 1,
            user_daily_cap: None,
            global_daily_cap: None,
            route_cache_ttl_secs: 0,
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.protocol_fee_bps > MAX_FEE_BPS {
            return Err(invalid(format!(
                "protocol_fee_bps {} above {}",
                self.protocol_fee_bps, MAX_FEE_BPS
            )));
        }
        if self.burn_rate_bps as u64 > BPS_DENOMINATOR {
            return Err(invalid("burn_rate_bps must be at most 10000".to_string()));
        }
        if self.fee_collector == Address::BURN {
            return Err(invalid("fee_collector cannot be the burn address".to_string()));
        }
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmmConfig {
    pub pool: PoolConfig,
    pub router: RouterConfig,
}

impl AmmConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AmmConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Save config to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        self.router.validate()
    }
}

fn invalid(msg: String) -> AmmError {
    AmmError::InvalidConfig(msg)
}
