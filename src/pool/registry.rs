//! Pool repository.
//!
//! The router never constructs pools itself; it asks a [`PoolRepository`]
//! to create or look one up by pair. [`PoolRegistry`] is the in-memory
//! implementation:
//!
//! - **Slab**: pool storage, a [`PoolId`] is the slab key
//! - **HashMap**: sorted pair to slab key, so lookups are order-independent
//!
//! Pool addresses are derived from the sorted pair with SHA-256, so the same
//! pair always lands at the same address.

use std::collections::HashMap;
use std::fmt;

use slab::Slab;
use tracing::info;

use crate::config::PoolConfig;
use crate::error::{AmmError, Result};
use crate::pool::{Pool, SharedDiscountOracle};
use crate::types::{compute_hash, Address, AssetId, PoolId};

/// Pool creation and lookup by pair.
pub trait PoolRepository {
    /// Create a pool for the pair. Fails if one already exists.
    fn create(&mut self, token_a: AssetId, token_b: AssetId) -> Result<PoolId>;

    /// Pool for the pair, in either order.
    fn lookup(&self, token_a: AssetId, token_b: AssetId) -> Option<PoolId>;

    fn get(&self, id: PoolId) -> Option<&Pool>;

    fn get_mut(&mut self, id: PoolId) -> Option<&mut Pool>;

    fn pool_ids(&self) -> Vec<PoolId>;
}

/// Pair in canonical (ascending) order.
#[inline]
pub fn sort_pair(token_a: AssetId, token_b: AssetId) -> (AssetId, AssetId) {
    if token_a <= token_b {
        (token_a, token_b)
    } else {
        (token_b, token_a)
    }
}

/// Deterministic pool address for a pair.
pub fn pool_address(token_a: AssetId, token_b: AssetId) -> Address {
    let (lo, hi) = sort_pair(token_a, token_b);
    let mut preimage = Vec::with_capacity(32);
    preimage.extend_from_slice(b"dark-amm/pool/v1");
    preimage.extend_from_slice(&lo.0.to_le_bytes());
    preimage.extend_from_slice(&hi.0.to_le_bytes());
    let digest = compute_hash(&preimage);

    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    match u64::from_le_bytes(word) {
        0 => Address(1),
        raw => Address(raw),
    }
}

/// Slab-backed [`PoolRepository`].
pub struct PoolRegistry {
    pools: Slab<Pool>,
    pair_index: HashMap<(AssetId, AssetId), usize>,
    config: PoolConfig,
    oracle: Option<SharedDiscountOracle>,
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pools", &self.pools.len())
            .field("config", &self.config)
            .field("oracle", &self.oracle.is_some())
            .finish()
    }
}

impl PoolRegistry {
    /// Registry whose new pools use `config`.
    pub fn new(config: PoolConfig) -> Self {
        Self::with_capacity(config, 0)
    }

    pub fn with_capacity(config: PoolConfig, capacity: usize) -> Self {
        Self {
            pools: Slab::with_capacity(capacity),
            pair_index: HashMap::with_capacity(capacity),
            config,
            oracle: None,
        }
    }

    /// Attach a discount oracle to every pool created from now on.
    pub fn with_discount_oracle(mut self, oracle: SharedDiscountOracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PoolId, &Pool)> {
        self.pools.iter().map(|(key, pool)| (PoolId(key), pool))
    }
}

impl PoolRepository for PoolRegistry {
    fn create(&mut self, token_a: AssetId, token_b: AssetId) -> Result<PoolId> {
        if token_a == token_b {
            return Err(AmmError::IdenticalAssets(token_a));
        }
        let pair = sort_pair(token_a, token_b);
        if self.pair_index.contains_key(&pair) {
            return Err(AmmError::PoolExists(pair.0, pair.1));
        }

        let address = pool_address(pair.0, pair.1);
        let mut pool = Pool::new(address, pair.0, pair.1, self.config.clone())?;
        pool.set_discount_oracle(self.oracle.clone());

        let key = self.pools.insert(pool);
        self.pair_index.insert(pair, key);
        info!(pool_id = key, address = %address, token_a = %pair.0, token_b = %pair.1, "pool created");
        Ok(PoolId(key))
    }

    fn lookup(&self, token_a: AssetId, token_b: AssetId) -> Option<PoolId> {
        self.pair_index
            .get(&sort_pair(token_a, token_b))
            .map(|&key| PoolId(key))
    }

    fn get(&self, id: PoolId) -> Option<&Pool> {
        self.pools.get(id.0)
    }

    fn get_mut(&mut self, id: PoolId) -> Option<&mut Pool> {
        self.pools.get_mut(id.0)
    }

    fn pool_ids(&self) -> Vec<PoolId> {
        self.pools.iter().map(|(key, _)| PoolId(key)).collect()
    }
}
