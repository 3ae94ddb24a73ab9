//! The swap router state machine.

use tracing::{info, warn};

use crate::config::RouterConfig;
use crate::error::{AmmError, Result};
use crate::ledger::AssetLedger;
use crate::math::mul_div;
use crate::pool::{Pool, PoolRegistry, PoolRepository, SwapParams};
use crate::router::finder::{QuoteContext, RouteFinder};
use crate::router::guards::{mev_key, MevGuard, VolumeGuard};
use crate::router::venue::ExternalVenue;
use crate::types::price::BPS_DENOMINATOR;
use crate::types::{AdapterId, Address, AssetId, Env, PoolId, Route, SwapReceipt, Venue};

/// One routed swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapRequest {
    /// Pays the input and the protocol fee
    pub caller: Address,
    pub recipient: Address,
    pub token_in: AssetId,
    pub token_out: AssetId,
    /// Gross input, protocol fee included
    pub amount_in: u64,
    /// Checked against the route quote and against the realized output
    pub min_amount_out: u64,
    /// Replay key component; reusing it inside the MEV delay is rejected
    pub nonce: u64,
    pub deadline: u64,
}

impl SwapRequest {
    /// Request paying out to the caller.
    pub fn new(
        caller: Address,
        token_in: AssetId,
        token_out: AssetId,
        amount_in: u64,
        min_amount_out: u64,
        nonce: u64,
        deadline: u64,
    ) -> Self {
        Self {
            caller,
            recipient: caller,
            token_in,
            token_out,
            amount_in,
            min_amount_out,
            nonce,
            deadline,
        }
    }

    pub fn to(mut self, recipient: Address) -> Self {
        self.recipient = recipient;
        self
    }
}

/// Routes swaps across native pools and external venues.
///
/// A swap either commits every effect (pool reserves, ledger balances, MEV
/// record, volume windows, route cache) or none of them.
#[derive(Debug)]
pub struct SwapRouter<R: PoolRepository = PoolRegistry> {
    config: RouterConfig,
    pools: R,
    finder: RouteFinder,
    adapters: Vec<Box<dyn ExternalVenue>>,
    mev: MevGuard,
    volume: VolumeGuard,
}

impl<R: PoolRepository> SwapRouter<R> {
    pub fn new(config: RouterConfig, pools: R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            finder: RouteFinder::new(config.bridge_asset, config.route_cache_ttl_secs),
            mev: MevGuard::new(config.mev_delay_blocks),
            volume: VolumeGuard::new(config.user_daily_cap, config.global_daily_cap),
            adapters: Vec::new(),
            pools,
            config,
        })
    }

    // ========================================================================
    // Registry passthroughs
    // ========================================================================

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn pools(&self) -> &R {
        &self.pools
    }

    pub fn pools_mut(&mut self) -> &mut R {
        &mut self.pools
    }

    pub fn create_pool(&mut self, token_a: AssetId, token_b: AssetId) -> Result<PoolId> {
        let id = self.pools.create(token_a, token_b)?;
        self.finder.invalidate();
        Ok(id)
    }

    pub fn lookup(&self, token_a: AssetId, token_b: AssetId) -> Option<PoolId> {
        self.pools.lookup(token_a, token_b)
    }

    /// Pool for the pair, in either order.
    pub fn pool(&self, token_a: AssetId, token_b: AssetId) -> Result<&Pool> {
        self.pools
            .lookup(token_a, token_b)
            .and_then(|id| self.pools.get(id))
            .ok_or(AmmError::PoolNotFound(token_a, token_b))
    }

    pub fn pool_mut(&mut self, token_a: AssetId, token_b: AssetId) -> Result<&mut Pool> {
        let id = self
            .pools
            .lookup(token_a, token_b)
            .ok_or(AmmError::PoolNotFound(token_a, token_b))?;
        self.pools
            .get_mut(id)
            .ok_or(AmmError::PoolNotFound(token_a, token_b))
    }

    pub fn register_adapter(&mut self, adapter: Box<dyn ExternalVenue>) -> AdapterId {
        let id = AdapterId(self.adapters.len() as u32);
        info!(adapter = %id, name = adapter.name(), gas = adapter.gas_estimate(), "external venue registered");
        self.adapters.push(adapter);
        self.finder.invalidate();
        id
    }

    pub fn mev_guard(&self) -> &MevGuard {
        &self.mev
    }

    pub fn volume_guard(&self) -> &VolumeGuard {
        &self.volume
    }

    // ========================================================================
    // Quoting
    // ========================================================================

    /// Protocol fee on a gross input (floor).
    pub fn protocol_fee(&self, amount_in: u64) -> u64 {
        mul_div(amount_in, self.config.protocol_fee_bps as u64, BPS_DENOMINATOR).unwrap_or(0)
    }

    /// Value of `amount` of `asset` in native units, at the native pool's
    /// spot rate. Assets without a funded native pool count 1:1.
    pub fn native_value(&self, asset: AssetId, amount: u64) -> u128 {
        let native = self.config.native_asset;
        if asset == native {
            return amount as u128;
        }
        let pool = self
            .pools
            .lookup(asset, native)
            .and_then(|id| self.pools.get(id))
            .filter(|pool| pool.has_liquidity());
        if let Some(pool) = pool {
            if let Ok(a_in) = pool.direction(asset) {
                let (reserve_in, reserve_native) = pool.reserves_for(a_in);
                return amount as u128 * reserve_native as u128 / reserve_in as u128;
            }
        }
        amount as u128
    }

    /// Route a swap would take right now, quoted on the input net of the
    /// protocol fee. Read-only.
    pub fn quote(
        &self,
        ledger: &dyn AssetLedger,
        token_in: AssetId,
        token_out: AssetId,
        amount_in: u64,
        trader: Address,
        now: u64,
    ) -> Result<Route> {
        if amount_in == 0 {
            return Err(AmmError::ZeroAmount);
        }
        if token_in == token_out {
            return Err(AmmError::IdenticalAssets(token_in));
        }
        let net = amount_in - self.protocol_fee(amount_in);
        if net == 0 {
            return Err(AmmError::InsufficientInputAmount);
        }
        self.finder.find(self.context(ledger), token_in, token_out, net, trader, now)
    }

    fn context<'a>(&'a self, ledger: &'a dyn AssetLedger) -> QuoteContext<'a> {
        QuoteContext {
            pools: &self.pools,
            adapters: &self.adapters,
            ledger,
        }
    }

    // ========================================================================
    // Swap
    // ========================================================================

    /// Validate, guard, route, execute and charge the protocol fee.
    pub fn swap(&mut self, ledger: &mut dyn AssetLedger, env: Env, request: SwapRequest) -> Result<SwapReceipt> {
        // input validation
        env.check_deadline(request.deadline)?;
        if request.amount_in == 0 {
            return Err(AmmError::ZeroAmount);
        }
        if request.token_in == request.token_out {
            return Err(AmmError::IdenticalAssets(request.token_in));
        }

        // policy guards, staged
        let key = mev_key(request.caller, request.nonce);
        self.mev.check(&key, env.block_number)?;
        let native_amount = self.native_value(request.token_in, request.amount_in);
        let ticket = self.volume.check(request.caller, native_amount, env.timestamp)?;

        // route on the net input
        let route = self.quote(
            &*ledger,
            request.token_in,
            request.token_out,
            request.amount_in,
            request.caller,
            env.timestamp,
        )?;
        if route.expected_output < request.min_amount_out {
            warn!(
                expected = route.expected_output,
                minimum = request.min_amount_out,
                "route quote below minimum output"
            );
            return Err(AmmError::InsufficientOutputAmount);
        }
        let fee = self.protocol_fee(request.amount_in);
        let net = request.amount_in - fee;

        // execute against a snapshot of the pools on the route
        let saved = self.snapshot_route(&route);
        let cp = ledger.checkpoint();
        match self.execute(ledger, env, &request, &route, net, fee) {
            Ok((amount_out, fee_burned)) => {
                ledger.commit(cp);
                self.mev.record(key, env.block_number);
                self.volume.apply(ticket);
                self.finder.remember(&route, env.timestamp);

                info!(
                    caller = %request.caller,
                    recipient = %request.recipient,
                    token_in = %request.token_in,
                    token_out = %request.token_out,
                    route = ?route.kind,
                    amount_in = request.amount_in,
                    amount_out,
                    protocol_fee = fee,
                    fee_burned,
                    "swap routed"
                );
                Ok(SwapReceipt {
                    caller: request.caller.0,
                    recipient: request.recipient.0,
                    token_in: request.token_in.0,
                    token_out: request.token_out.0,
                    amount_in: request.amount_in,
                    amount_out,
                    protocol_fee: fee,
                    fee_burned,
                    route_kind_raw: SwapReceipt::encode_route_kind(route.kind),
                    hop_count: route.hop_count() as u8,
                    block_number: env.block_number,
                    timestamp: env.timestamp,
                })
            }
            Err(err) => {
                ledger.revert_to(cp);
                self.restore(saved);
                warn!(caller = %request.caller, route = ?route.kind, error = %err, "swap reverted");
                Err(err)
            }
        }
    }

    /// Run every hop, then collect the protocol fee. Returns the output
    /// measured at the recipient and the amount burned.
    fn execute(
        &mut self,
        ledger: &mut dyn AssetLedger,
        env: Env,
        request: &SwapRequest,
        route: &Route,
        net: u64,
        fee: u64,
    ) -> Result<(u64, u64)> {
        let last = route.hop_count().saturating_sub(1);
        let mut amount = net;

        for (hop, venue) in route.venues.iter().enumerate() {
            let (asset_in, asset_out) = (route.path[hop], route.path[hop + 1]);
            let final_hop = hop == last;
            let to = if final_hop { request.recipient } else { request.caller };
            let before = ledger.balance_of(asset_out, to);

            match *venue {
                Venue::Pool(id) => {
                    let pool = self
                        .pools
                        .get_mut(id)
                        .ok_or(AmmError::PoolNotFound(asset_in, asset_out))?;
                    let params = SwapParams {
                        amount_in: amount,
                        a_in: pool.direction(asset_in)?,
                        min_amount_out: if final_hop { request.min_amount_out } else { 0 },
                        to,
                        deadline: request.deadline,
                    };
                    pool.swap(ledger, env, request.caller, params)?;
                }
                Venue::Adapter(id) => {
                    let adapter = self
                        .adapters
                        .get_mut(id.0 as usize)
                        .ok_or(AmmError::UnknownAdapter(id.0))?;
                    let name = adapter.name().to_string();
                    adapter
                        .execute(ledger, request.caller, to, asset_in, asset_out, amount)
                        .map_err(|err| match err {
                            AmmError::AdapterFailed(_) => err,
                            other => AmmError::AdapterFailed(format!("{}: {}", name, other)),
                        })?;
                }
            }
            // each hop continues with what actually arrived
            amount = ledger.balance_of(asset_out, to).saturating_sub(before);
        }

        if amount == 0 {
            return Err(AmmError::InsufficientOutputAmount);
        }
        if amount < request.min_amount_out {
            return Err(AmmError::SlippageExceeded {
                minimum: request.min_amount_out,
                actual: amount,
            });
        }

        let burned = self.collect_fee(ledger, request.caller, request.token_in, fee)?;
        Ok((amount, burned))
    }

    /// Burn `burn_rate_bps` of a native-asset fee and forward the rest to
    /// the collector; other assets are forwarded whole.
    fn collect_fee(&self, ledger: &mut dyn AssetLedger, payer: Address, asset: AssetId, fee: u64) -> Result<u64> {
        if fee == 0 {
            return Ok(0);
        }
        let burned = if asset == self.config.native_asset {
            mul_div(fee, self.config.burn_rate_bps as u64, BPS_DENOMINATOR).unwrap_or(0)
        } else {
            0
        };
        if burned > 0 {
            ledger.burn(asset, payer, burned)?;
        }
        ledger.transfer(asset, payer, self.config.fee_collector, fee - burned)?;
        Ok(burned)
    }

    fn snapshot_route(&self, route: &Route) -> Vec<(PoolId, Pool)> {
        route
            .venues
            .iter()
            .filter_map(|venue| match *venue {
                Venue::Pool(id) => self.pools.get(id).map(|pool| (id, pool.clone())),
                Venue::Adapter(_) => None,
            })
            .collect()
    }

    fn restore(&mut self, saved: Vec<(PoolId, Pool)>) {
        for (id, pool) in saved {
            if let Some(slot) = self.pools.get_mut(id) {
                *slot = pool;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::ledger::InMemoryLedger;
    use crate::pool::AddLiquidity;
    use crate::router::venue::FixedRateVenue;
    use crate::types::RouteKind;

    const NATIVE: AssetId = AssetId(1);
    const USDC: AssetId = AssetId(2);
    const WETH: AssetId = AssetId(3);
    const LP: Address = Address(10);
    const TRADER: Address = Address(11);
    const COLLECTOR: Address = Address(99);

    fn router_config() -> RouterConfig {
        RouterConfig {
            native_asset: NATIVE,
            bridge_asset: Some(NATIVE),
            protocol_fee_bps: 10,
            burn_rate_bps: 5_000,
            fee_collector: COLLECTOR,
            mev_delay_blocks: 1,
            user_daily_cap: None,
            global_daily_cap: None,
            route_cache_ttl_secs: 0,
        }
    }

    fn fund_pool(router: &mut SwapRouter, ledger: &mut InMemoryLedger, x: AssetId, y: AssetId, rx: u64, ry: u64) {
        router.create_pool(x, y).unwrap();
        ledger.mint(x, LP, rx).unwrap();
        ledger.mint(y, LP, ry).unwrap();
        let pool = router.pool_mut(x, y).unwrap();
        let (a, b) = if pool.token_a() == x { (rx, ry) } else { (ry, rx) };
        pool.add_liquidity(ledger, Env::new(1, 1), LP, AddLiquidity::new(a, b, LP, u64::MAX))
            .unwrap();
    }

    fn setup(config: RouterConfig) -> (SwapRouter, InMemoryLedger) {
        let mut router = SwapRouter::new(config, PoolRegistry::new(PoolConfig::default())).unwrap();
        let mut ledger = InMemoryLedger::new();
        fund_pool(&mut router, &mut ledger, NATIVE, USDC, 1_000_000, 2_000_000);
        fund_pool(&mut router, &mut ledger, NATIVE, WETH, 1_000_000, 1_000_000);
        ledger.mint(NATIVE, TRADER, 1_000_000).unwrap();
        ledger.mint(USDC, TRADER, 1_000_000).unwrap();
        (router, ledger)
    }

    #[test]
    fn test_native_swap_burns_half_the_fee() {
        let (mut router, mut ledger) = setup(router_config());
        let request = SwapRequest::new(TRADER, NATIVE, USDC, 10_000, 0, 1, 100);
        let receipt = router.swap(&mut ledger, Env::new(2, 10), request).unwrap();

        assert_eq!(receipt.protocol_fee, 10);
        assert_eq!(receipt.fee_burned, 5);
        assert_eq!(ledger.balance_of(NATIVE, COLLECTOR), 5);
        assert_eq!(receipt.route_kind(), 0);
        assert_eq!(ledger.balance_of(NATIVE, TRADER), 1_000_000 - 10_000);
        assert_eq!(ledger.balance_of(USDC, TRADER), 1_000_000 + receipt.amount_out);
    }

    #[test]
    fn test_non_native_fee_forwarded_whole() {
        let (mut router, mut ledger) = setup(router_config());
        let request = SwapRequest::new(TRADER, USDC, NATIVE, 10_000, 0, 1, 100);
        let receipt = router.swap(&mut ledger, Env::new(2, 10), request).unwrap();
        assert_eq!(receipt.fee_burned, 0);
        assert_eq!(ledger.balance_of(USDC, COLLECTOR), 10);
    }

    #[test]
    fn test_bridge_route() {
        let (mut router, mut ledger) = setup(router_config());
        let request = SwapRequest::new(TRADER, USDC, WETH, 10_000, 1, 1, 100);
        let receipt = router.swap(&mut ledger, Env::new(2, 10), request).unwrap();
        assert_eq!(receipt.route_kind(), SwapReceipt::encode_route_kind(RouteKind::BridgeHop { bridge: NATIVE }));
        assert_eq!(receipt.hop_count, 2);
        assert_eq!(ledger.balance_of(WETH, TRADER), receipt.amount_out);
        // the bridge leg nets out for the trader
        assert_eq!(ledger.balance_of(NATIVE, TRADER), 1_000_000);
    }

    #[test]
    fn test_mev_replay_rejected() {
        let (mut router, mut ledger) = setup(router_config());
        let request = SwapRequest::new(TRADER, NATIVE, USDC, 1_000, 0, 7, 100);
        router.swap(&mut ledger, Env::new(5, 10), request).unwrap();
        assert_eq!(
            router.swap(&mut ledger, Env::new(5, 11), request),
            Err(AmmError::MevProtectionActive { last_block: 5 })
        );
        assert!(router.swap(&mut ledger, Env::new(6, 12), request).is_ok());
    }

    #[test]
    fn test_failed_swap_commits_nothing() {
        let (mut router, mut ledger) = setup(router_config());
        let before = router.pool(NATIVE, USDC).unwrap().state_root();
        let request = SwapRequest::new(TRADER, NATIVE, USDC, 10_000, 1_000_000, 1, 100);
        assert_eq!(
            router.swap(&mut ledger, Env::new(2, 10), request),
            Err(AmmError::InsufficientOutputAmount)
        );
        assert_eq!(router.pool(NATIVE, USDC).unwrap().state_root(), before);
        assert_eq!(ledger.balance_of(NATIVE, TRADER), 1_000_000);
        assert!(router.mev_guard().is_empty());
        // the same nonce is still usable
        let request = SwapRequest::new(TRADER, NATIVE, USDC, 10_000, 0, 1, 100);
        assert!(router.swap(&mut ledger, Env::new(2, 10), request).is_ok());
    }

    #[test]
    fn test_short_delivering_venue_reverts() {
        let (mut router, mut ledger) = setup(router_config());
        ledger.mint(USDC, Address(900), 10_000_000).unwrap();
        // quotes 3 USDC per NATIVE but withholds half
        router.register_adapter(Box::new(
            FixedRateVenue::new("otc", Address(900), NATIVE, USDC, 3, 1, 50_000).with_shortfall(5_000),
        ));
        let request = SwapRequest::new(TRADER, NATIVE, USDC, 10_000, 25_000, 1, 100);
        let err = router.swap(&mut ledger, Env::new(2, 10), request).unwrap_err();
        assert!(matches!(err, AmmError::SlippageExceeded { minimum: 25_000, .. }));
        assert_eq!(ledger.balance_of(NATIVE, TRADER), 1_000_000);
        assert_eq!(ledger.balance_of(USDC, Address(900)), 10_000_000);
    }

    #[test]
    fn test_volume_caps() {
        let config = RouterConfig {
            user_daily_cap: Some(15_000),
            global_daily_cap: Some(25_000),
            ..router_config()
        };
        let (mut router, mut ledger) = setup(config);
        let request = SwapRequest::new(TRADER, NATIVE, USDC, 10_000, 0, 1, 100);
        router.swap(&mut ledger, Env::new(2, 10), request).unwrap();

        let request = SwapRequest::new(TRADER, NATIVE, USDC, 10_000, 0, 2, 100);
        assert_eq!(
            router.swap(&mut ledger, Env::new(3, 11), request),
            Err(AmmError::DailyVolumeExceeded { user: TRADER })
        );

        // 20_000 USDC is worth about 10_000 native
        let third = Address(12);
        ledger.mint(USDC, LP, 100_000).unwrap();
        ledger.mint(USDC, third, 100_000).unwrap();
        let other = SwapRequest::new(LP, USDC, NATIVE, 20_000, 0, 1, 100);
        router.swap(&mut ledger, Env::new(3, 11), other).unwrap();
        let other = SwapRequest::new(third, USDC, NATIVE, 20_000, 0, 1, 100);
        assert_eq!(
            router.swap(&mut ledger, Env::new(4, 12), other),
            Err(AmmError::GlobalLimitExceeded)
        );
    }

    #[test]
    fn test_input_validation() {
        let (mut router, mut ledger) = setup(router_config());
        let env = Env::new(2, 10);
        assert_eq!(
            router.swap(&mut ledger, env, SwapRequest::new(TRADER, NATIVE, USDC, 0, 0, 1, 100)),
            Err(AmmError::ZeroAmount)
        );
        assert_eq!(
            router.swap(&mut ledger, env, SwapRequest::new(TRADER, USDC, USDC, 5, 0, 1, 100)),
            Err(AmmError::IdenticalAssets(USDC))
        );
        assert_eq!(
            router.swap(&mut ledger, env, SwapRequest::new(TRADER, NATIVE, USDC, 5, 0, 1, 9)),
            Err(AmmError::ExpiredDeadline { deadline: 9, now: 10 })
        );
    }
}
