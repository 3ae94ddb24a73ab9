//! Route discovery.
//!
//! ## Candidates
//!
//! Evaluated in this order against live state:
//!
//! 1. the direct pool for the pair
//! 2. two pool hops through the bridge asset, leg 2 quoted on leg 1's output
//! 3. every registered external venue
//!
//! The greatest output wins; equal outputs go to the lower gas estimate,
//! and a full tie keeps the earlier candidate. Candidates that error or
//! quote zero are skipped.
//!
//! ## Cache
//!
//! The cache remembers the venue sequence chosen for a pair, not its
//! output. A fresh hit (`now - cached_at < ttl`) is re-quoted for the
//! requested amount so `expected_output` always reflects live reserves.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{AmmError, Result};
use crate::ledger::AssetLedger;
use crate::pool::PoolRepository;
use crate::router::venue::ExternalVenue;
use crate::types::{AdapterId, Address, AssetId, Route, RouteKind, Venue, BRIDGE_HOP_GAS, NATIVE_HOP_GAS};

/// Read-only view of everything a quote depends on.
#[derive(Clone, Copy)]
pub struct QuoteContext<'a> {
    pub pools: &'a dyn PoolRepository,
    pub adapters: &'a [Box<dyn ExternalVenue>],
    pub ledger: &'a dyn AssetLedger,
}

/// A route shape without an output.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RouteTemplate {
    kind: RouteKind,
    path: Vec<AssetId>,
    venues: Vec<Venue>,
    gas_estimate: u64,
}

#[derive(Debug, Clone)]
struct CachedRoute {
    template: RouteTemplate,
    cached_at: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RouteFinder {
    bridge_asset: Option<AssetId>,
    cache_ttl_secs: u64,
    cache: HashMap<(AssetId, AssetId), CachedRoute>,
}

impl RouteFinder {
    pub fn new(bridge_asset: Option<AssetId>, cache_ttl_secs: u64) -> Self {
        Self {
            bridge_asset,
            cache_ttl_secs,
            cache: HashMap::new(),
        }
    }

    pub fn bridge_asset(&self) -> Option<AssetId> {
        self.bridge_asset
    }

    /// Best route for `amount_in`, served from the cache when fresh.
    pub fn find(
        &self,
        ctx: QuoteContext<'_>,
        token_in: AssetId,
        token_out: AssetId,
        amount_in: u64,
        trader: Address,
        now: u64,
    ) -> Result<Route> {
        if let Some(cached) = self.cached(token_in, token_out, now) {
            match quote_template(ctx, cached, amount_in, trader) {
                Ok(route) if route.expected_output > 0 => {
                    debug!(token_in = %token_in, token_out = %token_out, "route cache hit");
                    return Ok(route);
                }
                _ => debug!(token_in = %token_in, token_out = %token_out, "cached route no longer quotes"),
            }
        }
        self.find_uncached(ctx, token_in, token_out, amount_in, trader)
    }

    /// Evaluate every candidate against live state.
    pub fn find_uncached(
        &self,
        ctx: QuoteContext<'_>,
        token_in: AssetId,
        token_out: AssetId,
        amount_in: u64,
        trader: Address,
    ) -> Result<Route> {
        let mut best: Option<Route> = None;
        for template in self.candidates(ctx, token_in, token_out) {
            let route = match quote_template(ctx, &template, amount_in, trader) {
                Ok(route) if route.expected_output > 0 => route,
                Ok(_) => continue,
                Err(err) => {
                    debug!(kind = ?template.kind, error = %err, "candidate skipped");
                    continue;
                }
            };
            debug!(kind = ?route.kind, expected_output = route.expected_output, gas = route.gas_estimate, "candidate quoted");
            best = match best {
                Some(current) if !route.beats(&current) => Some(current),
                _ => Some(route),
            };
        }
        best.ok_or(AmmError::NoValidRoute { token_in, token_out })
    }

    /// Remember `route`'s venue sequence for its pair.
    pub fn remember(&mut self, route: &Route, now: u64) {
        if self.cache_ttl_secs == 0 {
            return;
        }
        let template = RouteTemplate {
            kind: route.kind,
            path: route.path.clone(),
            venues: route.venues.clone(),
            gas_estimate: route.gas_estimate,
        };
        self.cache.insert(
            (route.token_in(), route.token_out()),
            CachedRoute {
                template,
                cached_at: now,
            },
        );
    }

    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    /// Cached venue sequence for the pair if still fresh at `now`.
    fn cached(&self, token_in: AssetId, token_out: AssetId, now: u64) -> Option<&RouteTemplate> {
        let entry = self.cache.get(&(token_in, token_out))?;
        if now.saturating_sub(entry.cached_at) < self.cache_ttl_secs {
            Some(&entry.template)
        } else {
            None
        }
    }

    fn candidates(&self, ctx: QuoteContext<'_>, token_in: AssetId, token_out: AssetId) -> Vec<RouteTemplate> {
        let mut out = Vec::new();

        if let Some(id) = ctx.pools.lookup(token_in, token_out) {
            out.push(RouteTemplate {
                kind: RouteKind::NativePool,
                path: vec![token_in, token_out],
                venues: vec![Venue::Pool(id)],
                gas_estimate: NATIVE_HOP_GAS,
            });
        }

        if let Some(bridge) = self.bridge_asset.filter(|b| *b != token_in && *b != token_out) {
            if let (Some(first), Some(second)) =
                (ctx.pools.lookup(token_in, bridge), ctx.pools.lookup(bridge, token_out))
            {
                out.push(RouteTemplate {
                    kind: RouteKind::BridgeHop { bridge },
                    path: vec![token_in, bridge, token_out],
                    venues: vec![Venue::Pool(first), Venue::Pool(second)],
                    gas_estimate: BRIDGE_HOP_GAS,
                });
            }
        }

        for (index, adapter) in ctx.adapters.iter().enumerate() {
            let id = AdapterId(index as u32);
            out.push(RouteTemplate {
                kind: RouteKind::ExternalAdapter { id },
                path: vec![token_in, token_out],
                venues: vec![Venue::Adapter(id)],
                gas_estimate: adapter.gas_estimate(),
            });
        }
        out
    }
}

/// Quote a route shape hop by hop, each hop on the previous hop's output.
fn quote_template(ctx: QuoteContext<'_>, template: &RouteTemplate, amount_in: u64, trader: Address) -> Result<Route> {
    let mut amount = amount_in;
    for (hop, venue) in template.venues.iter().enumerate() {
        let (asset_in, asset_out) = (template.path[hop], template.path[hop + 1]);
        amount = match *venue {
            Venue::Pool(id) => ctx
                .pools
                .get(id)
                .ok_or(AmmError::PoolNotFound(asset_in, asset_out))?
                .simulate_swap(asset_in, amount, trader)?,
            Venue::Adapter(id) => ctx
                .adapters
                .get(id.0 as usize)
                .ok_or(AmmError::UnknownAdapter(id.0))?
                .quote(ctx.ledger, asset_in, asset_out, amount)?,
        };
    }
    Ok(Route {
        kind: template.kind,
        path: template.path.clone(),
        venues: template.venues.clone(),
        expected_output: amount,
        gas_estimate: template.gas_estimate,
    })
}
