//! Dark AMM - demo binary
//!
//! Builds a small market in memory, routes a few swaps through it and
//! prints the resulting receipts and pool state roots.
//!
//! ```text
//! dark-amm [config.toml]
//! ```

use std::path::Path;
use std::sync::Arc;

use dark_amm::config::AmmConfig;
use dark_amm::ledger::{AssetLedger, InMemoryLedger, StaticDiscounts};
use dark_amm::pool::{AddLiquidity, PoolRegistry, PoolRepository};
use dark_amm::router::{FixedRateVenue, SwapRequest, SwapRouter};
use dark_amm::types::price::{from_base_units, to_base_units};
use dark_amm::types::{Address, AssetId, Env};
use dark_amm::Result;
use tracing::{error, info};

const DECIMALS: u32 = 6;
const USDC: AssetId = AssetId(2);
const WETH: AssetId = AssetId(3);
const LP: Address = Address(0x1000);
const TRADER: Address = Address(0x2000);
const OTC_DESK: Address = Address(0x3000);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run() {
        error!(error = %err, kind = ?err.kind(), "demo failed");
        std::process::exit(1);
    }
}

fn units(human: &str) -> Result<u64> {
    to_base_units(human, DECIMALS)
        .ok_or_else(|| dark_amm::AmmError::InvalidConfig(format!("bad amount {}", human)))
}

fn run() -> Result<()> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => AmmConfig::load_from_file(Path::new(&path))?,
        None => AmmConfig::default(),
    };
    let native = config.router.native_asset;
    // USDC <-> WETH has no direct pool; route it through the native asset
    config.router.bridge_asset.get_or_insert(native);
    info!(native = %native, fee_bps = config.pool.base_fee_bps, "starting");

    let discounts = StaticDiscounts::new().with(TRADER, 2_500);
    let registry = PoolRegistry::new(config.pool.clone()).with_discount_oracle(Arc::new(discounts));
    let mut router = SwapRouter::new(config.router.clone(), registry)?;
    let mut ledger = InMemoryLedger::new();

    // seed liquidity
    for asset in [native, USDC, WETH] {
        ledger.mint(asset, LP, units("10000000")?)?;
        ledger.mint(asset, TRADER, units("10000")?)?;
    }
    ledger.mint(USDC, OTC_DESK, units("1000000")?)?;

    let env = Env::new(1, 1_700_000_000);
    for (other, depth) in [(USDC, "2000000"), (WETH, "500000")] {
        let id = router.create_pool(native, other)?;
        let pool = router
            .pools_mut()
            .get_mut(id)
            .ok_or(dark_amm::AmmError::PoolNotFound(native, other))?;
        let (a, b) = if pool.token_a() == native {
            (units("1000000")?, units(depth)?)
        } else {
            (units(depth)?, units("1000000")?)
        };
        pool.add_liquidity(&mut ledger, env, LP, AddLiquidity::new(a, b, LP, env.timestamp + 60))?;
    }
    router.register_adapter(Box::new(FixedRateVenue::new("otc", OTC_DESK, WETH, USDC, 39, 10, 120_000)));

    // a few swaps
    let trades = [(native, USDC, "100"), (USDC, WETH, "250"), (WETH, USDC, "50")];
    for (nonce, (token_in, token_out, amount)) in trades.into_iter().enumerate() {
        let env = Env::new(2 + nonce as u64, env.timestamp + 12 * (nonce as u64 + 1));
        let request = SwapRequest::new(TRADER, token_in, token_out, units(amount)?, 0, nonce as u64, env.timestamp + 30);
        let receipt = router.swap(&mut ledger, env, request)?;
        info!(
            token_in = %token_in,
            token_out = %token_out,
            amount_in = %from_base_units(receipt.amount_in, DECIMALS),
            amount_out = %from_base_units(receipt.amount_out, DECIMALS),
            route = receipt.route_kind(),
            digest = %hex::encode(receipt.digest()),
            "receipt"
        );
    }

    for id in router.pools().pool_ids() {
        if let Some(pool) = router.pools().get(id) {
            let snapshot = pool.snapshot();
            info!(
                pool = %id,
                reserve_a = %from_base_units(snapshot.reserve_a, DECIMALS),
                reserve_b = %from_base_units(snapshot.reserve_b, DECIMALS),
                root = %snapshot.state_root_hex(),
                "pool state"
            );
        }
    }
    Ok(())
}
