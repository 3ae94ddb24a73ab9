// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS: constant-product math, pools, TWAP
//
// Run: cargo test --release --test invariants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use dark_amm::config::PoolConfig;
use dark_amm::error::AmmError;
use dark_amm::ledger::{AssetLedger, InMemoryLedger};
use dark_amm::math::{self, MAX_DISCOUNT_BPS};
use dark_amm::pool::{AddLiquidity, Pool, RemoveLiquidity, SwapParams, TwapAccumulator};
use dark_amm::types::price::scaled_price;
use dark_amm::types::{Address, AssetId, Env};
use proptest::prelude::*;

const TOKEN_A: AssetId = AssetId(1);
const TOKEN_B: AssetId = AssetId(2);
const SEED_LP: Address = Address(10);
const ACTOR: Address = Address(11);
const FUNDS: u64 = 1 << 50;

fn arb_reserve() -> impl Strategy<Value = u64> {
    1_000u64..=1_000_000_000_000
}

fn arb_fee() -> impl Strategy<Value = u64> {
    (0u16..=1_000, 0u16..=10_000).prop_map(|(base, discount)| math::effective_fee(base, discount))
}

fn funded_pool(reserve_a: u64, reserve_b: u64) -> (Pool, InMemoryLedger) {
    let mut ledger = InMemoryLedger::new();
    for asset in [TOKEN_A, TOKEN_B] {
        ledger.mint(asset, SEED_LP, FUNDS).unwrap();
        ledger.mint(asset, ACTOR, FUNDS).unwrap();
    }
    let config = PoolConfig {
        max_price_impact_bps: 10_000,
        ..PoolConfig::default()
    };
    let mut pool = Pool::new(Address(9_000), TOKEN_A, TOKEN_B, config).unwrap();
    pool.add_liquidity(
        &mut ledger,
        Env::new(1, 100),
        SEED_LP,
        AddLiquidity::new(reserve_a, reserve_b, SEED_LP, u64::MAX),
    )
    .unwrap();
    (pool, ledger)
}

// ─────────────────────────────────────────────────────────────────
// SWAP MATH
// ─────────────────────────────────────────────────────────────────

proptest! {
    /// The fee-adjusted product never falls below the pre-swap product.
    #[test]
    fn prop_swap_never_decreases_k(
        reserve_in in arb_reserve(),
        reserve_out in arb_reserve(),
        amount_in in 1u64..=1_000_000_000_000,
        fee in arb_fee(),
    ) {
        let out = math::amount_out(amount_in, reserve_in, reserve_out, fee).unwrap();
        prop_assert!(out < reserve_out);
        let after = math::k(reserve_in + amount_in, reserve_out - out);
        prop_assert!(after >= math::k(reserve_in, reserve_out));

        let fee_amount = amount_in - math::net_input(amount_in, fee).unwrap();
        prop_assert!(math::check_invariant(reserve_in, reserve_out, reserve_in + amount_in, reserve_out - out, fee_amount).is_ok());
    }

    /// Selling the proceeds straight back never returns more than was sold.
    #[test]
    fn prop_round_trip_loses_value(
        reserve_a in arb_reserve(),
        reserve_b in arb_reserve(),
        amount in 1u64..=1_000_000_000_000,
        fee in arb_fee(),
    ) {
        let out = math::amount_out(amount, reserve_a, reserve_b, fee).unwrap();
        prop_assume!(out > 0);
        let back = math::amount_out(out, reserve_b - out, reserve_a + amount, fee).unwrap();
        prop_assert!(back <= amount, "sold {} got back {}", amount, back);
    }

    /// A larger discount never yields a smaller output.
    #[test]
    fn prop_output_monotonic_in_discount(
        reserve_in in arb_reserve(),
        reserve_out in arb_reserve(),
        amount_in in 1u64..=1_000_000_000,
        base in 0u16..=1_000,
        d1 in 0u16..=MAX_DISCOUNT_BPS,
        d2 in 0u16..=MAX_DISCOUNT_BPS,
    ) {
        let (low, high) = (d1.min(d2), d1.max(d2));
        let fee_low = math::effective_fee(base, low);
        let fee_high = math::effective_fee(base, high);
        prop_assert!(fee_high <= fee_low);
        let out_low = math::amount_out(amount_in, reserve_in, reserve_out, fee_low).unwrap();
        let out_high = math::amount_out(amount_in, reserve_in, reserve_out, fee_high).unwrap();
        prop_assert!(out_high >= out_low);
    }

    /// Paying the quoted input always buys at least the requested output.
    #[test]
    fn prop_amount_in_covers_amount_out(
        reserve_in in arb_reserve(),
        reserve_out in arb_reserve(),
        fraction in 1u64..=9_000,
        fee in arb_fee(),
    ) {
        let wanted = (reserve_out as u128 * fraction as u128 / 10_000) as u64;
        prop_assume!(wanted > 0);
        let needed = math::amount_in(wanted, reserve_in, reserve_out, fee).unwrap();
        let got = math::amount_out(needed, reserve_in, reserve_out, fee).unwrap();
        prop_assert!(got >= wanted, "paid {} for {} but got {}", needed, wanted, got);
    }
}

// ─────────────────────────────────────────────────────────────────
// POOL STATE
// ─────────────────────────────────────────────────────────────────

proptest! {
    /// Pool swaps keep reserves equal to ledger balances and grow k.
    #[test]
    fn prop_pool_swaps_track_ledger(
        reserve_a in 1_000_000u64..=1_000_000_000_000,
        reserve_b in 1_000_000u64..=1_000_000_000_000,
        trades in prop::collection::vec((any::<bool>(), 1u64..=10_000), 1..20),
    ) {
        let (mut pool, mut ledger) = funded_pool(reserve_a, reserve_b);
        let mut last_k = pool.snapshot().k();

        for (i, (a_in, bps)) in trades.into_iter().enumerate() {
            let (reserve_in, _) = pool.reserves_for(a_in);
            let amount = (reserve_in as u128 * bps as u128 / 10_000).max(1) as u64;
            let env = Env::new(2 + i as u64, 200 + i as u64);
            let _ = pool.swap(&mut ledger, env, ACTOR, SwapParams::exact_in(amount, a_in, 0, ACTOR, u64::MAX));

            let reserves = pool.get_reserves();
            prop_assert_eq!(ledger.balance_of(TOKEN_A, pool.address()), reserves.reserve_a);
            prop_assert_eq!(ledger.balance_of(TOKEN_B, pool.address()), reserves.reserve_b);
            let k = pool.snapshot().k();
            prop_assert!(k >= last_k);
            last_k = k;
        }
    }

    /// Burning `s` of `T` shares pays exactly floor(s * R / T) of each
    /// reserve, whatever trading happened before.
    #[test]
    fn prop_remove_liquidity_is_exact_pro_rata(
        reserve_a in 1_000_000u64..=1_000_000_000_000,
        reserve_b in 1_000_000u64..=1_000_000_000_000,
        a_in in any::<bool>(),
        swap_bps in 0u64..=500,
        share_bps in 1u64..=10_000,
    ) {
        let (mut pool, mut ledger) = funded_pool(reserve_a, reserve_b);
        if swap_bps > 0 {
            let (reserve_in, _) = pool.reserves_for(a_in);
            let amount = (reserve_in as u128 * swap_bps as u128 / 10_000) as u64;
            pool.swap(&mut ledger, Env::new(2, 200), ACTOR, SwapParams::exact_in(amount, a_in, 0, ACTOR, u64::MAX))
                .unwrap();
        }

        let before = pool.get_reserves();
        let supply = pool.share_supply();
        let held = pool.position(SEED_LP).shares;
        let shares = (held as u128 * share_bps as u128 / 10_000).max(1) as u64;
        let expected_a = math::mul_div(shares, before.reserve_a, supply).unwrap();
        let expected_b = math::mul_div(shares, before.reserve_b, supply).unwrap();

        let env = Env::new(3, 300);
        let result = pool.remove_liquidity(&mut ledger, env, SEED_LP, RemoveLiquidity::new(shares, SEED_LP, u64::MAX));
        if expected_a == 0 || expected_b == 0 {
            prop_assert_eq!(result, Err(AmmError::InsufficientLiquidityBurned));
            return Ok(());
        }
        let removed = result.unwrap();
        prop_assert_eq!((removed.amount_a, removed.amount_b), (expected_a, expected_b));

        let after = pool.get_reserves();
        prop_assert_eq!(after.reserve_a, before.reserve_a - expected_a);
        prop_assert_eq!(after.reserve_b, before.reserve_b - expected_b);
        prop_assert_eq!(pool.share_supply(), supply - shares);
        prop_assert_eq!(pool.position(SEED_LP).shares, held - shares);
    }

    /// A provider joining and leaving a quiet pool never gets out more than
    /// it put in; rounding always favours the pool.
    #[test]
    fn prop_pro_rata_redemption(
        reserve_a in 1_000_000u64..=1_000_000_000_000,
        reserve_b in 1_000_000u64..=1_000_000_000_000,
        deposit_a in 1_000u64..=1_000_000_000_000,
        deposit_b in 1_000u64..=1_000_000_000_000,
    ) {
        let (mut pool, mut ledger) = funded_pool(reserve_a, reserve_b);
        let supply_before = pool.share_supply();
        let env = Env::new(2, 200);

        let added = match pool.add_liquidity(&mut ledger, env, ACTOR, AddLiquidity::new(deposit_a, deposit_b, ACTOR, u64::MAX)) {
            Ok(added) => added,
            Err(_) => return Ok(()),
        };
        prop_assert!(added.amount_a <= deposit_a && added.amount_b <= deposit_b);

        let removed = match pool.remove_liquidity(&mut ledger, env, ACTOR, RemoveLiquidity::new(added.shares, ACTOR, u64::MAX)) {
            Ok(removed) => removed,
            Err(_) => return Ok(()),
        };
        prop_assert!(removed.amount_a <= added.amount_a);
        prop_assert!(removed.amount_b <= added.amount_b);

        // the incumbent provider is never diluted by the round trip
        let reserves = pool.get_reserves();
        prop_assert!(reserves.reserve_a >= reserve_a);
        prop_assert!(reserves.reserve_b >= reserve_b);
        prop_assert_eq!(pool.share_supply(), supply_before);
        prop_assert_eq!(pool.position(ACTOR).shares, 0);
    }
}

// ─────────────────────────────────────────────────────────────────
// TWAP
// ─────────────────────────────────────────────────────────────────

proptest! {
    /// The windowed average lies between the lowest and highest spot
    /// price that held during the window.
    #[test]
    fn prop_twap_bounded_by_spot_prices(
        start in 1u64..=1_000_000,
        steps in prop::collection::vec((1u64..=3_600, 1u64..=1_000_000_000, 1u64..=1_000_000_000), 1..32),
        tail in 1u64..=3_600,
    ) {
        let mut twap = TwapAccumulator::new(u64::MAX / 2, steps.len() + 2);
        let (mut reserve_a, mut reserve_b) = (1_000_000u64, 1_000_000u64);
        let mut now = start;
        twap.update(reserve_a, reserve_b, now);

        let mut prices = Vec::new();
        for (gap, next_a, next_b) in steps {
            now += gap;
            twap.update(reserve_a, reserve_b, now);
            prices.push(scaled_price(reserve_b, reserve_a).unwrap());
            reserve_a = next_a;
            reserve_b = next_b;
        }
        now += tail;
        prices.push(scaled_price(reserve_b, reserve_a).unwrap());

        let average = twap.average(reserve_a, reserve_b, now).unwrap();
        prop_assert_eq!(average.interval, now - start);
        let lo = *prices.iter().min().unwrap();
        let hi = *prices.iter().max().unwrap();
        prop_assert!(average.price_a >= lo && average.price_a <= hi,
            "twap {} outside [{}, {}]", average.price_a, lo, hi);
    }
}
