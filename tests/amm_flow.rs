//! End-to-end flows across configuration, pools, flash loans and the router.

use dark_amm::config::AmmConfig;
use dark_amm::ledger::{AssetLedger, InMemoryLedger};
use dark_amm::pool::{AddLiquidity, PoolRegistry, RemoveLiquidity};
use dark_amm::router::{SwapRequest, SwapRouter};
use dark_amm::types::{Address, AssetId, Env, SECONDS_PER_DAY};
use dark_amm::AmmError;

const NATIVE: AssetId = AssetId(1);
const USDC: AssetId = AssetId(2);
const WETH: AssetId = AssetId(3);
const REWARD: AssetId = AssetId(4);

const LP: Address = Address(10);
const TRADER: Address = Address(11);
const BORROWER: Address = Address(12);
const COLLECTOR: Address = Address(7);

const T0: u64 = 1_700_000_000;
const DEPTH: u64 = 1_000_000;

const CONFIG: &str = r#"
[pool]
base_fee_bps = 30
reward_asset = 4
reward_rate_per_day = 1000000

[router]
native_asset = 1
bridge_asset = 1
protocol_fee_bps = 10
burn_rate_bps = 5000
fee_collector = 7
mev_delay_blocks = 2
"#;

struct Market {
    router: SwapRouter,
    ledger: InMemoryLedger,
}

fn market_with(config: AmmConfig) -> Market {
    let mut ledger = InMemoryLedger::new();
    for asset in [NATIVE, USDC, WETH] {
        ledger.mint(asset, LP, DEPTH * 10).unwrap();
        ledger.mint(asset, TRADER, DEPTH).unwrap();
    }

    let registry = PoolRegistry::new(config.pool.clone());
    let mut router = SwapRouter::new(config.router.clone(), registry).unwrap();
    let env = Env::new(1, T0);
    for other in [USDC, WETH] {
        router.create_pool(NATIVE, other).unwrap();
        router
            .pool_mut(NATIVE, other)
            .unwrap()
            .add_liquidity(&mut ledger, env, LP, AddLiquidity::new(DEPTH, DEPTH, LP, T0 + 60))
            .unwrap();
    }
    Market { router, ledger }
}

fn market() -> Market {
    market_with(AmmConfig::from_toml_str(CONFIG).unwrap())
}

#[test]
fn test_native_swap_burns_half_the_fee() {
    let Market { mut router, mut ledger } = market();
    let supply_before = ledger.total_supply(NATIVE);

    let request = SwapRequest::new(TRADER, NATIVE, USDC, 10_000, 9_800, 1, T0 + 60);
    let receipt = router.swap(&mut ledger, Env::new(2, T0 + 12), request).unwrap();

    // 9_990 reaches the pool, 9_960 after the 0.3% pool fee
    assert_eq!(receipt.protocol_fee, 10);
    assert_eq!(receipt.fee_burned, 5);
    assert_eq!(receipt.amount_out, 9_861);
    assert_eq!(receipt.route_kind(), 0);
    assert_eq!(receipt.hop_count, 1);

    assert_eq!(ledger.balance_of(NATIVE, TRADER), DEPTH - 10_000);
    assert_eq!(ledger.balance_of(USDC, TRADER), DEPTH + 9_861);
    assert_eq!(ledger.balance_of(NATIVE, COLLECTOR), 5);
    assert_eq!(ledger.total_supply(NATIVE), supply_before - 5);

    let reserves = router.pool(NATIVE, USDC).unwrap().get_reserves();
    assert_eq!(reserves.reserve_a, DEPTH + 9_990);
    assert_eq!(reserves.reserve_b, DEPTH - 9_861);
}

#[test]
fn test_bridge_swap_forwards_non_native_fee() {
    let Market { mut router, mut ledger } = market();
    let native_before = ledger.balance_of(NATIVE, TRADER);

    let request = SwapRequest::new(TRADER, USDC, WETH, 10_000, 9_700, 1, T0 + 60);
    let receipt = router.swap(&mut ledger, Env::new(2, T0 + 12), request).unwrap();

    assert_eq!(receipt.route_kind(), 1);
    assert_eq!(receipt.hop_count, 2);
    assert_eq!(receipt.amount_out, 9_735);
    assert_eq!(receipt.fee_burned, 0);
    assert_eq!(ledger.balance_of(USDC, COLLECTOR), 10);
    assert_eq!(ledger.balance_of(WETH, TRADER), DEPTH + 9_735);
    // the bridge leg passes through without leaving a balance behind
    assert_eq!(ledger.balance_of(NATIVE, TRADER), native_before);
}

#[test]
fn test_swap_to_other_recipient() {
    let Market { mut router, mut ledger } = market();
    let friend = Address(55);

    let request = SwapRequest::new(TRADER, NATIVE, USDC, 10_000, 0, 1, T0 + 60).to(friend);
    let receipt = router.swap(&mut ledger, Env::new(2, T0 + 12), request).unwrap();

    assert_eq!(receipt.recipient, friend.0);
    assert_eq!(ledger.balance_of(USDC, friend), receipt.amount_out);
    assert_eq!(ledger.balance_of(USDC, TRADER), DEPTH);
}

#[test]
fn test_replay_is_blocked_until_delay_passes() {
    let Market { mut router, mut ledger } = market();
    let request = SwapRequest::new(TRADER, NATIVE, USDC, 1_000, 0, 42, u64::MAX);

    router.swap(&mut ledger, Env::new(10, T0 + 1), request).unwrap();
    let err = router.swap(&mut ledger, Env::new(11, T0 + 2), request).unwrap_err();
    assert!(matches!(err, AmmError::MevProtectionActive { last_block: 10 }));

    // different nonce, same block: allowed
    let fresh = SwapRequest::new(TRADER, NATIVE, USDC, 1_000, 0, 43, u64::MAX);
    router.swap(&mut ledger, Env::new(11, T0 + 2), fresh).unwrap();

    router.swap(&mut ledger, Env::new(12, T0 + 3), request).unwrap();
}

#[test]
fn test_daily_cap_resets_next_day() {
    let mut config = AmmConfig::from_toml_str(CONFIG).unwrap();
    config.router.user_daily_cap = Some(15_000);
    let Market { mut router, mut ledger } = market_with(config);

    let first = SwapRequest::new(TRADER, NATIVE, USDC, 10_000, 0, 1, u64::MAX);
    router.swap(&mut ledger, Env::new(2, T0 + 10), first).unwrap();

    let second = SwapRequest::new(TRADER, NATIVE, USDC, 10_000, 0, 2, u64::MAX);
    let err = router.swap(&mut ledger, Env::new(3, T0 + 20), second).unwrap_err();
    assert!(matches!(err, AmmError::DailyVolumeExceeded { user } if user == TRADER));
    assert_eq!(router.volume_guard().user_spent(TRADER, T0 + 20), 10_000);

    let next_day = T0 + 10 + SECONDS_PER_DAY;
    router.swap(&mut ledger, Env::new(4, next_day), second).unwrap();
    assert_eq!(router.volume_guard().user_spent(TRADER, next_day), 10_000);
}

#[test]
fn test_rewards_stream_to_providers() {
    let Market { mut router, mut ledger } = market();
    let one_day = T0 + SECONDS_PER_DAY;

    let pool = router.pool_mut(NATIVE, USDC).unwrap();
    // 999_000 of 1_000_000 shares for a full day at 1_000_000 per day
    assert_eq!(pool.get_pending_rewards(LP, one_day), 999_000);

    let claimed = pool.claim_rewards(&mut ledger, Env::new(100, one_day), LP).unwrap();
    assert_eq!(claimed, 999_000);
    assert_eq!(ledger.balance_of(REWARD, LP), 999_000);
    assert_eq!(pool.get_pending_rewards(LP, one_day), 0);

    // withdrawing does not forfeit what has accrued since
    let half_day = one_day + SECONDS_PER_DAY / 2;
    let shares = pool.position(LP).shares;
    pool.remove_liquidity(&mut ledger, Env::new(101, half_day), LP, RemoveLiquidity::new(shares, LP, u64::MAX))
        .unwrap();
    assert_eq!(pool.get_pending_rewards(LP, half_day + SECONDS_PER_DAY), 499_500);
}

#[test]
fn test_flash_loan_repaid_with_fee() {
    let Market { mut router, mut ledger } = market();
    ledger.mint(NATIVE, BORROWER, 1_000).unwrap();

    let pool = router.pool_mut(NATIVE, USDC).unwrap();
    let pool_address = pool.address();
    let token_a = pool.token_a();
    assert_eq!(token_a, NATIVE);

    let settlement = pool
        .flash_loan(&mut ledger, Env::new(5, T0 + 5), BORROWER, 100_000, 0, |ledger, loan| {
            assert_eq!(ledger.balance_of(NATIVE, BORROWER), 101_000);
            let (repay_a, _) = loan.repayment();
            ledger.transfer(NATIVE, BORROWER, pool_address, repay_a)
        })
        .unwrap();

    // ceil(100_000 * 9 / 10_000)
    assert_eq!(settlement.gain_a, 90);
    assert_eq!(settlement.gain_b, 0);
    assert_eq!(pool.get_reserves().reserve_a, DEPTH + 90);
    assert_eq!(ledger.balance_of(NATIVE, BORROWER), 910);
    assert!(!pool.is_locked());
}

#[test]
fn test_flash_loan_short_repayment_reverts() {
    let Market { mut router, mut ledger } = market();
    ledger.mint(NATIVE, BORROWER, 1_000).unwrap();

    let pool = router.pool_mut(NATIVE, USDC).unwrap();
    let pool_address = pool.address();
    let root = pool.state_root();

    let err = pool
        .flash_loan(&mut ledger, Env::new(5, T0 + 5), BORROWER, 100_000, 0, |ledger, loan| {
            let (principal, _) = loan.amounts();
            ledger.transfer(NATIVE, BORROWER, pool_address, principal)
        })
        .unwrap_err();

    assert!(matches!(err, AmmError::FlashLoanNotRepaid { .. }));
    assert_eq!(pool.state_root(), root);
    assert!(!pool.is_locked());
    assert_eq!(ledger.balance_of(NATIVE, BORROWER), 1_000);
    assert_eq!(ledger.balance_of(NATIVE, pool_address), DEPTH);
}

#[test]
fn test_open_loan_locks_the_pair_for_routing() {
    let Market { mut router, mut ledger } = market();
    ledger.mint(USDC, BORROWER, 1_000).unwrap();
    let env = Env::new(5, T0 + 5);

    let handle = {
        let pool = router.pool_mut(NATIVE, USDC).unwrap();
        pool.lend(&mut ledger, BORROWER, 0, 50_000).unwrap()
    };
    assert!(router.pool(NATIVE, USDC).unwrap().is_locked());

    let request = SwapRequest::new(TRADER, NATIVE, USDC, 1_000, 0, 9, u64::MAX);
    assert!(router.swap(&mut ledger, env, request).is_err());
    assert!(router.mev_guard().is_empty());

    let pool = router.pool_mut(NATIVE, USDC).unwrap();
    let (_, repay_b) = handle.repayment();
    ledger.transfer(USDC, BORROWER, pool.address(), repay_b).unwrap();
    let settlement = pool.settle(&ledger, env, handle).unwrap();
    assert_eq!(settlement.gain_b, 45);

    // the same request goes through once the loan is settled
    router.swap(&mut ledger, env, request).unwrap();
}

#[test]
fn test_twap_tracks_pre_trade_price() {
    let Market { mut router, mut ledger } = market();

    // push the price around after half an hour at 1:1
    let request = SwapRequest::new(TRADER, NATIVE, USDC, 50_000, 0, 1, u64::MAX);
    router.swap(&mut ledger, Env::new(2, T0 + 1_800), request).unwrap();

    let pool = router.pool(NATIVE, USDC).unwrap();
    let twap = pool.twap_price(T0 + 1_800).unwrap();
    assert_eq!(twap.interval, 1_800);
    assert_eq!(twap.price_a, 100_000_000);
    assert_eq!(twap.price_b, 100_000_000);

    let spot = pool.spot_price().unwrap();
    assert!(spot < 100_000_000);
}

#[test]
fn test_failed_swap_leaves_everything_untouched() {
    let Market { mut router, mut ledger } = market();
    let root = router.pool(NATIVE, USDC).unwrap().state_root();

    let greedy = SwapRequest::new(TRADER, NATIVE, USDC, 10_000, 10_000, 1, u64::MAX);
    let err = router.swap(&mut ledger, Env::new(2, T0 + 12), greedy).unwrap_err();
    assert!(matches!(err, AmmError::InsufficientOutputAmount));

    assert_eq!(router.pool(NATIVE, USDC).unwrap().state_root(), root);
    assert_eq!(ledger.balance_of(NATIVE, TRADER), DEPTH);
    assert_eq!(ledger.balance_of(NATIVE, COLLECTOR), 0);
    assert!(router.mev_guard().is_empty());
    assert_eq!(router.volume_guard().user_spent(TRADER, T0 + 12), 0);
}
