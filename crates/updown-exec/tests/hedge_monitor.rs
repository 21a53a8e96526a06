//! Hedge monitor lifecycle against the paper gateway.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

use updown_core::{
    BookSource, Cents, MarketPair, NewOrder, Order, OrderPlacer, OrderSide, OrderType, Size,
    TokenSide, TopOfBook,
};
use updown_exec::{FillPolicy, HedgeMonitor, HedgeMonitorConfig, HedgeOutcome, HedgeTask, PaperGateway};

const SLUG: &str = "btc-updown-1h-1722500400";

fn market() -> MarketPair {
    MarketPair {
        slug: SLUG.to_string(),
        up_asset: "a-up".to_string(),
        down_asset: "a-down".to_string(),
        condition_id: "cond".to_string(),
        cycle_start_s: 1_722_500_400,
    }
}

fn tob(up_ask: i64, down_ask: i64) -> TopOfBook {
    TopOfBook {
        up_bid: Cents(up_ask - 1),
        up_ask: Cents(up_ask),
        down_bid: Cents(down_ask - 1),
        down_ask: Cents(down_ask),
        source: BookSource::Ws,
        fetched_at_ms: 0,
    }
}

async fn resting_hedge(gw: &Arc<PaperGateway>) -> Order {
    gw.set_policy("a-down", FillPolicy::Rest);
    gw.place_order(NewOrder {
        market_slug: SLUG.to_string(),
        asset_id: "a-down".to_string(),
        token: TokenSide::Down,
        side: OrderSide::Buy,
        price: Cents(39),
        size: Size::new(dec!(10)),
        order_type: OrderType::Gtc,
        is_entry: false,
        hedge_for: None,
    })
    .await
    .unwrap()
}

fn monitor(gw: &Arc<PaperGateway>, config: HedgeMonitorConfig) -> HedgeMonitor {
    HedgeMonitor::new(config, gw.clone(), gw.clone(), gw.clone(), gw.clone())
}

#[tokio::test(start_paused = true)]
async fn test_filled_hedge_ends_monitoring() {
    let gw = PaperGateway::new();
    let hedge = resting_hedge(&gw).await;
    gw.fill_order(&hedge.id, Size::new(dec!(10)));

    let mon = monitor(&gw, HedgeMonitorConfig::default());
    let outcome = mon
        .run(
            HedgeTask {
                market: market(),
                entry_ask: Cents(58),
                hedge_order: hedge,
            },
            CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome, HedgeOutcome::Filled);
}

#[tokio::test(start_paused = true)]
async fn test_requote_at_complementary_price() {
    // Entry ask 58, offset 3, fresh DOWN ask 39.
    // 100 - 58 - 3 = 39, clamped to min(39, 39 - 1) = 38.
    let gw = PaperGateway::new();
    let hedge = resting_hedge(&gw).await;
    gw.set_top_of_book(SLUG, tob(62, 39));

    let mon = monitor(&gw, HedgeMonitorConfig::default());
    let task = HedgeTask {
        market: market(),
        entry_ask: Cents(58),
        hedge_order: hedge.clone(),
    };
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(async move { mon.run(task, cancel).await });

    // Past the 30s reorder timeout the stale hedge is replaced.
    tokio::time::sleep(Duration::from_secs(35)).await;

    let placements = gw.placements();
    assert_eq!(placements.len(), 2);
    let requote = &placements[1];
    assert_eq!(requote.order_type, OrderType::Gtc);
    assert_eq!(requote.side, OrderSide::Buy);
    assert_eq!(requote.token, TokenSide::Down);
    assert_eq!(requote.price, Cents(38));
    assert_eq!(requote.size, Size::new(dec!(10)));
    assert_eq!(gw.cancels(), vec![hedge.id]);

    // Fill the replacement: the monitor exits cleanly.
    gw.fill_order(&requote.id, Size::new(dec!(10)));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(handle.await.unwrap(), HedgeOutcome::Filled);
}

#[tokio::test(start_paused = true)]
async fn test_requote_happens_once() {
    let gw = PaperGateway::new();
    let hedge = resting_hedge(&gw).await;
    gw.set_top_of_book(SLUG, tob(62, 39));

    let mon = monitor(&gw, HedgeMonitorConfig::default());
    let task = HedgeTask {
        market: market(),
        entry_ask: Cents(58),
        hedge_order: hedge,
    };
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { mon.run(task, cancel).await }
    });

    // Two full reorder windows: still exactly one re-quote.
    tokio::time::sleep(Duration::from_secs(70)).await;
    assert_eq!(gw.placements().len(), 2);

    cancel.cancel();
    assert_eq!(handle.await.unwrap(), HedgeOutcome::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_taker_fallback_takes_current_ask() {
    let gw = PaperGateway::new();
    let hedge = resting_hedge(&gw).await;
    gw.set_top_of_book(SLUG, tob(62, 44));

    let config = HedgeMonitorConfig {
        fak_timeout_s: 5,
        ..Default::default()
    };
    let mon = monitor(&gw, config);
    let outcome = mon
        .run(
            HedgeTask {
                market: market(),
                entry_ask: Cents(58),
                hedge_order: hedge.clone(),
            },
            CancellationToken::new(),
        )
        .await;

    let placements = gw.placements();
    assert_eq!(placements.len(), 2);
    let taker = &placements[1];
    assert_eq!(taker.order_type, OrderType::Fak);
    assert_eq!(taker.price, Cents(44));
    assert_eq!(taker.size, Size::new(dec!(10)));
    assert_eq!(outcome, HedgeOutcome::TakerFallback {
        order_id: Some(taker.id.clone()),
    });
    assert_eq!(gw.cancels(), vec![hedge.id]);
}

#[tokio::test(start_paused = true)]
async fn test_risk_stop_when_complement_out_of_range() {
    // DOWN ask of 1c leaves no tradeable re-quote below it.
    let gw = PaperGateway::new();
    let hedge = resting_hedge(&gw).await;
    gw.set_top_of_book(SLUG, tob(99, 1));

    let mon = monitor(&gw, HedgeMonitorConfig::default());
    let outcome = mon
        .run(
            HedgeTask {
                market: market(),
                entry_ask: Cents(58),
                hedge_order: hedge.clone(),
            },
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(outcome, HedgeOutcome::RiskStop { .. }));
    // The resting hedge was not touched.
    assert!(gw.cancels().is_empty());
    assert_eq!(gw.placements().len(), 1);
}
