//! End-to-end execution engine flows against the paper gateway.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

use updown_core::{
    AutoHedgeConfig, Cents, LegIntent, MultiLegRequest, OrderSide, OrderType, Size, TokenSide,
};
use updown_exec::{ExecError, ExecutionConfig, ExecutionEngine, FillPolicy, PaperGateway};
use updown_risk::{BreakerConfig, CircuitBreaker};

const SLUG: &str = "btc-updown-1h-1722500400";

fn leg(
    name: &str,
    asset: &str,
    token: TokenSide,
    price: i64,
    order_type: OrderType,
) -> LegIntent {
    LegIntent {
        name: name.to_string(),
        asset_id: asset.to_string(),
        token,
        side: OrderSide::Buy,
        price: Cents(price),
        size: Size::new(dec!(10)),
        order_type,
    }
}

fn two_leg_request(hedge: AutoHedgeConfig) -> MultiLegRequest {
    MultiLegRequest {
        name: "velocity-follow".to_string(),
        market_slug: SLUG.to_string(),
        legs: vec![
            leg("entry", "a-up", TokenSide::Up, 58, OrderType::Fak),
            leg("hedge", "a-down", TokenSide::Down, 39, OrderType::Gtc),
        ],
        hedge,
        in_flight_key: None,
    }
}

fn engine_with(
    gw: &Arc<PaperGateway>,
    config: ExecutionConfig,
    breaker: Arc<CircuitBreaker>,
) -> (Arc<ExecutionEngine>, CancellationToken) {
    let (engine, worker) = ExecutionEngine::new(config, gw.clone(), gw.clone(), breaker, None);
    let cancel = CancellationToken::new();
    tokio::spawn(worker.run(cancel.clone()));
    (engine, cancel)
}

fn breaker() -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new(BreakerConfig::default()))
}

#[tokio::test]
async fn test_two_legs_placed_with_indices_preserved() {
    let gw = PaperGateway::new();
    gw.set_policy("a-down", FillPolicy::Rest);
    let (engine, _cancel) = engine_with(&gw, ExecutionConfig::default(), breaker());

    let ticket = engine.submit(two_leg_request(AutoHedgeConfig::default())).unwrap();
    let result = ticket.result.await.unwrap();

    assert!(result.is_fully_placed());
    let entry = result.created[0].as_ref().unwrap();
    let hedge = result.created[1].as_ref().unwrap();
    assert_eq!(entry.token, TokenSide::Up);
    assert_eq!(entry.price, Cents(58));
    assert!(entry.is_entry);
    assert!(entry.is_filled());
    assert_eq!(hedge.token, TokenSide::Down);
    assert_eq!(hedge.order_type, OrderType::Gtc);
    assert!(!hedge.is_filled());
}

#[tokio::test]
async fn test_duplicate_refused_while_in_flight() {
    // No worker: the first submission holds the key until processed.
    let gw = PaperGateway::new();
    let (engine, _worker) = ExecutionEngine::new(
        ExecutionConfig::default(),
        gw.clone(),
        gw.clone(),
        breaker(),
        None,
    );

    let _ticket = engine.submit(two_leg_request(AutoHedgeConfig::default())).unwrap();
    let err = engine
        .submit(two_leg_request(AutoHedgeConfig::default()))
        .unwrap_err();
    assert!(matches!(err, ExecError::DuplicateInFlight(_)));
}

#[tokio::test]
async fn test_resubmit_allowed_after_processing() {
    let gw = PaperGateway::new();
    let (engine, _cancel) = engine_with(&gw, ExecutionConfig::default(), breaker());

    let ticket = engine.submit(two_leg_request(AutoHedgeConfig::default())).unwrap();
    ticket.result.await.unwrap();

    // Key released after processing: a fast identical retry is allowed.
    assert!(engine.submit(two_leg_request(AutoHedgeConfig::default())).is_ok());
}

#[tokio::test]
async fn test_partial_success_carries_created_and_error() {
    let gw = PaperGateway::new();
    gw.reject_next("a-down", "bad tick");
    let (engine, _cancel) = engine_with(&gw, ExecutionConfig::default(), breaker());

    let ticket = engine.submit(two_leg_request(AutoHedgeConfig::default())).unwrap();
    let result = ticket.result.await.unwrap();

    assert!(!result.is_fully_placed());
    assert!(result.created[0].is_some());
    assert!(result.created[1].is_none());
    assert_eq!(result.first_error(), Some("rejected: bad tick"));
}

#[tokio::test]
async fn test_queue_full_releases_key() {
    let gw = PaperGateway::new();
    // Capacity one and no worker: the second distinct request overflows.
    let config = ExecutionConfig {
        queue_capacity: 1,
        ..Default::default()
    };
    let (engine, _worker) =
        ExecutionEngine::new(config, gw.clone(), gw.clone(), breaker(), None);

    engine.submit(two_leg_request(AutoHedgeConfig::default())).unwrap();
    let mut second = two_leg_request(AutoHedgeConfig::default());
    second.legs[0].price = Cents(59);
    let key = second.dedup_key();
    assert!(matches!(
        engine.submit(second.clone()),
        Err(ExecError::QueueFull)
    ));
    // The overflowed request's key was released: not a duplicate now.
    let mut third = two_leg_request(AutoHedgeConfig::default());
    third.legs[0].price = Cents(59);
    assert_eq!(third.dedup_key(), key);
    assert!(matches!(
        engine.submit(third),
        Err(ExecError::QueueFull)
    ));
}

#[tokio::test]
async fn test_breaker_open_refuses_submission() {
    let gw = PaperGateway::new();
    let b = breaker();
    b.halt();
    let (engine, _cancel) = engine_with(&gw, ExecutionConfig::default(), b);

    let err = engine
        .submit(two_leg_request(AutoHedgeConfig::default()))
        .unwrap_err();
    assert!(matches!(err, ExecError::CircuitOpen(_)));
}

#[tokio::test]
async fn test_invalid_request_rejected_synchronously() {
    let gw = PaperGateway::new();
    let (engine, _cancel) = engine_with(&gw, ExecutionConfig::default(), breaker());

    let mut req = two_leg_request(AutoHedgeConfig::default());
    req.legs.clear();
    assert!(engine.submit(req).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_imbalance_closed_with_sell_fak() {
    // Entry fills 10, hedge rests at 0: excess 10 must be sold at
    // best bid minus the offset.
    let gw = PaperGateway::new();
    gw.set_policy("a-down", FillPolicy::Rest);
    gw.set_book("a-up", dec!(0.57), dec!(0.58));
    let (engine, _cancel) = engine_with(&gw, ExecutionConfig::default(), breaker());

    let ticket = engine.submit(two_leg_request(AutoHedgeConfig::enabled())).unwrap();
    let result = ticket.result.await.unwrap();
    let entry = result.created[0].clone().unwrap();
    assert!(entry.is_filled());

    // The user-data stream reports the entry fill.
    engine.on_order_update(&entry);

    // Past the 2s hedge delay the once-guarded check fires.
    tokio::time::sleep(Duration::from_secs(3)).await;

    let placements = gw.placements();
    assert_eq!(placements.len(), 3);
    let closer = &placements[2];
    assert_eq!(closer.side, OrderSide::Sell);
    assert_eq!(closer.order_type, OrderType::Fak);
    assert_eq!(closer.token, TokenSide::Up);
    assert_eq!(closer.size, Size::new(dec!(10)));
    // round(0.57 * 100) - 2 = 55.
    assert_eq!(closer.price, Cents(55));
}

#[tokio::test(start_paused = true)]
async fn test_balanced_fills_do_not_hedge() {
    let gw = PaperGateway::new();
    gw.set_book("a-up", dec!(0.57), dec!(0.58));
    gw.set_book("a-down", dec!(0.38), dec!(0.39));
    let (engine, _cancel) = engine_with(&gw, ExecutionConfig::default(), breaker());

    // Both legs fill in full.
    let ticket = engine.submit(two_leg_request(AutoHedgeConfig::enabled())).unwrap();
    let result = ticket.result.await.unwrap();
    engine.on_order_update(result.created[0].as_ref().unwrap());
    engine.on_order_update(result.created[1].as_ref().unwrap());

    tokio::time::sleep(Duration::from_secs(3)).await;

    // No extra SELL beyond the two legs.
    assert_eq!(gw.placements().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_hedge_check_fires_once() {
    let gw = PaperGateway::new();
    gw.set_policy("a-down", FillPolicy::Rest);
    gw.set_book("a-up", dec!(0.57), dec!(0.58));
    let (engine, _cancel) = engine_with(&gw, ExecutionConfig::default(), breaker());

    let ticket = engine.submit(two_leg_request(AutoHedgeConfig::enabled())).unwrap();
    let result = ticket.result.await.unwrap();
    let entry = result.created[0].clone().unwrap();

    // Repeated updates must not arm a second check.
    engine.on_order_update(&entry);
    engine.on_order_update(&entry);
    engine.on_order_update(&entry);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(gw.placements().len(), 3);
}

#[tokio::test]
async fn test_clear_market_drops_state() {
    let gw = PaperGateway::new();
    let (engine, _cancel) = engine_with(&gw, ExecutionConfig::default(), breaker());

    let ticket = engine.submit(two_leg_request(AutoHedgeConfig::default())).unwrap();
    ticket.result.await.unwrap();
    assert_eq!(engine.tracked_requests(), 1);

    engine.clear_market(SLUG);
    assert_eq!(engine.tracked_requests(), 0);
}
