//! The velocity-follow entry state machine.
//!
//! On every price event of the current cycle the strategy runs an ordered
//! gate chain, samples the price into the velocity engine, qualifies both
//! sides against bias-adjusted thresholds, and on a winner submits a
//! two-leg request: a taker entry on the winning side plus a complementary
//! maker hedge on the opposite side priced to keep
//! `entry_ask + hedge_limit ≤ 99`.
//!
//! Locking discipline: the strategy mutex is held only across in-memory
//! bookkeeping; every gateway call happens after the needed fields are
//! copied out and the lock is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use updown_core::gateway::{BOOK_DEADLINE_MS, CANCEL_DEADLINE_MS, PLACE_DEADLINE_MS};
use updown_core::{
    AutoHedgeConfig, BookReader, Cents, LegIntent, MarketPair, MultiLegRequest, NewOrder, Order,
    OrderCanceler, OrderId, OrderPlacer, OrderReader, OrderSide, OrderType, PositionLookup,
    PriceChangedEvent, SetMerger, Size, TokenSide, TopOfBook,
};
use updown_exec::{ExecutionEngine, HedgeMonitor, HedgeMonitorConfig, HedgeOutcome, HedgeTask};
use updown_risk::{CircuitBreaker, RiskExposure, RiskManager};
use updown_signal::{BiasFilter, CandleFeed, QualityGate, UnderlyingFeed, VelocityEngine};

use crate::book::PositionBook;
use crate::config::{ExecMode, StrategyConfig};
use crate::cycle::merge_if_balanced;
use crate::error::Result;
use crate::exit::{ExitAction, ExitController};
use crate::sizing::two_leg_sizes;

/// Per-cycle mutable state behind the strategy mutex.
struct StrategyState {
    market: MarketPair,
    velocity: VelocityEngine,
    bias: BiasFilter,
    exits: ExitController,
    /// First event of the cycle (Unix ms); zero until seen.
    first_seen_at_ms: u64,
    trades_this_cycle: u32,
    /// Survives cycle boundaries to prevent instant retriggering.
    last_trigger_at_ms: u64,
    last_trigger_side: Option<TokenSide>,
    last_trigger_side_at_ms: u64,
    /// entry order id -> outstanding hedge order id.
    pending_hedges: HashMap<OrderId, OrderId>,
}

/// What a price tick asks the async phase to do.
struct TickPlan {
    sweep_due: bool,
    winner: Option<TokenSide>,
}

/// Velocity-follow strategy over one cycle market family.
pub struct VelocityFollowStrategy {
    config: StrategyConfig,
    state: Arc<Mutex<StrategyState>>,
    engine: Arc<ExecutionEngine>,
    placer: Arc<dyn OrderPlacer>,
    canceler: Arc<dyn OrderCanceler>,
    reader: Arc<dyn OrderReader>,
    books: Arc<dyn BookReader>,
    risk: Arc<RiskManager>,
    breaker: Arc<CircuitBreaker>,
    book: Arc<PositionBook>,
    candles: Option<Arc<dyn CandleFeed>>,
    underlying: Option<Arc<dyn UnderlyingFeed>>,
    quality: QualityGate,
    cancel: CancellationToken,
}

impl VelocityFollowStrategy {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: StrategyConfig,
        market: MarketPair,
        engine: Arc<ExecutionEngine>,
        placer: Arc<dyn OrderPlacer>,
        canceler: Arc<dyn OrderCanceler>,
        reader: Arc<dyn OrderReader>,
        books: Arc<dyn BookReader>,
        risk: Arc<RiskManager>,
        breaker: Arc<CircuitBreaker>,
        book: Arc<PositionBook>,
        candles: Option<Arc<dyn CandleFeed>>,
        underlying: Option<Arc<dyn UnderlyingFeed>>,
        cancel: CancellationToken,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        book.upsert_market(market.clone());
        let mut bias = BiasFilter::new(config.bias);
        bias.reset(market.cycle_start_s);
        let state = StrategyState {
            market,
            velocity: VelocityEngine::new(config.velocity),
            bias,
            exits: ExitController::new(config.exit.clone()),
            first_seen_at_ms: 0,
            trades_this_cycle: 0,
            last_trigger_at_ms: 0,
            last_trigger_side: None,
            last_trigger_side_at_ms: 0,
            pending_hedges: HashMap::new(),
        };
        let quality = QualityGate::new(config.quality);
        Ok(Arc::new(Self {
            config,
            state: Arc::new(Mutex::new(state)),
            engine,
            placer,
            canceler,
            reader,
            books,
            risk,
            breaker,
            book,
            candles,
            underlying,
            quality,
            cancel,
        }))
    }

    /// The current cycle market.
    #[must_use]
    pub fn current_market(&self) -> MarketPair {
        self.state.lock().market.clone()
    }

    /// Trades triggered in the current cycle.
    #[must_use]
    pub fn trades_this_cycle(&self) -> u32 {
        self.state.lock().trades_this_cycle
    }

    /// Entry/hedge pairs whose hedge is still outstanding.
    #[must_use]
    pub fn pending_hedge_count(&self) -> usize {
        self.state.lock().pending_hedges.len()
    }

    /// Handle one coalesced price event.
    pub async fn on_price(&self, event: &PriceChangedEvent) {
        let now_ms = event.ts_ms;
        let plan = self.plan_tick(event);
        if !plan.sweep_due && plan.winner.is_none() {
            return;
        }

        let market = self.current_market();
        let tob = match timeout(
            Duration::from_millis(BOOK_DEADLINE_MS),
            self.books.top_of_book(&market),
        )
        .await
        {
            Ok(Ok(tob)) => tob,
            Ok(Err(e)) => {
                debug!(error = %e, "book fetch failed, tick dropped");
                return;
            }
            Err(_) => {
                debug!("book fetch timed out, tick dropped");
                return;
            }
        };

        if plan.sweep_due {
            let actions = {
                let positions = self.book.open_positions(&market.slug);
                self.state.lock().exits.check(&positions, &tob, now_ms)
            };
            for action in actions {
                self.execute_exit(&market, &action).await;
            }
        }

        if let Some(winner) = plan.winner {
            self.try_enter(&market, winner, &tob, now_ms).await;
        }
    }

    /// Synchronous gate chain, sampling, and side selection. Holds the
    /// strategy mutex; never touches the gateway.
    fn plan_tick(&self, event: &PriceChangedEvent) -> TickPlan {
        let now_ms = event.ts_ms;
        let mut state = self.state.lock();

        // Market filter: configured family and the active cycle only.
        if !self.config.cycle.matches(&event.market.slug)
            || event.market.slug != state.market.slug
        {
            return TickPlan {
                sweep_due: false,
                winner: None,
            };
        }
        if event.market.cycle_start_s != state.market.cycle_start_s {
            debug!(
                event_cycle = event.market.cycle_start_s,
                current = state.market.cycle_start_s,
                "event from another cycle dropped"
            );
            return TickPlan {
                sweep_due: false,
                winner: None,
            };
        }

        if let Some(candles) = &self.candles {
            state.bias.on_tick(candles.as_ref(), (now_ms / 1_000) as i64);
        }

        let sweep_due = self.book.has_open(&state.market.slug);
        let no_entry = TickPlan {
            sweep_due,
            winner: None,
        };

        if self.config.bias_required && !state.bias.is_ready() {
            return no_entry;
        }

        if state.first_seen_at_ms == 0 {
            state.first_seen_at_ms = now_ms;
        }
        if self.config.warmup_ms > 0
            && now_ms.saturating_sub(state.first_seen_at_ms) < self.config.warmup_ms
        {
            return no_entry;
        }

        let cycle_end_ms = (self.config.cycle.cycle_end(state.market.cycle_start_s) * 1_000) as u64;
        if cycle_end_ms.saturating_sub(now_ms)
            < self.config.cycle_end_protection_minutes * 60_000
        {
            return no_entry;
        }

        let cap = self.config.effective_max_trades();
        if cap > 0 && state.trades_this_cycle >= cap {
            return no_entry;
        }

        if !state.pending_hedges.is_empty() {
            return no_entry;
        }

        if now_ms.saturating_sub(state.last_trigger_at_ms) < self.config.cooldown_ms {
            return no_entry;
        }

        // Gates passed: sample, then qualify both sides.
        state.velocity.push(event.token, now_ms, event.cents);
        state.velocity.prune(now_ms);

        let mut qualified: Vec<(TokenSide, i64, f64)> = Vec::new();
        for side in TokenSide::ORDERED {
            if !state.bias.allows(side) {
                continue;
            }
            if self.config.inventory_threshold_shares.is_sign_positive()
                && !self.config.inventory_threshold_shares.is_zero()
                && self.book.net_size(&state.market.slug, side).inner()
                    > self.config.inventory_threshold_shares
            {
                debug!(side = %side, "inventory skew, side skipped");
                continue;
            }
            let (min_move, min_vel) = state.bias.adjusted_thresholds(
                side,
                self.config.min_move_cents,
                self.config.min_velocity_cps,
            );
            let Some(metrics) = state.velocity.compute(side) else {
                continue;
            };
            if metrics.qualifies(min_move, min_vel) {
                let latest = state.velocity.latest(side).map_or(0, |c| c.get());
                qualified.push((side, latest, metrics.cents_per_sec));
            }
        }

        let mut winner = match qualified.len() {
            0 => None,
            1 => Some(qualified[0].0),
            _ => {
                let pick = if self.config.prefer_higher_price {
                    qualified
                        .iter()
                        .max_by(|a, b| a.1.cmp(&b.1).then(a.2.total_cmp(&b.2)))
                } else {
                    qualified.iter().max_by(|a, b| a.2.total_cmp(&b.2))
                };
                pick.map(|q| q.0)
            }
        };

        if let Some(side) = winner {
            if self.config.min_preferred_price_cents > 0 {
                let latest = state.velocity.latest(side).map_or(0, |c| c.get());
                if latest < self.config.min_preferred_price_cents {
                    winner = None;
                }
            }
        }

        // Side-level cooldown against bursty retriggering.
        if let Some(side) = winner {
            if state.last_trigger_side == Some(side)
                && now_ms.saturating_sub(state.last_trigger_side_at_ms) < self.config.cooldown_ms
            {
                winner = None;
            }
        }

        if let Some(side) = winner {
            if !self.underlying_confirms(side, now_ms) {
                debug!(side = %side, "underlying move not confirmed");
                winner = None;
            }
        }

        TickPlan { sweep_due, winner }
    }

    /// Optional confirmation against the underlying 1s candle series: the
    /// recent move must share the winner's direction and be large enough.
    fn underlying_confirms(&self, winner: TokenSide, now_ms: u64) -> bool {
        if !self.config.underlying_confirm_enabled {
            return true;
        }
        let Some(feed) = &self.underlying else {
            return true;
        };
        let lookback_ms = self.config.underlying_lookback_s * 1_000;
        let (Some(now), Some(then)) = (
            feed.close_at_or_before(now_ms),
            feed.close_at_or_before(now_ms.saturating_sub(lookback_ms)),
        ) else {
            return false;
        };
        if then.is_zero() {
            return false;
        }
        use rust_decimal::prelude::ToPrimitive;
        let move_bps = ((now - then) / then * rust_decimal::Decimal::from(10_000))
            .round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .unwrap_or(0);
        let signed_ok = match winner {
            TokenSide::Up => move_bps > 0,
            TokenSide::Down => move_bps < 0,
        };
        signed_ok && move_bps.abs() >= self.config.min_underlying_move_bps
    }

    /// Market-quality, price-band, pricing, sizing, and execution for one
    /// selected side.
    async fn try_enter(&self, market: &MarketPair, winner: TokenSide, tob: &TopOfBook, now_ms: u64) {
        if !tob.is_complete() {
            debug!("book incomplete, entry skipped");
            return;
        }
        let entry_ask = tob.ask(winner);
        let entry_bid = tob.bid(winner);
        if entry_ask.get() < self.config.min_entry_price_cents
            || entry_ask.get() > self.config.max_entry_price_cents
        {
            debug!(entry_ask = %entry_ask, "entry price out of band");
            return;
        }
        if (entry_ask - entry_bid).get() > self.config.max_spread_cents {
            debug!(spread = %(entry_ask - entry_bid), "entry spread too wide");
            return;
        }
        if self.config.enable_market_quality_gate {
            let report = self.quality.assess(tob, now_ms);
            if !self.quality.passes(&report) {
                info!(score = report.score, "market quality gate refused entry");
                return;
            }
        }

        let hedge_side = winner.opposite();
        let hedge_ask = tob.ask(hedge_side);
        let raw_limit = 100 - entry_ask.get() - self.config.hedge_offset_cents;
        let hedge_limit = Cents(raw_limit.min(hedge_ask.get() - 1));
        if !hedge_limit.is_tradeable() {
            info!(
                entry_ask = %entry_ask,
                hedge_ask = %hedge_ask,
                "no tradeable hedge price, entry skipped"
            );
            return;
        }
        // Structural edge guard: a perfect hedge fill must cost under one
        // payout.
        if entry_ask.get() + hedge_limit.get() > 99 {
            info!(entry_ask = %entry_ask, hedge_limit = %hedge_limit, "no edge, entry skipped");
            return;
        }

        let (entry_size, hedge_size) = two_leg_sizes(
            self.config.order_size_shares,
            self.config.min_order_usdc,
            self.config.min_share_size,
            entry_ask,
            hedge_limit,
        );

        // Bookkeeping before any placement so a slow gateway cannot admit
        // a second trigger.
        {
            let mut state = self.state.lock();
            state.trades_this_cycle += 1;
            state.last_trigger_at_ms = now_ms;
            state.last_trigger_side = Some(winner);
            state.last_trigger_side_at_ms = now_ms;
        }

        info!(
            market = %market.slug,
            side = %winner,
            entry_ask = %entry_ask,
            hedge_limit = %hedge_limit,
            entry_size = %entry_size,
            hedge_size = %hedge_size,
            mode = ?self.config.order_execution_mode,
            "entry triggered"
        );

        match self.config.order_execution_mode {
            ExecMode::Parallel => {
                self.enter_parallel(market, winner, entry_ask, entry_size, hedge_limit, hedge_size)
                    .await;
            }
            ExecMode::Sequential => {
                self.enter_sequential(market, winner, entry_ask, entry_size, hedge_limit, hedge_size)
                    .await;
            }
        }
    }

    /// Both legs through the execution engine as one request.
    async fn enter_parallel(
        &self,
        market: &MarketPair,
        winner: TokenSide,
        entry_ask: Cents,
        entry_size: Size,
        hedge_limit: Cents,
        hedge_size: Size,
    ) {
        let hedge_side = winner.opposite();
        let req = MultiLegRequest {
            name: "velocity-follow".to_string(),
            market_slug: market.slug.clone(),
            legs: vec![
                LegIntent {
                    name: "entry".to_string(),
                    asset_id: market.asset_for(winner).to_string(),
                    token: winner,
                    side: OrderSide::Buy,
                    price: entry_ask,
                    size: entry_size,
                    order_type: OrderType::Fak,
                },
                LegIntent {
                    name: "hedge".to_string(),
                    asset_id: market.asset_for(hedge_side).to_string(),
                    token: hedge_side,
                    side: OrderSide::Buy,
                    price: hedge_limit,
                    size: hedge_size,
                    order_type: OrderType::Gtc,
                },
            ],
            hedge: AutoHedgeConfig::enabled(),
            in_flight_key: None,
        };

        let ticket = match self.engine.submit(req) {
            Ok(ticket) => ticket,
            Err(e) => {
                info!(error = %e, "two-leg submission refused");
                return;
            }
        };
        let Ok(result) = ticket.result.await else {
            warn!("execution result abandoned");
            return;
        };

        let entry = result.created.first().cloned().flatten();
        let hedge = result.created.get(1).cloned().flatten();

        let Some(entry) = entry else {
            // Entry leg failed: a placed hedge must not rest alone.
            if let Some(hedge) = hedge {
                info!(hedge = %hedge.id, "entry failed, canceling orphan hedge");
                let _ = timeout(
                    Duration::from_millis(CANCEL_DEADLINE_MS),
                    self.canceler.cancel_order(&hedge.id),
                )
                .await;
            }
            return;
        };

        self.book.record_order_fill(&entry);
        if let Some(hedge) = &hedge {
            self.book.record_order_fill(hedge);
        }

        if entry.is_filled() {
            if let Some(hedge) = hedge {
                if !hedge.is_filled() && hedge.status.is_active() {
                    self.arm_hedge(market.clone(), entry, hedge, entry_ask);
                }
            }
        }
    }

    /// Entry first; the hedge only goes out once the entry has filled
    /// within the sequential wait budget.
    async fn enter_sequential(
        &self,
        market: &MarketPair,
        winner: TokenSide,
        entry_ask: Cents,
        entry_size: Size,
        hedge_limit: Cents,
        hedge_size: Size,
    ) {
        if let Err(e) = self.breaker.allow_trading() {
            info!(error = %e, "sequential entry refused");
            return;
        }
        let entry_order = NewOrder {
            market_slug: market.slug.clone(),
            asset_id: market.asset_for(winner).to_string(),
            token: winner,
            side: OrderSide::Buy,
            price: entry_ask,
            size: entry_size,
            order_type: OrderType::Fak,
            is_entry: true,
            hedge_for: None,
        };
        let entry = match timeout(
            Duration::from_millis(PLACE_DEADLINE_MS),
            self.placer.place_order(entry_order),
        )
        .await
        {
            Ok(Ok(order)) => {
                self.breaker.on_success();
                order
            }
            Ok(Err(e)) => {
                self.breaker.on_error();
                warn!(error = %e, "sequential entry placement failed");
                return;
            }
            Err(_) => {
                self.breaker.on_error();
                warn!("sequential entry placement timed out");
                return;
            }
        };
        self.book.record_order_fill(&entry);

        // Poll the entry until it fills, goes terminal, or the wait budget
        // runs out.
        let mut latest = entry.clone();
        let mut waited_ms = 0u64;
        while !latest.is_filled()
            && !latest.status.is_terminal()
            && waited_ms < self.config.sequential_max_wait_ms
        {
            tokio::time::sleep(Duration::from_millis(self.config.sequential_check_interval_ms))
                .await;
            waited_ms += self.config.sequential_check_interval_ms;
            if let Some(order) = self.reader.get_order(&entry.id) {
                latest = order;
            }
        }
        self.book.record_order_fill(&latest);
        if !latest.is_filled() {
            info!(entry = %entry.id, filled = %latest.filled_size, "entry unfilled, hedge withheld");
            return;
        }

        let hedge_side = winner.opposite();
        let hedge_order = NewOrder {
            market_slug: market.slug.clone(),
            asset_id: market.asset_for(hedge_side).to_string(),
            token: hedge_side,
            side: OrderSide::Buy,
            price: hedge_limit,
            size: hedge_size,
            order_type: OrderType::Gtc,
            is_entry: false,
            hedge_for: Some(entry.id.clone()),
        };
        match timeout(
            Duration::from_millis(PLACE_DEADLINE_MS),
            self.placer.place_order(hedge_order),
        )
        .await
        {
            Ok(Ok(hedge)) => {
                self.breaker.on_success();
                self.book.record_order_fill(&hedge);
                if !hedge.is_filled() && hedge.status.is_active() {
                    self.arm_hedge(market.clone(), latest, hedge, entry_ask);
                }
            }
            Ok(Err(e)) => {
                self.breaker.on_error();
                warn!(error = %e, "hedge placement failed, exposure registered for recovery");
            }
            Err(_) => {
                self.breaker.on_error();
                warn!("hedge placement timed out");
            }
        }
    }

    /// Record the entry/hedge pair, register the exposure, and spawn a
    /// hedge monitor for the resting leg.
    fn arm_hedge(&self, market: MarketPair, entry: Order, hedge: Order, entry_ask: Cents) {
        {
            let mut state = self.state.lock();
            state
                .pending_hedges
                .insert(entry.id.clone(), hedge.id.clone());
        }
        self.risk.register_exposure(RiskExposure {
            market_slug: market.slug.clone(),
            entry_order_id: entry.id.clone(),
            entry_token: entry.token,
            entry_size: entry.filled_size,
            entry_price: entry.price,
            entry_filled_at_ms: now_wall_ms(),
            hedge_order_id: hedge.id.clone(),
            hedge_status: hedge.status,
            max_loss_cents: (entry.price.get() + hedge.price.get() - 100).max(0),
            aggressive_fired: false,
        });

        let monitor = HedgeMonitor::new(
            HedgeMonitorConfig {
                reorder_timeout_s: self.config.hedge_reorder_timeout_s,
                fak_timeout_s: self.config.hedge_timeout_fak_s,
                hedge_offset_cents: self.config.hedge_offset_cents,
            },
            Arc::clone(&self.placer),
            Arc::clone(&self.canceler),
            Arc::clone(&self.reader),
            Arc::clone(&self.books),
        );
        let task = HedgeTask {
            market,
            entry_ask,
            hedge_order: hedge,
        };
        let state = Arc::clone(&self.state);
        let risk = Arc::clone(&self.risk);
        let entry_id = entry.id;
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            let outcome = monitor.run(task, cancel).await;
            state.lock().pending_hedges.remove(&entry_id);
            match outcome {
                HedgeOutcome::Filled => {
                    risk.remove_exposure(&entry_id);
                }
                HedgeOutcome::TakerFallback {
                    order_id: Some(taker_id),
                } => {
                    risk.update_hedge(&entry_id, taker_id);
                }
                HedgeOutcome::TakerFallback { order_id: None }
                | HedgeOutcome::RiskStop { .. }
                | HedgeOutcome::Cancelled => {
                    // The risk manager keeps covering the exposure.
                }
            }
        });
    }

    /// Execute one exit action: a SELL FAK at the current bid.
    async fn execute_exit(&self, market: &MarketPair, action: &ExitAction) {
        let order = NewOrder {
            market_slug: market.slug.clone(),
            asset_id: market.asset_for(action.token).to_string(),
            token: action.token,
            side: OrderSide::Sell,
            price: action.price,
            size: action.size,
            order_type: OrderType::Fak,
            is_entry: false,
            hedge_for: None,
        };
        match timeout(
            Duration::from_millis(PLACE_DEADLINE_MS),
            self.placer.place_order(order),
        )
        .await
        {
            Ok(Ok(placed)) => {
                self.breaker.on_success();
                info!(
                    token = %action.token,
                    size = %action.size,
                    price = %action.price,
                    reason = ?action.reason,
                    order = %placed.id,
                    "exit placed"
                );
                self.book.record_order_fill(&placed);
            }
            Ok(Err(e)) => {
                self.breaker.on_error();
                warn!(reason = ?action.reason, error = %e, "exit placement failed");
            }
            Err(_) => {
                self.breaker.on_error();
                warn!(reason = ?action.reason, "exit placement timed out");
            }
        }
    }

    /// Handle a user-data stream order update.
    pub fn on_order_update(&self, order: &Order) {
        self.engine.on_order_update(order);
        self.book.record_order_fill(order);

        if !order.is_filled() {
            return;
        }
        let cleared: Vec<OrderId> = {
            let mut state = self.state.lock();
            let cleared: Vec<OrderId> = state
                .pending_hedges
                .iter()
                .filter(|(_, hedge_id)| **hedge_id == order.id)
                .map(|(entry_id, _)| entry_id.clone())
                .collect();
            for entry_id in &cleared {
                state.pending_hedges.remove(entry_id);
            }
            cleared
        };
        for entry_id in cleared {
            debug!(entry = %entry_id, hedge = %order.id, "hedge filled, pair cleared");
            self.risk.remove_exposure(&entry_id);
        }
    }

    /// Cycle boundary: reset per-cycle state and reclaim the old market's
    /// balanced inventory. `last_trigger_at` survives on purpose.
    pub async fn on_cycle(&self, new_market: MarketPair, merger: Option<&dyn SetMerger>) {
        let old_market = {
            let mut state = self.state.lock();
            let old = state.market.clone();
            state.velocity.clear();
            state.first_seen_at_ms = 0;
            state.trades_this_cycle = 0;
            state.last_trigger_side = None;
            state.last_trigger_side_at_ms = 0;
            state.bias.reset(new_market.cycle_start_s);
            state.pending_hedges.clear();
            state.exits.reset();
            state.market = new_market.clone();
            old
        };
        info!(old = %old_market.slug, new = %new_market.slug, "cycle rolled");

        self.book.upsert_market(new_market);
        self.engine.clear_market(&old_market.slug);

        if let Some(merger) = merger {
            merge_if_balanced(&self.book, &old_market, merger).await;
        }
    }
}

fn now_wall_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

#[async_trait::async_trait]
impl updown_session::PriceEventHandler for VelocityFollowStrategy {
    async fn on_price_event(&self, event: PriceChangedEvent) {
        self.on_price(&event).await;
    }
}

#[async_trait::async_trait]
impl updown_session::OrderEventHandler for VelocityFollowStrategy {
    async fn on_order_event(&self, order: Order) {
        self.on_order_update(&order);
    }
}
