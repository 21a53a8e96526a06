//! Unhedged exposure registry and aggressive hedge recovery.
//!
//! Every filled entry whose paired hedge is still resting is an exposure.
//! The manager polls the registry; once an exposure ages past the timeout it
//! cancels the stale hedge and crosses the spread with a taker BUY on the
//! hedge side. Cancel-then-submit ordering is mandatory so the hedge can
//! never double-fill.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use updown_core::gateway::{BOOK_DEADLINE_MS, CANCEL_DEADLINE_MS, PLACE_DEADLINE_MS};
use updown_core::{
    BookReader, Cents, NewOrder, Order, OrderCanceler, OrderId, OrderPlacer, OrderReader,
    OrderSide, OrderStatus, OrderType, PositionLookup, Size, TokenSide,
};

use crate::breaker::CircuitBreaker;

/// What to do when the computed taker-hedge loss exceeds the acceptable
/// bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossPolicy {
    /// Hedge unconditionally; log a warning above the bound.
    #[default]
    AlwaysExecute,
    /// Refuse when the expected loss exceeds twice the acceptable bound.
    RefuseBeyondDouble,
}

/// Risk manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Registry poll interval (ms).
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    /// Exposure age before the taker hedge fires (seconds).
    #[serde(default = "default_aggressive_timeout_s")]
    pub aggressive_timeout_s: u64,
    /// Loss bound for warnings and the refuse policy (cents per share).
    #[serde(default = "default_max_acceptable_loss_cents")]
    pub max_acceptable_loss_cents: i64,
    #[serde(default)]
    pub loss_policy: LossPolicy,
}

fn default_check_interval_ms() -> u64 {
    5_000
}

fn default_aggressive_timeout_s() -> u64 {
    60
}

fn default_max_acceptable_loss_cents() -> i64 {
    5
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            aggressive_timeout_s: default_aggressive_timeout_s(),
            max_acceptable_loss_cents: default_max_acceptable_loss_cents(),
            loss_policy: LossPolicy::default(),
        }
    }
}

/// A filled entry whose hedge has not filled yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskExposure {
    pub market_slug: String,
    pub entry_order_id: OrderId,
    pub entry_token: TokenSide,
    pub entry_size: Size,
    pub entry_price: Cents,
    /// When the entry filled (Unix milliseconds).
    pub entry_filled_at_ms: u64,
    pub hedge_order_id: OrderId,
    pub hedge_status: OrderStatus,
    /// Worst-case loss recorded at registration (cents per share).
    pub max_loss_cents: i64,
    /// Set once the aggressive hedge has been dispatched.
    #[serde(default)]
    pub aggressive_fired: bool,
}

impl RiskExposure {
    /// Age of the exposure in whole seconds.
    #[must_use]
    pub fn exposure_seconds(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.entry_filled_at_ms) / 1_000
    }
}

/// Registry of unhedged exposures with timed taker recovery.
pub struct RiskManager {
    config: RiskConfig,
    exposures: Mutex<HashMap<OrderId, RiskExposure>>,
    placer: Arc<dyn OrderPlacer>,
    canceler: Arc<dyn OrderCanceler>,
    reader: Arc<dyn OrderReader>,
    books: Arc<dyn BookReader>,
    positions: Arc<dyn PositionLookup>,
    breaker: Arc<CircuitBreaker>,
}

impl RiskManager {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RiskConfig,
        placer: Arc<dyn OrderPlacer>,
        canceler: Arc<dyn OrderCanceler>,
        reader: Arc<dyn OrderReader>,
        books: Arc<dyn BookReader>,
        positions: Arc<dyn PositionLookup>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            config,
            exposures: Mutex::new(HashMap::new()),
            placer,
            canceler,
            reader,
            books,
            positions,
            breaker,
        }
    }

    /// Register an exposure after an entry fill.
    pub fn register_exposure(&self, exposure: RiskExposure) {
        info!(
            market = %exposure.market_slug,
            entry = %exposure.entry_order_id,
            hedge = %exposure.hedge_order_id,
            size = %exposure.entry_size,
            "exposure registered"
        );
        self.exposures
            .lock()
            .insert(exposure.entry_order_id.clone(), exposure);
    }

    /// Drop an exposure (hedge filled or operator action).
    pub fn remove_exposure(&self, entry_order_id: &OrderId) -> Option<RiskExposure> {
        let removed = self.exposures.lock().remove(entry_order_id);
        if removed.is_some() {
            debug!(entry = %entry_order_id, "exposure removed");
        }
        removed
    }

    /// Re-point an exposure at a replacement hedge order (e.g. after the
    /// hedge monitor re-quotes).
    pub fn update_hedge(&self, entry_order_id: &OrderId, hedge_order_id: OrderId) {
        let mut exposures = self.exposures.lock();
        if let Some(exp) = exposures.get_mut(entry_order_id) {
            exp.hedge_order_id = hedge_order_id;
            exp.hedge_status = OrderStatus::Open;
            exp.aggressive_fired = false;
        }
    }

    /// Snapshot of all live exposures.
    #[must_use]
    pub fn exposures(&self) -> Vec<RiskExposure> {
        self.exposures.lock().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.exposures.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exposures.lock().is_empty()
    }

    /// Poll loop. Runs until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            interval_ms = self.config.check_interval_ms,
            timeout_s = self.config.aggressive_timeout_s,
            "risk manager started"
        );
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.check_interval_ms));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("risk manager stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let now_ms = chrono::Utc::now().timestamp_millis() as u64;
                    for entry_id in self.sweep_at(now_ms) {
                        let mgr = Arc::clone(&self);
                        tokio::spawn(async move {
                            mgr.aggressive_hedge(&entry_id).await;
                        });
                    }
                }
            }
        }
    }

    /// One registry pass: drop exposures whose hedge filled, return the
    /// entry ids whose exposure aged past the timeout. Pure bookkeeping
    /// under the lock; all I/O happens in `aggressive_hedge`.
    pub fn sweep_at(&self, now_ms: u64) -> Vec<OrderId> {
        let mut due = Vec::new();
        let mut exposures = self.exposures.lock();
        exposures.retain(|entry_id, exp| {
            if let Some(hedge) = self.reader.get_order(&exp.hedge_order_id) {
                exp.hedge_status = hedge.status;
                if hedge.is_filled() {
                    info!(entry = %entry_id, hedge = %exp.hedge_order_id, "hedge filled, exposure cleared");
                    return false;
                }
            }
            let aged = exp.exposure_seconds(now_ms) >= self.config.aggressive_timeout_s;
            if aged && !exp.aggressive_fired && !exp.hedge_status.is_terminal() {
                exp.aggressive_fired = true;
                due.push(entry_id.clone());
            }
            true
        });
        due
    }

    /// Cancel the stale hedge and cross the spread on the hedge side.
    ///
    /// The exposure stays registered until the replacement hedge fills; on
    /// a synchronous fill it is removed here.
    pub async fn aggressive_hedge(&self, entry_order_id: &OrderId) {
        let Some(exp) = self.exposures.lock().get(entry_order_id).cloned() else {
            return;
        };

        let Some(market) = self.positions.market_for_slug(&exp.market_slug) else {
            warn!(
                market = %exp.market_slug,
                entry = %entry_order_id,
                "no market for exposure; operator action required"
            );
            return;
        };

        let hedge_token = exp.entry_token.opposite();

        if let Ok(Err(e)) = timeout(
            Duration::from_millis(CANCEL_DEADLINE_MS),
            self.canceler.cancel_order(&exp.hedge_order_id),
        )
        .await
        {
            debug!(hedge = %exp.hedge_order_id, error = %e, "stale hedge cancel");
        }

        // Let the cancel land before quoting against our own resting order.
        tokio::time::sleep(Duration::from_millis(500)).await;

        let tob = match timeout(
            Duration::from_millis(BOOK_DEADLINE_MS),
            self.books.top_of_book(&market),
        )
        .await
        {
            Ok(Ok(tob)) => tob,
            Ok(Err(e)) => {
                warn!(market = %market, error = %e, "book fetch failed, hedge deferred");
                self.breaker.on_error();
                self.rearm(entry_order_id);
                return;
            }
            Err(_) => {
                warn!(market = %market, "book fetch timed out, hedge deferred");
                self.breaker.on_error();
                self.rearm(entry_order_id);
                return;
            }
        };

        let hedge_ask = tob.ask(hedge_token);
        let expected_loss_cents = exp.entry_price.get() + hedge_ask.get() - 100;
        let bound = self.config.max_acceptable_loss_cents;

        if self.config.loss_policy == LossPolicy::RefuseBeyondDouble
            && expected_loss_cents > 2 * bound
        {
            warn!(
                entry = %entry_order_id,
                expected_loss_cents,
                bound,
                "aggressive hedge refused, loss beyond twice the bound"
            );
            self.rearm(entry_order_id);
            return;
        }
        if expected_loss_cents > bound {
            warn!(
                entry = %entry_order_id,
                expected_loss_cents,
                bound,
                "aggressive hedge above acceptable loss"
            );
        } else {
            info!(
                entry = %entry_order_id,
                expected_loss_cents,
                "aggressive hedge executing"
            );
        }

        let order = NewOrder {
            market_slug: exp.market_slug.clone(),
            asset_id: market.asset_for(hedge_token).to_string(),
            token: hedge_token,
            side: OrderSide::Buy,
            price: hedge_ask,
            size: exp.entry_size,
            order_type: OrderType::Fak,
            is_entry: false,
            hedge_for: Some(exp.entry_order_id.clone()),
        };

        match timeout(
            Duration::from_millis(PLACE_DEADLINE_MS),
            self.placer.place_order(order),
        )
        .await
        {
            Ok(Ok(placed)) => {
                self.breaker.on_success();
                self.on_replacement(entry_order_id, &placed);
            }
            Ok(Err(e)) => {
                warn!(entry = %entry_order_id, error = %e, "aggressive hedge placement failed");
                self.breaker.on_error();
                self.rearm(entry_order_id);
            }
            Err(_) => {
                warn!(entry = %entry_order_id, "aggressive hedge placement timed out");
                self.breaker.on_error();
                self.rearm(entry_order_id);
            }
        }
    }

    /// Record the replacement hedge; a synchronous fill clears the exposure.
    fn on_replacement(&self, entry_order_id: &OrderId, placed: &Order) {
        if placed.is_filled() {
            info!(entry = %entry_order_id, hedge = %placed.id, "aggressive hedge filled");
            self.remove_exposure(entry_order_id);
            return;
        }
        let mut exposures = self.exposures.lock();
        if let Some(exp) = exposures.get_mut(entry_order_id) {
            exp.hedge_order_id = placed.id.clone();
            exp.hedge_status = placed.status;
        }
    }

    /// Allow a later sweep to retry after a failed attempt.
    fn rearm(&self, entry_order_id: &OrderId) {
        let mut exposures = self.exposures.lock();
        if let Some(exp) = exposures.get_mut(entry_order_id) {
            exp.aggressive_fired = false;
        }
    }
}
