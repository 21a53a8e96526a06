//! Hedge leg lifecycle monitor.
//!
//! Armed by the strategy once an entry FAK has filled while the paired GTC
//! hedge is still resting. The monitor watches the hedge on a one-second
//! tick; a stale hedge is re-quoted once at the complementary price, and an
//! optional harder timeout abandons price improvement entirely and takes the
//! current ask.
//!
//! The complementary-price discipline is mandatory: the re-quote must keep
//! `entry_ask + hedge_price < 100` or the pair can lock in a structural
//! loss. When the clamped price leaves the tradeable range the monitor stops
//! and reports risk instead of quoting.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use updown_core::gateway::{BOOK_DEADLINE_MS, CANCEL_DEADLINE_MS, PLACE_DEADLINE_MS};
use updown_core::{
    BookReader, Cents, MarketPair, NewOrder, Order, OrderCanceler, OrderPlacer, OrderReader,
    OrderSide, OrderType,
};

/// Hedge monitor configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HedgeMonitorConfig {
    /// Seconds a hedge may rest before the one-time re-quote.
    #[serde(default = "default_reorder_timeout_s")]
    pub reorder_timeout_s: u64,
    /// Seconds before giving up on maker pricing and taking the ask.
    /// Zero disables the taker fallback.
    #[serde(default)]
    pub fak_timeout_s: u64,
    /// Cents kept as edge when recomputing the complementary price.
    #[serde(default = "default_hedge_offset_cents")]
    pub hedge_offset_cents: i64,
}

fn default_reorder_timeout_s() -> u64 {
    30
}

fn default_hedge_offset_cents() -> i64 {
    3
}

impl Default for HedgeMonitorConfig {
    fn default() -> Self {
        Self {
            reorder_timeout_s: default_reorder_timeout_s(),
            fak_timeout_s: 0,
            hedge_offset_cents: default_hedge_offset_cents(),
        }
    }
}

/// One hedge to watch: the market, the entry ask it complements, and the
/// resting order.
#[derive(Debug, Clone)]
pub struct HedgeTask {
    pub market: MarketPair,
    /// Ask paid on the entry leg, fixed at the original entry.
    pub entry_ask: Cents,
    pub hedge_order: Order,
}

/// Terminal state of a monitoring run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HedgeOutcome {
    /// The hedge filled; the next trade cycle may proceed.
    Filled,
    /// The taker fallback fired; the FAK order id is carried when placement
    /// succeeded.
    TakerFallback { order_id: Option<updown_core::OrderId> },
    /// Monitoring stopped with the hedge unfilled; operator attention
    /// required.
    RiskStop { reason: String },
    /// The enclosing context was cancelled.
    Cancelled,
}

/// Watches one resting hedge order until it fills or times out.
pub struct HedgeMonitor {
    config: HedgeMonitorConfig,
    placer: Arc<dyn OrderPlacer>,
    canceler: Arc<dyn OrderCanceler>,
    reader: Arc<dyn OrderReader>,
    books: Arc<dyn BookReader>,
}

impl HedgeMonitor {
    #[must_use]
    pub fn new(
        config: HedgeMonitorConfig,
        placer: Arc<dyn OrderPlacer>,
        canceler: Arc<dyn OrderCanceler>,
        reader: Arc<dyn OrderReader>,
        books: Arc<dyn BookReader>,
    ) -> Self {
        Self {
            config,
            placer,
            canceler,
            reader,
            books,
        }
    }

    /// Monitor `task` until a terminal outcome.
    pub async fn run(&self, task: HedgeTask, cancel: CancellationToken) -> HedgeOutcome {
        let mut current = task.hedge_order.clone();
        let mut elapsed_s: u64 = 0;
        let mut requoted = false;
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(
            market = %task.market,
            hedge = %current.id,
            entry_ask = %task.entry_ask,
            reorder_timeout_s = self.config.reorder_timeout_s,
            fak_timeout_s = self.config.fak_timeout_s,
            "hedge monitor armed"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return HedgeOutcome::Cancelled,
                _ = ticker.tick() => {}
            }
            elapsed_s += 1;

            if let Some(order) = self.reader.get_order(&current.id) {
                if order.is_filled() {
                    info!(hedge = %order.id, "hedge filled");
                    return HedgeOutcome::Filled;
                }
                if order.status.is_terminal() {
                    return HedgeOutcome::RiskStop {
                        reason: format!("hedge {} terminal without fill", order.id),
                    };
                }
                current = order;
            }

            if self.config.fak_timeout_s > 0 && elapsed_s >= self.config.fak_timeout_s {
                return self.taker_fallback(&task, &current).await;
            }

            if elapsed_s >= self.config.reorder_timeout_s && !requoted {
                match self.requote(&task, &current).await {
                    Ok(new_order) => {
                        current = new_order;
                        requoted = true;
                        elapsed_s = 0;
                    }
                    Err(outcome) => return outcome,
                }
            }
        }
    }

    /// Cancel the stale hedge and re-quote once at the complementary price.
    async fn requote(&self, task: &HedgeTask, current: &Order) -> Result<Order, HedgeOutcome> {
        let tob = match timeout(
            Duration::from_millis(BOOK_DEADLINE_MS),
            self.books.top_of_book(&task.market),
        )
        .await
        {
            Ok(Ok(tob)) => tob,
            Ok(Err(e)) => {
                return Err(HedgeOutcome::RiskStop {
                    reason: format!("book fetch failed before re-quote: {e}"),
                })
            }
            Err(_) => {
                return Err(HedgeOutcome::RiskStop {
                    reason: "book fetch timed out before re-quote".to_string(),
                })
            }
        };
        let hedge_ask = tob.ask(current.token);
        let max_hedge = Cents::new(100 - task.entry_ask.get() - self.config.hedge_offset_cents);
        let target = Cents::new(max_hedge.get().min(hedge_ask.get() - 1));
        if !target.is_tradeable() {
            warn!(
                hedge = %current.id,
                entry_ask = %task.entry_ask,
                hedge_ask = %hedge_ask,
                target = %target,
                "complementary price left the tradeable range"
            );
            return Err(HedgeOutcome::RiskStop {
                reason: format!("re-quote price {target} out of range"),
            });
        }

        self.cancel_and_confirm(current).await;

        let order = NewOrder {
            market_slug: current.market_slug.clone(),
            asset_id: current.asset_id.clone(),
            token: current.token,
            side: OrderSide::Buy,
            price: target,
            size: current.size,
            order_type: OrderType::Gtc,
            is_entry: false,
            hedge_for: current.hedge_for.clone(),
        };
        match timeout(
            Duration::from_millis(PLACE_DEADLINE_MS),
            self.placer.place_order(order),
        )
        .await
        {
            Ok(Ok(placed)) => {
                info!(old = %current.id, new = %placed.id, price = %target, "hedge re-quoted");
                Ok(placed)
            }
            Ok(Err(e)) => Err(HedgeOutcome::RiskStop {
                reason: format!("re-quote placement failed: {e}"),
            }),
            Err(_) => Err(HedgeOutcome::RiskStop {
                reason: "re-quote placement timed out".to_string(),
            }),
        }
    }

    /// Give up on maker pricing: cancel the hedge and take the current ask.
    async fn taker_fallback(&self, task: &HedgeTask, current: &Order) -> HedgeOutcome {
        info!(hedge = %current.id, "hedge taker fallback");
        self.cancel_and_confirm(current).await;

        let tob = match timeout(
            Duration::from_millis(BOOK_DEADLINE_MS),
            self.books.top_of_book(&task.market),
        )
        .await
        {
            Ok(Ok(tob)) => tob,
            Ok(Err(e)) => {
                warn!(error = %e, "book fetch failed, taker fallback aborted");
                return HedgeOutcome::TakerFallback { order_id: None };
            }
            Err(_) => {
                warn!("book fetch timed out, taker fallback aborted");
                return HedgeOutcome::TakerFallback { order_id: None };
            }
        };
        let ask = tob.ask(current.token);
        let order = NewOrder {
            market_slug: current.market_slug.clone(),
            asset_id: current.asset_id.clone(),
            token: current.token,
            side: OrderSide::Buy,
            price: ask,
            size: current.remaining_size(),
            order_type: OrderType::Fak,
            is_entry: false,
            hedge_for: current.hedge_for.clone(),
        };
        match timeout(
            Duration::from_millis(PLACE_DEADLINE_MS),
            self.placer.place_order(order),
        )
        .await
        {
            Ok(Ok(placed)) => {
                info!(order = %placed.id, price = %ask, "taker hedge placed");
                HedgeOutcome::TakerFallback {
                    order_id: Some(placed.id),
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "taker hedge placement failed");
                HedgeOutcome::TakerFallback { order_id: None }
            }
            Err(_) => {
                warn!("taker hedge placement timed out");
                HedgeOutcome::TakerFallback { order_id: None }
            }
        }
    }

    /// Cancel and poll for up to three seconds until the order is terminal
    /// or gone. Proceeding without confirmation risks a double hedge, so the
    /// wait is unconditional even when the cancel call errors.
    async fn cancel_and_confirm(&self, order: &Order) {
        match timeout(
            Duration::from_millis(CANCEL_DEADLINE_MS),
            self.canceler.cancel_order(&order.id),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(order = %order.id, error = %e, "cancel returned error"),
            Err(_) => warn!(order = %order.id, "cancel timed out"),
        }
        for _ in 0..3 {
            match self.reader.get_order(&order.id) {
                None => return,
                Some(o) if o.status.is_terminal() => return,
                Some(_) => tokio::time::sleep(Duration::from_secs(1)).await,
            }
        }
        warn!(order = %order.id, "cancel unconfirmed after 3s, proceeding");
    }
}
