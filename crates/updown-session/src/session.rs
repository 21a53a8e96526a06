//! Per-market event multiplexer.
//!
//! WebSocket deliveries are bursty and occasionally stale; the session is
//! the single entry point that makes them safe for the strategy:
//!
//! - price events coalesce into one pending slot per token side, signalled
//!   through a capacity-1 channel (drop-newest: a pending signal already
//!   covers the burst)
//! - the drainer snapshots and clears the pending slots, then invokes the
//!   handlers serially in a fixed UP-then-DOWN order
//! - events whose cycle timestamp differs from the current market are
//!   dropped at the boundary
//! - order events are matched by slug or asset id, back-filled when only
//!   one of the two is known, and delivered through a bounded queue
//! - handler panics are caught and logged so one bad tick cannot kill the
//!   dispatch loop

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use updown_core::{MarketPair, Order, PriceChangedEvent, TokenSide};

/// Session configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Order-update queue capacity.
    pub order_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            order_queue_capacity: 256,
        }
    }
}

/// Consumer of coalesced price events.
#[async_trait]
pub trait PriceEventHandler: Send + Sync {
    async fn on_price_event(&self, event: PriceChangedEvent);
}

/// Consumer of filtered order updates.
#[async_trait]
pub trait OrderEventHandler: Send + Sync {
    async fn on_order_event(&self, order: Order);
}

/// Per-market event fan-out.
pub struct DispatchSession {
    market: RwLock<MarketPair>,
    /// One pending slot per token side, newest wins.
    pending: Mutex<[Option<PriceChangedEvent>; 2]>,
    signal_tx: mpsc::Sender<()>,
    order_tx: mpsc::Sender<Order>,
    price_handlers: RwLock<Vec<Arc<dyn PriceEventHandler>>>,
    order_handlers: RwLock<Vec<Arc<dyn OrderEventHandler>>>,
    stale_dropped: AtomicU64,
}

impl DispatchSession {
    /// Build the session plus its drainer. The drainer must be driven with
    /// `SessionDrainer::run` for handlers to fire.
    #[must_use]
    pub fn new(market: MarketPair, config: SessionConfig) -> (Arc<Self>, SessionDrainer) {
        let (signal_tx, signal_rx) = mpsc::channel(1);
        let (order_tx, order_rx) = mpsc::channel(config.order_queue_capacity.max(1));
        let session = Arc::new(Self {
            market: RwLock::new(market),
            pending: Mutex::new([None, None]),
            signal_tx,
            order_tx,
            price_handlers: RwLock::new(Vec::new()),
            order_handlers: RwLock::new(Vec::new()),
            stale_dropped: AtomicU64::new(0),
        });
        let drainer = SessionDrainer {
            session: Arc::clone(&session),
            signal_rx,
            order_rx,
        };
        (session, drainer)
    }

    pub fn register_price_handler(&self, handler: Arc<dyn PriceEventHandler>) {
        self.price_handlers.write().push(handler);
    }

    pub fn register_order_handler(&self, handler: Arc<dyn OrderEventHandler>) {
        self.order_handlers.write().push(handler);
    }

    /// Swap to a new cycle market, clearing any pending events of the old
    /// one.
    pub fn set_market(&self, market: MarketPair) {
        info!(old = %self.market.read().slug, new = %market.slug, "session market swapped");
        *self.market.write() = market;
        *self.pending.lock() = [None, None];
    }

    #[must_use]
    pub fn current_market(&self) -> MarketPair {
        self.market.read().clone()
    }

    /// Price events dropped for belonging to a stale cycle.
    #[must_use]
    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped.load(Ordering::Relaxed)
    }

    /// Single entry point for stream price events.
    pub fn on_price_event(&self, event: PriceChangedEvent) {
        {
            let current = self.market.read();
            if event.market.slug != current.slug
                || event.market.cycle_start_s != current.cycle_start_s
            {
                self.stale_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    event_slug = %event.market.slug,
                    event_cycle = event.market.cycle_start_s,
                    current_cycle = current.cycle_start_s,
                    "stale price event dropped"
                );
                return;
            }
        }
        let slot = slot_index(event.token);
        self.pending.lock()[slot] = Some(event);
        // Capacity 1: a refused send means a wake-up is already pending.
        let _ = self.signal_tx.try_send(());
    }

    /// Single entry point for stream order updates.
    pub fn on_order_event(&self, mut order: Order) {
        {
            let current = self.market.read();
            let by_slug = !order.market_slug.is_empty() && order.market_slug == current.slug;
            let by_asset = current.contains_asset(&order.asset_id);
            if !by_slug && !by_asset {
                return;
            }
            if order.market_slug.is_empty() {
                order.market_slug = current.slug.clone();
            }
            if let Some(token) = current.token_for(&order.asset_id) {
                order.token = token;
            }
        }
        if let Err(mpsc::error::TrySendError::Full(order)) = self.order_tx.try_send(order) {
            warn!(order = %order.id, "order update queue full, update dropped");
        }
    }
}

fn slot_index(token: TokenSide) -> usize {
    match token {
        TokenSide::Up => 0,
        TokenSide::Down => 1,
    }
}

/// Drains coalesced price signals and order updates, invoking handlers
/// serially on one task.
pub struct SessionDrainer {
    session: Arc<DispatchSession>,
    signal_rx: mpsc::Receiver<()>,
    order_rx: mpsc::Receiver<Order>,
}

impl SessionDrainer {
    /// Run until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(market = %self.session.current_market().slug, "session drainer started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("session drainer stopped");
                    return;
                }
                signal = self.signal_rx.recv() => {
                    if signal.is_none() {
                        return;
                    }
                    self.drain_prices().await;
                }
                order = self.order_rx.recv() => {
                    let Some(order) = order else { return };
                    self.dispatch_order(order).await;
                }
            }
        }
    }

    /// Snapshot and clear the pending slots, then fan out UP before DOWN.
    async fn drain_prices(&self) {
        let snapshot: Vec<PriceChangedEvent> = {
            let mut pending = self.session.pending.lock();
            TokenSide::ORDERED
                .iter()
                .filter_map(|t| pending[slot_index(*t)].take())
                .collect()
        };
        let handlers = self.session.price_handlers.read().clone();
        for event in snapshot {
            for handler in &handlers {
                let fut = handler.on_price_event(event.clone());
                if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                    error!(token = %event.token, "price handler panicked");
                }
            }
        }
    }

    async fn dispatch_order(&self, order: Order) {
        let handlers = self.session.order_handlers.read().clone();
        for handler in &handlers {
            let fut = handler.on_order_event(order.clone());
            if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                error!(order = %order.id, "order handler panicked");
            }
        }
    }
}
