//! Multi-leg execution engine.
//!
//! Requests enter through a bounded queue; one worker drains it and spawns a
//! processor per request so the queue head can never block. Legs of one
//! request are placed concurrently with their indices preserved in the
//! result. After fills, a once-guarded delayed check closes any imbalance
//! between the first two BUY legs with a SELL FAK on the over-filled side.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use updown_core::gateway::{BOOK_DEADLINE_MS, PLACE_DEADLINE_MS};
use updown_core::{
    BalanceRefresher, BookReader, Cents, MultiLegRequest, NewOrder, Order, OrderId, OrderPlacer,
    OrderSide, OrderType, Size,
};
use updown_risk::CircuitBreaker;

use crate::dedup::{InFlightGate, DEFAULT_SHARDS, DEFAULT_TTL_MS};
use crate::error::{ExecError, Result};

// ============================================================================
// Config and result types
// ============================================================================

/// Execution engine configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExecutionConfig {
    /// Request queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// In-flight dedup TTL (ms).
    #[serde(default = "default_in_flight_ttl_ms")]
    pub in_flight_ttl_ms: u64,
    /// In-flight dedup shard count.
    #[serde(default = "default_in_flight_shards")]
    pub in_flight_shards: usize,
}

fn default_queue_capacity() -> usize {
    512
}

fn default_in_flight_ttl_ms() -> u64 {
    DEFAULT_TTL_MS
}

fn default_in_flight_shards() -> usize {
    DEFAULT_SHARDS
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            in_flight_ttl_ms: default_in_flight_ttl_ms(),
            in_flight_shards: default_in_flight_shards(),
        }
    }
}

/// Result of processing one multi-leg request.
///
/// `created` and `errors` are parallel to the request's legs; partial
/// success is normal (some legs placed, some errored).
#[derive(Debug, Clone)]
pub struct MultiLegResult {
    pub exec_id: u64,
    pub created: Vec<Option<Order>>,
    pub errors: Vec<Option<String>>,
}

impl MultiLegResult {
    /// True when every leg was placed.
    #[must_use]
    pub fn is_fully_placed(&self) -> bool {
        self.created.iter().all(Option::is_some)
    }

    /// First leg error, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&str> {
        self.errors.iter().flatten().next().map(String::as_str)
    }
}

/// Handle returned by `submit`: the exec id plus a single-shot result
/// channel. Dropping the ticket abandons the result without affecting the
/// placement.
#[derive(Debug)]
pub struct ExecTicket {
    pub exec_id: u64,
    pub result: oneshot::Receiver<MultiLegResult>,
}

// ============================================================================
// Internal state
// ============================================================================

/// Per-request record kept for fill routing and auto-hedging.
#[derive(Debug)]
struct ExecState {
    req: MultiLegRequest,
    created: Vec<Option<Order>>,
    filled_by_order: HashMap<OrderId, Size>,
    /// Once-guard for the delayed imbalance check.
    hedge_scheduled: bool,
}

struct Job {
    exec_id: u64,
    req: MultiLegRequest,
    dedup_key: String,
    result_tx: oneshot::Sender<MultiLegResult>,
}

/// Releases the dedup key when the processor exits, on every path.
struct ReleaseOnDrop<'a> {
    gate: &'a InFlightGate,
    key: &'a str,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.gate.release(self.key);
    }
}

// ============================================================================
// ExecutionEngine
// ============================================================================

/// Accepts multi-leg requests, places legs concurrently, tracks fills, and
/// closes fill imbalances.
pub struct ExecutionEngine {
    placer: Arc<dyn OrderPlacer>,
    books: Arc<dyn BookReader>,
    breaker: Arc<CircuitBreaker>,
    balance: Option<Arc<dyn BalanceRefresher>>,
    gate: InFlightGate,
    tx: mpsc::Sender<Job>,
    /// Delayed imbalance checks: (exec id, delay ms), drained by the worker.
    hedge_tx: mpsc::UnboundedSender<(u64, u64)>,
    states: DashMap<u64, ExecState>,
    routes: DashMap<OrderId, u64>,
    next_exec_id: AtomicU64,
}

impl ExecutionEngine {
    /// Build the engine plus its worker. The worker must be driven with
    /// `ExecutionWorker::run` for submissions to make progress.
    #[must_use]
    pub fn new(
        config: ExecutionConfig,
        placer: Arc<dyn OrderPlacer>,
        books: Arc<dyn BookReader>,
        breaker: Arc<CircuitBreaker>,
        balance: Option<Arc<dyn BalanceRefresher>>,
    ) -> (Arc<Self>, ExecutionWorker) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (hedge_tx, hedge_rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            placer,
            books,
            breaker,
            balance,
            gate: InFlightGate::new(
                Duration::from_millis(config.in_flight_ttl_ms),
                config.in_flight_shards,
            ),
            tx,
            hedge_tx,
            states: DashMap::new(),
            routes: DashMap::new(),
            next_exec_id: AtomicU64::new(1),
        });
        let worker = ExecutionWorker {
            engine: Arc::clone(&engine),
            rx,
            hedge_rx,
        };
        (engine, worker)
    }

    /// Validate, dedup-gate, and enqueue a request.
    pub fn submit(&self, req: MultiLegRequest) -> Result<ExecTicket> {
        self.breaker
            .allow_trading()
            .map_err(|e| ExecError::CircuitOpen(e.to_string()))?;
        req.validate()?;

        let dedup_key = req.dedup_key();
        self.gate.try_acquire(&dedup_key)?;

        let exec_id = self.next_exec_id.fetch_add(1, Ordering::AcqRel);
        let (result_tx, result) = oneshot::channel();
        let job = Job {
            exec_id,
            req,
            dedup_key: dedup_key.clone(),
            result_tx,
        };
        match self.tx.try_send(job) {
            Ok(()) => {
                trace!(exec_id, "request enqueued");
                Ok(ExecTicket { exec_id, result })
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.gate.release(&dedup_key);
                Err(ExecError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.gate.release(&dedup_key);
                Err(ExecError::Stopped)
            }
        }
    }

    /// Route an order update to its request and, once a fill is seen on a
    /// hedged request, arm the one-shot imbalance check.
    pub fn on_order_update(&self, order: &Order) {
        let Some(exec_id) = self.routes.get(&order.id).map(|r| *r) else {
            return;
        };
        let mut delay_ms = None;
        {
            let Some(mut state) = self.states.get_mut(&exec_id) else {
                return;
            };
            state
                .filled_by_order
                .insert(order.id.clone(), order.filled_size);
            if state.req.hedge.enabled && !state.hedge_scheduled && order.filled_size.is_positive()
            {
                state.hedge_scheduled = true;
                delay_ms = Some(state.req.hedge.delay_ms);
            }
        }
        if let Some(delay_ms) = delay_ms {
            debug!(exec_id, delay_ms, "imbalance check armed");
            let _ = self.hedge_tx.send((exec_id, delay_ms));
        }
    }

    /// Close the fill imbalance between the first two BUY legs with a SELL
    /// FAK on the over-filled side. Applies only to the conventional
    /// two-BUY pattern; placement failures are not retried here, the risk
    /// manager covers the longer horizon.
    pub async fn try_auto_hedge(&self, exec_id: u64) {
        let (req, created, filled) = {
            let Some(state) = self.states.get(&exec_id) else {
                return;
            };
            (
                state.req.clone(),
                state.created.clone(),
                state.filled_by_order.clone(),
            )
        };

        let buys: Vec<usize> = req
            .legs
            .iter()
            .enumerate()
            .filter(|(_, l)| l.side == OrderSide::Buy)
            .map(|(i, _)| i)
            .take(2)
            .collect();
        if buys.len() < 2 {
            return;
        }
        let (a, b) = (buys[0], buys[1]);

        let fill_of = |i: usize| {
            created[i]
                .as_ref()
                .map(|o| filled.get(&o.id).copied().unwrap_or(o.filled_size))
                .unwrap_or(Size::ZERO)
        };
        let fill_a = fill_of(a);
        let fill_b = fill_of(b);
        let excess = fill_a.abs_diff(fill_b);
        if excess < req.hedge.min_exposure_to_hedge {
            trace!(exec_id, excess = %excess, "fills balanced, no action");
            return;
        }
        let over = if fill_a >= fill_b {
            &req.legs[a]
        } else {
            &req.legs[b]
        };

        let best_bid = match timeout(
            Duration::from_millis(BOOK_DEADLINE_MS),
            self.books.best_price(&over.asset_id),
        )
        .await
        {
            Ok(Ok((bid, _ask))) => bid,
            Ok(Err(e)) => {
                warn!(exec_id, error = %e, "imbalance close skipped, book fetch failed");
                return;
            }
            Err(_) => {
                warn!(exec_id, "imbalance close skipped, book fetch timed out");
                return;
            }
        };
        let Some(bid_cents) = Cents::from_decimal_price(best_bid) else {
            warn!(exec_id, %best_bid, "imbalance close skipped, bid out of range");
            return;
        };
        let sell_price = Cents::new(
            (bid_cents.get() - req.hedge.sell_price_offset_cents).max(1),
        );

        info!(
            exec_id,
            side = %over.token,
            excess = %excess,
            price = %sell_price,
            "closing fill imbalance"
        );
        let order = NewOrder {
            market_slug: req.market_slug.clone(),
            asset_id: over.asset_id.clone(),
            token: over.token,
            side: OrderSide::Sell,
            price: sell_price,
            size: excess,
            order_type: OrderType::Fak,
            is_entry: false,
            hedge_for: created[if fill_a >= fill_b { a } else { b }]
                .as_ref()
                .map(|o| o.id.clone()),
        };
        match timeout(
            Duration::from_millis(PLACE_DEADLINE_MS),
            self.placer.place_order(order),
        )
        .await
        {
            Ok(Ok(placed)) => {
                self.breaker.on_success();
                debug!(exec_id, order = %placed.id, "imbalance close placed");
            }
            Ok(Err(e)) => {
                self.breaker.on_error();
                warn!(exec_id, error = %e, "imbalance close failed, not retrying");
            }
            Err(_) => {
                self.breaker.on_error();
                warn!(exec_id, "imbalance close timed out, not retrying");
            }
        }
    }

    /// Drop all request state for a finished cycle market.
    pub fn clear_market(&self, slug: &str) {
        let mut dropped: Vec<u64> = Vec::new();
        self.states.retain(|exec_id, state| {
            if state.req.market_slug == slug {
                dropped.push(*exec_id);
                false
            } else {
                true
            }
        });
        if !dropped.is_empty() {
            self.routes.retain(|_, exec_id| !dropped.contains(exec_id));
            debug!(slug, requests = dropped.len(), "request state cleared");
        }
    }

    /// Number of tracked requests (for diagnostics).
    #[must_use]
    pub fn tracked_requests(&self) -> usize {
        self.states.len()
    }

    /// Process one request end to end. Runs on its own task.
    async fn process(self: Arc<Self>, job: Job) {
        let Job {
            exec_id,
            req,
            dedup_key,
            result_tx,
        } = job;
        let _release = ReleaseOnDrop {
            gate: &self.gate,
            key: &dedup_key,
        };

        let leg_count = req.legs.len();
        self.states.insert(
            exec_id,
            ExecState {
                req: req.clone(),
                created: vec![None; leg_count],
                filled_by_order: HashMap::new(),
                hedge_scheduled: false,
            },
        );

        let placements = req.legs.iter().enumerate().map(|(i, leg)| {
            let placer = Arc::clone(&self.placer);
            let order = NewOrder {
                market_slug: req.market_slug.clone(),
                asset_id: leg.asset_id.clone(),
                token: leg.token,
                side: leg.side,
                price: leg.price,
                size: leg.size,
                order_type: leg.order_type,
                is_entry: i == 0,
                hedge_for: None,
            };
            async move {
                timeout(
                    Duration::from_millis(PLACE_DEADLINE_MS),
                    placer.place_order(order),
                )
                .await
            }
        });

        let outcomes = join_all(placements).await;
        let mut created: Vec<Option<Order>> = vec![None; leg_count];
        let mut errors: Vec<Option<String>> = vec![None; leg_count];
        for (i, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(Ok(order)) => {
                    self.breaker.on_success();
                    if !order.id.is_empty() {
                        self.routes.insert(order.id.clone(), exec_id);
                    }
                    created[i] = Some(order);
                }
                Ok(Err(e)) => {
                    self.breaker.on_error();
                    if e.indicates_insufficient_balance() {
                        if let Some(balance) = &self.balance {
                            balance.request_refresh();
                        }
                    }
                    warn!(exec_id, leg = i, error = %e, "leg placement failed");
                    errors[i] = Some(e.to_string());
                }
                Err(_) => {
                    self.breaker.on_error();
                    warn!(exec_id, leg = i, "leg placement deadline exceeded");
                    errors[i] = Some("placement deadline exceeded".to_string());
                }
            }
        }

        if let Some(mut state) = self.states.get_mut(&exec_id) {
            state.created = created.clone();
        }

        // Non-blocking: the caller may have abandoned the ticket.
        let _ = result_tx.send(MultiLegResult {
            exec_id,
            created,
            errors,
        });
    }
}

// ============================================================================
// ExecutionWorker
// ============================================================================

/// Drains the request queue, one processor task per request. Also drives
/// the delayed imbalance checks armed by `on_order_update`.
pub struct ExecutionWorker {
    engine: Arc<ExecutionEngine>,
    rx: mpsc::Receiver<Job>,
    hedge_rx: mpsc::UnboundedReceiver<(u64, u64)>,
}

impl ExecutionWorker {
    /// Run until cancelled or all senders are dropped.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("execution worker started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("execution worker stopped");
                    return;
                }
                job = self.rx.recv() => {
                    let Some(job) = job else {
                        info!("execution queue closed");
                        return;
                    };
                    let engine = Arc::clone(&self.engine);
                    tokio::spawn(engine.process(job));
                }
                armed = self.hedge_rx.recv() => {
                    let Some((exec_id, delay_ms)) = armed else {
                        continue;
                    };
                    let engine = Arc::clone(&self.engine);
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        engine.try_auto_hedge(exec_id).await;
                    });
                }
            }
        }
    }
}
