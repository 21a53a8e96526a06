//! External interface seams.
//!
//! The bot talks to the exchange and to auxiliary feeds exclusively through
//! these traits; real adapters (WebSocket/REST/on-chain) and the in-memory
//! paper implementation live elsewhere. Callers bound every async call with
//! a deadline; the constants below are the conventional budgets.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::market::MarketPair;
use crate::order::{NewOrder, Order, OrderId, Size};
use crate::price::{Cents, Pips};
use crate::side::TokenSide;

/// Deadline for order placement calls.
pub const PLACE_DEADLINE_MS: u64 = 10_000;
/// Deadline for cancel calls.
pub const CANCEL_DEADLINE_MS: u64 = 10_000;
/// Deadline for top-of-book fetches on the trading path.
pub const BOOK_DEADLINE_MS: u64 = 5_000;
/// Deadline for dashboard-grade book fetches.
pub const BOOK_FAST_DEADLINE_MS: u64 = 500;

/// Errors surfaced by gateway implementations.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("deadline exceeded")]
    Timeout,

    #[error("unknown order: {0}")]
    UnknownOrder(String),
}

impl GatewayError {
    /// Balance exhaustion is reported as free-form rejection text by the
    /// venue; adapters are only required to keep the substring intact.
    #[must_use]
    pub fn indicates_insufficient_balance(&self) -> bool {
        match self {
            Self::Rejected(msg) | Self::Transport(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("insufficient") && msg.contains("balance")
            }
            _ => false,
        }
    }
}

/// Where a book snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSource {
    Ws,
    Rest,
    Mixed,
}

impl fmt::Display for BookSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ws => write!(f, "ws"),
            Self::Rest => write!(f, "rest"),
            Self::Mixed => write!(f, "mixed"),
        }
    }
}

/// Top of book for both sides of a cycle market, fetched atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopOfBook {
    pub up_bid: Cents,
    pub up_ask: Cents,
    pub down_bid: Cents,
    pub down_ask: Cents,
    pub source: BookSource,
    /// When the snapshot was assembled (Unix milliseconds).
    pub fetched_at_ms: u64,
}

impl TopOfBook {
    #[must_use]
    pub fn bid(&self, token: TokenSide) -> Cents {
        match token {
            TokenSide::Up => self.up_bid,
            TokenSide::Down => self.down_bid,
        }
    }

    #[must_use]
    pub fn ask(&self, token: TokenSide) -> Cents {
        match token {
            TokenSide::Up => self.up_ask,
            TokenSide::Down => self.down_ask,
        }
    }

    /// Bid/ask spread of one side, in pips.
    #[must_use]
    pub fn spread_pips(&self, token: TokenSide) -> Pips {
        Pips::from_cents(self.ask(token) - self.bid(token))
    }

    /// Snapshot age relative to `now_ms`.
    #[must_use]
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.fetched_at_ms)
    }

    /// Both sides quoted inside the payout range.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.up_bid.is_tradeable()
            && self.up_ask.is_tradeable()
            && self.down_bid.is_tradeable()
            && self.down_ask.is_tradeable()
    }

    /// A side is crossed when its bid is at or through its ask.
    #[must_use]
    pub fn is_crossed(&self, token: TokenSide) -> bool {
        self.bid(token) >= self.ask(token)
    }

    /// Mirror gap in pips: how far the two mid prices drift from summing to
    /// one payout. Complementary sides should satisfy
    /// `mid(UP) + mid(DOWN) ≈ 100c`.
    #[must_use]
    pub fn mirror_gap_pips(&self) -> Pips {
        let up_mid = Pips::from_cents(self.up_bid) + Pips::from_cents(self.up_ask);
        let down_mid = Pips::from_cents(self.down_bid) + Pips::from_cents(self.down_ask);
        // Each mid is doubled, so the target sum is 2 payouts.
        let sum = up_mid + down_mid;
        Pips::new((sum.get() - 2 * Pips::from_cents(Cents::PAYOUT).get()).abs() / 2)
    }
}

/// Places orders on the venue. Idempotency is not assumed; callers rely on
/// the in-flight dedup gate.
#[async_trait]
pub trait OrderPlacer: Send + Sync {
    async fn place_order(&self, order: NewOrder) -> Result<Order, GatewayError>;
}

/// Cancels orders. Canceling an absent order is not an error; absence
/// implies the order is terminal.
#[async_trait]
pub trait OrderCanceler: Send + Sync {
    async fn cancel_order(&self, id: &OrderId) -> Result<(), GatewayError>;
}

/// Reads order state from the venue-synced local cache.
pub trait OrderReader: Send + Sync {
    fn get_order(&self, id: &OrderId) -> Option<Order>;
    fn active_orders(&self) -> Vec<Order>;
    /// All known orders, terminal ones included.
    fn all_orders(&self) -> Vec<Order>;
}

/// Reads top-of-book state.
#[async_trait]
pub trait BookReader: Send + Sync {
    /// Best bid/ask for one asset as venue decimals in `[0, 1]`.
    async fn best_price(&self, asset_id: &str) -> Result<(Decimal, Decimal), GatewayError>;

    /// Atomic two-sided snapshot for a cycle market.
    async fn top_of_book(&self, market: &MarketPair) -> Result<TopOfBook, GatewayError>;
}

/// Full trading gateway: place, cancel, read.
pub trait OrderGateway: OrderPlacer + OrderCanceler + OrderReader {}

impl<T: OrderPlacer + OrderCanceler + OrderReader> OrderGateway for T {}

/// Burns matched UP/DOWN inventory back into collateral via the relayer.
#[async_trait]
pub trait SetMerger: Send + Sync {
    /// Returns the settlement transaction hash.
    async fn merge_complete_sets(
        &self,
        condition_id: &str,
        amount: Size,
    ) -> Result<String, GatewayError>;
}

/// Resolves cycle markets and open inventory for risk checks.
pub trait PositionLookup: Send + Sync {
    fn market_for_slug(&self, slug: &str) -> Option<MarketPair>;
    /// Open positions on a market, both sides.
    fn open_positions(&self, slug: &str) -> Vec<crate::position::Position>;
}

/// Out-of-band balance refresh hook, fired when a placement is rejected for
/// insufficient balance.
pub trait BalanceRefresher: Send + Sync {
    fn request_refresh(&self);
}
