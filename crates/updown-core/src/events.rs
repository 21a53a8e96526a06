//! Stream event types.

use serde::{Deserialize, Serialize};

use crate::market::MarketPair;
use crate::price::Cents;
use crate::side::TokenSide;

/// A top-of-book price change for one token side of a cycle market.
///
/// Emitted by the market-data stream; `market.cycle_start_s` identifies the
/// cycle the event belongs to so stale deliveries can be dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChangedEvent {
    /// Event timestamp (Unix milliseconds), stamped by the stream.
    pub ts_ms: u64,
    pub token: TokenSide,
    /// New best price in cents.
    pub cents: Cents,
    pub market: MarketPair,
}
