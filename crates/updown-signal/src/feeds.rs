//! Candle feed seams for bias and move confirmation.
//!
//! Both feeds are backed by external market-data adapters; the signal layer
//! only polls them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// OHLC bar of the underlying, as venue decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

/// Supplies the first closed 1-minute candle at a cycle's open.
pub trait CandleFeed: Send + Sync {
    /// Returns `None` until the bar has closed and been delivered.
    fn opening_candle(&self, cycle_start_s: i64) -> Option<Candle>;
}

/// Supplies underlying closes from a 1-second candle series.
pub trait UnderlyingFeed: Send + Sync {
    /// Latest close at or before `ts_ms`.
    fn close_at_or_before(&self, ts_ms: u64) -> Option<Decimal>;
}
