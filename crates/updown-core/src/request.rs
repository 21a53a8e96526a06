//! Multi-leg execution request types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::order::{OrderType, Size};
use crate::price::Cents;
use crate::side::{OrderSide, TokenSide};

/// One leg of a multi-leg request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegIntent {
    /// Human-readable leg label (e.g. `entry`, `hedge`).
    pub name: String,
    pub asset_id: String,
    pub token: TokenSide,
    pub side: OrderSide,
    pub price: Cents,
    pub size: Size,
    pub order_type: OrderType,
}

impl LegIntent {
    /// Canonical tuple used for request fingerprinting. Sorted tuples make
    /// the fingerprint independent of leg order.
    fn canonical(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.asset_id, self.side, self.price.get(), self.size, self.order_type
        )
    }
}

/// Imbalance auto-hedge configuration for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoHedgeConfig {
    /// Master switch; disabled requests are never auto-hedged.
    #[serde(default)]
    pub enabled: bool,
    /// Delay after a fill before the imbalance check runs (ms).
    #[serde(default = "default_hedge_delay_ms")]
    pub delay_ms: u64,
    /// Minimum fill imbalance worth closing.
    #[serde(default = "default_min_exposure")]
    pub min_exposure_to_hedge: Size,
    /// Cents shaved off best bid for the balancing SELL.
    #[serde(default = "default_sell_offset_cents")]
    pub sell_price_offset_cents: i64,
}

fn default_hedge_delay_ms() -> u64 {
    2_000
}

fn default_min_exposure() -> Size {
    // 0.0001 shares.
    Size::new(Decimal::new(1, 4))
}

fn default_sell_offset_cents() -> i64 {
    2
}

impl Default for AutoHedgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_ms: default_hedge_delay_ms(),
            min_exposure_to_hedge: default_min_exposure(),
            sell_price_offset_cents: default_sell_offset_cents(),
        }
    }
}

impl AutoHedgeConfig {
    /// Enabled config with defaults.
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }
}

/// A request to place several legs as one logical action.
///
/// For the core two-leg pattern: an entry BUY plus a hedge BUY on the
/// opposite token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiLegRequest {
    /// Request label for logs.
    pub name: String,
    pub market_slug: String,
    pub legs: Vec<LegIntent>,
    pub hedge: AutoHedgeConfig,
    /// Dedup key; computed from the fingerprint when empty.
    #[serde(default)]
    pub in_flight_key: Option<String>,
}

impl MultiLegRequest {
    /// Reject malformed requests before they reach the queue.
    pub fn validate(&self) -> Result<()> {
        if self.market_slug.is_empty() {
            return Err(CoreError::InvalidRequest(
                "request requires a market slug".to_string(),
            ));
        }
        if self.legs.is_empty() {
            return Err(CoreError::InvalidRequest(
                "request requires at least one leg".to_string(),
            ));
        }
        Ok(())
    }

    /// Deterministic fingerprint of the request: market slug plus sorted
    /// canonical leg tuples. Logically equivalent submissions fingerprint
    /// identically regardless of leg order.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut tuples: Vec<String> = self.legs.iter().map(LegIntent::canonical).collect();
        tuples.sort();
        format!("mlr:{}|{}", self.market_slug, tuples.join("|"))
    }

    /// The dedup key: explicit when set, fingerprint otherwise.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        self.in_flight_key
            .clone()
            .unwrap_or_else(|| self.fingerprint())
    }
}
