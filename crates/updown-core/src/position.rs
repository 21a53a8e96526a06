//! Open inventory with cost-basis accounting.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::market::MarketPair;
use crate::order::Size;
use crate::price::Cents;
use crate::side::TokenSide;

/// Position lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

/// An open position on one token side of a cycle market.
///
/// Invariant: `avg_price ≈ cost_basis / total_filled` whenever both are
/// known. Each fill moves `size`, `total_filled`, and `cost_basis` together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub market_slug: String,
    pub token: TokenSide,
    /// Currently open quantity (reduced by exits).
    pub size: Size,
    /// Total quantity ever filled into this position.
    pub total_filled: Size,
    /// Cumulative `fill.size × fill.price` in cents.
    pub cost_basis_cents: Decimal,
    pub status: PositionStatus,
    /// Price of the first fill.
    pub entry_price: Cents,
    pub market: MarketPair,
    /// Timestamp of the first fill (Unix milliseconds).
    pub opened_at_ms: u64,
}

impl Position {
    /// Open a position from its first fill.
    #[must_use]
    pub fn open(
        id: impl Into<String>,
        market: MarketPair,
        token: TokenSide,
        size: Size,
        price: Cents,
        now_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            market_slug: market.slug.clone(),
            token,
            size,
            total_filled: size,
            cost_basis_cents: size.notional_cents(price),
            status: PositionStatus::Open,
            entry_price: price,
            market,
            opened_at_ms: now_ms,
        }
    }

    /// Fold a subsequent entry fill into the position.
    pub fn apply_fill(&mut self, size: Size, price: Cents) {
        self.size = self.size + size;
        self.total_filled = self.total_filled + size;
        self.cost_basis_cents += size.notional_cents(price);
    }

    /// Reduce the open quantity after an exit fill. Quantities are clamped
    /// at zero; a fully reduced position flips to `Closed`.
    pub fn reduce(&mut self, size: Size) {
        self.size = Size::new((self.size.inner() - size.inner()).max(Decimal::ZERO));
        if self.size.is_zero() {
            self.status = PositionStatus::Closed;
        }
    }

    /// Volume-weighted average entry price in cents, rounded half-up.
    #[must_use]
    pub fn avg_price(&self) -> Option<Cents> {
        if self.total_filled.is_zero() {
            return None;
        }
        let avg = (self.cost_basis_cents / self.total_filled.inner())
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        avg.to_i64().map(Cents::new)
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open && self.size.is_positive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MarketPair;
    use rust_decimal_macros::dec;

    fn sample_market() -> MarketPair {
        MarketPair {
            slug: "btc-updown-1h-1722500000".to_string(),
            up_asset: "asset-up".to_string(),
            down_asset: "asset-down".to_string(),
            condition_id: "cond-1".to_string(),
            cycle_start_s: 1_722_500_000,
        }
    }

    #[test]
    fn test_open_and_avg() {
        let pos = Position::open(
            "p1",
            sample_market(),
            TokenSide::Up,
            Size::new(dec!(10)),
            Cents(60),
            1_000,
        );
        assert_eq!(pos.avg_price(), Some(Cents(60)));
        assert_eq!(pos.cost_basis_cents, dec!(600));
        assert!(pos.is_open());
    }

    #[test]
    fn test_apply_fill_moves_average() {
        let mut pos = Position::open(
            "p1",
            sample_market(),
            TokenSide::Up,
            Size::new(dec!(10)),
            Cents(60),
            1_000,
        );
        pos.apply_fill(Size::new(dec!(10)), Cents(50));
        assert_eq!(pos.size, Size::new(dec!(20)));
        assert_eq!(pos.total_filled, Size::new(dec!(20)));
        assert_eq!(pos.avg_price(), Some(Cents(55)));
    }

    #[test]
    fn test_reduce_to_closed() {
        let mut pos = Position::open(
            "p1",
            sample_market(),
            TokenSide::Down,
            Size::new(dec!(5)),
            Cents(40),
            1_000,
        );
        pos.reduce(Size::new(dec!(2)));
        assert!(pos.is_open());
        assert_eq!(pos.size, Size::new(dec!(3)));
        pos.reduce(Size::new(dec!(4)));
        assert_eq!(pos.size, Size::ZERO);
        assert_eq!(pos.status, PositionStatus::Closed);
        // Average keeps the full fill history.
        assert_eq!(pos.avg_price(), Some(Cents(40)));
    }
}
