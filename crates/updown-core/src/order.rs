//! Order lifecycle types.
//!
//! Orders move `Pending → Open → (PartialFilled)* → Filled | Canceled |
//! Failed`. Terminal statuses are immutable; logic branches on
//! `is_terminal()` rather than textual status codes.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;
use uuid::Uuid;

use crate::price::Cents;
use crate::side::{OrderSide, TokenSide};

/// Share quantity with exact decimal precision.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Size(pub Decimal);

impl Size {
    pub const ZERO: Self = Self(Decimal::ZERO);
    pub const ONE: Self = Self(Decimal::ONE);

    #[inline]
    #[must_use]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Absolute difference between two sizes.
    #[inline]
    #[must_use]
    pub fn abs_diff(&self, other: Self) -> Self {
        Self((self.0 - other.0).abs())
    }

    #[inline]
    #[must_use]
    pub fn min(&self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    #[inline]
    #[must_use]
    pub fn max(&self, other: Self) -> Self {
        Self(self.0.max(other.0))
    }

    /// Notional in cents: `size × price`.
    #[inline]
    #[must_use]
    pub fn notional_cents(&self, price: Cents) -> Decimal {
        self.0 * Decimal::from(price.get())
    }

    /// Snap so that `size × price` (in collateral units) lands on two
    /// decimal places, rounding half-up. Exchange maker-amount precision
    /// rule; the snapped size is what actually rests on the book.
    #[must_use]
    pub fn snap_to_maker_precision(&self, price: Cents) -> Self {
        let px = price.to_decimal_price();
        if px.is_zero() {
            return *self;
        }
        let maker = (self.0 * px)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Self(maker / px)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Size {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Size {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for Size {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Size {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<Decimal> for Size {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

/// Exchange-assigned order identifier.
///
/// Empty until the gateway acknowledges the order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a locally unique id, used by the paper gateway.
    ///
    /// Format: `ord_{timestamp_ms}_{uuid_short}`
    #[must_use]
    pub fn generate(now_ms: u64) -> Self {
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("ord_{now_ms}_{uuid_short}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Fill-and-kill: execute immediately, cancel the remainder.
    Fak,
    /// Good-till-canceled: rest on the book.
    Gtc,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fak => write!(f, "FAK"),
            Self::Gtc => write!(f, "GTC"),
        }
    }
}

/// State of an order in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Submitted but not yet acknowledged by the exchange.
    #[default]
    Pending,
    /// Acknowledged and resting (or executing).
    Open,
    /// Partially filled.
    PartialFilled,
    /// Completely filled.
    Filled,
    /// Canceled before completion.
    Canceled,
    /// Rejected or errored out.
    Failed,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Failed)
    }

    /// Returns true if the order is still active (can be canceled).
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// An order as submitted to the gateway, before an exchange id exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    /// Slug of the cycle market this order belongs to.
    pub market_slug: String,
    /// Asset id of the targeted token.
    pub asset_id: String,
    /// Token side of the asset.
    pub token: TokenSide,
    /// Buy or sell.
    pub side: OrderSide,
    /// Limit price in cents.
    pub price: Cents,
    /// Share quantity.
    pub size: Size,
    /// FAK or GTC.
    pub order_type: OrderType,
    /// Whether this is the strategy's entry leg.
    pub is_entry: bool,
    /// Entry order this order hedges, if any.
    pub hedge_for: Option<OrderId>,
}

/// A live order with exchange identity and fill state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Exchange-assigned id.
    pub id: OrderId,
    pub market_slug: String,
    pub asset_id: String,
    pub token: TokenSide,
    pub side: OrderSide,
    pub price: Cents,
    pub size: Size,
    pub order_type: OrderType,
    pub status: OrderStatus,
    /// Cumulative filled quantity.
    pub filled_size: Size,
    pub is_entry: bool,
    pub hedge_for: Option<OrderId>,
    /// Creation timestamp (Unix milliseconds).
    pub created_at_ms: u64,
}

impl Order {
    /// Materialize a gateway-acknowledged order from its submission.
    #[must_use]
    pub fn from_new(new: NewOrder, id: OrderId, status: OrderStatus, created_at_ms: u64) -> Self {
        Self {
            id,
            market_slug: new.market_slug,
            asset_id: new.asset_id,
            token: new.token,
            side: new.side,
            price: new.price,
            size: new.size,
            order_type: new.order_type,
            status,
            filled_size: Size::ZERO,
            is_entry: new.is_entry,
            hedge_for: new.hedge_for,
            created_at_ms,
        }
    }

    /// Remaining unfilled quantity.
    #[must_use]
    pub fn remaining_size(&self) -> Size {
        self.size - self.filled_size
    }

    /// True when the order has completely filled.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled || self.filled_size >= self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_new_order() -> NewOrder {
        NewOrder {
            market_slug: "btc-updown-1h-1722500000".to_string(),
            asset_id: "asset-up".to_string(),
            token: TokenSide::Up,
            side: OrderSide::Buy,
            price: Cents(58),
            size: Size::new(dec!(10)),
            order_type: OrderType::Fak,
            is_entry: true,
            hedge_for: None,
        }
    }

    #[test]
    fn test_status_terminality() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(OrderStatus::Pending.is_active());
        assert!(OrderStatus::Open.is_active());
        assert!(OrderStatus::PartialFilled.is_active());
    }

    #[test]
    fn test_order_from_new() {
        let order = Order::from_new(
            sample_new_order(),
            OrderId::new("x1"),
            OrderStatus::Open,
            1_000,
        );
        assert_eq!(order.id, OrderId::new("x1"));
        assert_eq!(order.filled_size, Size::ZERO);
        assert_eq!(order.remaining_size(), Size::new(dec!(10)));
        assert!(!order.is_filled());
    }

    #[test]
    fn test_is_filled_by_quantity() {
        let mut order = Order::from_new(
            sample_new_order(),
            OrderId::new("x2"),
            OrderStatus::PartialFilled,
            1_000,
        );
        order.filled_size = Size::new(dec!(10));
        assert!(order.is_filled());
    }

    #[test]
    fn test_generated_id_format() {
        let id = OrderId::generate(1_722_500_000_000);
        assert!(id.as_str().starts_with("ord_1722500000000_"));
        assert_ne!(OrderId::generate(1), OrderId::generate(1));
    }

    #[test]
    fn test_snap_to_maker_precision() {
        // 10.3 shares at 39c = 4.017 collateral, snaps to 4.02.
        let snapped = Size::new(dec!(10.3)).snap_to_maker_precision(Cents(39));
        assert_eq!((snapped.inner() * dec!(0.39)).round_dp(6), dec!(4.02));
        // Already exact: unchanged.
        let exact = Size::new(dec!(10)).snap_to_maker_precision(Cents(58));
        assert_eq!(exact, Size::new(dec!(10)));
    }

    #[test]
    fn test_size_abs_diff() {
        let a = Size::new(dec!(10));
        let b = Size::new(dec!(7.5));
        assert_eq!(a.abs_diff(b), Size::new(dec!(2.5)));
        assert_eq!(b.abs_diff(a), Size::new(dec!(2.5)));
    }
}
