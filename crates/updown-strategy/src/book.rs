//! In-memory position book.
//!
//! Tracks open inventory per market and token side, fed idempotently from
//! order fills (synchronous placement results and stream updates may both
//! report the same fill; only the delta beyond what was already recorded is
//! applied). Nothing here persists: the book is reconstructable from
//! exchange queries.

use std::collections::HashMap;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::debug;

use updown_core::{
    MarketPair, Order, OrderId, OrderSide, Position, PositionLookup, Size, TokenSide,
};

#[derive(Default)]
struct BookInner {
    markets: HashMap<String, MarketPair>,
    positions: HashMap<(String, TokenSide), Position>,
    /// Cumulative fill size already applied per order.
    recorded: HashMap<OrderId, Size>,
}

/// Thread-safe inventory registry for all active cycle markets.
#[derive(Default)]
pub struct PositionBook {
    inner: Mutex<BookInner>,
}

impl PositionBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or refresh) a market so slugs resolve.
    pub fn upsert_market(&self, market: MarketPair) {
        self.inner.lock().markets.insert(market.slug.clone(), market);
    }

    /// Apply an order's cumulative fill to the book. Idempotent: repeated
    /// reports of the same order only apply the unseen delta. Buys extend
    /// the position on the order's token, sells reduce it.
    pub fn record_order_fill(&self, order: &Order) {
        if !order.filled_size.is_positive() || order.id.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        let prev = inner
            .recorded
            .get(&order.id)
            .copied()
            .unwrap_or(Size::ZERO);
        if order.filled_size <= prev {
            return;
        }
        let delta = order.filled_size - prev;
        inner.recorded.insert(order.id.clone(), order.filled_size);

        let Some(market) = inner.markets.get(&order.market_slug).cloned() else {
            debug!(order = %order.id, slug = %order.market_slug, "fill for unknown market ignored");
            return;
        };
        let key = (order.market_slug.clone(), order.token);
        match order.side {
            OrderSide::Buy => {
                let entry = inner.positions.entry(key).or_insert_with(|| {
                    Position::open(
                        format!("pos-{}", order.id),
                        market,
                        order.token,
                        Size::ZERO,
                        order.price,
                        order.created_at_ms,
                    )
                });
                entry.apply_fill(delta, order.price);
                entry.status = updown_core::PositionStatus::Open;
            }
            OrderSide::Sell => {
                if let Some(pos) = inner.positions.get_mut(&key) {
                    pos.reduce(delta);
                }
            }
        }
    }

    /// Net open size on one side of a market.
    #[must_use]
    pub fn net_size(&self, slug: &str, token: TokenSide) -> Size {
        self.inner
            .lock()
            .positions
            .get(&(slug.to_string(), token))
            .filter(|p| p.is_open())
            .map(|p| p.size)
            .unwrap_or(Size::ZERO)
    }

    /// True when any side of the market has open inventory.
    #[must_use]
    pub fn has_open(&self, slug: &str) -> bool {
        TokenSide::ORDERED
            .iter()
            .any(|t| self.net_size(slug, *t).is_positive())
    }

    /// Matched UP/DOWN quantity available for a complete-set merge.
    #[must_use]
    pub fn matched_size(&self, slug: &str) -> Size {
        let up = self.net_size(slug, TokenSide::Up);
        let down = self.net_size(slug, TokenSide::Down);
        Size::new(up.inner().min(down.inner()).max(Decimal::ZERO))
    }

    /// Forget a finished market entirely.
    pub fn clear_market(&self, slug: &str) {
        let mut inner = self.inner.lock();
        inner.markets.remove(slug);
        inner.positions.retain(|(s, _), _| s != slug);
    }
}

impl PositionLookup for PositionBook {
    fn market_for_slug(&self, slug: &str) -> Option<MarketPair> {
        self.inner.lock().markets.get(slug).cloned()
    }

    fn open_positions(&self, slug: &str) -> Vec<Position> {
        self.inner
            .lock()
            .positions
            .values()
            .filter(|p| p.market_slug == slug && p.is_open())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use updown_core::{Cents, OrderStatus, OrderType};

    fn market() -> MarketPair {
        MarketPair {
            slug: "btc-updown-1h-1722500400".to_string(),
            up_asset: "a-up".to_string(),
            down_asset: "a-down".to_string(),
            condition_id: "cond".to_string(),
            cycle_start_s: 1_722_500_400,
        }
    }

    fn filled_order(id: &str, side: OrderSide, token: TokenSide, size: Decimal, price: i64) -> Order {
        Order {
            id: OrderId::new(id),
            market_slug: market().slug,
            asset_id: market().asset_for(token).to_string(),
            token,
            side,
            price: Cents(price),
            size: Size::new(size),
            order_type: OrderType::Fak,
            status: OrderStatus::Filled,
            filled_size: Size::new(size),
            is_entry: side == OrderSide::Buy,
            hedge_for: None,
            created_at_ms: 0,
        }
    }

    fn book() -> PositionBook {
        let b = PositionBook::new();
        b.upsert_market(market());
        b
    }

    #[test]
    fn test_buy_fill_opens_position() {
        let b = book();
        b.record_order_fill(&filled_order("o1", OrderSide::Buy, TokenSide::Up, dec!(10), 58));
        assert_eq!(b.net_size(&market().slug, TokenSide::Up), Size::new(dec!(10)));
        assert!(b.has_open(&market().slug));
        let positions = b.open_positions(&market().slug);
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].avg_price(), Some(Cents(58)));
    }

    #[test]
    fn test_duplicate_report_applies_once() {
        let b = book();
        let order = filled_order("o1", OrderSide::Buy, TokenSide::Up, dec!(10), 58);
        b.record_order_fill(&order);
        // Stream echo of the same cumulative fill.
        b.record_order_fill(&order);
        assert_eq!(b.net_size(&market().slug, TokenSide::Up), Size::new(dec!(10)));
    }

    #[test]
    fn test_incremental_fill_applies_delta() {
        let b = book();
        let mut order = filled_order("o1", OrderSide::Buy, TokenSide::Up, dec!(10), 58);
        order.filled_size = Size::new(dec!(4));
        order.status = OrderStatus::PartialFilled;
        b.record_order_fill(&order);
        assert_eq!(b.net_size(&market().slug, TokenSide::Up), Size::new(dec!(4)));

        order.filled_size = Size::new(dec!(10));
        order.status = OrderStatus::Filled;
        b.record_order_fill(&order);
        assert_eq!(b.net_size(&market().slug, TokenSide::Up), Size::new(dec!(10)));
    }

    #[test]
    fn test_sell_reduces_and_closes() {
        let b = book();
        b.record_order_fill(&filled_order("o1", OrderSide::Buy, TokenSide::Up, dec!(10), 58));
        b.record_order_fill(&filled_order("o2", OrderSide::Sell, TokenSide::Up, dec!(4), 62));
        assert_eq!(b.net_size(&market().slug, TokenSide::Up), Size::new(dec!(6)));

        b.record_order_fill(&filled_order("o3", OrderSide::Sell, TokenSide::Up, dec!(6), 63));
        assert!(!b.has_open(&market().slug));
        assert!(b.open_positions(&market().slug).is_empty());
    }

    #[test]
    fn test_matched_size_for_merge() {
        let b = book();
        b.record_order_fill(&filled_order("o1", OrderSide::Buy, TokenSide::Up, dec!(10), 58));
        assert_eq!(b.matched_size(&market().slug), Size::ZERO);
        b.record_order_fill(&filled_order("o2", OrderSide::Buy, TokenSide::Down, dec!(7), 39));
        assert_eq!(b.matched_size(&market().slug), Size::new(dec!(7)));
    }

    #[test]
    fn test_lookup_and_clear() {
        let b = book();
        assert!(b.market_for_slug(&market().slug).is_some());
        b.record_order_fill(&filled_order("o1", OrderSide::Buy, TokenSide::Up, dec!(10), 58));
        b.clear_market(&market().slug);
        assert!(b.market_for_slug(&market().slug).is_none());
        assert!(!b.has_open(&market().slug));
    }
}
