//! In-memory paper-trading gateway.
//!
//! Backs dry-run mode and the integration tests. Fills are scripted per
//! asset: immediate full fill, immediate partial, or resting. All
//! placements and cancels are recorded for inspection.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::debug;

use updown_core::{
    BookReader, GatewayError, MarketPair, NewOrder, Order, OrderCanceler, OrderId, OrderPlacer,
    OrderReader, OrderStatus, OrderType, SetMerger, Size, TopOfBook,
};

/// Scripted fill behavior for placed orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillPolicy {
    /// Fill the full size synchronously.
    #[default]
    Fill,
    /// Fill this much synchronously; a FAK kills the remainder, a GTC
    /// stays partially filled on the book.
    Partial(Size),
    /// No synchronous fill; a FAK is killed, a GTC rests.
    Rest,
}

#[derive(Default)]
struct PaperState {
    orders: HashMap<OrderId, Order>,
    placements: Vec<Order>,
    cancels: Vec<OrderId>,
    /// asset id -> (best bid, best ask) as venue decimals.
    books: HashMap<String, (Decimal, Decimal)>,
    /// market slug -> two-sided snapshot.
    tops: HashMap<String, TopOfBook>,
    policies: HashMap<String, FillPolicy>,
    default_policy: FillPolicy,
    /// asset id -> one-shot rejection message.
    rejections: HashMap<String, String>,
    merges: Vec<(String, Size)>,
    seq: u64,
}

/// Paper gateway implementing the full trading surface in memory.
#[derive(Default)]
pub struct PaperGateway {
    state: Mutex<PaperState>,
}

impl PaperGateway {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_book(&self, asset_id: &str, bid: Decimal, ask: Decimal) {
        self.state
            .lock()
            .books
            .insert(asset_id.to_string(), (bid, ask));
    }

    pub fn set_top_of_book(&self, slug: &str, tob: TopOfBook) {
        self.state.lock().tops.insert(slug.to_string(), tob);
    }

    pub fn set_policy(&self, asset_id: &str, policy: FillPolicy) {
        self.state
            .lock()
            .policies
            .insert(asset_id.to_string(), policy);
    }

    pub fn set_default_policy(&self, policy: FillPolicy) {
        self.state.lock().default_policy = policy;
    }

    /// Make the next placement on `asset_id` fail with `message`.
    pub fn reject_next(&self, asset_id: &str, message: &str) {
        self.state
            .lock()
            .rejections
            .insert(asset_id.to_string(), message.to_string());
    }

    /// Apply a fill to a resting order.
    pub fn fill_order(&self, id: &OrderId, size: Size) -> Option<Order> {
        let mut state = self.state.lock();
        let order = state.orders.get_mut(id)?;
        if order.status.is_terminal() {
            return Some(order.clone());
        }
        order.filled_size = (order.filled_size + size).min(order.size);
        order.status = if order.filled_size >= order.size {
            OrderStatus::Filled
        } else {
            OrderStatus::PartialFilled
        };
        Some(order.clone())
    }

    /// All placements, in order.
    #[must_use]
    pub fn placements(&self) -> Vec<Order> {
        self.state.lock().placements.clone()
    }

    /// All cancel requests, in order.
    #[must_use]
    pub fn cancels(&self) -> Vec<OrderId> {
        self.state.lock().cancels.clone()
    }

    /// Complete-set merges submitted, in order.
    #[must_use]
    pub fn merges(&self) -> Vec<(String, Size)> {
        self.state.lock().merges.clone()
    }

    fn now_ms() -> u64 {
        chrono::Utc::now().timestamp_millis() as u64
    }
}

#[async_trait]
impl OrderPlacer for PaperGateway {
    async fn place_order(&self, new: NewOrder) -> Result<Order, GatewayError> {
        let mut state = self.state.lock();
        if let Some(message) = state.rejections.remove(&new.asset_id) {
            return Err(GatewayError::Rejected(message));
        }
        state.seq += 1;
        let id = OrderId::new(format!("paper-{}", state.seq));
        let policy = state
            .policies
            .get(&new.asset_id)
            .copied()
            .unwrap_or(state.default_policy);
        let order_type = new.order_type;
        let mut order = Order::from_new(new, id, OrderStatus::Open, Self::now_ms());
        match (policy, order_type) {
            (FillPolicy::Fill, _) => {
                order.filled_size = order.size;
                order.status = OrderStatus::Filled;
            }
            (FillPolicy::Partial(size), OrderType::Fak) => {
                order.filled_size = size.min(order.size);
                // Remainder killed.
                order.status = if order.filled_size >= order.size {
                    OrderStatus::Filled
                } else {
                    OrderStatus::Canceled
                };
            }
            (FillPolicy::Partial(size), OrderType::Gtc) => {
                order.filled_size = size.min(order.size);
                order.status = if order.filled_size >= order.size {
                    OrderStatus::Filled
                } else {
                    OrderStatus::PartialFilled
                };
            }
            (FillPolicy::Rest, OrderType::Fak) => {
                order.status = OrderStatus::Canceled;
            }
            (FillPolicy::Rest, OrderType::Gtc) => {
                order.status = OrderStatus::Open;
            }
        }
        debug!(order = %order.id, status = ?order.status, "paper placement");
        state.placements.push(order.clone());
        state.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }
}

#[async_trait]
impl OrderCanceler for PaperGateway {
    async fn cancel_order(&self, id: &OrderId) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        state.cancels.push(id.clone());
        if let Some(order) = state.orders.get_mut(id) {
            if order.status.is_active() {
                order.status = OrderStatus::Canceled;
            }
        }
        // Absent orders are not an error; absence implies terminal.
        Ok(())
    }
}

impl OrderReader for PaperGateway {
    fn get_order(&self, id: &OrderId) -> Option<Order> {
        self.state.lock().orders.get(id).cloned()
    }

    fn active_orders(&self) -> Vec<Order> {
        self.state
            .lock()
            .orders
            .values()
            .filter(|o| o.status.is_active())
            .cloned()
            .collect()
    }

    fn all_orders(&self) -> Vec<Order> {
        self.state.lock().orders.values().cloned().collect()
    }
}

#[async_trait]
impl BookReader for PaperGateway {
    async fn best_price(&self, asset_id: &str) -> Result<(Decimal, Decimal), GatewayError> {
        self.state
            .lock()
            .books
            .get(asset_id)
            .copied()
            .ok_or_else(|| GatewayError::Transport(format!("no book for {asset_id}")))
    }

    async fn top_of_book(&self, market: &MarketPair) -> Result<TopOfBook, GatewayError> {
        self.state
            .lock()
            .tops
            .get(&market.slug)
            .copied()
            .ok_or_else(|| GatewayError::Transport(format!("no snapshot for {}", market.slug)))
    }
}

#[async_trait]
impl SetMerger for PaperGateway {
    async fn merge_complete_sets(
        &self,
        condition_id: &str,
        amount: Size,
    ) -> Result<String, GatewayError> {
        let mut state = self.state.lock();
        state.merges.push((condition_id.to_string(), amount));
        Ok(format!("0xpaper{:04x}", state.merges.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use updown_core::{Cents, OrderSide, TokenSide};

    fn new_order(order_type: OrderType) -> NewOrder {
        NewOrder {
            market_slug: "btc-updown-1h-1722500400".to_string(),
            asset_id: "a-up".to_string(),
            token: TokenSide::Up,
            side: OrderSide::Buy,
            price: Cents(58),
            size: Size::new(dec!(10)),
            order_type,
            is_entry: true,
            hedge_for: None,
        }
    }

    #[tokio::test]
    async fn test_fill_policy_full() {
        let gw = PaperGateway::new();
        let order = gw.place_order(new_order(OrderType::Fak)).await.unwrap();
        assert!(order.is_filled());
        assert_eq!(gw.placements().len(), 1);
    }

    #[tokio::test]
    async fn test_fak_partial_kills_remainder() {
        let gw = PaperGateway::new();
        gw.set_policy("a-up", FillPolicy::Partial(Size::new(dec!(4))));
        let order = gw.place_order(new_order(OrderType::Fak)).await.unwrap();
        assert_eq!(order.filled_size, Size::new(dec!(4)));
        assert_eq!(order.status, OrderStatus::Canceled);
        assert!(!order.is_filled());
    }

    #[tokio::test]
    async fn test_gtc_rests_and_fills_later() {
        let gw = PaperGateway::new();
        gw.set_policy("a-up", FillPolicy::Rest);
        let order = gw.place_order(new_order(OrderType::Gtc)).await.unwrap();
        assert_eq!(order.status, OrderStatus::Open);

        let after = gw.fill_order(&order.id, Size::new(dec!(10))).unwrap();
        assert!(after.is_filled());
        assert_eq!(gw.get_order(&order.id).unwrap().status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_cancel_active_and_absent() {
        let gw = PaperGateway::new();
        gw.set_policy("a-up", FillPolicy::Rest);
        let order = gw.place_order(new_order(OrderType::Gtc)).await.unwrap();
        gw.cancel_order(&order.id).await.unwrap();
        assert_eq!(
            gw.get_order(&order.id).unwrap().status,
            OrderStatus::Canceled
        );
        // Absent order: success, recorded.
        gw.cancel_order(&OrderId::new("missing")).await.unwrap();
        assert_eq!(gw.cancels().len(), 2);
    }

    #[tokio::test]
    async fn test_reject_next_is_one_shot() {
        let gw = PaperGateway::new();
        gw.reject_next("a-up", "Insufficient balance");
        let err = gw.place_order(new_order(OrderType::Fak)).await.unwrap_err();
        assert!(err.indicates_insufficient_balance());
        assert!(gw.place_order(new_order(OrderType::Fak)).await.is_ok());
    }

    #[tokio::test]
    async fn test_books_and_merges() {
        let gw = PaperGateway::new();
        gw.set_book("a-up", dec!(0.57), dec!(0.58));
        let (bid, ask) = gw.best_price("a-up").await.unwrap();
        assert_eq!((bid, ask), (dec!(0.57), dec!(0.58)));
        assert!(gw.best_price("unknown").await.is_err());

        let tx = gw
            .merge_complete_sets("cond-1", Size::new(dec!(5)))
            .await
            .unwrap();
        assert!(tx.starts_with("0xpaper"));
        assert_eq!(gw.merges(), vec![("cond-1".to_string(), Size::new(dec!(5)))]);
    }
}
