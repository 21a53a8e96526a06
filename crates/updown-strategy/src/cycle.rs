//! Cycle-boundary glue.
//!
//! When the scheduler rolls to a new cycle the strategy state is reset (see
//! `VelocityFollowStrategy::on_cycle`) and the old market's balanced
//! inventory is reclaimed: matched UP/DOWN shares form complete sets that
//! merge back into collateral ahead of resolution.

use tracing::{info, warn};

use updown_core::{MarketPair, SetMerger};

use crate::book::PositionBook;

/// Merge the old market's matched UP/DOWN inventory via the relayer.
///
/// Returns the settlement transaction hash when a merge was submitted.
pub async fn merge_if_balanced(
    book: &PositionBook,
    market: &MarketPair,
    merger: &dyn SetMerger,
) -> Option<String> {
    let amount = book.matched_size(&market.slug);
    if !amount.is_positive() {
        return None;
    }
    match merger.merge_complete_sets(&market.condition_id, amount).await {
        Ok(tx_hash) => {
            info!(
                market = %market.slug,
                amount = %amount,
                tx = %tx_hash,
                "complete sets merged"
            );
            Some(tx_hash)
        }
        Err(e) => {
            warn!(market = %market.slug, amount = %amount, error = %e, "complete-set merge failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use updown_core::{Cents, Order, OrderId, OrderSide, OrderStatus, OrderType, Size, TokenSide};
    use updown_exec::PaperGateway;

    fn market() -> MarketPair {
        MarketPair {
            slug: "btc-updown-1h-1722500400".to_string(),
            up_asset: "a-up".to_string(),
            down_asset: "a-down".to_string(),
            condition_id: "cond-1".to_string(),
            cycle_start_s: 1_722_500_400,
        }
    }

    fn fill(id: &str, token: TokenSide, size: Size) -> Order {
        Order {
            id: OrderId::new(id),
            market_slug: market().slug,
            asset_id: market().asset_for(token).to_string(),
            token,
            side: OrderSide::Buy,
            price: Cents(50),
            size,
            order_type: OrderType::Fak,
            status: OrderStatus::Filled,
            filled_size: size,
            is_entry: true,
            hedge_for: None,
            created_at_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_balanced_inventory_merges() {
        let book = PositionBook::new();
        book.upsert_market(market());
        book.record_order_fill(&fill("o1", TokenSide::Up, Size::new(dec!(10))));
        book.record_order_fill(&fill("o2", TokenSide::Down, Size::new(dec!(7))));

        let gw = PaperGateway::new();
        let tx = merge_if_balanced(&book, &market(), &*gw).await;
        assert!(tx.is_some());
        assert_eq!(gw.merges(), vec![("cond-1".to_string(), Size::new(dec!(7)))]);
    }

    #[tokio::test]
    async fn test_one_sided_inventory_skips_merge() {
        let book = PositionBook::new();
        book.upsert_market(market());
        book.record_order_fill(&fill("o1", TokenSide::Up, Size::new(dec!(10))));

        let gw = PaperGateway::new();
        assert!(merge_if_balanced(&book, &market(), &*gw).await.is_none());
        assert!(gw.merges().is_empty());
    }
}
