//! Share sizing for two-leg triggers.
//!
//! Both legs are sized to the same share count so a perfect hedge fill
//! leaves no residual inventory, then each is snapped to the exchange
//! maker-amount precision (`size × price` on two decimals, half-up).

use rust_decimal::Decimal;

use updown_core::{Cents, Size};

/// Shares for one leg: the configured baseline, floored up so the notional
/// reaches the venue minimum at this price.
#[must_use]
pub fn shares_for(order_size: Decimal, min_order_usdc: Decimal, price: Cents) -> Size {
    let px = price.to_decimal_price();
    if px.is_zero() {
        return Size::new(order_size);
    }
    let floor = min_order_usdc / px;
    Size::new(order_size.max(floor))
}

/// Final sizes for the entry FAK and hedge GTC legs.
///
/// The hedge leg, resting on the book, additionally honors the exchange
/// minimum share size. Both legs equalize to the larger before snapping.
#[must_use]
pub fn two_leg_sizes(
    order_size: Decimal,
    min_order_usdc: Decimal,
    min_share_size: Decimal,
    entry_price: Cents,
    hedge_price: Cents,
) -> (Size, Size) {
    let entry = shares_for(order_size, min_order_usdc, entry_price);
    let hedge = shares_for(order_size, min_order_usdc, hedge_price)
        .max(Size::new(min_share_size));
    let equalized = entry.max(hedge);
    (
        equalized.snap_to_maker_precision(entry_price),
        equalized.snap_to_maker_precision(hedge_price),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_baseline_dominates_at_normal_prices() {
        // 10 shares at 58c is $5.80, well over a $1 minimum.
        let s = shares_for(dec!(10), dec!(1), Cents(58));
        assert_eq!(s, Size::new(dec!(10)));
    }

    #[test]
    fn test_min_notional_floors_tiny_orders() {
        // 1 share at 4c is $0.04; a $1 minimum needs 25 shares.
        let s = shares_for(dec!(1), dec!(1), Cents(4));
        assert_eq!(s, Size::new(dec!(25)));
    }

    #[test]
    fn test_two_legs_equalized() {
        // Both legs settle on 10 shares.
        let (entry, hedge) = two_leg_sizes(dec!(10), dec!(1), dec!(5), Cents(58), Cents(39));
        assert_eq!(entry, Size::new(dec!(10)));
        assert_eq!(hedge, Size::new(dec!(10)));
    }

    #[test]
    fn test_hedge_min_share_size_pulls_both_up() {
        let (entry, hedge) = two_leg_sizes(dec!(2), dec!(1), dec!(5), Cents(58), Cents(39));
        // Hedge floor of 5 shares equalizes the entry up as well.
        assert_eq!(hedge, Size::new(dec!(5)));
        assert_eq!(entry, Size::new(dec!(5)));
    }

    #[test]
    fn test_maker_amount_lands_on_two_decimals() {
        let (entry, hedge) = two_leg_sizes(dec!(10.3), dec!(1), dec!(5), Cents(58), Cents(39));
        let entry_notional = (entry.inner() * dec!(0.58)).round_dp(6);
        let hedge_notional = (hedge.inner() * dec!(0.39)).round_dp(6);
        assert_eq!(entry_notional, entry_notional.round_dp(2));
        assert_eq!(hedge_notional, hedge_notional.round_dp(2));
    }
}
