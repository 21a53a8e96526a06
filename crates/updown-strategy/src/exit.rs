//! Exit rules for open positions.
//!
//! Runs on price ticks whenever the current market holds inventory,
//! throttled to one sweep per 200ms. Rule order per position: dual-side
//! unwind, hard stop-loss, take-profit, time stop, partial take-profits,
//! trailing stop. At most one action fires per position per sweep, and a
//! sell never exceeds the open size.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use updown_core::{Cents, Position, Size, TokenSide, TopOfBook};

use crate::error::{Result, StrategyError};

/// Minimum interval between exit sweeps (ms).
const SWEEP_THROTTLE_MS: u64 = 200;

/// One partial take-profit level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialTakeProfit {
    /// Profit threshold, cents.
    pub profit_cents: i64,
    /// Fraction of the remaining size to sell, in (0, 1].
    pub fraction: Decimal,
}

/// Exit configuration. Zero values disable individual rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitConfig {
    #[serde(default)]
    pub take_profit_cents: i64,
    #[serde(default)]
    pub stop_loss_cents: i64,
    /// Maximum holding time, seconds.
    #[serde(default)]
    pub max_hold_s: u64,
    #[serde(default = "default_exit_cooldown_ms")]
    pub exit_cooldown_ms: u64,
    /// Unwind both sides together once both are held.
    #[serde(default)]
    pub exit_both_sides_if_hedged: bool,
    /// Ordered partial take-profit ladder.
    #[serde(default)]
    pub partial_take_profits: Vec<PartialTakeProfit>,
    #[serde(default)]
    pub enable_trailing_take_profit: bool,
    /// Profit that arms the trail, cents.
    #[serde(default)]
    pub trail_start_cents: i64,
    /// Distance from the high-water bid to the trailing stop, cents.
    #[serde(default)]
    pub trail_distance_cents: i64,
}

fn default_exit_cooldown_ms() -> u64 {
    1_500
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            take_profit_cents: 0,
            stop_loss_cents: 0,
            max_hold_s: 0,
            exit_cooldown_ms: default_exit_cooldown_ms(),
            exit_both_sides_if_hedged: false,
            partial_take_profits: Vec::new(),
            enable_trailing_take_profit: false,
            trail_start_cents: 0,
            trail_distance_cents: 0,
        }
    }
}

impl ExitConfig {
    pub fn validate(&self) -> Result<()> {
        for (i, level) in self.partial_take_profits.iter().enumerate() {
            if !level.fraction.is_sign_positive() || level.fraction > Decimal::ONE {
                return Err(StrategyError::InvalidConfig(format!(
                    "partial take-profit {i} fraction must be in (0, 1]"
                )));
            }
        }
        if self.enable_trailing_take_profit && self.trail_distance_cents <= 0 {
            return Err(StrategyError::InvalidConfig(
                "trailing take-profit requires a positive distance".to_string(),
            ));
        }
        Ok(())
    }
}

/// Why a sell was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TimeStop,
    /// Index into the partial take-profit ladder.
    PartialTakeProfit(usize),
    Trailing,
    DualSide,
}

/// A sell the strategy must execute.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitAction {
    pub token: TokenSide,
    pub size: Size,
    /// Current bid: the FAK sell price.
    pub price: Cents,
    pub reason: ExitReason,
}

#[derive(Debug, Default)]
struct TrailState {
    armed: bool,
    high_bid: Cents,
}

/// Per-cycle exit state machine.
#[derive(Debug)]
pub struct ExitController {
    config: ExitConfig,
    /// Fired partial levels per token side.
    partial_fired: HashMap<TokenSide, HashSet<usize>>,
    trailing: HashMap<TokenSide, TrailState>,
    last_sweep_at_ms: u64,
    last_exit_at_ms: u64,
}

impl ExitController {
    #[must_use]
    pub fn new(config: ExitConfig) -> Self {
        Self {
            config,
            partial_fired: HashMap::new(),
            trailing: HashMap::new(),
            last_sweep_at_ms: 0,
            last_exit_at_ms: 0,
        }
    }

    /// Clear the partial and trailing maps at a cycle boundary.
    pub fn reset(&mut self) {
        self.partial_fired.clear();
        self.trailing.clear();
    }

    /// Evaluate open positions against the current book.
    ///
    /// Returns the sells to execute, possibly empty. Throttled internally;
    /// a recent exit also suppresses the sweep for the cooldown window.
    pub fn check(
        &mut self,
        positions: &[Position],
        tob: &TopOfBook,
        now_ms: u64,
    ) -> Vec<ExitAction> {
        if now_ms.saturating_sub(self.last_sweep_at_ms) < SWEEP_THROTTLE_MS {
            return Vec::new();
        }
        self.last_sweep_at_ms = now_ms;
        if now_ms.saturating_sub(self.last_exit_at_ms) < self.config.exit_cooldown_ms {
            return Vec::new();
        }

        let open: Vec<&Position> = positions.iter().filter(|p| p.is_open()).collect();
        if open.is_empty() {
            return Vec::new();
        }

        let mut actions = Vec::new();

        // Dual-side unwind takes priority: both sells go out together.
        if self.config.exit_both_sides_if_hedged {
            let up = open.iter().find(|p| p.token == TokenSide::Up);
            let down = open.iter().find(|p| p.token == TokenSide::Down);
            if let (Some(up), Some(down)) = (up, down) {
                for pos in [up, down] {
                    actions.push(ExitAction {
                        token: pos.token,
                        size: pos.size,
                        price: tob.bid(pos.token),
                        reason: ExitReason::DualSide,
                    });
                }
                self.last_exit_at_ms = now_ms;
                return actions;
            }
        }

        for pos in open {
            if let Some(action) = self.check_position(pos, tob, now_ms) {
                actions.push(action);
            }
        }
        if !actions.is_empty() {
            self.last_exit_at_ms = now_ms;
        }
        actions
    }

    fn check_position(
        &mut self,
        pos: &Position,
        tob: &TopOfBook,
        now_ms: u64,
    ) -> Option<ExitAction> {
        let bid = tob.bid(pos.token);
        let avg = pos.avg_price()?;
        let profit_cents = bid.get() - avg.get();

        let sell_all = |reason| {
            Some(ExitAction {
                token: pos.token,
                size: pos.size,
                price: bid,
                reason,
            })
        };

        if self.config.stop_loss_cents > 0 && profit_cents <= -self.config.stop_loss_cents {
            debug!(token = %pos.token, profit_cents, "stop loss");
            return sell_all(ExitReason::StopLoss);
        }
        if self.config.take_profit_cents > 0 && profit_cents >= self.config.take_profit_cents {
            debug!(token = %pos.token, profit_cents, "take profit");
            return sell_all(ExitReason::TakeProfit);
        }
        if self.config.max_hold_s > 0 {
            let held_s = now_ms.saturating_sub(pos.opened_at_ms) / 1_000;
            if held_s >= self.config.max_hold_s {
                debug!(token = %pos.token, held_s, "time stop");
                return sell_all(ExitReason::TimeStop);
            }
        }

        // Partial ladder: first unfired level whose threshold is reached.
        for (i, level) in self.config.partial_take_profits.iter().enumerate() {
            let fired = self.partial_fired.entry(pos.token).or_default();
            if fired.contains(&i) || profit_cents < level.profit_cents {
                continue;
            }
            fired.insert(i);
            let size = Size::new(pos.size.inner() * level.fraction).min(pos.size);
            debug!(token = %pos.token, level = i, size = %size, "partial take profit");
            return Some(ExitAction {
                token: pos.token,
                size,
                price: bid,
                reason: ExitReason::PartialTakeProfit(i),
            });
        }

        if self.config.enable_trailing_take_profit {
            let trail = self.trailing.entry(pos.token).or_default();
            if !trail.armed && profit_cents >= self.config.trail_start_cents {
                trail.armed = true;
                trail.high_bid = bid;
                debug!(token = %pos.token, high = %bid, "trailing armed");
            } else if trail.armed && bid > trail.high_bid {
                trail.high_bid = bid;
            }
            if trail.armed {
                let stop = Cents(trail.high_bid.get() - self.config.trail_distance_cents);
                if bid <= stop {
                    debug!(token = %pos.token, stop = %stop, "trailing stop hit");
                    return sell_all(ExitReason::Trailing);
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use updown_core::{BookSource, MarketPair};

    fn market() -> MarketPair {
        MarketPair {
            slug: "btc-updown-1h-1722500400".to_string(),
            up_asset: "a-up".to_string(),
            down_asset: "a-down".to_string(),
            condition_id: "cond".to_string(),
            cycle_start_s: 1_722_500_400,
        }
    }

    fn position(token: TokenSide, size: Decimal, entry: i64) -> Position {
        Position::open(
            "p1",
            market(),
            token,
            Size::new(size),
            Cents(entry),
            0,
        )
    }

    fn tob_with_bid(up_bid: i64) -> TopOfBook {
        TopOfBook {
            up_bid: Cents(up_bid),
            up_ask: Cents(up_bid + 1),
            down_bid: Cents(99 - up_bid - 2),
            down_ask: Cents(99 - up_bid - 1),
            source: BookSource::Ws,
            fetched_at_ms: 0,
        }
    }

    #[test]
    fn test_take_profit() {
        let mut ctl = ExitController::new(ExitConfig {
            take_profit_cents: 4,
            ..Default::default()
        });
        let pos = [position(TokenSide::Up, dec!(10), 60)];
        assert!(ctl.check(&pos, &tob_with_bid(63), 2_000).is_empty());
        let actions = ctl.check(&pos, &tob_with_bid(64), 3_000);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].reason, ExitReason::TakeProfit);
        assert_eq!(actions[0].size, Size::new(dec!(10)));
        assert_eq!(actions[0].price, Cents(64));
    }

    #[test]
    fn test_stop_loss() {
        let mut ctl = ExitController::new(ExitConfig {
            stop_loss_cents: 5,
            ..Default::default()
        });
        let pos = [position(TokenSide::Up, dec!(10), 60)];
        assert!(ctl.check(&pos, &tob_with_bid(56), 2_000).is_empty());
        let actions = ctl.check(&pos, &tob_with_bid(55), 3_000);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].reason, ExitReason::StopLoss);
    }

    #[test]
    fn test_time_stop() {
        let mut ctl = ExitController::new(ExitConfig {
            max_hold_s: 60,
            ..Default::default()
        });
        let pos = [position(TokenSide::Up, dec!(10), 60)];
        assert!(ctl.check(&pos, &tob_with_bid(60), 30_000).is_empty());
        let actions = ctl.check(&pos, &tob_with_bid(60), 61_000);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].reason, ExitReason::TimeStop);
    }

    #[test]
    fn test_partial_then_trailing_path() {
        // Size 10 at 60c, partial [{3, 0.5}], trailing start 4 / dist 2,
        // bid path 62 -> 63 -> 64 -> 65 -> 63.
        let mut ctl = ExitController::new(ExitConfig {
            partial_take_profits: vec![PartialTakeProfit {
                profit_cents: 3,
                fraction: dec!(0.5),
            }],
            enable_trailing_take_profit: true,
            trail_start_cents: 4,
            trail_distance_cents: 2,
            ..Default::default()
        });

        let mut pos = position(TokenSide::Up, dec!(10), 60);
        let mut t = 10_000u64;
        let mut step = |ctl: &mut ExitController, pos: &Position, bid: i64, t: &mut u64| {
            *t += 2_000;
            ctl.check(std::slice::from_ref(pos), &tob_with_bid(bid), *t)
        };

        // 62c: profit 2, nothing.
        assert!(step(&mut ctl, &pos, 62, &mut t).is_empty());

        // 63c: profit 3, partial sells half.
        let actions = step(&mut ctl, &pos, 63, &mut t);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].reason, ExitReason::PartialTakeProfit(0));
        assert_eq!(actions[0].size, Size::new(dec!(5)));
        pos.reduce(actions[0].size);

        // 64c: profit 4 arms the trail at high 64, no sell.
        assert!(step(&mut ctl, &pos, 64, &mut t).is_empty());

        // 65c: high-water moves to 65, stop 63.
        assert!(step(&mut ctl, &pos, 65, &mut t).is_empty());

        // 63c: at the stop, remaining 5 sold.
        let actions = step(&mut ctl, &pos, 63, &mut t);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].reason, ExitReason::Trailing);
        assert_eq!(actions[0].size, Size::new(dec!(5)));
    }

    #[test]
    fn test_partial_level_fires_once() {
        let mut ctl = ExitController::new(ExitConfig {
            partial_take_profits: vec![PartialTakeProfit {
                profit_cents: 3,
                fraction: dec!(0.5),
            }],
            exit_cooldown_ms: 0,
            ..Default::default()
        });
        let pos = [position(TokenSide::Up, dec!(10), 60)];
        assert_eq!(ctl.check(&pos, &tob_with_bid(63), 1_000).len(), 1);
        assert!(ctl.check(&pos, &tob_with_bid(63), 2_000).is_empty());
        assert!(ctl.check(&pos, &tob_with_bid(64), 3_000).is_empty());
    }

    #[test]
    fn test_exit_cooldown_suppresses_sweeps() {
        let mut ctl = ExitController::new(ExitConfig {
            take_profit_cents: 1,
            ..Default::default()
        });
        let pos = [position(TokenSide::Up, dec!(10), 60)];
        assert_eq!(ctl.check(&pos, &tob_with_bid(64), 10_000).len(), 1);
        // Inside the 1500ms cooldown nothing fires, even though the rule
        // still matches.
        assert!(ctl.check(&pos, &tob_with_bid(64), 11_000).is_empty());
        assert_eq!(ctl.check(&pos, &tob_with_bid(64), 12_000).len(), 1);
    }

    #[test]
    fn test_throttle_between_sweeps() {
        let mut ctl = ExitController::new(ExitConfig {
            take_profit_cents: 1,
            exit_cooldown_ms: 0,
            ..Default::default()
        });
        let pos = [position(TokenSide::Up, dec!(10), 60)];
        assert_eq!(ctl.check(&pos, &tob_with_bid(64), 10_000).len(), 1);
        // 100ms later: inside the 200ms sweep throttle.
        assert!(ctl.check(&pos, &tob_with_bid(64), 10_100).is_empty());
        assert_eq!(ctl.check(&pos, &tob_with_bid(64), 10_300).len(), 1);
    }

    #[test]
    fn test_dual_side_exit() {
        let mut ctl = ExitController::new(ExitConfig {
            exit_both_sides_if_hedged: true,
            ..Default::default()
        });
        let pos = [
            position(TokenSide::Up, dec!(10), 58),
            position(TokenSide::Down, dec!(10), 39),
        ];
        let actions = ctl.check(&pos, &tob_with_bid(60), 10_000);
        assert_eq!(actions.len(), 2);
        assert!(actions.iter().all(|a| a.reason == ExitReason::DualSide));
        assert_eq!(actions[0].token, TokenSide::Up);
        assert_eq!(actions[1].token, TokenSide::Down);
    }

    #[test]
    fn test_never_sells_more_than_open() {
        let mut ctl = ExitController::new(ExitConfig {
            partial_take_profits: vec![PartialTakeProfit {
                profit_cents: 1,
                fraction: dec!(1),
            }],
            ..Default::default()
        });
        let pos = [position(TokenSide::Up, dec!(3), 60)];
        let actions = ctl.check(&pos, &tob_with_bid(64), 10_000);
        assert_eq!(actions.len(), 1);
        assert!(actions[0].size <= pos[0].size);
    }

    #[test]
    fn test_reset_clears_partials_and_trailing() {
        let mut ctl = ExitController::new(ExitConfig {
            partial_take_profits: vec![PartialTakeProfit {
                profit_cents: 3,
                fraction: dec!(0.5),
            }],
            exit_cooldown_ms: 0,
            ..Default::default()
        });
        let pos = [position(TokenSide::Up, dec!(10), 60)];
        assert_eq!(ctl.check(&pos, &tob_with_bid(63), 1_000).len(), 1);
        ctl.reset();
        // The level can fire again in the new cycle.
        assert_eq!(ctl.check(&pos, &tob_with_bid(63), 2_000).len(), 1);
    }
}
