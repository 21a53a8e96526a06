//! Directional bias from the cycle's opening candle.
//!
//! At cycle start the filter waits for the first closed 1-minute candle of
//! the underlying. A decisive body sets the bias toward the candle's
//! direction; an indecisive body or an outsized wick yields no bias, and a
//! missing candle times out into no bias.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use updown_core::TokenSide;

use crate::feeds::{Candle, CandleFeed};

/// How the bias constrains entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiasMode {
    /// Only the bias side may trade.
    Hard,
    /// Both sides may trade; the opposite side faces stiffer thresholds.
    #[default]
    Soft,
}

/// Why the bias resolved the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasReason {
    Ok,
    Timeout,
    BodyTooSmall,
    WickTooLarge,
}

impl fmt::Display for BiasReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Timeout => write!(f, "timeout"),
            Self::BodyTooSmall => write!(f, "body_too_small"),
            Self::WickTooLarge => write!(f, "wick_too_large"),
        }
    }
}

/// Resolved bias for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BiasOutcome {
    pub token: Option<TokenSide>,
    pub reason: BiasReason,
    pub body_bps: i64,
    pub wick_bps: i64,
}

impl BiasOutcome {
    fn none(reason: BiasReason, body_bps: i64, wick_bps: i64) -> Self {
        Self {
            token: None,
            reason,
            body_bps,
            wick_bps,
        }
    }
}

/// Bias filter configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BiasConfig {
    #[serde(default)]
    pub mode: BiasMode,
    /// Seconds to wait for the opening candle before giving up.
    #[serde(default = "default_max_wait_s")]
    pub open_1m_max_wait_s: u64,
    /// Minimum candle body, basis points of the open.
    #[serde(default = "default_min_body_bps")]
    pub open_1m_min_body_bps: i64,
    /// Maximum wick, basis points of the open.
    #[serde(default = "default_max_wick_bps")]
    pub open_1m_max_wick_bps: i64,
    /// Soft mode: velocity threshold multiplier against the bias.
    #[serde(default = "default_opposite_velocity_multiplier")]
    pub opposite_velocity_multiplier: f64,
    /// Soft mode: extra move demanded against the bias, cents.
    #[serde(default)]
    pub opposite_min_move_extra_cents: i64,
}

fn default_max_wait_s() -> u64 {
    120
}

fn default_min_body_bps() -> i64 {
    3
}

fn default_max_wick_bps() -> i64 {
    25
}

fn default_opposite_velocity_multiplier() -> f64 {
    1.5
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            mode: BiasMode::default(),
            open_1m_max_wait_s: default_max_wait_s(),
            open_1m_min_body_bps: default_min_body_bps(),
            open_1m_max_wick_bps: default_max_wick_bps(),
            opposite_velocity_multiplier: default_opposite_velocity_multiplier(),
            opposite_min_move_extra_cents: 0,
        }
    }
}

/// Per-cycle bias state machine.
#[derive(Debug)]
pub struct BiasFilter {
    config: BiasConfig,
    cycle_start_s: i64,
    outcome: Option<BiasOutcome>,
}

impl BiasFilter {
    #[must_use]
    pub fn new(config: BiasConfig) -> Self {
        Self {
            config,
            cycle_start_s: 0,
            outcome: None,
        }
    }

    /// Start waiting for a new cycle's opening candle.
    pub fn reset(&mut self, cycle_start_s: i64) {
        self.cycle_start_s = cycle_start_s;
        self.outcome = None;
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.outcome.is_some()
    }

    #[must_use]
    pub fn outcome(&self) -> Option<BiasOutcome> {
        self.outcome
    }

    /// Poll the feed. Resolves the bias once, either from the candle or by
    /// timing out after the configured wait.
    pub fn on_tick(&mut self, feed: &dyn CandleFeed, now_s: i64) -> Option<BiasOutcome> {
        if self.outcome.is_some() {
            return self.outcome;
        }
        if let Some(candle) = feed.opening_candle(self.cycle_start_s) {
            if let Some(outcome) = evaluate(&self.config, &candle) {
                info!(
                    token = ?outcome.token,
                    reason = %outcome.reason,
                    body_bps = outcome.body_bps,
                    wick_bps = outcome.wick_bps,
                    "bias resolved"
                );
                self.outcome = Some(outcome);
                return self.outcome;
            }
        }
        if now_s.saturating_sub(self.cycle_start_s) >= self.config.open_1m_max_wait_s as i64 {
            debug!(cycle_start_s = self.cycle_start_s, "bias wait timed out");
            self.outcome = Some(BiasOutcome::none(BiasReason::Timeout, 0, 0));
        }
        self.outcome
    }

    /// Whether `token` may trade under the resolved bias. Hard mode with no
    /// bias signal leaves both sides tradeable.
    #[must_use]
    pub fn allows(&self, token: TokenSide) -> bool {
        match (self.config.mode, self.outcome.and_then(|o| o.token)) {
            (BiasMode::Hard, Some(bias)) => token == bias,
            _ => true,
        }
    }

    /// Entry thresholds for `token`, stiffened against the bias in soft
    /// mode.
    #[must_use]
    pub fn adjusted_thresholds(
        &self,
        token: TokenSide,
        min_move_cents: i64,
        min_velocity: f64,
    ) -> (i64, f64) {
        if self.config.mode != BiasMode::Soft {
            return (min_move_cents, min_velocity);
        }
        match self.outcome.and_then(|o| o.token) {
            Some(bias) if bias != token => (
                min_move_cents + self.config.opposite_min_move_extra_cents,
                min_velocity * self.config.opposite_velocity_multiplier,
            ),
            _ => (min_move_cents, min_velocity),
        }
    }
}

/// Judge a closed opening candle. Returns `None` for a malformed bar (the
/// filter keeps waiting).
#[must_use]
pub fn evaluate(config: &BiasConfig, candle: &Candle) -> Option<BiasOutcome> {
    if !candle.open.is_sign_positive() || candle.open.is_zero() {
        return None;
    }
    let body_bps = to_bps((candle.close - candle.open).abs() / candle.open);
    let body_top = candle.open.max(candle.close);
    let body_bottom = candle.open.min(candle.close);
    let upper_wick = (candle.high - body_top).max(Decimal::ZERO) / candle.open;
    let lower_wick = (body_bottom - candle.low).max(Decimal::ZERO) / candle.open;
    let wick_bps = to_bps(upper_wick.max(lower_wick));

    let outcome = if body_bps < config.open_1m_min_body_bps {
        BiasOutcome::none(BiasReason::BodyTooSmall, body_bps, wick_bps)
    } else if wick_bps > config.open_1m_max_wick_bps {
        BiasOutcome::none(BiasReason::WickTooLarge, body_bps, wick_bps)
    } else {
        let token = if candle.close >= candle.open {
            TokenSide::Up
        } else {
            TokenSide::Down
        };
        BiasOutcome {
            token: Some(token),
            reason: BiasReason::Ok,
            body_bps,
            wick_bps,
        }
    };
    Some(outcome)
}

fn to_bps(ratio: Decimal) -> i64 {
    (ratio * Decimal::from(10_000))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}
