//! Strategy configuration surface.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use updown_core::{CycleSpec, SlugStyle, Timeframe};
use updown_signal::{BiasConfig, QualityConfig, VelocityConfig};

use crate::error::{Result, StrategyError};
use crate::exit::ExitConfig;

/// How the two legs of a trigger are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Entry FAK first; the hedge GTC is placed only after the entry
    /// reports Filled within the sequential wait budget.
    Sequential,
    /// Both legs go through the execution engine as one request.
    #[default]
    Parallel,
}

/// Velocity-follow strategy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Cycle market definition (symbol, kind, timeframe, slug style).
    pub cycle: CycleSpec,

    // --- Entry signal ---
    #[serde(default)]
    pub velocity: VelocityConfig,
    /// Minimum move over the window, cents.
    #[serde(default = "default_min_move_cents")]
    pub min_move_cents: i64,
    /// Minimum velocity, cents per second.
    #[serde(default = "default_min_velocity_cps")]
    pub min_velocity_cps: f64,
    /// Global and side-level retrigger cooldown (ms).
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Quiet period after the first event of a cycle (ms). Zero disables.
    #[serde(default)]
    pub warmup_ms: u64,
    /// Trades allowed per cycle. Zero means unlimited.
    #[serde(default)]
    pub max_trades_per_cycle: Option<u32>,
    /// Legacy switch: implies `max_trades_per_cycle = 1` when that cap is
    /// unset.
    #[serde(default)]
    pub once_per_cycle: bool,
    /// When both sides qualify, pick the one trading at the higher price.
    #[serde(default = "default_true")]
    pub prefer_higher_price: bool,
    /// Disqualify a winner trading below this price. Zero disables.
    #[serde(default)]
    pub min_preferred_price_cents: i64,
    /// No new entries this close to cycle end (minutes).
    #[serde(default = "default_cycle_end_protection_minutes")]
    pub cycle_end_protection_minutes: u64,

    // --- Execution ---
    #[serde(default)]
    pub order_execution_mode: ExecMode,
    #[serde(default = "default_sequential_check_interval_ms")]
    pub sequential_check_interval_ms: u64,
    #[serde(default = "default_sequential_max_wait_ms")]
    pub sequential_max_wait_ms: u64,

    // --- Pricing ---
    /// Cents kept as edge below the complementary hedge price.
    #[serde(default = "default_hedge_offset_cents")]
    pub hedge_offset_cents: i64,
    #[serde(default = "default_min_entry_price_cents")]
    pub min_entry_price_cents: i64,
    #[serde(default = "default_max_entry_price_cents")]
    pub max_entry_price_cents: i64,
    /// Maximum entry-side spread, cents.
    #[serde(default = "default_max_spread_cents")]
    pub max_spread_cents: i64,

    // --- Sizing ---
    /// Baseline order size, shares.
    #[serde(default = "default_order_size_shares")]
    pub order_size_shares: Decimal,
    /// Minimum notional per order, collateral units.
    #[serde(default = "default_min_order_usdc")]
    pub min_order_usdc: Decimal,
    /// Exchange minimum share size for resting orders.
    #[serde(default = "default_min_share_size")]
    pub min_share_size: Decimal,

    // --- Inventory ---
    /// Skip a side once its net position exceeds this many shares.
    /// Zero disables.
    #[serde(default)]
    pub inventory_threshold_shares: Decimal,

    // --- Market quality ---
    #[serde(default = "default_true")]
    pub enable_market_quality_gate: bool,
    #[serde(default)]
    pub quality: QualityConfig,

    // --- Hedge lifecycle ---
    #[serde(default = "default_hedge_reorder_timeout_s")]
    pub hedge_reorder_timeout_s: u64,
    /// Zero disables the hedge taker fallback.
    #[serde(default)]
    pub hedge_timeout_fak_s: u64,

    // --- Bias ---
    #[serde(default)]
    pub bias_required: bool,
    #[serde(default)]
    pub bias: BiasConfig,

    // --- Underlying move confirmation ---
    #[serde(default)]
    pub underlying_confirm_enabled: bool,
    #[serde(default = "default_underlying_lookback_s")]
    pub underlying_lookback_s: u64,
    #[serde(default = "default_min_underlying_move_bps")]
    pub min_underlying_move_bps: i64,

    // --- Exits ---
    #[serde(default)]
    pub exit: ExitConfig,
}

fn default_true() -> bool {
    true
}

fn default_min_move_cents() -> i64 {
    3
}

fn default_min_velocity_cps() -> f64 {
    0.3
}

fn default_cooldown_ms() -> u64 {
    1_500
}

fn default_cycle_end_protection_minutes() -> u64 {
    2
}

fn default_sequential_check_interval_ms() -> u64 {
    200
}

fn default_sequential_max_wait_ms() -> u64 {
    3_000
}

fn default_hedge_offset_cents() -> i64 {
    3
}

fn default_min_entry_price_cents() -> i64 {
    30
}

fn default_max_entry_price_cents() -> i64 {
    95
}

fn default_max_spread_cents() -> i64 {
    3
}

fn default_order_size_shares() -> Decimal {
    Decimal::from(10)
}

fn default_min_order_usdc() -> Decimal {
    Decimal::ONE
}

fn default_min_share_size() -> Decimal {
    Decimal::from(5)
}

fn default_hedge_reorder_timeout_s() -> u64 {
    30
}

fn default_underlying_lookback_s() -> u64 {
    3
}

fn default_min_underlying_move_bps() -> i64 {
    2
}

impl StrategyConfig {
    /// A workable baseline for the given cycle market.
    #[must_use]
    pub fn for_cycle(cycle: CycleSpec) -> Self {
        Self {
            cycle,
            velocity: VelocityConfig::default(),
            min_move_cents: default_min_move_cents(),
            min_velocity_cps: default_min_velocity_cps(),
            cooldown_ms: default_cooldown_ms(),
            warmup_ms: 0,
            max_trades_per_cycle: None,
            once_per_cycle: false,
            prefer_higher_price: true,
            min_preferred_price_cents: 0,
            cycle_end_protection_minutes: default_cycle_end_protection_minutes(),
            order_execution_mode: ExecMode::default(),
            sequential_check_interval_ms: default_sequential_check_interval_ms(),
            sequential_max_wait_ms: default_sequential_max_wait_ms(),
            hedge_offset_cents: default_hedge_offset_cents(),
            min_entry_price_cents: default_min_entry_price_cents(),
            max_entry_price_cents: default_max_entry_price_cents(),
            max_spread_cents: default_max_spread_cents(),
            order_size_shares: default_order_size_shares(),
            min_order_usdc: default_min_order_usdc(),
            min_share_size: default_min_share_size(),
            inventory_threshold_shares: Decimal::ZERO,
            enable_market_quality_gate: true,
            quality: QualityConfig::default(),
            hedge_reorder_timeout_s: default_hedge_reorder_timeout_s(),
            hedge_timeout_fak_s: 0,
            bias_required: false,
            bias: BiasConfig::default(),
            underlying_confirm_enabled: false,
            underlying_lookback_s: default_underlying_lookback_s(),
            min_underlying_move_bps: default_min_underlying_move_bps(),
            exit: ExitConfig::default(),
        }
    }

    /// The effective per-cycle trade cap, with the `once_per_cycle`
    /// migration applied: the legacy switch implies a cap of one unless an
    /// explicit cap is set. Zero means unlimited.
    #[must_use]
    pub fn effective_max_trades(&self) -> u32 {
        match (self.max_trades_per_cycle, self.once_per_cycle) {
            (Some(n), _) => n,
            (None, true) => 1,
            (None, false) => 0,
        }
    }

    /// Reject inconsistent configurations at startup.
    pub fn validate(&self) -> Result<()> {
        self.cycle
            .validate()
            .map_err(|e| StrategyError::InvalidConfig(e.to_string()))?;
        if self.min_entry_price_cents >= self.max_entry_price_cents {
            return Err(StrategyError::InvalidConfig(format!(
                "entry price band empty: [{}, {}]",
                self.min_entry_price_cents, self.max_entry_price_cents
            )));
        }
        if !(0..100).contains(&self.min_entry_price_cents)
            || !(1..=100).contains(&self.max_entry_price_cents)
        {
            return Err(StrategyError::InvalidConfig(
                "entry price band outside (0, 100)".to_string(),
            ));
        }
        if self.hedge_offset_cents < 0 {
            return Err(StrategyError::InvalidConfig(
                "hedge offset must be non-negative".to_string(),
            ));
        }
        if self.min_velocity_cps < 0.0 || !self.min_velocity_cps.is_finite() {
            return Err(StrategyError::InvalidConfig(
                "minimum velocity must be finite and non-negative".to_string(),
            ));
        }
        if !self.order_size_shares.is_sign_positive() {
            return Err(StrategyError::InvalidConfig(
                "order size must be positive".to_string(),
            ));
        }
        self.exit.validate()?;
        Ok(())
    }
}

/// Default cycle used in examples and tests: numeric hourly BTC slugs.
#[must_use]
pub fn default_cycle() -> CycleSpec {
    CycleSpec::new("btc", "updown", Timeframe::H1, SlugStyle::Numeric)
}
