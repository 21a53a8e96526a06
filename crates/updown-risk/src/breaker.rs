//! Process-wide circuit breaker.
//!
//! Trading halts when consecutive errors reach the configured threshold or
//! when the daily realized loss crosses the limit. All state lives in
//! atomics so the hot path never takes a lock. Once halted by errors, only a
//! manual `resume()` re-enables trading; the daily-loss rule re-arms itself
//! when the local day rolls over.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};

use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{Result, RiskError};

/// Circuit breaker thresholds. A zero value disables that rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive placement/cancel errors before halting.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    /// Daily loss limit in cents of collateral.
    #[serde(default)]
    pub daily_loss_limit_cents: i64,
}

fn default_max_consecutive_errors() -> u32 {
    5
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_errors: default_max_consecutive_errors(),
            daily_loss_limit_cents: 0,
        }
    }
}

/// Lock-free kill switch shared across all trading components.
pub struct CircuitBreaker {
    config: BreakerConfig,
    halted: AtomicBool,
    consecutive_errors: AtomicU32,
    daily_pnl_cents: AtomicI64,
    /// Local calendar day the pnl counter belongs to, as `yyyymmdd`.
    day_key: AtomicU32,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            halted: AtomicBool::new(false),
            consecutive_errors: AtomicU32::new(0),
            daily_pnl_cents: AtomicI64::new(0),
            day_key: AtomicU32::new(local_day_key()),
        }
    }

    /// Check whether trading is currently allowed.
    pub fn allow_trading(&self) -> Result<()> {
        self.allow_trading_at(local_day_key())
    }

    /// Deterministic variant taking the caller's local day key.
    pub fn allow_trading_at(&self, day_key: u32) -> Result<()> {
        if self.halted.load(Ordering::SeqCst) {
            return Err(RiskError::CircuitOpen("halted".to_string()));
        }

        let max_errors = self.config.max_consecutive_errors;
        if max_errors > 0 {
            let errors = self.consecutive_errors.load(Ordering::SeqCst);
            if errors >= max_errors {
                if self
                    .halted
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    error!(errors, "circuit breaker tripped on consecutive errors");
                }
                return Err(RiskError::CircuitOpen(format!(
                    "{errors} consecutive errors"
                )));
            }
        }

        self.roll_day(day_key);

        let limit = self.config.daily_loss_limit_cents;
        if limit > 0 {
            let pnl = self.daily_pnl_cents.load(Ordering::SeqCst);
            if pnl <= -limit {
                return Err(RiskError::CircuitOpen(format!(
                    "daily loss {pnl}c at limit -{limit}c"
                )));
            }
        }

        Ok(())
    }

    /// Record a transient I/O error.
    pub fn on_error(&self) {
        let n = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.config.max_consecutive_errors && n > 0 {
            warn!(errors = n, "consecutive error threshold reached");
        }
    }

    /// Record a successful external call, resetting the error streak.
    pub fn on_success(&self) {
        self.consecutive_errors.store(0, Ordering::SeqCst);
    }

    /// Accumulate realized pnl within the current local day.
    pub fn add_pnl_cents(&self, delta: i64) {
        self.add_pnl_cents_at(delta, local_day_key());
    }

    /// Deterministic variant taking the caller's local day key.
    pub fn add_pnl_cents_at(&self, delta: i64, day_key: u32) {
        self.roll_day(day_key);
        self.daily_pnl_cents.fetch_add(delta, Ordering::SeqCst);
    }

    /// Manual halt.
    pub fn halt(&self) {
        if self
            .halted
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            warn!("circuit breaker halted manually");
        }
    }

    /// Manual resume; clears the error streak.
    pub fn resume(&self) {
        self.halted.store(false, Ordering::SeqCst);
        self.consecutive_errors.store(0, Ordering::SeqCst);
        info!("circuit breaker resumed");
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn daily_pnl_cents(&self) -> i64 {
        self.daily_pnl_cents.load(Ordering::SeqCst)
    }

    /// Reset the pnl counter when the local day changes. One caller wins the
    /// CAS; losers observe the already-rolled state.
    fn roll_day(&self, day_key: u32) {
        let current = self.day_key.load(Ordering::SeqCst);
        if current != day_key
            && self
                .day_key
                .compare_exchange(current, day_key, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            let old = self.daily_pnl_cents.swap(0, Ordering::SeqCst);
            info!(old_day = current, new_day = day_key, old_pnl_cents = old, "daily pnl rolled");
        }
    }
}

/// Local calendar day as `yyyymmdd`.
#[must_use]
pub fn local_day_key() -> u32 {
    let now = Local::now();
    now.year() as u32 * 10_000 + now.month() * 100 + now.day()
}
