//! Per-token price sample windows and velocity metrics.
//!
//! The strategy chases the rising side, so the entry path only treats a
//! positive delta as qualifying; the signed value is still exposed for
//! display and diagnostics.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use updown_core::{Cents, TokenSide};

/// Hard cap on retained samples per token, bounding memory under event
/// storms regardless of the time window.
const MAX_SAMPLES: usize = 512;

/// One observed price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSample {
    /// Unix milliseconds.
    pub ts_ms: u64,
    pub cents: Cents,
}

/// Sample window configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VelocityConfig {
    /// Sliding window length in seconds.
    #[serde(default = "default_window_s")]
    pub window_s: u64,
}

fn default_window_s() -> u64 {
    10
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            window_s: default_window_s(),
        }
    }
}

/// Derived movement metrics over one token's window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityMetrics {
    /// Signed move over the window, cents.
    pub delta_cents: i64,
    /// Window span in seconds.
    pub seconds: f64,
    /// Signed velocity, cents per second.
    pub cents_per_sec: f64,
}

impl VelocityMetrics {
    /// Entry-path qualification: only a rising side qualifies.
    #[must_use]
    pub fn qualifies(&self, min_move_cents: i64, min_velocity: f64) -> bool {
        self.delta_cents > 0
            && self.delta_cents >= min_move_cents
            && self.cents_per_sec >= min_velocity
    }
}

/// Bounded, ordered price samples for both tokens of one market.
#[derive(Debug, Default)]
pub struct VelocityEngine {
    config: VelocityConfig,
    up: VecDeque<PriceSample>,
    down: VecDeque<PriceSample>,
}

impl VelocityEngine {
    #[must_use]
    pub fn new(config: VelocityConfig) -> Self {
        Self {
            config,
            up: VecDeque::new(),
            down: VecDeque::new(),
        }
    }

    /// Append a sample. Quotes outside the tradeable range are rejected.
    pub fn push(&mut self, token: TokenSide, ts_ms: u64, cents: Cents) -> bool {
        if !cents.is_tradeable() {
            return false;
        }
        let window = self.window_mut(token);
        window.push_back(PriceSample { ts_ms, cents });
        if window.len() > MAX_SAMPLES {
            window.pop_front();
        }
        true
    }

    /// Drop samples older than the window, both tokens. The length cap is
    /// re-applied defensively.
    pub fn prune(&mut self, now_ms: u64) {
        let horizon = now_ms.saturating_sub(self.config.window_s * 1_000);
        for token in TokenSide::ORDERED {
            let window = self.window_mut(token);
            while window.front().is_some_and(|s| s.ts_ms < horizon) {
                window.pop_front();
            }
            while window.len() > MAX_SAMPLES {
                window.pop_front();
            }
        }
    }

    /// Compute metrics over one token's current window.
    ///
    /// Requires at least two samples spanning more than one millisecond;
    /// non-finite results are rejected.
    #[must_use]
    pub fn compute(&self, token: TokenSide) -> Option<VelocityMetrics> {
        let window = self.window(token);
        let first = window.front()?;
        let last = window.back()?;
        if window.len() < 2 {
            return None;
        }
        let dt_ms = last.ts_ms.saturating_sub(first.ts_ms);
        if dt_ms <= 1 {
            return None;
        }
        let seconds = dt_ms as f64 / 1_000.0;
        let delta_cents = last.cents.get() - first.cents.get();
        let cents_per_sec = delta_cents as f64 / seconds;
        if !seconds.is_finite() || !cents_per_sec.is_finite() {
            return None;
        }
        Some(VelocityMetrics {
            delta_cents,
            seconds,
            cents_per_sec,
        })
    }

    /// Latest observed price for a token.
    #[must_use]
    pub fn latest(&self, token: TokenSide) -> Option<Cents> {
        self.window(token).back().map(|s| s.cents)
    }

    /// Number of retained samples for a token.
    #[must_use]
    pub fn len(&self, token: TokenSide) -> usize {
        self.window(token).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.up.is_empty() && self.down.is_empty()
    }

    /// Drop all samples, both tokens.
    pub fn clear(&mut self) {
        self.up.clear();
        self.down.clear();
    }

    fn window(&self, token: TokenSide) -> &VecDeque<PriceSample> {
        match token {
            TokenSide::Up => &self.up,
            TokenSide::Down => &self.down,
        }
    }

    fn window_mut(&mut self, token: TokenSide) -> &mut VecDeque<PriceSample> {
        match token {
            TokenSide::Up => &mut self.up,
            TokenSide::Down => &mut self.down,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> VelocityEngine {
        VelocityEngine::new(VelocityConfig { window_s: 10 })
    }

    #[test]
    fn test_rising_sequence_metrics() {
        // t=0 50c, t=3 54c, t=6 58c.
        let mut e = engine();
        e.push(TokenSide::Up, 0, Cents(50));
        e.push(TokenSide::Up, 3_000, Cents(54));
        e.push(TokenSide::Up, 6_000, Cents(58));

        let m = e.compute(TokenSide::Up).unwrap();
        assert_eq!(m.delta_cents, 8);
        assert!((m.seconds - 6.0).abs() < f64::EPSILON);
        assert!((m.cents_per_sec - 8.0 / 6.0).abs() < 1e-9);
        assert!(m.qualifies(3, 0.3));
    }

    #[test]
    fn test_falling_sequence_signed_but_not_qualifying() {
        let mut e = engine();
        e.push(TokenSide::Down, 0, Cents(58));
        e.push(TokenSide::Down, 4_000, Cents(50));

        let m = e.compute(TokenSide::Down).unwrap();
        assert_eq!(m.delta_cents, -8);
        assert!(m.cents_per_sec < 0.0);
        assert!(!m.qualifies(1, 0.0));
    }

    #[test]
    fn test_needs_two_samples() {
        let mut e = engine();
        assert!(e.compute(TokenSide::Up).is_none());
        e.push(TokenSide::Up, 0, Cents(50));
        assert!(e.compute(TokenSide::Up).is_none());
    }

    #[test]
    fn test_rejects_tiny_span() {
        let mut e = engine();
        e.push(TokenSide::Up, 1_000, Cents(50));
        e.push(TokenSide::Up, 1_001, Cents(51));
        assert!(e.compute(TokenSide::Up).is_none());
        e.push(TokenSide::Up, 1_002, Cents(52));
        assert!(e.compute(TokenSide::Up).is_some());
    }

    #[test]
    fn test_rejects_out_of_range_quotes() {
        let mut e = engine();
        assert!(!e.push(TokenSide::Up, 0, Cents(0)));
        assert!(!e.push(TokenSide::Up, 0, Cents(100)));
        assert!(!e.push(TokenSide::Up, 0, Cents(-3)));
        assert!(e.push(TokenSide::Up, 0, Cents(1)));
        assert_eq!(e.len(TokenSide::Up), 1);
    }

    #[test]
    fn test_prune_window() {
        let mut e = engine();
        e.push(TokenSide::Up, 0, Cents(50));
        e.push(TokenSide::Up, 5_000, Cents(51));
        e.push(TokenSide::Up, 12_000, Cents(52));
        e.prune(12_000);
        // The t=0 sample fell out of the 10s window.
        assert_eq!(e.len(TokenSide::Up), 2);
        let m = e.compute(TokenSide::Up).unwrap();
        assert_eq!(m.delta_cents, 1);
    }

    #[test]
    fn test_sample_cap() {
        let mut e = engine();
        for i in 0..600 {
            e.push(TokenSide::Up, i, Cents(50));
        }
        assert_eq!(e.len(TokenSide::Up), MAX_SAMPLES);
    }

    #[test]
    fn test_clear() {
        let mut e = engine();
        e.push(TokenSide::Up, 0, Cents(50));
        e.push(TokenSide::Down, 0, Cents(50));
        e.clear();
        assert!(e.is_empty());
        assert!(e.latest(TokenSide::Up).is_none());
    }
}
