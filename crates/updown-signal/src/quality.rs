//! Top-of-book quality scoring.
//!
//! Produces a 0..100 score from freshness, completeness, crossed-book
//! checks, spread width, and mirror consistency between the two sides.
//! Complementary quotes should mirror each other: `up_bid + down_ask` and
//! `up_ask + down_bid` both sum near one payout.

use serde::{Deserialize, Serialize};
use tracing::trace;

use updown_core::{Cents, Pips, TokenSide, TopOfBook};

/// Score floor for `tradable()`, independent of the configured gate.
const TRADABLE_MIN_SCORE: u8 = 60;

/// Quality gate configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Snapshot age beyond which the book counts as stale (ms).
    #[serde(default = "default_max_book_age_ms")]
    pub max_book_age_ms: u64,
    /// Per-side spread beyond which the book counts as wide (pips).
    #[serde(default = "default_max_spread_pips")]
    pub max_spread_pips: i64,
    /// Mirror gap tolerance (pips).
    #[serde(default = "default_mirror_tolerance_pips")]
    pub mirror_tolerance_pips: i64,
    /// Minimum score the gate enforces.
    #[serde(default = "default_min_score")]
    pub min_score: u8,
}

fn default_max_book_age_ms() -> u64 {
    3_000
}

fn default_max_spread_pips() -> i64 {
    500
}

fn default_mirror_tolerance_pips() -> i64 {
    200
}

fn default_min_score() -> u8 {
    60
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_book_age_ms: default_max_book_age_ms(),
            max_spread_pips: default_max_spread_pips(),
            mirror_tolerance_pips: default_mirror_tolerance_pips(),
            min_score: default_min_score(),
        }
    }
}

/// Assessment of one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityReport {
    pub score: u8,
    pub fresh: bool,
    pub complete: bool,
}

impl QualityReport {
    /// Minimum bar for any trading decision.
    #[must_use]
    pub fn tradable(&self) -> bool {
        self.complete && self.fresh && self.score >= TRADABLE_MIN_SCORE
    }
}

/// Scores snapshots and enforces the configured minimum.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityGate {
    config: QualityConfig,
}

impl QualityGate {
    #[must_use]
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Score a snapshot at `now_ms`.
    #[must_use]
    pub fn assess(&self, tob: &TopOfBook, now_ms: u64) -> QualityReport {
        let mut penalty: u32 = 0;

        let fresh = tob.age_ms(now_ms) <= self.config.max_book_age_ms;
        if !fresh {
            penalty += 25;
        }

        let complete = tob.is_complete();
        if !complete {
            penalty += 50;
        }

        for token in TokenSide::ORDERED {
            if tob.is_crossed(token) {
                penalty += 40;
            }
        }

        if tob.spread_pips(TokenSide::Up).get() > self.config.max_spread_pips
            || tob.spread_pips(TokenSide::Down).get() > self.config.max_spread_pips
        {
            penalty += 20;
        }

        for gap in mirror_gaps(tob) {
            if gap.get().abs() > self.config.mirror_tolerance_pips {
                penalty += 10;
            }
        }

        let score = 100u32.saturating_sub(penalty) as u8;
        trace!(score, fresh, complete, source = %tob.source, "book assessed");
        QualityReport {
            score,
            fresh,
            complete,
        }
    }

    /// Gate decision: tradable and at or above the configured minimum.
    #[must_use]
    pub fn passes(&self, report: &QualityReport) -> bool {
        report.tradable() && report.score >= self.config.min_score
    }
}

/// The two mirror deviations from one payout, in pips:
/// `up_bid + down_ask - 100c` and `up_ask + down_bid - 100c`.
fn mirror_gaps(tob: &TopOfBook) -> [Pips; 2] {
    let payout = Pips::from_cents(Cents::PAYOUT);
    [
        Pips::from_cents(tob.up_bid) + Pips::from_cents(tob.down_ask) - payout,
        Pips::from_cents(tob.up_ask) + Pips::from_cents(tob.down_bid) - payout,
    ]
}
