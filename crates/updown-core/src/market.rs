//! Cycle market identification and slug codec.
//!
//! A cycle is a time-boxed market round (15m/1h/4h) identified by its start
//! timestamp. Exchanges address cycles by slug; two slug styles exist:
//!
//! - numeric: `{symbol}-{kind}-{tf}-{unix}` (e.g. `btc-updown-1h-1722500000`)
//! - ET-hourly: `{symbol}-{kind}-{month}-{day}-{h}{am|pm}-et`
//!   (e.g. `bitcoin-up-or-down-july-26-3pm-et`)
//!
//! The codec is bidirectional: `parse(format(start)) == start`. The ET form
//! carries no year, so parsing resolves the nearest candidate around a hint
//! timestamp.

use chrono::{Datelike, TimeZone, Timelike, Utc};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::side::TokenSide;

/// Cycle length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
}

impl Timeframe {
    /// Cycle length in seconds.
    #[must_use]
    pub fn secs(&self) -> i64 {
        match self {
            Self::M15 => 900,
            Self::H1 => 3_600,
            Self::H4 => 14_400,
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Timeframe {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "15m" => Ok(Self::M15),
            "1h" => Ok(Self::H1),
            "4h" => Ok(Self::H4),
            other => Err(CoreError::InvalidSlug(format!(
                "unknown timeframe: {other}"
            ))),
        }
    }
}

/// Slug naming style used by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlugStyle {
    /// `{symbol}-{kind}-{tf}-{unix}`
    #[default]
    Numeric,
    /// `{symbol}-{kind}-{month}-{day}-{h}{am|pm}-et`, hourly cycles only.
    EtHourly,
}

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Defines the slug format and cycle cadence for one underlying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSpec {
    /// Underlying symbol as it appears in slugs (e.g. `btc`, `bitcoin`).
    pub symbol: String,
    /// Market kind segment (e.g. `updown`, `up-or-down`).
    pub kind: String,
    pub timeframe: Timeframe,
    #[serde(default)]
    pub style: SlugStyle,
}

impl CycleSpec {
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        kind: impl Into<String>,
        timeframe: Timeframe,
        style: SlugStyle,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            kind: kind.into(),
            timeframe,
            style,
        }
    }

    /// Validate internal consistency. The ET-hourly style only exists for
    /// one-hour cycles.
    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() || self.kind.is_empty() {
            return Err(CoreError::InvalidSlug(
                "cycle spec requires symbol and kind".to_string(),
            ));
        }
        if self.style == SlugStyle::EtHourly && self.timeframe != Timeframe::H1 {
            return Err(CoreError::InvalidSlug(format!(
                "et-hourly slugs require 1h cycles, got {}",
                self.timeframe
            )));
        }
        Ok(())
    }

    /// Start of the cycle containing `now_s`.
    #[must_use]
    pub fn cycle_start_for(&self, now_s: i64) -> i64 {
        let len = self.timeframe.secs();
        now_s.div_euclid(len) * len
    }

    /// End of the cycle starting at `start_s`.
    #[must_use]
    pub fn cycle_end(&self, start_s: i64) -> i64 {
        start_s + self.timeframe.secs()
    }

    /// Common slug prefix for market filtering.
    #[must_use]
    pub fn slug_prefix(&self) -> String {
        match self.style {
            SlugStyle::Numeric => format!("{}-{}-{}-", self.symbol, self.kind, self.timeframe),
            SlugStyle::EtHourly => format!("{}-{}-", self.symbol, self.kind),
        }
    }

    /// True when `slug` belongs to this underlying and timeframe.
    #[must_use]
    pub fn matches(&self, slug: &str) -> bool {
        slug.starts_with(&self.slug_prefix())
    }

    /// Render the slug for the cycle starting at `start_s`.
    #[must_use]
    pub fn slug_for(&self, start_s: i64) -> String {
        match self.style {
            SlugStyle::Numeric => format!(
                "{}-{}-{}-{}",
                self.symbol, self.kind, self.timeframe, start_s
            ),
            SlugStyle::EtHourly => {
                let et = Utc
                    .timestamp_opt(start_s, 0)
                    .single()
                    .map(|dt| dt.with_timezone(&New_York));
                match et {
                    Some(dt) => {
                        let month = MONTHS[(dt.month() - 1) as usize];
                        let (h, ampm) = hour12(dt.hour());
                        format!(
                            "{}-{}-{}-{}-{}{}-et",
                            self.symbol,
                            self.kind,
                            month,
                            dt.day(),
                            h,
                            ampm
                        )
                    }
                    None => String::new(),
                }
            }
        }
    }

    /// Recover the cycle start timestamp from a slug.
    ///
    /// `hint_s` disambiguates the year for the ET-hourly style (the nearest
    /// candidate around the hint wins); the numeric style ignores it.
    pub fn parse_slug(&self, slug: &str, hint_s: i64) -> Result<i64> {
        if !self.matches(slug) {
            return Err(CoreError::InvalidSlug(format!(
                "slug {slug} does not match {}{}",
                self.slug_prefix(),
                "*"
            )));
        }
        match self.style {
            SlugStyle::Numeric => {
                let tail = slug
                    .rsplit('-')
                    .next()
                    .ok_or_else(|| CoreError::InvalidSlug(slug.to_string()))?;
                tail.parse::<i64>()
                    .map_err(|_| CoreError::InvalidSlug(format!("bad unix suffix in {slug}")))
            }
            SlugStyle::EtHourly => self.parse_et_slug(slug, hint_s),
        }
    }

    fn parse_et_slug(&self, slug: &str, hint_s: i64) -> Result<i64> {
        let body = slug
            .strip_prefix(&self.slug_prefix())
            .and_then(|s| s.strip_suffix("-et"))
            .ok_or_else(|| CoreError::InvalidSlug(slug.to_string()))?;
        let parts: Vec<&str> = body.split('-').collect();
        if parts.len() != 3 {
            return Err(CoreError::InvalidSlug(slug.to_string()));
        }
        let month = MONTHS
            .iter()
            .position(|m| *m == parts[0])
            .ok_or_else(|| CoreError::InvalidSlug(format!("bad month in {slug}")))?
            as u32
            + 1;
        let day: u32 = parts[1]
            .parse()
            .map_err(|_| CoreError::InvalidSlug(format!("bad day in {slug}")))?;
        let hour = parse_hour12(parts[2])
            .ok_or_else(|| CoreError::InvalidSlug(format!("bad hour in {slug}")))?;

        let hint_year = Utc
            .timestamp_opt(hint_s, 0)
            .single()
            .map(|dt| dt.with_timezone(&New_York).year())
            .ok_or_else(|| CoreError::InvalidSlug("hint out of range".to_string()))?;

        // The slug carries no year; try the hint year and its neighbors and
        // keep the candidate closest to the hint.
        let mut best: Option<i64> = None;
        for year in [hint_year - 1, hint_year, hint_year + 1] {
            let Some(dt) = New_York
                .with_ymd_and_hms(year, month, day, hour, 0, 0)
                .earliest()
            else {
                continue;
            };
            let ts = dt.timestamp();
            match best {
                Some(b) if (b - hint_s).abs() <= (ts - hint_s).abs() => {}
                _ => best = Some(ts),
            }
        }
        best.ok_or_else(|| CoreError::InvalidSlug(format!("no calendar date for {slug}")))
    }
}

fn hour12(hour24: u32) -> (u32, &'static str) {
    match hour24 {
        0 => (12, "am"),
        1..=11 => (hour24, "am"),
        12 => (12, "pm"),
        _ => (hour24 - 12, "pm"),
    }
}

fn parse_hour12(s: &str) -> Option<u32> {
    let (num, ampm) = s.split_at(s.len().checked_sub(2)?);
    let h: u32 = num.parse().ok()?;
    if h == 0 || h > 12 {
        return None;
    }
    match ampm {
        "am" => Some(if h == 12 { 0 } else { h }),
        "pm" => Some(if h == 12 { 12 } else { h + 12 }),
        _ => None,
    }
}

/// A cycle market: one asset id per token side plus the cycle identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketPair {
    /// Opaque slug identifying the time-boxed cycle.
    pub slug: String,
    pub up_asset: String,
    pub down_asset: String,
    /// On-chain condition id, used for complete-set operations.
    pub condition_id: String,
    /// Cycle start timestamp (Unix seconds).
    pub cycle_start_s: i64,
}

impl MarketPair {
    /// Asset id for a token side.
    #[must_use]
    pub fn asset_for(&self, token: TokenSide) -> &str {
        match token {
            TokenSide::Up => &self.up_asset,
            TokenSide::Down => &self.down_asset,
        }
    }

    /// Token side for an asset id, when it belongs to this pair.
    #[must_use]
    pub fn token_for(&self, asset_id: &str) -> Option<TokenSide> {
        if asset_id == self.up_asset {
            Some(TokenSide::Up)
        } else if asset_id == self.down_asset {
            Some(TokenSide::Down)
        } else {
            None
        }
    }

    /// True when `asset_id` is one of the pair's tokens.
    #[must_use]
    pub fn contains_asset(&self, asset_id: &str) -> bool {
        self.token_for(asset_id).is_some()
    }
}

impl fmt::Display for MarketPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug)
    }
}
