//! Price-derived trading signals for the UP/DOWN bot.
//!
//! - `VelocityEngine`: bounded per-token sample windows with delta/velocity
//!   metrics
//! - `BiasFilter`: directional bias from the cycle's opening 1-minute candle
//! - `QualityGate`: 0..100 top-of-book quality score
//! - `feeds`: candle feed seams consumed by bias and move confirmation

pub mod bias;
pub mod feeds;
pub mod quality;
pub mod velocity;

pub use bias::{BiasConfig, BiasFilter, BiasMode, BiasOutcome, BiasReason};
pub use feeds::{Candle, CandleFeed, UnderlyingFeed};
pub use quality::{QualityConfig, QualityGate, QualityReport};
pub use velocity::{PriceSample, VelocityConfig, VelocityEngine, VelocityMetrics};
