//! Velocity-follow strategy for UP/DOWN cycle markets.
//!
//! - `StrategyConfig`: the full configuration surface
//! - `PositionBook`: in-memory inventory backing skew gates, exits, and
//!   complete-set merging
//! - `ExitController`: take-profit / stop-loss / trailing / partial /
//!   time-stop exit rules
//! - `VelocityFollowStrategy`: the entry state machine wiring signals to
//!   the execution engine
//! - `cycle`: cycle-boundary reset and complete-set merge glue

pub mod book;
pub mod config;
pub mod cycle;
pub mod error;
pub mod exit;
pub mod sizing;
pub mod velocity_follow;

pub use book::PositionBook;
pub use config::{ExecMode, StrategyConfig};
pub use error::{Result, StrategyError};
pub use exit::{ExitAction, ExitConfig, ExitController, ExitReason, PartialTakeProfit};
pub use velocity_follow::VelocityFollowStrategy;
