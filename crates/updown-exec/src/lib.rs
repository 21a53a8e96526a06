//! Multi-leg execution and hedge lifecycle for the UP/DOWN bot.
//!
//! - `InFlightGate`: short-TTL sharded dedup gate for request submissions
//! - `ExecutionEngine`: bounded-queue multi-leg placement with concurrent
//!   legs and imbalance auto-hedging
//! - `HedgeMonitor`: watches a resting hedge leg, re-quotes on timeout and
//!   optionally falls back to a taker order
//! - `PaperGateway`: in-memory gateway for dry-run mode and tests

pub mod dedup;
pub mod engine;
pub mod error;
pub mod hedge;
pub mod paper;

pub use dedup::InFlightGate;
pub use engine::{
    ExecTicket, ExecutionConfig, ExecutionEngine, ExecutionWorker, MultiLegResult,
};
pub use error::{ExecError, Result};
pub use hedge::{HedgeMonitor, HedgeMonitorConfig, HedgeOutcome, HedgeTask};
pub use paper::{FillPolicy, PaperGateway};
