//! Risk controls for the UP/DOWN bot.
//!
//! Two layers:
//! - `CircuitBreaker`: process-wide kill switch on consecutive errors and
//!   daily realized loss, lock-free atomics throughout.
//! - `RiskManager`: registry of unhedged entry exposures; after a timeout it
//!   cancels the stale hedge and crosses the spread with a taker order.

pub mod breaker;
pub mod error;
pub mod exposure;

pub use breaker::{BreakerConfig, CircuitBreaker};
pub use error::{Result, RiskError};
pub use exposure::{LossPolicy, RiskConfig, RiskExposure, RiskManager};
