//! Error types for updown-strategy.

use thiserror::Error;

/// Strategy layer errors.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("execution: {0}")]
    Exec(#[from] updown_exec::ExecError),

    #[error("gateway: {0}")]
    Gateway(#[from] updown_core::GatewayError),
}

/// Result type alias for strategy operations.
pub type Result<T> = std::result::Result<T, StrategyError>;
