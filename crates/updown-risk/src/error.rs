//! Error types for updown-risk.

use thiserror::Error;

/// Risk layer errors.
#[derive(Debug, Error)]
pub enum RiskError {
    /// Trading is halted; operator must resume.
    #[error("circuit breaker open: {0}")]
    CircuitOpen(String),

    #[error("unknown exposure: {0}")]
    UnknownExposure(String),

    #[error("gateway: {0}")]
    Gateway(#[from] updown_core::GatewayError),
}

/// Result type alias for risk operations.
pub type Result<T> = std::result::Result<T, RiskError>;
