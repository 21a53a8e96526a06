//! Error types for updown-exec.

use thiserror::Error;

/// Execution layer errors.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An equivalent request is already in flight; retry after the TTL.
    #[error("duplicate request in flight: {0}")]
    DuplicateInFlight(String),

    #[error("request queue full")]
    QueueFull,

    #[error("engine stopped")]
    Stopped,

    /// Circuit breaker refused the submission; operator must resume.
    #[error("trading halted: {0}")]
    CircuitOpen(String),

    #[error("gateway: {0}")]
    Gateway(#[from] updown_core::GatewayError),

    /// Structural refusal: a hedge price left the tradeable range.
    #[error("hedge price out of range: {0}")]
    HedgePriceOutOfRange(String),

    #[error(transparent)]
    Core(#[from] updown_core::CoreError),
}

/// Result type alias for execution operations.
pub type Result<T> = std::result::Result<T, ExecError>;
