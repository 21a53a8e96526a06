//! Error types for the bot binary.

use thiserror::Error;

/// Top-level application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration: {0}")]
    Config(String),

    #[error("strategy: {0}")]
    Strategy(#[from] updown_strategy::StrategyError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for application operations.
pub type AppResult<T> = std::result::Result<T, AppError>;
