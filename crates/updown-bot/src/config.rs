//! Application configuration.
//!
//! Loaded from a TOML file with an `UPDOWN__`-prefixed environment overlay
//! (e.g. `UPDOWN__LOGGING__LEVEL=debug`). Every section has serde defaults
//! so a minimal file only names the cycle market.

use std::path::Path;

use serde::{Deserialize, Serialize};

use updown_exec::ExecutionConfig;
use updown_risk::{BreakerConfig, RiskConfig};
use updown_strategy::StrategyConfig;

use crate::error::{AppError, AppResult};

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl BotConfig {
    /// Load from a TOML file plus the environment overlay.
    pub fn load(path: &Path) -> AppResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("UPDOWN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;
        let config: Self = settings
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all sections.
    pub fn validate(&self) -> AppResult<()> {
        self.strategy.validate()?;
        Ok(())
    }
}
