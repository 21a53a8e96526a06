//! CLI entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use updown_bot::{App, BotConfig};

#[derive(Parser)]
#[command(name = "updown-bot", about = "UP/DOWN cycle trading bot", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bot.
    Run {
        /// Path to the TOML configuration file.
        #[arg(long, default_value = "updown.toml")]
        config: PathBuf,
        /// Trade against the in-memory paper gateway.
        #[arg(long, default_value_t = true)]
        dry_run: bool,
    },
    /// Validate a configuration file and exit.
    Check {
        #[arg(long, default_value = "updown.toml")]
        config: PathBuf,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { config, dry_run } => {
            let config = BotConfig::load(&config).context("loading configuration")?;
            init_tracing(&config.logging.level, config.logging.json);
            if !dry_run {
                anyhow::bail!(
                    "live exchange adapters are wired externally; run with --dry-run"
                );
            }

            let app = App::new(config)?;
            let cancel = CancellationToken::new();
            let shutdown = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("shutdown requested");
                    shutdown.cancel();
                }
            });
            app.run_paper(cancel).await?;
        }
        Command::Check { config } => {
            let config = BotConfig::load(&config).context("loading configuration")?;
            init_tracing(&config.logging.level, config.logging.json);
            info!(
                symbol = %config.strategy.cycle.symbol,
                timeframe = %config.strategy.cycle.timeframe,
                "configuration ok"
            );
        }
    }
    Ok(())
}
