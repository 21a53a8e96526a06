//! Component wiring and run loop.
//!
//! The app composes the session, strategy, execution engine, and risk
//! manager around a gateway. This build wires the in-memory paper gateway
//! (dry-run); live exchange adapters implement the same `updown_core`
//! gateway traits and drop into the identical wiring.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use updown_core::{CycleSpec, MarketPair};
use updown_exec::{ExecutionEngine, PaperGateway};
use updown_risk::{CircuitBreaker, RiskManager};
use updown_session::{DispatchSession, SessionConfig};
use updown_strategy::{PositionBook, VelocityFollowStrategy};

use crate::config::BotConfig;
use crate::error::AppResult;

/// The composed application.
pub struct App {
    config: BotConfig,
}

/// Handles to the wired components, exposed for the run loop and tests.
pub struct Wired {
    pub gateway: Arc<PaperGateway>,
    pub session: Arc<DispatchSession>,
    pub strategy: Arc<VelocityFollowStrategy>,
    pub book: Arc<PositionBook>,
}

impl App {
    pub fn new(config: BotConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Run against the paper gateway until cancelled.
    pub async fn run_paper(&self, cancel: CancellationToken) -> AppResult<()> {
        let now_s = chrono::Utc::now().timestamp();
        let wired = self.wire_paper(now_s, cancel.clone())?;
        info!(market = %wired.session.current_market().slug, "bot running (paper)");

        // Cycle ticker: roll the session and strategy at boundaries and
        // reclaim balanced inventory from the finished cycle.
        let spec = self.config.strategy.cycle.clone();
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        let mut current_start = spec.cycle_start_for(now_s);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("bot stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    let now_s = chrono::Utc::now().timestamp();
                    let start = spec.cycle_start_for(now_s);
                    if start != current_start {
                        current_start = start;
                        let market = synthesize_market(&spec, start);
                        wired.session.set_market(market.clone());
                        wired
                            .strategy
                            .on_cycle(market, Some(&*wired.gateway))
                            .await;
                    }
                }
            }
        }
    }

    /// Build the full component graph around a paper gateway.
    pub fn wire_paper(&self, now_s: i64, cancel: CancellationToken) -> AppResult<Wired> {
        let spec = &self.config.strategy.cycle;
        let market = synthesize_market(spec, spec.cycle_start_for(now_s));

        let gateway = PaperGateway::new();
        let breaker = Arc::new(CircuitBreaker::new(self.config.breaker));
        let book = Arc::new(PositionBook::new());

        let (engine, worker) = ExecutionEngine::new(
            self.config.execution.clone(),
            gateway.clone(),
            gateway.clone(),
            breaker.clone(),
            None,
        );
        tokio::spawn(worker.run(cancel.clone()));

        let risk = Arc::new(RiskManager::new(
            self.config.risk.clone(),
            gateway.clone(),
            gateway.clone(),
            gateway.clone(),
            gateway.clone(),
            book.clone(),
            breaker.clone(),
        ));
        tokio::spawn(Arc::clone(&risk).run(cancel.clone()));

        let (session, drainer) = DispatchSession::new(market.clone(), SessionConfig::default());
        tokio::spawn(drainer.run(cancel.clone()));

        let strategy = VelocityFollowStrategy::new(
            self.config.strategy.clone(),
            market,
            engine,
            gateway.clone(),
            gateway.clone(),
            gateway.clone(),
            gateway.clone(),
            risk,
            breaker,
            book.clone(),
            None,
            None,
            cancel,
        )?;
        session.register_price_handler(strategy.clone());
        session.register_order_handler(strategy.clone());

        Ok(Wired {
            gateway,
            session,
            strategy,
            book,
        })
    }
}

/// Cycle market for a start timestamp with deterministic asset ids, used
/// by the paper wiring. Live adapters resolve the real pair instead.
fn synthesize_market(spec: &CycleSpec, start_s: i64) -> MarketPair {
    let slug = spec.slug_for(start_s);
    MarketPair {
        up_asset: format!("{slug}-up"),
        down_asset: format!("{slug}-down"),
        condition_id: format!("cond-{slug}"),
        cycle_start_s: start_s,
        slug,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use updown_core::{Cents, PriceChangedEvent, TokenSide, TopOfBook};

    fn test_config() -> BotConfig {
        let raw = r#"
            [strategy.cycle]
            symbol = "btc"
            kind = "updown"
            timeframe = "1h"
        "#;
        toml::from_str(raw).unwrap()
    }

    #[test]
    fn test_synthesized_market_is_consistent() {
        let config = test_config();
        let market = synthesize_market(&config.strategy.cycle, 1_722_502_800);
        assert_eq!(market.slug, "btc-updown-1h-1722502800");
        assert_eq!(market.asset_for(TokenSide::Up), "btc-updown-1h-1722502800-up");
        assert_eq!(
            market.token_for("btc-updown-1h-1722502800-down"),
            Some(TokenSide::Down)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wired_graph_trades_end_to_end() {
        let app = App::new(test_config()).unwrap();
        let cancel = CancellationToken::new();
        let start = 1_722_502_800i64;
        let wired = app.wire_paper(start, cancel.clone()).unwrap();
        let market = wired.session.current_market();

        wired.gateway.set_policy(
            market.asset_for(TokenSide::Down),
            updown_exec::FillPolicy::Rest,
        );
        wired.gateway.set_top_of_book(
            &market.slug,
            TopOfBook {
                up_bid: Cents(57),
                up_ask: Cents(58),
                down_bid: Cents(41),
                down_ask: Cents(42),
                source: updown_core::BookSource::Ws,
                fetched_at_ms: (start * 1_000) as u64,
            },
        );

        // Rising UP tape through the session.
        for (offset, cents) in [(0, 50), (3, 54)] {
            wired.session.on_price_event(PriceChangedEvent {
                ts_ms: ((start + offset) * 1_000) as u64,
                token: TokenSide::Up,
                cents: Cents(cents),
                market: market.clone(),
            });
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let placements = wired.gateway.placements();
        assert_eq!(placements.len(), 2);
        assert_eq!(placements[0].token, TokenSide::Up);
        assert_eq!(placements[1].token, TokenSide::Down);
        assert_eq!(placements[1].price, Cents(39));

        cancel.cancel();
    }
}
