use crate::backtest::metrics::{BacktestMetrics, TradeRecord};
use crate::config::BotConfig;
use crate::data::aggregate;
use crate::db::ExitReason;
use crate::error::ConfigError;
use crate::models::{Candle, Direction, VenueKind};
use crate::risk::{size_position, RiskSettings};
use crate::strategy::{Evaluation, Strategy, StrategyParams, StructureStrategy};
use crate::Result;

/// LTF bars skipped before the first evaluation
pub const WARMUP_BARS: usize = 100;
/// Closed HTF bars needed before bias is considered
pub const MIN_HTF_BARS: usize = 20;

/// Replays the live pipeline bar by bar over a closed LTF series.
///
/// Each bar sees only the candles that had closed by its close time, the
/// same view the live cycle gets. One trade at a time: entry at the signal's
/// gap level on the signal bar, exit on the first later bar whose range
/// touches stop or target (stop checked first), or at the last close.
pub struct BacktestRunner {
    strategy: StructureStrategy,
    risk: RiskSettings,
    venue: VenueKind,
    window: usize,
}

impl BacktestRunner {
    pub fn new(params: StrategyParams, risk: RiskSettings, venue: VenueKind) -> Self {
        Self {
            strategy: StructureStrategy::new(params),
            risk,
            venue,
            window: 300,
        }
    }

    /// Runner with the configured profile, risk and venue
    pub fn from_config(config: &BotConfig) -> std::result::Result<Self, ConfigError> {
        let risk = RiskSettings {
            balance: config.balance,
            leverage: config.leverage,
            risk_pct: config.risk_per_trade_percent,
            cost_percent: config.cost_percent(config.venue),
        };
        Ok(Self::new(config.strategy_params(config.profile)?, risk, config.venue)
            .with_window(config.candle_limit))
    }

    /// Bars of history visible to each evaluation, per timeframe
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    pub fn run(&self, ltf: &[Candle]) -> Result<BacktestMetrics> {
        if ltf.len() <= WARMUP_BARS {
            return Err(format!(
                "Not enough candles for backtest. Need more than {}, got {}",
                WARMUP_BARS,
                ltf.len()
            )
            .into());
        }

        let params = self.strategy.params();
        let htf_all = aggregate(ltf, params.profile.htf());

        tracing::info!(
            "Starting backtest: {} {} candles ({} {} candles), profile {}",
            ltf.len(),
            params.profile.ltf(),
            htf_all.len(),
            params.profile.htf(),
            params.profile
        );

        let mut trades = Vec::new();
        let mut i = WARMUP_BARS;

        while i < ltf.len() {
            let now = ltf[i].close_time();

            let htf_end = htf_all.partition_point(|c| c.close_time() <= now);
            if htf_end < MIN_HTF_BARS {
                i += 1;
                continue;
            }
            let htf = &htf_all[htf_end.saturating_sub(self.window)..htf_end];
            let window = &ltf[(i + 1).saturating_sub(self.window)..=i];

            let signal = match self.strategy.evaluate(htf, window, now) {
                Evaluation::Signal(signal) => signal,
                Evaluation::NoSignal(_) => {
                    i += 1;
                    continue;
                }
            };

            let plan = match size_position(&self.risk, self.venue, signal.entry, signal.stop) {
                Ok(plan) => plan,
                Err(e) => {
                    tracing::debug!("Bar {} sizing rejected: {}", i, e);
                    i += 1;
                    continue;
                }
            };

            let (exit_index, exit_price, exit_reason) =
                simulate_exit(ltf, i, signal.direction, signal.stop, signal.target);

            let gross_pnl = match signal.direction {
                Direction::Long => (exit_price - signal.entry) * plan.quantity,
                Direction::Short => (signal.entry - exit_price) * plan.quantity,
            };
            let fees = exit_price * plan.quantity * self.risk.cost_percent / 100.0;

            tracing::debug!(
                "Bar {}: {} entry={:.5} exit={:.5} ({}) net={:.4}",
                i,
                signal.direction,
                signal.entry,
                exit_price,
                exit_reason,
                gross_pnl - fees
            );

            trades.push(TradeRecord {
                entry_time: now,
                exit_time: ltf[exit_index].close_time(),
                direction: signal.direction,
                entry_price: signal.entry,
                exit_price,
                stop: signal.stop,
                target: signal.target,
                quantity: plan.quantity,
                notional: plan.notional,
                risk_budget: plan.risk_budget,
                rr: signal.rr,
                gross_pnl,
                fees,
                net_pnl: gross_pnl - fees,
                exit_reason,
                bars_held: exit_index - i,
                session: params.sessions.resolve(now).map(|(session, _)| session),
            });

            // No new entry until the trade is closed
            i = exit_index + 1;
        }

        let metrics = BacktestMetrics::from_trades(trades, self.risk.balance);

        tracing::info!(
            "Backtest complete: {} trades, net ${:.4}",
            metrics.total_trades,
            metrics.net_pnl
        );

        Ok(metrics)
    }
}

/// Walk forward from the bar after `entry_index`. The stop is checked before
/// the target when a single bar spans both.
pub fn simulate_exit(
    candles: &[Candle],
    entry_index: usize,
    direction: Direction,
    stop: f64,
    target: f64,
) -> (usize, f64, ExitReason) {
    for (j, candle) in candles.iter().enumerate().skip(entry_index + 1) {
        match direction {
            Direction::Long => {
                if candle.low <= stop {
                    return (j, stop, ExitReason::StopHit);
                }
                if candle.high >= target {
                    return (j, target, ExitReason::TargetHit);
                }
            }
            Direction::Short => {
                if candle.high >= stop {
                    return (j, stop, ExitReason::StopHit);
                }
                if candle.low <= target {
                    return (j, target, ExitReason::TargetHit);
                }
            }
        }
    }

    let last = candles.len() - 1;
    (last, candles[last].close, ExitReason::EndOfData)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::synthetic::{MarketScenario, SyntheticDataGenerator};
    use crate::models::{Profile, Timeframe};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn create_test_runner() -> BacktestRunner {
        BacktestRunner::new(
            StrategyParams::for_profile(Profile::Ltf5m, "SYNTH"),
            RiskSettings::default(),
            VenueKind::IntegerContract,
        )
    }

    fn bar(i: i64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: start() + Duration::minutes(5 * i),
            open: close,
            high,
            low,
            close,
            volume: 1.0,
            timeframe: Timeframe::M5,
        }
    }

    #[test]
    fn test_stop_checked_before_target() {
        let candles = vec![bar(0, 100.0, 100.0, 100.0), bar(1, 105.0, 97.0, 101.0)];
        let (index, price, reason) = simulate_exit(&candles, 0, Direction::Long, 98.0, 104.0);

        assert_eq!(index, 1);
        assert_eq!(price, 98.0);
        assert_eq!(reason, ExitReason::StopHit);
    }

    #[test]
    fn test_short_target_hit() {
        let candles = vec![
            bar(0, 100.0, 100.0, 100.0),
            bar(1, 100.5, 99.0, 99.5),
            bar(2, 99.8, 95.5, 96.0),
        ];
        let (index, price, reason) = simulate_exit(&candles, 0, Direction::Short, 101.0, 96.0);

        assert_eq!(index, 2);
        assert_eq!(price, 96.0);
        assert_eq!(reason, ExitReason::TargetHit);
    }

    #[test]
    fn test_end_of_data_exit() {
        let candles = vec![bar(0, 100.0, 100.0, 100.0), bar(1, 100.5, 99.5, 100.2)];
        let (index, price, reason) = simulate_exit(&candles, 0, Direction::Long, 98.0, 104.0);

        assert_eq!(index, 1);
        assert_eq!(price, 100.2);
        assert_eq!(reason, ExitReason::EndOfData);
    }

    #[test]
    fn test_backtest_swing_series() {
        tracing_subscriber::fmt()
            .with_env_filter("swingbot=debug")
            .try_init()
            .ok();

        let mut gen = SyntheticDataGenerator::new(42);
        let candles = gen.generate(MarketScenario::SwingUp, 2_000, Timeframe::M5, start());

        let metrics = create_test_runner().run(&candles).unwrap();
        println!("Metrics: {:?}", metrics);

        assert_eq!(metrics.winning_trades + metrics.losing_trades, metrics.total_trades);
        for trade in &metrics.trades {
            assert!(trade.exit_time >= trade.entry_time);
            assert!((trade.net_pnl - (trade.gross_pnl - trade.fees)).abs() < 1e-9);
            assert!(trade.quantity >= 1.0);
        }
        // One position at a time
        for pair in metrics.trades.windows(2) {
            assert!(pair[1].entry_time > pair[0].exit_time);
        }
    }

    #[test]
    fn test_backtest_insufficient_data() {
        let mut gen = SyntheticDataGenerator::new(42);
        let candles = gen.generate(MarketScenario::Uptrend, 50, Timeframe::M5, start());

        assert!(create_test_runner().run(&candles).is_err());
    }
}
