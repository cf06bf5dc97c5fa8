// Bot runtime: one cycle at a time, operator commands at safe boundaries
pub mod commands;
pub mod scheduler;

pub use commands::{BotHandle, Command, Envelope};
pub use scheduler::{next_cycle_at, until};

use crate::alerts::{Alert, Notifier};
use crate::config::BotConfig;
use crate::data::{aggregate, validate_batch, CandleFeed};
use crate::db::Store;
use crate::error::{ConfigError, DataError, SizingError};
use crate::execution::controller::levels_are_consistent;
use crate::execution::{
    ControllerSettings, ControllerState, ExecutionGateway, PositionController, StatusReport,
};
use crate::models::{Candle, Profile};
use crate::persistence::{ControlSnapshot, RedisPersistence};
use crate::risk::{size_position, RiskSettings};
use crate::strategy::{Evaluation, NoSignalReason, Strategy, StructureStrategy};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;

/// What one cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Feed problem, no evaluation this cycle
    DataSkipped(DataError),
    /// Entries not allowed (position held, paused or halted)
    Holding(ControllerState),
    NoSignal(NoSignalReason),
    SizingRejected(SizingError),
    EntryBlocked(String),
    Submitted(ControllerState),
}

pub struct Bot {
    config: BotConfig,
    feed: Arc<dyn CandleFeed>,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    controller: PositionController,
    strategy: StructureStrategy,
    persistence: Option<RedisPersistence>,
    queued: Vec<Envelope>,
    last_close: Option<f64>,
    shutdown_requested: bool,
}

impl Bot {
    pub fn new(
        config: BotConfig,
        feed: Arc<dyn CandleFeed>,
        gateway: Arc<dyn ExecutionGateway>,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if gateway.venue() != config.venue {
            return Err(ConfigError::Invalid(format!(
                "gateway {} is a {} venue but config says {}",
                gateway.name(),
                gateway.venue(),
                config.venue
            )));
        }

        let strategy = StructureStrategy::new(config.strategy_params(config.profile)?);
        let controller = PositionController::new(
            gateway,
            Arc::clone(&store),
            Arc::clone(&notifier),
            config.retry_policy(),
            ControllerSettings {
                symbol: config.symbol.clone(),
                profile: config.profile,
                cost_percent: config.cost_percent(config.venue),
                confirm_max_cycles: config.confirm_max_cycles,
                degraded_after_errors: config.degraded_after_errors,
            },
        );

        Ok(Self {
            config,
            feed,
            store,
            notifier,
            controller,
            strategy,
            persistence: None,
            queued: Vec::new(),
            last_close: None,
            shutdown_requested: false,
        })
    }

    pub fn with_persistence(mut self, persistence: RedisPersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn controller(&self) -> &PositionController {
        &self.controller
    }

    pub fn status(&self) -> StatusReport {
        self.controller.status()
    }

    /// True once the bot should leave its loop
    pub fn should_exit(&self) -> bool {
        self.shutdown_requested
            || (self.controller.stop_requested() && self.controller.state() == ControllerState::Idle)
    }

    // ========================================================================
    // Startup
    // ========================================================================

    /// Reload the last control snapshot, if any. The next reconcile verifies
    /// any restored position against the venue.
    pub async fn recover(&mut self) {
        let Some(persistence) = self.persistence.as_mut() else {
            return;
        };

        let snapshot = match persistence.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Could not load control snapshot: {}", e);
                return;
            }
        };
        self.apply_snapshot(snapshot).await;
    }

    pub async fn apply_snapshot(&mut self, snapshot: ControlSnapshot) {
        let mut state = snapshot.state;
        if let Some(slot) = &snapshot.slot {
            if slot.position.symbol != self.config.symbol || !levels_are_consistent(&slot.position) {
                tracing::error!("Restored position does not match this bot, halting entries");
                self.notifier
                    .notify(Alert::Critical(format!(
                        "Restored position {} {} failed sanity checks. Review before /resume.",
                        slot.position.direction, slot.position.symbol
                    )))
                    .await;
                state = ControllerState::ErrorPaused;
            }
        }

        // Config decides the profile unless a position is still tied to another one
        let profile = match &snapshot.slot {
            Some(slot) => slot.position.profile,
            None => self.config.profile,
        };
        if let Err(e) = self.rebuild_strategy(profile) {
            tracing::error!("Cannot rebuild strategy for restored profile {}: {}", profile, e);
            return;
        }

        let has_position = snapshot.slot.is_some();
        self.controller
            .restore(state, snapshot.paused, profile, snapshot.slot);

        if has_position {
            self.notifier
                .notify(Alert::Info(format!(
                    "Recovered open position after restart (state {})",
                    self.controller.state()
                )))
                .await;
        }
    }

    // ========================================================================
    // Cycle
    // ========================================================================

    /// fetch -> reconcile -> evaluate -> size -> submit -> persist
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        self.apply_queued().await;

        let outcome = self.cycle_inner(now).await;
        match &outcome {
            CycleOutcome::NoSignal(reason) => tracing::debug!("No signal: {}", reason),
            CycleOutcome::Holding(state) => tracing::debug!("Holding in state {}", state),
            other => tracing::info!("Cycle outcome: {:?}", other),
        }

        self.persist().await;
        outcome
    }

    async fn cycle_inner(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        let candles = self.fetch_candles(now).await;

        let (htf, ltf) = match candles {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!("⚠️ Data error, skipping evaluation: {}", e);
                self.controller.record_data_error(&e).await;
                // Reconciliation never depends on fresh candles
                self.controller.reconcile(self.last_close).await;
                return CycleOutcome::DataSkipped(e);
            }
        };

        self.controller.record_data_ok().await;
        self.last_close = ltf.last().map(|c| c.close);

        let state = self.controller.reconcile(self.last_close).await;
        if !self.controller.can_enter() || self.controller.stop_requested() {
            return CycleOutcome::Holding(state);
        }

        let signal = match self.strategy.evaluate(&htf, &ltf, now) {
            Evaluation::Signal(signal) => signal,
            Evaluation::NoSignal(reason) => return CycleOutcome::NoSignal(reason),
        };

        let settings = self.risk_settings();
        let plan = match size_position(&settings, self.controller.venue(), signal.entry, signal.stop) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!("Sizing rejected signal {}: {}", signal.id, e);
                return CycleOutcome::SizingRejected(e);
            }
        };

        tracing::info!(
            "📐 Sized {} {}: qty={} notional={:.4} margin={:.4}",
            signal.direction,
            signal.symbol,
            plan.quantity,
            plan.notional,
            plan.margin
        );

        match self.controller.submit(&signal, &plan).await {
            Ok(state) => CycleOutcome::Submitted(state),
            Err(e) => {
                tracing::warn!("Signal not submitted: {}", e);
                CycleOutcome::EntryBlocked(e.to_string())
            }
        }
    }

    /// Closed LTF bars plus HTF bars (fetched, or aggregated from LTF when the
    /// feed has no HTF series)
    async fn fetch_candles(&self, now: DateTime<Utc>) -> Result<(Vec<Candle>, Vec<Candle>), DataError> {
        let profile = self.controller.profile();
        let (ltf_tf, htf_tf) = (profile.ltf(), profile.htf());
        let symbol = &self.config.symbol;
        let tolerance = self.config.stale_tolerance_bars;

        let batch = self.feed.fetch(symbol, ltf_tf, self.config.candle_limit).await?;
        let ltf = validate_batch(batch, ltf_tf, now, tolerance)?;

        let htf = match self.feed.fetch(symbol, htf_tf, self.config.candle_limit).await {
            Ok(batch) => validate_batch(batch, htf_tf, now, tolerance)?,
            Err(DataError::Unavailable(reason)) => {
                tracing::debug!("No {} series ({}), aggregating from {}", htf_tf, reason, ltf_tf);
                aggregate(&ltf, htf_tf)
            }
            Err(e) => return Err(e),
        };

        let needed = self.strategy.min_candles_required();
        if ltf.len() < needed {
            return Err(DataError::Insufficient {
                needed,
                got: ltf.len(),
            });
        }

        Ok((htf, ltf))
    }

    fn risk_settings(&self) -> RiskSettings {
        RiskSettings {
            balance: self.config.balance,
            leverage: self.config.leverage,
            risk_pct: self.config.risk_per_trade_percent,
            cost_percent: self.config.cost_percent(self.controller.venue()),
        }
    }

    fn rebuild_strategy(&mut self, profile: Profile) -> Result<(), ConfigError> {
        self.strategy = StructureStrategy::new(self.config.strategy_params(profile)?);
        Ok(())
    }

    async fn persist(&mut self) {
        let snapshot = ControlSnapshot {
            state: self.controller.state(),
            paused: self.controller.is_paused(),
            profile: self.controller.profile(),
            slot: self.controller.slot().cloned(),
            saved_at: Utc::now(),
        };
        if let Some(persistence) = self.persistence.as_mut() {
            if let Err(e) = persistence.save(&snapshot).await {
                tracing::warn!("Failed to save control snapshot: {}", e);
            }
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Apply immediate commands now and queue the rest for the next cycle start
    pub async fn handle(&mut self, envelope: Envelope) {
        if envelope.command.is_immediate() {
            self.apply(envelope).await;
        } else {
            tracing::info!("Queued {:?} for next cycle start", envelope.command);
            self.queued.push(envelope);
        }
    }

    async fn apply_queued(&mut self) {
        for envelope in std::mem::take(&mut self.queued) {
            self.apply(envelope).await;
        }
    }

    async fn apply(&mut self, envelope: Envelope) {
        let Envelope { command, reply } = envelope;
        tracing::info!("🎛 Command: {:?}", command);

        match command {
            Command::Pause => {
                self.controller.pause();
                self.notifier
                    .notify(Alert::Info("Paused. Open position is still monitored.".to_string()))
                    .await;
            }
            Command::Resume => {
                let state = self.controller.resume().await;
                self.notifier
                    .notify(Alert::Info(format!("Resumed (state {})", state)))
                    .await;
            }
            Command::Kill => {
                self.controller.kill(self.last_close).await;
            }
            Command::Shutdown => {
                self.shutdown_requested = true;
                self.notifier
                    .notify(Alert::Info(
                        "Shutting down after the current cycle. Open position left in place.".to_string(),
                    ))
                    .await;
            }
            Command::Status => {
                self.notifier.notify(Alert::Status(self.status())).await;
            }
            Command::Trades => match self.store.recent_exits(10).await {
                Ok(records) => self.notifier.notify(Alert::Trades(records)).await,
                Err(e) => {
                    tracing::error!("Failed to load trades: {}", e);
                    self.notifier
                        .notify(Alert::Error(format!("Could not load trades: {}", e)))
                        .await;
                }
            },
            Command::SwitchProfile(profile) => self.switch_profile(profile).await,
        }

        self.persist().await;
        if let Some(reply) = reply {
            let _ = reply.send(self.status());
        }
    }

    async fn switch_profile(&mut self, profile: Profile) {
        if let Err(e) = self.config.strategy_params(profile) {
            self.notifier
                .notify(Alert::Error(format!("Profile {} is misconfigured: {}", profile, e)))
                .await;
            return;
        }

        match self.controller.switch_profile(profile) {
            Ok(()) => {
                if let Err(e) = self.rebuild_strategy(profile) {
                    tracing::error!("Strategy rebuild failed: {}", e);
                    return;
                }
                self.notifier
                    .notify(Alert::Info(format!(
                        "Profile switched to {} (LTF {} / HTF {})",
                        profile,
                        profile.ltf(),
                        profile.htf()
                    )))
                    .await;
            }
            Err(e) => {
                self.notifier
                    .notify(Alert::Error(format!("Profile switch rejected: {}", e)))
                    .await;
            }
        }
    }

    // ========================================================================
    // Loop
    // ========================================================================

    /// Run until shutdown, Ctrl-C or a completed kill
    pub async fn run(mut self, mut commands: mpsc::Receiver<Envelope>) {
        let buffer = chrono::Duration::seconds(self.config.candle_close_buffer_seconds as i64);
        self.recover().await;

        self.notifier
            .notify(Alert::Info(format!(
                "Bot started: {} {} on {} ({:?})",
                self.config.symbol,
                self.controller.profile(),
                self.controller.venue(),
                self.config.environment
            )))
            .await;

        let mut commands_open = true;
        let mut wake = next_cycle_at(Utc::now(), self.controller.profile().ltf(), buffer);
        tracing::info!("⏰ First cycle at {}", wake.format("%H:%M:%S"));

        loop {
            let sleep = tokio::time::sleep(until(Utc::now(), wake));

            tokio::select! {
                _ = sleep => {
                    tracing::info!("🔄 Cycle at {}", Utc::now().format("%H:%M:%S"));
                    self.run_cycle(Utc::now()).await;
                    wake = next_cycle_at(Utc::now(), self.controller.profile().ltf(), buffer);
                }
                received = commands.recv(), if commands_open => match received {
                    Some(envelope) => self.handle(envelope).await,
                    None => {
                        tracing::warn!("Command channel closed, continuing without operator commands");
                        commands_open = false;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("⚠️  Received Ctrl+C, shutting down...");
                    self.shutdown_requested = true;
                }
            }

            if self.should_exit() {
                break;
            }
        }

        self.persist().await;
        self.notifier
            .notify(Alert::Info(format!("Bot stopped (state {})", self.controller.state())))
            .await;
        tracing::info!("👋 Bot stopped");
    }
}
