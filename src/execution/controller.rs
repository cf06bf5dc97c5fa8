//! Position lifecycle controller.
//!
//! Owns the single position slot and the IDLE / PENDING_ENTRY / OPEN /
//! CLOSING / ERROR_PAUSED state machine. Venue position queries are the only
//! source of truth: a position is never reported closed until a query returns
//! flat, and an order ack is never taken as a fill.

use super::gateway::{
    ExecutionGateway, OrderHandle, OrderRequest, OrderStatus, OrderType, VenuePosition,
};
use super::retry::{RetryPolicy, RetryReport};
use crate::alerts::{Alert, Notifier};
use crate::db::{EventLevel, EventRecord, ExitReason, ExitRecord, SizingReport, Store};
use crate::error::{DataError, GatewayError};
use crate::models::{Direction, Position, Profile, Side, Signal, SizingPlan, VenueKind};
use anyhow::bail;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerState {
    Idle,
    PendingEntry,
    Open,
    Closing,
    ErrorPaused,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControllerState::Idle => "IDLE",
            ControllerState::PendingEntry => "PENDING_ENTRY",
            ControllerState::Open => "OPEN",
            ControllerState::Closing => "CLOSING",
            ControllerState::ErrorPaused => "ERROR_PAUSED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtectiveOrders {
    pub stop_order_id: Option<String>,
    pub target_order_id: Option<String>,
}

/// The one position the bot may hold, with its sizing and venue orders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenSlot {
    pub signal_id: Uuid,
    pub position: Position,
    pub plan: SizingPlan,
    pub rr: f64,
    pub protection: ProtectiveOrders,
    /// A position query has shown the entry filled
    pub confirmed: bool,
}

/// Operator-facing snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: ControllerState,
    pub paused: bool,
    pub profile: Profile,
    pub venue: VenueKind,
    pub symbol: String,
    pub position: Option<Position>,
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub symbol: String,
    pub profile: Profile,
    /// Venue cost percent applied to exit notional
    pub cost_percent: f64,
    pub confirm_max_cycles: u32,
    /// Consecutive data errors that raise the degraded alert (>= 1)
    pub degraded_after_errors: u32,
}

enum ExitCause {
    Reconciled { last_close: Option<f64> },
    Kill { fill_price: Option<f64>, last_close: Option<f64> },
}

pub struct PositionController {
    gateway: Arc<dyn ExecutionGateway>,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    settings: ControllerSettings,
    state: ControllerState,
    paused: bool,
    slot: Option<OpenSlot>,
    confirm_cycles: u32,
    kill_fill_price: Option<f64>,
    consecutive_data_errors: u32,
    stop_requested: bool,
}

impl PositionController {
    pub fn new(
        gateway: Arc<dyn ExecutionGateway>,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        retry: RetryPolicy,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            gateway,
            store,
            notifier,
            retry,
            settings,
            state: ControllerState::Idle,
            paused: false,
            slot: None,
            confirm_cycles: 0,
            kill_fill_price: None,
            consecutive_data_errors: 0,
            stop_requested: false,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn profile(&self) -> Profile {
        self.settings.profile
    }

    pub fn venue(&self) -> VenueKind {
        self.gateway.venue()
    }

    pub fn position(&self) -> Option<&Position> {
        self.slot.as_ref().map(|s| &s.position)
    }

    pub fn slot(&self) -> Option<&OpenSlot> {
        self.slot.as_ref()
    }

    /// Set by a successful kill; the scheduler exits once flat
    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// New entries allowed this cycle
    pub fn can_enter(&self) -> bool {
        self.state == ControllerState::Idle && !self.paused && self.slot.is_none()
    }

    /// A position is believed to exist (or be in flight)
    pub fn has_position(&self) -> bool {
        self.slot.is_some()
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            state: self.state,
            paused: self.paused,
            profile: self.settings.profile,
            venue: self.gateway.venue(),
            symbol: self.settings.symbol.clone(),
            position: self.position().cloned(),
        }
    }

    // ========================================================================
    // Operator commands
    // ========================================================================

    pub fn pause(&mut self) {
        self.paused = true;
        tracing::info!("⏸ Paused: no new entries, open position still reconciled");
    }

    /// Clear a pause or an ERROR_PAUSED halt
    pub async fn resume(&mut self) -> ControllerState {
        self.paused = false;
        if self.state != ControllerState::ErrorPaused {
            return self.state;
        }

        self.confirm_cycles = 0;
        let (confirmed, protected) = match &self.slot {
            Some(slot) => (slot.confirmed, slot.protection.stop_order_id.is_some()),
            None => {
                self.transition(ControllerState::Idle);
                return self.state;
            }
        };

        if !confirmed {
            self.transition(ControllerState::PendingEntry);
        } else if !protected {
            tracing::warn!("Resuming with an unprotected position, placing stop");
            self.protect().await;
        } else {
            self.transition(ControllerState::Open);
        }

        self.state
    }

    /// Switch strategy profile. Only allowed while flat.
    pub fn switch_profile(&mut self, profile: Profile) -> anyhow::Result<()> {
        if self.slot.is_some() || self.state != ControllerState::Idle {
            bail!(
                "cannot switch profile in state {} with {} position",
                self.state,
                if self.slot.is_some() { "an open" } else { "no" }
            );
        }
        self.settings.profile = profile;
        tracing::info!("Profile switched to {}", profile);
        Ok(())
    }

    // ========================================================================
    // Data health
    // ========================================================================

    pub async fn record_data_error(&mut self, error: &DataError) {
        self.consecutive_data_errors += 1;
        self.event(EventLevel::Warning, "data_error", error.to_string()).await;

        if self.consecutive_data_errors == self.settings.degraded_after_errors {
            tracing::warn!(
                "Degraded: {} consecutive data errors",
                self.consecutive_data_errors
            );
            self.notifier
                .notify(Alert::Degraded {
                    consecutive_errors: self.consecutive_data_errors,
                    last_error: error.to_string(),
                })
                .await;
        }
    }

    pub async fn record_data_ok(&mut self) {
        if self.consecutive_data_errors >= self.settings.degraded_after_errors
            && self.settings.degraded_after_errors > 0
        {
            self.notifier
                .notify(Alert::Info("Candle feed recovered".to_string()))
                .await;
        }
        self.consecutive_data_errors = 0;
    }

    // ========================================================================
    // Entry
    // ========================================================================

    /// Accept a sized signal and drive it towards OPEN.
    ///
    /// Returns the state reached. Errors only when the controller is not in a
    /// position to take the signal at all.
    pub async fn submit(&mut self, signal: &Signal, plan: &SizingPlan) -> anyhow::Result<ControllerState> {
        if self.state != ControllerState::Idle {
            bail!("entry blocked: state is {}", self.state);
        }
        if self.paused {
            bail!("entry blocked: paused");
        }
        if self.slot.is_some() {
            bail!("entry blocked: a position already exists");
        }
        if signal.profile != self.settings.profile {
            bail!(
                "entry blocked: signal from profile {} but active profile is {}",
                signal.profile,
                self.settings.profile
            );
        }
        if signal.symbol != self.settings.symbol {
            bail!("entry blocked: signal symbol {} is not {}", signal.symbol, self.settings.symbol);
        }

        // Untracked exposure on the venue means local belief is wrong
        let report = self.query_with_retry("pre_entry_query").await;
        match report {
            Ok(venue) if !venue.is_flat() => {
                let message = format!(
                    "Venue reports an untracked {} position (size {}) before entry",
                    self.settings.symbol,
                    venue.size()
                );
                self.critical("untracked_position", message).await;
                self.transition(ControllerState::ErrorPaused);
                return Ok(self.state);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Pre-entry position query failed, skipping entry: {}", e);
                self.event(EventLevel::Error, "entry_skipped", e.to_string()).await;
                return Ok(self.state);
            }
        }

        self.transition(ControllerState::PendingEntry);

        let order = OrderRequest::market(
            &self.settings.symbol,
            signal.direction.entry_side(),
            plan.quantity,
        );
        let report = self.place_with_retry("entry", order).await;

        let handle = match report {
            Ok(handle) => handle,
            Err(e) => {
                let message = format!("Entry order failed ({}): {}", e.kind(), e);
                tracing::error!("{}", message);
                self.event(EventLevel::Error, "entry_failed", message.clone()).await;
                self.notifier.notify(Alert::Error(message)).await;

                // Transport exhaustion fails this cycle only; a rejection or
                // mapping problem halts entries until the operator resumes
                if e.is_retryable() {
                    self.transition(ControllerState::Idle);
                } else {
                    self.transition(ControllerState::ErrorPaused);
                }
                return Ok(self.state);
            }
        };

        tracing::info!(
            "Entry order acknowledged: id={} {} {} x {}",
            handle.order_id,
            signal.direction,
            signal.symbol,
            plan.quantity
        );

        self.slot = Some(OpenSlot {
            signal_id: signal.id,
            position: Position {
                venue: self.gateway.venue(),
                symbol: signal.symbol.clone(),
                direction: signal.direction,
                entry: handle.fill_price.unwrap_or(signal.entry),
                stop: signal.stop,
                target: signal.target,
                quantity: plan.quantity,
                order_id: handle.order_id,
                opened_at: Utc::now(),
                profile: signal.profile,
            },
            plan: plan.clone(),
            rr: signal.rr,
            protection: ProtectiveOrders::default(),
            confirmed: false,
        });
        self.confirm_cycles = 0;

        self.confirm_entry().await;
        Ok(self.state)
    }

    /// PENDING_ENTRY: wait for the venue to show the fill, then protect it
    async fn confirm_entry(&mut self) {
        let report = self.query_with_retry("confirm_entry").await;
        self.confirm_cycles += 1;

        match report {
            Ok(VenuePosition::Open { size, entry, side }) if size > 0.0 => {
                if let Some(message) = self.side_mismatch(side) {
                    self.critical("side_mismatch", message).await;
                    self.transition(ControllerState::ErrorPaused);
                    return;
                }
                let planned = self.slot.as_ref().map_or(size, |s| s.position.quantity);
                if (size - planned).abs() > 1e-9 {
                    tracing::warn!("Filled size {} differs from planned {}", size, planned);
                    self.event(
                        EventLevel::Warning,
                        "size_mismatch",
                        format!("planned {} filled {}", planned, size),
                    )
                    .await;
                }
                if let Some(slot) = self.slot.as_mut() {
                    slot.position.quantity = size;
                    slot.position.entry = entry;
                    slot.confirmed = true;
                }
                self.record_sizing_report().await;
                self.protect().await;
                return;
            }
            Ok(_) => {
                tracing::info!(
                    "Entry not yet visible on venue ({}/{})",
                    self.confirm_cycles,
                    self.settings.confirm_max_cycles
                );
            }
            Err(e) => {
                self.event(
                    EventLevel::Warning,
                    "confirm_query_failed",
                    format!("entry confirmation query failed: {}", e),
                )
                .await;
            }
        }

        if self.confirm_cycles >= self.settings.confirm_max_cycles {
            let order_id = self.slot.as_ref().map(|s| s.position.order_id.clone());
            if let Some(order_id) = order_id {
                if let Err(e) = self.gateway.cancel(&self.settings.symbol, &order_id).await {
                    tracing::warn!("Could not cancel unconfirmed entry {}: {}", order_id, e);
                }
            }
            self.critical(
                "entry_unconfirmed",
                format!(
                    "Entry not confirmed after {} cycles, entries halted",
                    self.confirm_cycles
                ),
            )
            .await;
            self.transition(ControllerState::ErrorPaused);
        }
    }

    /// Place the protective stop (never retried) and the take-profit
    async fn protect(&mut self) {
        let Some(slot) = self.slot.as_ref() else {
            return;
        };
        let position = slot.position.clone();
        let exit_side = position.direction.exit_side();

        let stop_order = OrderRequest {
            order_type: OrderType::Stop { trigger: position.stop },
            ..OrderRequest::market(&position.symbol, exit_side, position.quantity).reduce_only()
        };

        let stop_id = match self.gateway.place(&stop_order).await {
            Ok(handle) => handle.order_id,
            Err(e) => {
                let message = format!(
                    "STOP PLACEMENT FAILED for {} {} ({}): {}\nPosition is UNPROTECTED. Manual action required. Entries halted.",
                    position.symbol,
                    position.direction.as_str().to_uppercase(),
                    e.kind(),
                    e
                );
                self.critical("stop_placement_failed", message).await;
                self.transition(ControllerState::ErrorPaused);
                return;
            }
        };
        tracing::info!("Stop order placed: id={} trigger={}", stop_id, position.stop);

        let target_order = OrderRequest {
            order_type: OrderType::Limit { price: position.target },
            ..OrderRequest::market(&position.symbol, exit_side, position.quantity).reduce_only()
        };
        let target_id = match self.place_with_retry("take_profit", target_order).await {
            Ok(handle) => Some(handle.order_id),
            Err(e) => {
                let message = format!("Take-profit order failed (stop is active): {}", e);
                tracing::warn!("{}", message);
                self.event(EventLevel::Warning, "take_profit_failed", message.clone()).await;
                self.notifier.notify(Alert::Error(message)).await;
                None
            }
        };

        let Some(slot) = self.slot.as_mut() else {
            return;
        };
        slot.protection = ProtectiveOrders {
            stop_order_id: Some(stop_id),
            target_order_id: target_id,
        };
        let slot = slot.clone();
        self.transition(ControllerState::Open);

        self.event(
            EventLevel::Info,
            "trade_opened",
            format!(
                "{} {} x {} @ {}",
                slot.position.direction, slot.position.symbol, slot.position.quantity, slot.position.entry
            ),
        )
        .await;

        self.notifier
            .notify(Alert::Entry {
                position: slot.position,
                plan: slot.plan,
                rr: slot.rr,
            })
            .await;
    }

    /// Written once per position, when the venue first shows the fill
    async fn record_sizing_report(&self) {
        let Some(slot) = self.slot.as_ref() else {
            return;
        };
        let report = SizingReport {
            signal_id: slot.signal_id,
            recorded_at: Utc::now(),
            position: slot.position.clone(),
            plan: slot.plan.clone(),
        };
        if let Err(e) = self.store.record_sizing(&report).await {
            tracing::error!("Failed to store sizing report: {}", e);
        }
    }

    /// Venue holds the opposite side of what the slot believes
    fn side_mismatch(&self, side: Side) -> Option<String> {
        let slot = self.slot.as_ref()?;
        let expected = slot.position.direction.entry_side();
        (side != expected).then(|| {
            format!(
                "Venue reports a {:?} position on {} but local {} expects {:?}. Entries halted.",
                side, slot.position.symbol, slot.position.direction, expected
            )
        })
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Per-cycle resync against the venue. Runs whenever a position is
    /// believed to exist, independent of signal evaluation.
    pub async fn reconcile(&mut self, last_close: Option<f64>) -> ControllerState {
        match self.state {
            ControllerState::Idle => {}
            ControllerState::PendingEntry => self.confirm_entry().await,
            ControllerState::Open => self.reconcile_open(last_close).await,
            ControllerState::Closing => self.confirm_close(last_close).await,
            ControllerState::ErrorPaused => self.reconcile_paused(last_close).await,
        }
        self.state
    }

    async fn reconcile_open(&mut self, last_close: Option<f64>) {
        let Some(expected) = self.slot.as_ref().map(|s| s.position.quantity) else {
            // OPEN without a slot cannot happen through the transition functions
            self.transition(ControllerState::Idle);
            return;
        };

        match self.query_with_retry("reconcile").await {
            Err(e) => {
                tracing::warn!("Reconcile: position query failed, treating as missed cycle: {}", e);
                self.event(
                    EventLevel::Warning,
                    "reconcile_skip",
                    format!("position query failed: {}", e),
                )
                .await;
            }
            Ok(VenuePosition::Open { size, side, .. }) if size > 0.0 => {
                if let Some(message) = self.side_mismatch(side) {
                    self.critical("side_mismatch", message).await;
                    self.transition(ControllerState::ErrorPaused);
                    return;
                }
                if (size - expected).abs() > 1e-9 {
                    self.event(
                        EventLevel::Warning,
                        "size_mismatch",
                        format!("local {} venue {}", expected, size),
                    )
                    .await;
                }
                tracing::debug!("Reconcile: position still open size={}", size);
            }
            Ok(_) => {
                tracing::info!("Reconcile: venue is flat, closing out position");
                self.finalize_exit(ExitCause::Reconciled { last_close }).await;
            }
        }
    }

    /// ERROR_PAUSED: keep watching the venue so a manual close is recorded
    async fn reconcile_paused(&mut self, last_close: Option<f64>) {
        let Some(confirmed) = self.slot.as_ref().map(|s| s.confirmed) else {
            return;
        };

        match self.query_with_retry("reconcile").await {
            Err(e) => {
                self.event(
                    EventLevel::Warning,
                    "reconcile_skip",
                    format!("position query failed: {}", e),
                )
                .await;
            }
            Ok(venue) if venue.is_flat() => {
                if confirmed {
                    self.finalize_exit(ExitCause::Reconciled { last_close }).await;
                }
            }
            Ok(venue) => {
                if !confirmed {
                    if let VenuePosition::Open { side, .. } = &venue {
                        if let Some(message) = self.side_mismatch(*side) {
                            tracing::warn!("Paused with a mismatched venue position: {}", message);
                            return;
                        }
                    }
                    if let Some(slot) = self.slot.as_mut() {
                        slot.confirmed = true;
                        slot.position.quantity = venue.size();
                    }
                    self.record_sizing_report().await;
                    self.critical(
                        "late_fill",
                        format!(
                            "Entry filled after confirmation timeout (size {}). Position has no stop; /resume to protect it.",
                            venue.size()
                        ),
                    )
                    .await;
                }
            }
        }
    }

    async fn confirm_close(&mut self, last_close: Option<f64>) {
        match self.query_with_retry("confirm_close").await {
            Ok(venue) if venue.is_flat() => {
                let fill_price = self.kill_fill_price.take();
                self.finalize_exit(ExitCause::Kill { fill_price, last_close }).await;
            }
            Ok(venue) => {
                self.confirm_cycles += 1;
                tracing::warn!(
                    "Close not yet confirmed, venue size {} ({}/{})",
                    venue.size(),
                    self.confirm_cycles,
                    self.settings.confirm_max_cycles
                );
                if self.confirm_cycles >= self.settings.confirm_max_cycles {
                    self.critical(
                        "close_unconfirmed",
                        format!("Close not confirmed after {} cycles", self.confirm_cycles),
                    )
                    .await;
                    self.stop_requested = false;
                    self.transition(ControllerState::ErrorPaused);
                }
            }
            Err(e) => {
                self.event(
                    EventLevel::Warning,
                    "reconcile_skip",
                    format!("close confirmation query failed: {}", e),
                )
                .await;
            }
        }
    }

    /// Record the exit of a venue-confirmed flat position and clear the slot
    async fn finalize_exit(&mut self, cause: ExitCause) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        let position = &slot.position;

        let (exit_price, exit_reason) = match cause {
            ExitCause::Kill { fill_price, last_close } => (
                fill_price.or(last_close).unwrap_or(position.entry),
                ExitReason::ManualKill,
            ),
            ExitCause::Reconciled { last_close } => self.attribute_exit(&slot, last_close).await,
        };

        let pnl = position.pnl_at(exit_price);
        let fees = exit_price * position.quantity * self.settings.cost_percent / 100.0;

        let record = ExitRecord {
            signal_id: slot.signal_id,
            recorded_at: Utc::now(),
            position: slot.position.clone(),
            plan: slot.plan.clone(),
            exit_price,
            pnl,
            fees,
            exit_reason,
            status: "closed".to_string(),
        };

        tracing::info!(
            "Position closed: {} {} exit={} reason={} pnl={:.4} fees={:.4}",
            position.direction,
            position.symbol,
            exit_price,
            exit_reason,
            pnl,
            fees
        );

        if let Err(e) = self.store.record_exit(&record).await {
            tracing::error!("Failed to store exit record: {}", e);
        }
        self.event(
            EventLevel::Info,
            "trade_closed",
            format!("{} net={:.4}", exit_reason, record.net_pnl()),
        )
        .await;
        self.notifier.notify(Alert::Closed { record }).await;

        self.confirm_cycles = 0;
        if self.state != ControllerState::ErrorPaused {
            self.transition(ControllerState::Idle);
        }
    }

    /// Exit price and reason from protective order status, falling back to
    /// the last close and whichever level it sits nearer
    async fn attribute_exit(&self, slot: &OpenSlot, last_close: Option<f64>) -> (f64, ExitReason) {
        let symbol = &self.settings.symbol;
        let stop_status = self.order_status(slot.protection.stop_order_id.as_deref()).await;
        let target_status = self.order_status(slot.protection.target_order_id.as_deref()).await;

        let filled = match (&stop_status, &target_status) {
            (Some(OrderStatus::Filled { price }), _) => Some((*price, ExitReason::StopHit)),
            (_, Some(OrderStatus::Filled { price })) => Some((*price, ExitReason::TargetHit)),
            _ => None,
        };

        // Cancel whatever is still resting
        for (id, status) in [
            (&slot.protection.stop_order_id, &stop_status),
            (&slot.protection.target_order_id, &target_status),
        ] {
            if let (Some(id), Some(OrderStatus::Open)) = (id, status) {
                match self.gateway.cancel(symbol, id).await {
                    Ok(()) => tracing::info!("Cancelled orphaned order {}", id),
                    Err(e) => tracing::warn!("Failed to cancel orphaned order {}: {}", id, e),
                }
            }
        }

        if let Some(attributed) = filled {
            return attributed;
        }

        let position = &slot.position;
        match last_close {
            Some(price) => {
                let reason = if (price - position.target).abs() < (price - position.stop).abs() {
                    ExitReason::TargetHit
                } else {
                    ExitReason::StopHit
                };
                tracing::warn!(
                    "Exit attribution fell back to last close {} ({})",
                    price,
                    reason
                );
                (price, reason)
            }
            None => (position.entry, ExitReason::Unknown),
        }
    }

    async fn order_status(&self, order_id: Option<&str>) -> Option<OrderStatus> {
        let order_id = order_id?;
        match self.gateway.order_status(&self.settings.symbol, order_id).await {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!("Order status query for {} failed: {}", order_id, e);
                None
            }
        }
    }

    // ========================================================================
    // Kill
    // ========================================================================

    /// Close now and stop. Applied immediately, not at a cycle boundary.
    pub async fn kill(&mut self, last_close: Option<f64>) -> ControllerState {
        self.stop_requested = true;

        let Some(slot) = self.slot.clone() else {
            tracing::info!("Kill: no local position");
            self.notifier
                .notify(Alert::Info("Kill: no open position. Stopping.".to_string()))
                .await;
            return self.state;
        };

        if self.state == ControllerState::Closing {
            tracing::info!("Kill: close already in flight");
            return self.state;
        }

        for id in [&slot.protection.stop_order_id, &slot.protection.target_order_id]
            .into_iter()
            .flatten()
        {
            if let Err(e) = self.gateway.cancel(&self.settings.symbol, id).await {
                tracing::warn!("Kill: failed to cancel order {}: {}", id, e);
            }
        }

        self.transition(ControllerState::Closing);
        self.confirm_cycles = 0;

        let close = OrderRequest::market(
            &slot.position.symbol,
            slot.position.direction.exit_side(),
            slot.position.quantity,
        )
        .reduce_only();

        match self.place_with_retry("kill_close", close).await {
            Ok(handle) => {
                tracing::info!("Kill: close order sent id={}", handle.order_id);
                self.kill_fill_price = handle.fill_price;
                self.confirm_close(last_close).await;
            }
            Err(e) => {
                self.critical(
                    "close_failed",
                    format!("Kill close order failed ({}): {}. Manual action required.", e.kind(), e),
                )
                .await;
                self.stop_requested = false;
                self.transition(ControllerState::ErrorPaused);
            }
        }

        self.state
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    /// Restore after a restart. Venue truth is re-checked on the next reconcile.
    pub fn restore(&mut self, state: ControllerState, paused: bool, profile: Profile, slot: Option<OpenSlot>) {
        self.paused = paused;
        self.settings.profile = profile;
        self.state = match (&slot, state) {
            (_, ControllerState::ErrorPaused) => ControllerState::ErrorPaused,
            (Some(s), _) if s.confirmed => ControllerState::Open,
            (Some(_), _) => ControllerState::PendingEntry,
            (None, _) => ControllerState::Idle,
        };
        self.slot = slot;
        tracing::info!("Restored controller state {} (paused={})", self.state, self.paused);
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn transition(&mut self, next: ControllerState) {
        if self.state != next {
            tracing::info!("State: {} -> {}", self.state, next);
            self.state = next;
        }
    }

    async fn event(&self, level: EventLevel, kind: &str, message: impl Into<String>) {
        let event = EventRecord::new(level, kind, message).with_context(serde_json::json!({
            "state": self.state,
            "symbol": self.settings.symbol,
            "profile": self.settings.profile,
        }));
        if let Err(e) = self.store.record_event(&event).await {
            tracing::error!("Failed to store {} event: {}", kind, e);
        }
    }

    async fn critical(&self, kind: &str, message: String) {
        tracing::error!("🚨 CRITICAL [{}]: {}", kind, message);
        self.event(EventLevel::Critical, kind, message.clone()).await;
        self.notifier.notify(Alert::Critical(message)).await;
    }

    async fn record_retries<T>(&self, label: &str, report: RetryReport<T>) -> Result<T, GatewayError> {
        for error in &report.retries {
            self.event(
                EventLevel::Warning,
                "retry",
                format!("{}: {}", label, error),
            )
            .await;
        }
        report.outcome
    }

    async fn place_with_retry(
        &self,
        label: &str,
        order: OrderRequest,
    ) -> Result<OrderHandle, GatewayError> {
        let gateway = Arc::clone(&self.gateway);
        let report = self
            .retry
            .run(label, || {
                let gateway = Arc::clone(&gateway);
                let order = order.clone();
                async move { gateway.place(&order).await }
            })
            .await;
        self.record_retries(label, report).await
    }

    async fn query_with_retry(&self, label: &str) -> Result<VenuePosition, GatewayError> {
        let gateway = Arc::clone(&self.gateway);
        let symbol = self.settings.symbol.clone();
        let report = self
            .retry
            .run(label, || {
                let gateway = Arc::clone(&gateway);
                let symbol = symbol.clone();
                async move { gateway.query_position(&symbol).await }
            })
            .await;
        self.record_retries(label, report).await
    }
}

impl fmt::Debug for PositionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PositionController")
            .field("state", &self.state)
            .field("paused", &self.paused)
            .field("profile", &self.settings.profile)
            .field("slot", &self.slot)
            .finish()
    }
}

/// Direction-aware sanity check used before accepting a restored slot
pub fn levels_are_consistent(position: &Position) -> bool {
    match position.direction {
        Direction::Long => position.stop < position.entry && position.entry < position.target,
        Direction::Short => position.target < position.entry && position.entry < position.stop,
    }
}
