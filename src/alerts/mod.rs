//! Operator alerts.
//!
//! Sending is best effort: `notify` logs failures and never returns them, so
//! alerting can never block a trading decision.

use crate::db::ExitRecord;
use crate::error::NotifyError;
use crate::execution::controller::StatusReport;
use crate::models::{Position, SizingPlan};
use async_trait::async_trait;
use std::fmt::Write as _;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    Entry {
        position: Position,
        plan: SizingPlan,
        rr: f64,
    },
    Closed {
        record: ExitRecord,
    },
    Error(String),
    Critical(String),
    Status(StatusReport),
    Trades(Vec<ExitRecord>),
    Degraded {
        consecutive_errors: u32,
        last_error: String,
    },
    Info(String),
}

impl Alert {
    /// Short template name, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Alert::Entry { .. } => "entry",
            Alert::Closed { .. } => "closed",
            Alert::Error(_) => "error",
            Alert::Critical(_) => "critical",
            Alert::Status(_) => "status",
            Alert::Trades(_) => "trades",
            Alert::Degraded { .. } => "degraded",
            Alert::Info(_) => "info",
        }
    }

    /// Telegram-flavoured HTML body
    pub fn render(&self) -> String {
        match self {
            Alert::Entry { position, plan, rr } => {
                let arrow = match position.direction {
                    crate::models::Direction::Long => "🟢 LONG",
                    crate::models::Direction::Short => "🔴 SHORT",
                };
                format!(
                    "<b>{} | {} | {}</b>\nVenue: <b>{}</b>\n\n\
                     Entry:    <code>{:.5}</code>\n\
                     SL:       <code>{:.5}</code>\n\
                     TP:       <code>{:.5}</code>\n\
                     RR:       <b>1:{:.1}</b>\n\n\
                     Qty:      <code>{}</code>\n\
                     Leverage: <code>{}x</code>\n\
                     Risk:     <code>${:.4}</code>\n\
                     Notional: <code>${:.4}</code>\n\
                     Margin:   <code>${:.4}</code>\n\
                     Est. Fee: <code>${:.4}</code>",
                    arrow,
                    position.symbol,
                    position.profile.as_str().to_uppercase(),
                    position.venue,
                    position.entry,
                    position.stop,
                    position.target,
                    rr,
                    position.quantity,
                    plan.leverage,
                    plan.risk_budget,
                    plan.notional,
                    plan.margin,
                    plan.estimated_cost,
                )
            }
            Alert::Closed { record } => {
                let net = record.net_pnl();
                let icon = if net >= 0.0 { "✅" } else { "❌" };
                format!(
                    "<b>{} CLOSED | {}</b>\n\
                     Direction:  <code>{}</code>\n\
                     Reason:     <code>{}</code>\n\n\
                     Entry:      <code>{:.5}</code>\n\
                     Exit:       <code>{:.5}</code>\n\n\
                     Gross PnL:  <code>${:.4}</code>\n\
                     Fees:       <code>${:.4}</code>\n\
                     Net PnL:    <b>${:.4}</b>",
                    icon,
                    record.position.symbol,
                    record.position.direction.as_str().to_uppercase(),
                    record.exit_reason,
                    record.position.entry,
                    record.exit_price,
                    record.pnl,
                    record.fees,
                    net,
                )
            }
            Alert::Error(message) => format!("⚠️ <b>ERROR</b>\n{}", message),
            Alert::Critical(message) => format!("🚨 <b>CRITICAL</b>\n{}", message),
            Alert::Status(status) => {
                let position = match &status.position {
                    Some(p) => format!(
                        "{} | qty={} | entry={:.5} | sl={:.5} | tp={:.5}",
                        p.direction.as_str().to_uppercase(),
                        p.quantity,
                        p.entry,
                        p.stop,
                        p.target
                    ),
                    None => "Flat (no open position)".to_string(),
                };
                format!(
                    "<b>📊 Bot Status</b>\n\
                     State:    <code>{}</code>\n\
                     Paused:   <code>{}</code>\n\
                     Profile:  <code>{}</code>\n\
                     Venue:    <code>{}</code>\n\
                     Symbol:   <code>{}</code>\n\n\
                     Position: {}",
                    status.state, status.paused, status.profile, status.venue, status.symbol, position
                )
            }
            Alert::Trades(records) => {
                if records.is_empty() {
                    return "No trades found.".to_string();
                }
                let mut out = String::from("<b>📋 Recent Trades</b>\n");
                for r in records {
                    let net = r.net_pnl();
                    let icon = if net >= 0.0 { "✅" } else { "❌" };
                    let _ = write!(
                        out,
                        "\n{} <code>{}</code> entry=<code>{:.5}</code> exit=<code>{:.5}</code> pnl=<b>${:.4}</b> [{}]",
                        icon,
                        r.position.direction.as_str().to_uppercase(),
                        r.position.entry,
                        r.exit_price,
                        net,
                        r.exit_reason
                    );
                }
                out
            }
            Alert::Degraded {
                consecutive_errors,
                last_error,
            } => format!(
                "⚠️ <b>DEGRADED</b>\n{} consecutive data errors, trading skipped.\nLast: {}",
                consecutive_errors, last_error
            ),
            Alert::Info(message) => format!("ℹ️ {}", message),
        }
    }
}

/// Outbound alert channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError>;

    /// Best-effort send: failures are logged and swallowed
    async fn notify(&self, alert: Alert) {
        if let Err(e) = self.send(&alert).await {
            tracing::error!("Failed to send {} alert: {}", alert.kind(), e);
        }
    }
}

/// Writes alerts to the log only
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        match alert {
            Alert::Critical(_) => tracing::error!("[ALERT] {}", alert.render()),
            Alert::Error(_) | Alert::Degraded { .. } => tracing::warn!("[ALERT] {}", alert.render()),
            _ => tracing::info!("[ALERT] {}", alert.render()),
        }
        Ok(())
    }
}

/// Keeps every alert in memory, for paper runs and tests
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: RwLock<Vec<Alert>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Alert> {
        self.sent.read().await.clone()
    }

    pub async fn count(&self, kind: &str) -> usize {
        self.sent.read().await.iter().filter(|a| a.kind() == kind).count()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.sent.write().await.push(alert.clone());
        Ok(())
    }
}
