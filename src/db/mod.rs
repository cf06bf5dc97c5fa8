// Append-only audit trail: sizing reports, exit records, events
pub mod postgres;

pub use postgres::PostgresStore;

use crate::error::StoreError;
use crate::models::{Position, SizingPlan};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopHit,
    TargetHit,
    ManualKill,
    EndOfData,
    Unknown,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopHit => "stop_hit",
            ExitReason::TargetHit => "target_hit",
            ExitReason::ManualKill => "manual_kill",
            ExitReason::EndOfData => "end_of_data",
            ExitReason::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop_hit" => Ok(ExitReason::StopHit),
            "target_hit" => Ok(ExitReason::TargetHit),
            "manual_kill" => Ok(ExitReason::ManualKill),
            "end_of_data" => Ok(ExitReason::EndOfData),
            "unknown" => Ok(ExitReason::Unknown),
            other => Err(format!("unknown exit reason: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Info => "INFO",
            EventLevel::Warning => "WARNING",
            EventLevel::Error => "ERROR",
            EventLevel::Critical => "CRITICAL",
        }
    }
}

/// Written once when a position is confirmed open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingReport {
    pub signal_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub position: Position,
    pub plan: SizingPlan,
}

/// Written once when a position is confirmed closed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitRecord {
    pub signal_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub position: Position,
    pub plan: SizingPlan,
    pub exit_price: f64,
    pub pnl: f64,
    pub fees: f64,
    pub exit_reason: ExitReason,
    pub status: String,
}

impl ExitRecord {
    pub fn net_pnl(&self) -> f64 {
        self.pnl - self.fees
    }
}

/// Retry, reconciliation anomaly or lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub recorded_at: DateTime<Utc>,
    pub level: EventLevel,
    pub kind: String,
    pub message: String,
    pub context: serde_json::Value,
}

impl EventRecord {
    pub fn new(level: EventLevel, kind: &str, message: impl Into<String>) -> Self {
        Self {
            recorded_at: Utc::now(),
            level,
            kind: kind.to_string(),
            message: message.into(),
            context: serde_json::Value::Null,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

/// Append-only record sink
#[async_trait]
pub trait Store: Send + Sync {
    async fn record_sizing(&self, report: &SizingReport) -> Result<(), StoreError>;

    async fn record_exit(&self, record: &ExitRecord) -> Result<(), StoreError>;

    async fn record_event(&self, event: &EventRecord) -> Result<(), StoreError>;

    /// Most recent exits, newest first
    async fn recent_exits(&self, limit: usize) -> Result<Vec<ExitRecord>, StoreError>;
}

/// In-process store for paper mode and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    sizing: RwLock<Vec<SizingReport>>,
    exits: RwLock<Vec<ExitRecord>>,
    events: RwLock<Vec<EventRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sizing_reports(&self) -> Vec<SizingReport> {
        self.sizing.read().await.clone()
    }

    pub async fn exits(&self) -> Vec<ExitRecord> {
        self.exits.read().await.clone()
    }

    pub async fn events(&self) -> Vec<EventRecord> {
        self.events.read().await.clone()
    }

    pub async fn events_of_kind(&self, kind: &str) -> Vec<EventRecord> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn record_sizing(&self, report: &SizingReport) -> Result<(), StoreError> {
        self.sizing.write().await.push(report.clone());
        Ok(())
    }

    async fn record_exit(&self, record: &ExitRecord) -> Result<(), StoreError> {
        self.exits.write().await.push(record.clone());
        Ok(())
    }

    async fn record_event(&self, event: &EventRecord) -> Result<(), StoreError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn recent_exits(&self, limit: usize) -> Result<Vec<ExitRecord>, StoreError> {
        Ok(self.exits.read().await.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, Profile, VenueKind};

    fn sample_exit(pnl: f64) -> ExitRecord {
        ExitRecord {
            signal_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            position: Position {
                venue: VenueKind::IntegerContract,
                symbol: "ADAUSDT".to_string(),
                direction: Direction::Long,
                entry: 100.0,
                stop: 98.0,
                target: 104.0,
                quantity: 30.0,
                order_id: "1".to_string(),
                opened_at: Utc::now(),
                profile: Profile::Ltf5m,
            },
            plan: SizingPlan {
                balance: 1000.0,
                leverage: 3.0,
                risk_pct: 2.0,
                risk_budget: 60.0,
                quantity: 30.0,
                notional: 3000.0,
                margin: 1000.0,
                estimated_cost: 1.2,
            },
            exit_price: 104.0,
            pnl,
            fees: 1.0,
            exit_reason: ExitReason::TargetHit,
            status: "closed".to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_recent_exits_newest_first() {
        let store = MemoryStore::new();
        store.record_exit(&sample_exit(1.0)).await.unwrap();
        store.record_exit(&sample_exit(2.0)).await.unwrap();
        store.record_exit(&sample_exit(3.0)).await.unwrap();

        let recent = store.recent_exits(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].pnl, 3.0);
        assert_eq!(recent[1].pnl, 2.0);
    }

    #[tokio::test]
    async fn test_events_by_kind() {
        let store = MemoryStore::new();
        store
            .record_event(&EventRecord::new(EventLevel::Warning, "retry", "timeout"))
            .await
            .unwrap();
        store
            .record_event(&EventRecord::new(EventLevel::Critical, "unprotected", "stop failed"))
            .await
            .unwrap();

        assert_eq!(store.events_of_kind("retry").await.len(), 1);
        assert_eq!(store.events().await.len(), 2);
    }

    #[test]
    fn test_exit_reason_round_trip_names() {
        assert_eq!("stop_hit".parse::<ExitReason>().unwrap(), ExitReason::StopHit);
        assert_eq!(ExitReason::ManualKill.to_string(), "manual_kill");
        assert_eq!(sample_exit(10.0).net_pnl(), 9.0);
    }
}
