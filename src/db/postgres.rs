use super::{EventRecord, ExitReason, ExitRecord, SizingReport, Store};
use crate::error::StoreError;
use crate::models::{Direction, Position, Profile, SizingPlan, VenueKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

/// Postgres-backed audit store
pub struct PostgresStore {
    pool: PgPool,
}

fn parse_enum<T: serde::de::DeserializeOwned>(value: &str) -> Result<T, StoreError> {
    Ok(serde_json::from_value(serde_json::Value::String(value.to_string()))?)
}

impl PostgresStore {
    /// Connect and run migrations
    pub async fn new(database_url: &str) -> crate::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres audit store");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn record_sizing(&self, report: &SizingReport) -> Result<(), StoreError> {
        let p = &report.position;
        let plan = &report.plan;

        sqlx::query(
            r#"
            INSERT INTO sizing_reports (
                signal_id, recorded_at, venue, symbol, profile, direction,
                entry_price, stop_loss, take_profit, quantity, order_id, opened_at,
                balance, leverage, risk_pct, risk_budget, notional, margin, estimated_cost
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(report.signal_id)
        .bind(report.recorded_at)
        .bind(p.venue.to_string())
        .bind(&p.symbol)
        .bind(p.profile.as_str())
        .bind(p.direction.as_str())
        .bind(p.entry)
        .bind(p.stop)
        .bind(p.target)
        .bind(p.quantity)
        .bind(&p.order_id)
        .bind(p.opened_at)
        .bind(plan.balance)
        .bind(plan.leverage)
        .bind(plan.risk_pct)
        .bind(plan.risk_budget)
        .bind(plan.notional)
        .bind(plan.margin)
        .bind(plan.estimated_cost)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Saved sizing report for signal {}", report.signal_id);
        Ok(())
    }

    async fn record_exit(&self, record: &ExitRecord) -> Result<(), StoreError> {
        let p = &record.position;
        let plan = &record.plan;

        sqlx::query(
            r#"
            INSERT INTO exit_records (
                signal_id, recorded_at, venue, symbol, profile, direction,
                entry_price, stop_loss, take_profit, quantity, order_id, opened_at,
                balance, leverage, risk_pct, risk_budget, notional, margin, estimated_cost,
                exit_price, pnl, fees, exit_reason, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24)
            "#,
        )
        .bind(record.signal_id)
        .bind(record.recorded_at)
        .bind(p.venue.to_string())
        .bind(&p.symbol)
        .bind(p.profile.as_str())
        .bind(p.direction.as_str())
        .bind(p.entry)
        .bind(p.stop)
        .bind(p.target)
        .bind(p.quantity)
        .bind(&p.order_id)
        .bind(p.opened_at)
        .bind(plan.balance)
        .bind(plan.leverage)
        .bind(plan.risk_pct)
        .bind(plan.risk_budget)
        .bind(plan.notional)
        .bind(plan.margin)
        .bind(plan.estimated_cost)
        .bind(record.exit_price)
        .bind(record.pnl)
        .bind(record.fees)
        .bind(record.exit_reason.as_str())
        .bind(&record.status)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            "Saved exit record for signal {} ({})",
            record.signal_id,
            record.exit_reason
        );
        Ok(())
    }

    async fn record_event(&self, event: &EventRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO events (recorded_at, level, kind, message, context)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.recorded_at)
        .bind(event.level.as_str())
        .bind(&event.kind)
        .bind(&event.message)
        .bind(serde_json::to_string(&event.context)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_exits(&self, limit: usize) -> Result<Vec<ExitRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT signal_id, recorded_at, venue, symbol, profile, direction,
                   entry_price, stop_loss, take_profit, quantity, order_id, opened_at,
                   balance, leverage, risk_pct, risk_budget, notional, margin, estimated_cost,
                   exit_price, pnl, fees, exit_reason, status
            FROM exit_records
            ORDER BY recorded_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let venue: String = row.get("venue");
            let profile: String = row.get("profile");
            let direction: String = row.get("direction");
            let exit_reason: String = row.get("exit_reason");

            records.push(ExitRecord {
                signal_id: row.get::<Uuid, _>("signal_id"),
                recorded_at: row.get::<DateTime<Utc>, _>("recorded_at"),
                position: Position {
                    venue: parse_enum::<VenueKind>(&venue)?,
                    symbol: row.get("symbol"),
                    direction: parse_enum::<Direction>(&direction)?,
                    entry: row.get("entry_price"),
                    stop: row.get("stop_loss"),
                    target: row.get("take_profit"),
                    quantity: row.get("quantity"),
                    order_id: row.get("order_id"),
                    opened_at: row.get("opened_at"),
                    profile: parse_enum::<Profile>(&profile)?,
                },
                plan: SizingPlan {
                    balance: row.get("balance"),
                    leverage: row.get("leverage"),
                    risk_pct: row.get("risk_pct"),
                    risk_budget: row.get("risk_budget"),
                    quantity: row.get("quantity"),
                    notional: row.get("notional"),
                    margin: row.get("margin"),
                    estimated_cost: row.get("estimated_cost"),
                },
                exit_price: row.get("exit_price"),
                pnl: row.get("pnl"),
                fees: row.get("fees"),
                exit_reason: exit_reason.parse().unwrap_or(ExitReason::Unknown),
                status: row.get("status"),
            });
        }

        Ok(records)
    }
}
