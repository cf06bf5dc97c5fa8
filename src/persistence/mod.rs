use crate::execution::{ControllerState, OpenSlot};
use crate::models::Profile;
use crate::Result;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};

const CONTROL_KEY: &str = "swingbot:control";

/// Controller state kept across restarts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSnapshot {
    pub state: ControllerState,
    pub paused: bool,
    pub profile: Profile,
    pub slot: Option<OpenSlot>,
    pub saved_at: DateTime<Utc>,
}

impl ControlSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Redis-backed control snapshot
///
/// One JSON value under `swingbot:control`, overwritten after every cycle.
/// Venue truth still wins: a restored position is re-checked by the next
/// reconciliation.
pub struct RedisPersistence {
    conn: ConnectionManager,
    key: String,
}

impl RedisPersistence {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| "Redis connection timeout after 5 seconds")??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            conn,
            key: CONTROL_KEY.to_string(),
        })
    }

    /// Use a different key (tests, side-by-side paper runs)
    pub fn with_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    pub async fn save(&mut self, snapshot: &ControlSnapshot) -> Result<()> {
        let value = snapshot.to_json()?;
        self.conn.set::<_, _, ()>(&self.key, value).await?;
        tracing::debug!("Saved control snapshot ({})", snapshot.state);
        Ok(())
    }

    pub async fn load(&mut self) -> Result<Option<ControlSnapshot>> {
        let raw: Option<String> = self.conn.get(&self.key).await?;
        match raw {
            Some(raw) => {
                let snapshot = ControlSnapshot::from_json(&raw)?;
                tracing::info!(
                    "Loaded control snapshot: state={} position={}",
                    snapshot.state,
                    snapshot.slot.is_some()
                );
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    pub async fn clear(&mut self) -> Result<()> {
        self.conn.del::<_, ()>(&self.key).await?;
        Ok(())
    }
}
