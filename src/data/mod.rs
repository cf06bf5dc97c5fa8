// Candle series: feed contract, batch validation, HTF aggregation
pub mod aggregate;
pub mod validator;

pub use aggregate::aggregate;
pub use validator::{validate_batch, validate_candle};

use crate::error::DataError;
use crate::models::{Candle, MarketClass, Timeframe};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Candles as returned by a feed, tagged with where they came from
#[derive(Debug, Clone, PartialEq)]
pub struct CandleBatch {
    pub market_class: MarketClass,
    pub candles: Vec<Candle>,
}

/// Closed-bar OHLCV source
#[async_trait]
pub trait CandleFeed: Send + Sync {
    fn name(&self) -> &str;

    /// Most recent `limit` bars, oldest first. May include the forming bar.
    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<CandleBatch, DataError>;
}

/// Feed serving pre-loaded candles, for paper runs and tests
#[derive(Debug, Default)]
pub struct StaticFeed {
    market_class: Option<MarketClass>,
    series: RwLock<HashMap<Timeframe, Vec<Candle>>>,
}

impl StaticFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag every batch with a different market class
    pub fn with_market_class(mut self, class: MarketClass) -> Self {
        self.market_class = Some(class);
        self
    }

    pub async fn set(&self, timeframe: Timeframe, candles: Vec<Candle>) {
        self.series.write().await.insert(timeframe, candles);
    }
}

#[async_trait]
impl CandleFeed for StaticFeed {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(
        &self,
        _symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<CandleBatch, DataError> {
        let series = self.series.read().await;
        let candles = series
            .get(&timeframe)
            .ok_or_else(|| DataError::Unavailable(format!("no {} series loaded", timeframe)))?;

        let start = candles.len().saturating_sub(limit);
        Ok(CandleBatch {
            market_class: self.market_class.unwrap_or(MarketClass::Futures),
            candles: candles[start..].to_vec(),
        })
    }
}
