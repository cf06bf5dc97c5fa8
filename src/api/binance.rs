use crate::data::{CandleBatch, CandleFeed};
use crate::error::DataError;
use crate::models::{Candle, MarketClass, Timeframe};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;

const BINANCE_FUTURES_API_BASE: &str = "https://fapi.binance.com";
const RATE_LIMIT_RPM: u32 = 600;
const MAX_LIMIT: usize = 1_500;

type KlineRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Public USD-M futures klines. Batches are always tagged futures-origin.
#[derive(Clone)]
pub struct BinanceFuturesFeed {
    client: Client,
    base_url: String,
    rate_limiter: Arc<KlineRateLimiter>,
}

impl BinanceFuturesFeed {
    pub fn new() -> Self {
        Self::with_base_url(BINANCE_FUTURES_API_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap_or(NonZeroU32::MIN));
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Klines from `start_ms` onwards, for backtest history
    pub async fn fetch_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start_ms: i64,
        limit: usize,
    ) -> Result<Vec<Candle>, DataError> {
        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&startTime={}&limit={}",
            self.base_url,
            symbol,
            timeframe.as_str(),
            start_ms,
            limit.min(MAX_LIMIT)
        );
        self.get_klines(&url, timeframe).await
    }

    async fn get_klines(&self, url: &str, timeframe: Timeframe) -> Result<Vec<Candle>, DataError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DataError::Unavailable(format!("klines request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::Unavailable(format!(
                "Binance futures API error ({}): {}",
                status, body
            )));
        }

        let rows: Vec<Vec<Value>> = response
            .json()
            .await
            .map_err(|e| DataError::Unavailable(format!("failed to parse klines: {}", e)))?;

        rows.iter()
            .enumerate()
            .map(|(i, row)| parse_kline(row, timeframe).ok_or(DataError::Malformed {
                index: i,
                reason: "unexpected kline layout".to_string(),
            }))
            .collect()
    }
}

impl Default for BinanceFuturesFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// `[open_time_ms, "open", "high", "low", "close", "volume", close_time_ms, ...]`
fn parse_kline(row: &[Value], timeframe: Timeframe) -> Option<Candle> {
    let number = |v: &Value| -> Option<f64> {
        match v {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    };

    let open_ms = row.first()?.as_i64()?;
    Some(Candle {
        open_time: Utc.timestamp_millis_opt(open_ms).single()?,
        open: number(row.get(1)?)?,
        high: number(row.get(2)?)?,
        low: number(row.get(3)?)?,
        close: number(row.get(4)?)?,
        volume: number(row.get(5)?)?,
        timeframe,
    })
}

#[async_trait]
impl CandleFeed for BinanceFuturesFeed {
    fn name(&self) -> &str {
        "binance_futures"
    }

    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<CandleBatch, DataError> {
        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol,
            timeframe.as_str(),
            limit.min(MAX_LIMIT)
        );

        let candles = self.get_klines(&url, timeframe).await?;
        tracing::debug!("Fetched {} {} klines for {}", candles.len(), timeframe, symbol);

        Ok(CandleBatch {
            market_class: MarketClass::Futures,
            candles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KLINES: &str = r#"[
        [1704103200000, "0.5900", "0.5950", "0.5880", "0.5930", "120000", 1704103499999, "0", 10, "0", "0", "0"],
        [1704103500000, "0.5930", "0.5990", "0.5920", "0.5980", "98000", 1704103799999, "0", 12, "0", "0", "0"]
    ]"#;

    #[tokio::test]
    async fn test_fetch_parses_klines() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/fapi/v1/klines")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("symbol".into(), "ADAUSDT".into()),
                mockito::Matcher::UrlEncoded("interval".into(), "5m".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(KLINES)
            .create_async()
            .await;

        let feed = BinanceFuturesFeed::with_base_url(&server.url());
        let batch = feed.fetch("ADAUSDT", Timeframe::M5, 2).await.unwrap();

        mock.assert_async().await;
        assert_eq!(batch.market_class, MarketClass::Futures);
        assert_eq!(batch.candles.len(), 2);
        assert_eq!(batch.candles[1].close, 0.598);
        assert_eq!(batch.candles[0].open_time.timestamp(), 1_704_103_200);
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/fapi/v1/klines")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let feed = BinanceFuturesFeed::with_base_url(&server.url());
        let err = feed.fetch("ADAUSDT", Timeframe::M5, 10).await.unwrap_err();
        assert!(matches!(err, DataError::Unavailable(_)));
    }

    #[test]
    fn test_parse_kline_rejects_short_rows() {
        let row: Vec<Value> = serde_json::from_str(r#"[1704103200000, "1.0"]"#).unwrap();
        assert!(parse_kline(&row, Timeframe::M5).is_none());
    }
}
