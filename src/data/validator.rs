use super::CandleBatch;
use crate::error::DataError;
use crate::models::{Candle, MarketClass, Timeframe};
use chrono::{DateTime, Utc};

/// Check a single bar for sane prices and OHLC relationships
pub fn validate_candle(candle: &Candle) -> Result<(), String> {
    for (name, value) in [
        ("open", candle.open),
        ("high", candle.high),
        ("low", candle.low),
        ("close", candle.close),
    ] {
        if !(value > 0.0) || !value.is_finite() {
            return Err(format!("invalid {} price: {}", name, value));
        }
    }
    if candle.volume < 0.0 {
        return Err(format!("invalid volume: {}", candle.volume));
    }
    if candle.high < candle.low {
        return Err(format!("high ({}) is less than low ({})", candle.high, candle.low));
    }
    if candle.high < candle.open.max(candle.close) {
        return Err(format!(
            "high ({}) is below the body ({} / {})",
            candle.high, candle.open, candle.close
        ));
    }
    if candle.low > candle.open.min(candle.close) {
        return Err(format!(
            "low ({}) is above the body ({} / {})",
            candle.low, candle.open, candle.close
        ));
    }
    Ok(())
}

/// Validate a fetched batch and return only closed bars.
///
/// Rejects non-futures data outright. A trailing bar still forming at `now`
/// is dropped. The last closed bar must be no older than
/// `stale_tolerance_bars` bar lengths.
pub fn validate_batch(
    batch: CandleBatch,
    timeframe: Timeframe,
    now: DateTime<Utc>,
    stale_tolerance_bars: i64,
) -> Result<Vec<Candle>, DataError> {
    if batch.market_class != MarketClass::Futures {
        return Err(DataError::WrongMarketClass(format!("{:?}", batch.market_class)));
    }

    let mut candles = batch.candles;
    if candles.is_empty() {
        return Err(DataError::Unavailable("feed returned no candles".to_string()));
    }

    for (i, candle) in candles.iter().enumerate() {
        if candle.timeframe != timeframe {
            return Err(DataError::Malformed {
                index: i,
                reason: format!("expected {} bar, got {}", timeframe, candle.timeframe),
            });
        }
        validate_candle(candle).map_err(|reason| DataError::Malformed { index: i, reason })?;
        if i > 0 && candle.open_time <= candles[i - 1].open_time {
            return Err(DataError::Unordered(i));
        }
    }

    while candles.last().is_some_and(|c| c.close_time() > now) {
        candles.pop();
    }

    let Some(last) = candles.last() else {
        return Err(DataError::Insufficient { needed: 1, got: 0 });
    };

    let age_secs = (now - last.close_time()).num_seconds();
    if age_secs > stale_tolerance_bars * timeframe.as_secs() {
        return Err(DataError::Stale { age_secs });
    }

    Ok(candles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn create_test_candles(count: usize, start: DateTime<Utc>) -> Vec<Candle> {
        (0..count)
            .map(|i| Candle {
                open_time: start + Duration::minutes(5 * i as i64),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.5,
                volume: 10.0,
                timeframe: Timeframe::M5,
            })
            .collect()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_drops_forming_bar() {
        let candles = create_test_candles(4, start());
        // Last bar opened 10:15 and closes 10:20
        let now = start() + Duration::minutes(17);
        let batch = CandleBatch {
            market_class: MarketClass::Futures,
            candles,
        };

        let closed = validate_batch(batch, Timeframe::M5, now, 2).unwrap();
        assert_eq!(closed.len(), 3);
    }

    #[test]
    fn test_rejects_spot_feed() {
        let batch = CandleBatch {
            market_class: MarketClass::Spot,
            candles: create_test_candles(3, start()),
        };
        let err = validate_batch(batch, Timeframe::M5, start() + Duration::hours(1), 2).unwrap_err();
        assert!(matches!(err, DataError::WrongMarketClass(_)));
    }

    #[test]
    fn test_rejects_stale_feed() {
        let batch = CandleBatch {
            market_class: MarketClass::Futures,
            candles: create_test_candles(3, start()),
        };
        // Last close 10:15, now 11:00 -> 45 minutes old
        let err = validate_batch(batch, Timeframe::M5, start() + Duration::hours(1), 2).unwrap_err();
        assert_eq!(err, DataError::Stale { age_secs: 2700 });
    }

    #[test]
    fn test_rejects_unordered() {
        let mut candles = create_test_candles(3, start());
        candles.swap(1, 2);
        let batch = CandleBatch {
            market_class: MarketClass::Futures,
            candles,
        };
        let err = validate_batch(batch, Timeframe::M5, start() + Duration::minutes(15), 2).unwrap_err();
        assert_eq!(err, DataError::Unordered(2));
    }

    #[test]
    fn test_validate_candle_relationships() {
        let mut candle = create_test_candles(1, start()).remove(0);
        assert!(validate_candle(&candle).is_ok());

        candle.high = 98.0;
        assert!(validate_candle(&candle).is_err());

        candle.high = 101.0;
        candle.open = -1.0;
        assert!(validate_candle(&candle).unwrap_err().contains("open"));
    }
}
