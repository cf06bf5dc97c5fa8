use crate::error::DataError;
use crate::indicators::calculate_atr_series;
use crate::models::{Candle, Direction};

/// An impulse candle: |close - open| >= mult x ATR at that bar
#[derive(Debug, Clone, PartialEq)]
pub struct Displacement {
    pub index: usize,
    pub direction: Direction,
    pub body: f64,
    pub atr: f64,
}

/// Whether a single candle qualifies against a known ATR value
pub fn is_displacement(candle: &Candle, atr: f64, mult: f64) -> Option<Direction> {
    let body = candle.body();
    if atr <= 0.0 || body.abs() < mult * atr {
        return None;
    }
    if body > 0.0 {
        Some(Direction::Long)
    } else {
        Some(Direction::Short)
    }
}

/// Most recent displacement candle aligned with `direction` within the last
/// `lookback` candles.
///
/// Errors with `Insufficient` until the ATR has `atr_period` true ranges, so a
/// warm-up window never produces a false positive.
pub fn find_latest_displacement(
    candles: &[Candle],
    direction: Direction,
    atr_period: usize,
    mult: f64,
    lookback: usize,
) -> Result<Option<Displacement>, DataError> {
    if candles.len() < atr_period + 1 {
        return Err(DataError::Insufficient {
            needed: atr_period + 1,
            got: candles.len(),
        });
    }

    let atr = calculate_atr_series(candles, atr_period);
    let first = candles.len().saturating_sub(lookback.max(1));

    for index in (first..candles.len()).rev() {
        let Some(atr_value) = atr[index] else {
            continue;
        };
        if is_displacement(&candles[index], atr_value, mult) == Some(direction) {
            return Ok(Some(Displacement {
                index,
                direction,
                body: candles[index].body().abs(),
                atr: atr_value,
            }));
        }
    }

    Ok(None)
}
