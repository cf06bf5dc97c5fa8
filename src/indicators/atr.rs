/// Average True Range (ATR) indicator
///
/// Volatility yardstick for displacement detection.
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// Smoothed with a simple moving average over `period` true ranges. The first
/// candle has no previous close, so the first value exists at index `period`.

use crate::indicators::moving_average::{calculate_sma, sma_series};
use crate::models::Candle;

/// True range of `candle` given the previous bar's close
pub fn true_range(candle: &Candle, prev_close: f64) -> f64 {
    (candle.high - candle.low)
        .max((candle.high - prev_close).abs())
        .max((candle.low - prev_close).abs())
}

/// True ranges for candles[1..]
fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|pair| true_range(&pair[1], pair[0].close))
        .collect()
}

/// Calculate the current ATR for the given candles
///
/// Returns None if insufficient data (fewer than `period + 1` candles)
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    calculate_sma(&true_ranges(candles), period)
}

/// ATR aligned with `candles`: entry `i` is the SMA of the true ranges ending at `i`.
///
/// Entries before index `period` are None (not enough samples yet).
pub fn calculate_atr_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; candles.len()];
    if period == 0 || candles.len() < period + 1 {
        return series;
    }

    // tr[k] belongs to candle k + 1
    for (k, value) in sma_series(&true_ranges(candles), period).into_iter().enumerate() {
        series[k + 1] = value;
    }

    series
}
