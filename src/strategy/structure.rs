/// Swing structure classifier
///
/// Candle i is a swing high when its high is strictly greater than every other
/// high in [i - left, i + right]. The pivot only exists once all `right`
/// candles after it have closed. Swing lows mirror this on the low.
///
/// Bias compares the two most recent pivots of each kind:
/// - Bullish: higher high, then a higher low formed after it
/// - Bearish: lower low, then a lower high formed after it
/// - Neutral: anything else
use crate::models::{Bias, Candle};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotKind {
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pivot {
    pub index: usize,
    pub price: f64,
    pub kind: PivotKind,
    /// Open time of the candle that completed the right-hand window
    pub confirmed_at: DateTime<Utc>,
}

fn is_pivot(candles: &[Candle], i: usize, left: usize, right: usize, kind: PivotKind) -> bool {
    let value = |c: &Candle| match kind {
        PivotKind::High => c.high,
        PivotKind::Low => c.low,
    };
    let pivot = value(&candles[i]);

    (i - left..=i + right)
        .filter(|&j| j != i)
        .all(|j| match kind {
            PivotKind::High => value(&candles[j]) < pivot,
            PivotKind::Low => value(&candles[j]) > pivot,
        })
}

/// All confirmed pivots, in index order
pub fn find_pivots(candles: &[Candle], left: usize, right: usize) -> Vec<Pivot> {
    let mut pivots = Vec::new();
    if candles.len() < left + right + 1 {
        return pivots;
    }

    for i in left..candles.len() - right {
        for kind in [PivotKind::High, PivotKind::Low] {
            if is_pivot(candles, i, left, right, kind) {
                pivots.push(Pivot {
                    index: i,
                    price: match kind {
                        PivotKind::High => candles[i].high,
                        PivotKind::Low => candles[i].low,
                    },
                    kind,
                    confirmed_at: candles[i + right].open_time,
                });
            }
        }
    }

    pivots
}

/// Bias from an already computed pivot sequence
pub fn bias_from_pivots(pivots: &[Pivot]) -> Bias {
    let last_two = |kind: PivotKind| {
        let mut iter = pivots.iter().rev().filter(move |p| p.kind == kind);
        match (iter.next(), iter.next()) {
            (Some(last), Some(prev)) => Some((prev, last)),
            _ => None,
        }
    };

    let (Some((prev_high, last_high)), Some((prev_low, last_low))) =
        (last_two(PivotKind::High), last_two(PivotKind::Low))
    else {
        return Bias::Neutral;
    };

    let higher_high = last_high.price > prev_high.price;
    let higher_low = last_low.price > prev_low.price;
    let lower_high = last_high.price < prev_high.price;
    let lower_low = last_low.price < prev_low.price;

    if higher_high && higher_low && last_low.index > last_high.index {
        Bias::Bullish
    } else if lower_low && lower_high && last_high.index > last_low.index {
        Bias::Bearish
    } else {
        Bias::Neutral
    }
}

/// Classify HTF bias. Short series are neutral, never an error.
pub fn classify_bias(candles: &[Candle], left: usize, right: usize) -> Bias {
    let pivots = find_pivots(candles, left, right);
    let bias = bias_from_pivots(&pivots);
    tracing::debug!(pivots = pivots.len(), %bias, "HTF structure classified");
    bias
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timeframe;
    use chrono::{Duration, TimeZone};

    /// Candles with high = value + 1, low = value - 1
    fn create_test_candles(values: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Candle {
                open_time: start + Duration::minutes(15 * i as i64),
                open: v,
                high: v + 1.0,
                low: v - 1.0,
                close: v,
                volume: 100.0,
                timeframe: Timeframe::M15,
            })
            .collect()
    }

    // Zig-zag: low 10, high 20, low 12, high 24, low 15, then drift
    fn bullish_series() -> Vec<f64> {
        vec![
            14.0, 13.0, 12.0, 11.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0, 18.0, 16.0, 14.0, 13.0,
            12.0, 14.0, 17.0, 20.0, 22.0, 24.0, 22.0, 20.0, 18.0, 16.0, 15.0, 17.0, 19.0, 21.0,
            23.0, 23.5,
        ]
    }

    #[test]
    fn test_short_series_is_neutral() {
        let candles = create_test_candles(&[1.0, 2.0, 3.0]);
        assert_eq!(classify_bias(&candles, 5, 5), Bias::Neutral);
        assert!(find_pivots(&candles, 5, 5).is_empty());
    }

    #[test]
    fn test_higher_high_then_higher_low_is_bullish() {
        let candles = create_test_candles(&bullish_series());
        let pivots = find_pivots(&candles, 2, 2);

        let highs: Vec<_> = pivots.iter().filter(|p| p.kind == PivotKind::High).collect();
        let lows: Vec<_> = pivots.iter().filter(|p| p.kind == PivotKind::Low).collect();
        assert_eq!(highs.len(), 2);
        assert_eq!(lows.len(), 3);

        assert_eq!(classify_bias(&candles, 2, 2), Bias::Bullish);
    }

    #[test]
    fn test_mirror_is_bearish() {
        let values: Vec<f64> = bullish_series().iter().map(|v| 50.0 - v).collect();
        let candles = create_test_candles(&values);
        assert_eq!(classify_bias(&candles, 2, 2), Bias::Bearish);
    }

    #[test]
    fn test_equal_extremes_do_not_confirm() {
        let candles = create_test_candles(&[1.0, 2.0, 5.0, 5.0, 2.0, 1.0]);
        let pivots = find_pivots(&candles, 2, 2);
        assert!(pivots.iter().all(|p| p.kind != PivotKind::High));
    }

    #[test]
    fn test_pivot_needs_right_side_candles() {
        // Peak at index 2 with only one candle after it
        let candles = create_test_candles(&[1.0, 2.0, 5.0, 2.0]);
        assert!(find_pivots(&candles, 2, 2).is_empty());

        let candles = create_test_candles(&[1.0, 2.0, 5.0, 2.0, 1.0]);
        let pivots = find_pivots(&candles, 2, 2);
        assert_eq!(pivots.len(), 1);
        assert_eq!(pivots[0].index, 2);
        assert_eq!(pivots[0].confirmed_at, candles[4].open_time);
    }

    #[test]
    fn test_appending_candles_keeps_confirmed_pivots() {
        let values = bullish_series();
        let candles = create_test_candles(&values);
        let before = find_pivots(&candles[..25], 2, 2);

        let after = find_pivots(&candles, 2, 2);
        for pivot in &before {
            assert!(after.contains(pivot));
        }
    }
}
