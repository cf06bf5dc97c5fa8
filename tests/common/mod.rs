#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use swingbot::models::{Candle, Timeframe};

/// Wall clock of the fixture cycle: 14:00:05 UTC, inside the overlap session
pub fn cycle_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 5).unwrap()
}

fn last_close() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap()
}

/// 30 closed 15m bars zig-zagging into a higher high then a higher low.
/// high = v + 1, low = v - 1. The last bar closes at 14:00.
pub fn bullish_htf() -> Vec<Candle> {
    let values = [
        14.0, 13.0, 12.0, 11.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0, 18.0, 16.0, 14.0, 13.0, 12.0,
        14.0, 17.0, 20.0, 22.0, 24.0, 22.0, 20.0, 18.0, 16.0, 15.0, 17.0, 19.0, 21.0, 23.0, 23.5,
    ];
    let start = last_close() - Duration::minutes(15 * values.len() as i64);
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

/// 31 closed 5m bars, last closing at 14:00.
///
/// Bars 0-18 range 97-98 (true range 1.0). Bar 19 is a bullish impulse with
/// body 2.0. Bar 20 leaves a gap [98, 100] above bar 18. Price then drifts
/// back down and bar 30 closes at 99.0, half way into the gap at age 10.
pub fn gap_retrace_ltf() -> Vec<Candle> {
    let mut bars: Vec<(f64, f64, f64, f64)> = vec![(97.5, 98.0, 97.0, 97.5); 19];
    bars.push((97.5, 99.5, 97.5, 99.5)); // 19: impulse
    bars.push((100.0, 100.6, 100.0, 100.5)); // 20: gap bar
    bars.push((100.5, 100.6, 99.5, 99.6)); // 21

    let mut prev = 99.6;
    for close in [99.7, 99.5, 99.6, 99.4, 99.5, 99.3, 99.4, 99.2, 99.0] {
        bars.push((prev, prev.max(close) + 0.2, prev.min(close) - 0.2, close));
        prev = close;
    }

    let start = last_close() - Duration::minutes(5 * bars.len() as i64);
    bars.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Candle {
            open_time: start + Duration::minutes(5 * i as i64),
            open,
            high,
            low,
            close,
            volume: 1_000.0,
            timeframe: Timeframe::M5,
        })
        .collect()
}
