/// Fair value gap tracker
///
/// Three-candle imbalance at candle i (i >= 2):
/// - Bullish: low[i] > high[i-2], zone [high[i-2], low[i]]
/// - Bearish: high[i] < low[i-2], zone [high[i], low[i-2]]
///
/// A gap ages one bar per later candle and is dropped once its age exceeds
/// `max_age` or a later candle trades fully through it.
use crate::models::{Candle, Direction};

#[derive(Debug, Clone, PartialEq)]
pub struct Gap {
    pub direction: Direction,
    pub upper: f64,
    pub lower: f64,
    pub formed_at_index: usize,
    pub age_bars: u32,
}

impl Gap {
    pub fn height(&self) -> f64 {
        self.upper - self.lower
    }

    /// Whether `candle` has traded through the whole zone
    pub fn is_filled_by(&self, candle: &Candle) -> bool {
        match self.direction {
            Direction::Long => candle.low <= self.lower,
            Direction::Short => candle.high >= self.upper,
        }
    }

    /// Retracement depth into the zone for `price` (0 at the entry edge, 1 at the far edge)
    pub fn retracement(&self, price: f64) -> f64 {
        let height = self.height();
        if height <= 0.0 {
            return 0.0;
        }
        match self.direction {
            Direction::Long => (self.upper - price) / height,
            Direction::Short => (price - self.lower) / height,
        }
    }

    /// Price `fraction` of the way into the zone from the entry edge
    pub fn entry_level(&self, fraction: f64) -> f64 {
        match self.direction {
            Direction::Long => self.lower + (1.0 - fraction) * self.height(),
            Direction::Short => self.upper - (1.0 - fraction) * self.height(),
        }
    }

    /// Edge a stop belongs behind
    pub fn stop_edge(&self) -> f64 {
        match self.direction {
            Direction::Long => self.lower,
            Direction::Short => self.upper,
        }
    }
}

/// Gap formed by candle `i`, if any
pub fn detect_gap(candles: &[Candle], i: usize) -> Option<Gap> {
    if i < 2 || i >= candles.len() {
        return None;
    }
    let (first, third) = (&candles[i - 2], &candles[i]);

    if third.low > first.high {
        Some(Gap {
            direction: Direction::Long,
            upper: third.low,
            lower: first.high,
            formed_at_index: i,
            age_bars: 0,
        })
    } else if third.high < first.low {
        Some(Gap {
            direction: Direction::Short,
            upper: first.low,
            lower: third.high,
            formed_at_index: i,
            age_bars: 0,
        })
    } else {
        None
    }
}

/// Live gaps in formation order
#[derive(Debug, Clone)]
pub struct GapTracker {
    max_age: u32,
    gaps: Vec<Gap>,
    next_index: usize,
}

impl GapTracker {
    pub fn new(max_age: u32) -> Self {
        Self {
            max_age,
            gaps: Vec::new(),
            next_index: 0,
        }
    }

    /// Build the live set from scratch over the whole series
    pub fn replay(candles: &[Candle], max_age: u32) -> Self {
        let mut tracker = Self::new(max_age);
        tracker.advance(candles);
        tracker
    }

    /// Process every candle not yet seen. `candles` must extend the series
    /// previously passed in.
    pub fn advance(&mut self, candles: &[Candle]) {
        while self.next_index < candles.len() {
            self.push(candles, self.next_index);
            self.next_index += 1;
        }
    }

    fn push(&mut self, candles: &[Candle], i: usize) {
        let candle = &candles[i];
        let max_age = self.max_age;

        for gap in self.gaps.iter_mut() {
            gap.age_bars = (i - gap.formed_at_index) as u32;
        }

        let before = self.gaps.len();
        self.gaps
            .retain(|gap| gap.age_bars <= max_age && !gap.is_filled_by(candle));
        if self.gaps.len() != before {
            tracing::debug!(removed = before - self.gaps.len(), index = i, "Gaps expired or filled");
        }

        if let Some(gap) = detect_gap(candles, i) {
            tracing::debug!(
                direction = %gap.direction,
                lower = gap.lower,
                upper = gap.upper,
                index = i,
                "Gap formed"
            );
            self.gaps.push(gap);
        }
    }

    pub fn live(&self) -> &[Gap] {
        &self.gaps
    }

    /// Live gaps in `direction`, newest first
    pub fn aligned(&self, direction: Direction) -> impl Iterator<Item = &Gap> {
        self.gaps.iter().rev().filter(move |g| g.direction == direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timeframe;
    use chrono::{Duration, TimeZone, Utc};

    fn candle(i: usize, high: f64, low: f64) -> Candle {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Candle {
            open_time: start + Duration::minutes(5 * i as i64),
            open: (high + low) / 2.0,
            high,
            low,
            close: (high + low) / 2.0,
            volume: 10.0,
            timeframe: Timeframe::M5,
        }
    }

    fn create_test_candles(ranges: &[(f64, f64)]) -> Vec<Candle> {
        ranges
            .iter()
            .enumerate()
            .map(|(i, &(high, low))| candle(i, high, low))
            .collect()
    }

    #[test]
    fn test_detect_bullish_gap() {
        let candles = create_test_candles(&[(98.0, 96.0), (101.0, 97.0), (102.0, 100.0)]);
        let gap = detect_gap(&candles, 2).unwrap();

        assert_eq!(gap.direction, Direction::Long);
        assert_eq!(gap.lower, 98.0);
        assert_eq!(gap.upper, 100.0);
        assert_eq!(gap.retracement(99.0), 0.5);
    }

    #[test]
    fn test_detect_bearish_gap() {
        let candles = create_test_candles(&[(104.0, 102.0), (103.0, 99.0), (100.0, 98.0)]);
        let gap = detect_gap(&candles, 2).unwrap();

        assert_eq!(gap.direction, Direction::Short);
        assert_eq!(gap.lower, 100.0);
        assert_eq!(gap.upper, 102.0);
        assert_eq!(gap.stop_edge(), 102.0);
    }

    #[test]
    fn test_no_gap_on_overlap() {
        let candles = create_test_candles(&[(100.0, 98.0), (101.0, 99.0), (102.0, 99.5)]);
        assert!(detect_gap(&candles, 2).is_none());
        assert!(detect_gap(&candles, 1).is_none());
    }

    #[test]
    fn test_age_and_expiry() {
        let mut ranges = vec![(98.0, 96.0), (101.0, 97.0), (102.0, 100.0)];
        // Stay above the zone so nothing fills it
        ranges.extend(vec![(103.0, 101.0); 4]);
        let candles = create_test_candles(&ranges);

        let tracker = GapTracker::replay(&candles, 4);
        assert_eq!(tracker.live().len(), 1);
        assert_eq!(tracker.live()[0].age_bars, 4);

        let tracker = GapTracker::replay(&candles, 3);
        assert!(tracker.live().is_empty());
    }

    #[test]
    fn test_full_fill_removes_gap() {
        let candles = create_test_candles(&[
            (98.0, 96.0),
            (101.0, 97.0),
            (102.0, 100.0),
            (101.0, 99.0), // partial retrace
        ]);
        let tracker = GapTracker::replay(&candles, 24);
        assert_eq!(tracker.live().len(), 1);

        let mut filled = candles.clone();
        filled.push(candle(4, 100.0, 97.5)); // trades below the lower edge
        let tracker = GapTracker::replay(&filled, 24);
        assert!(tracker.live().is_empty());
    }

    #[test]
    fn test_age_is_monotonic_until_removal() {
        let mut ranges = vec![(98.0, 96.0), (101.0, 97.0), (102.0, 100.0)];
        ranges.extend(vec![(103.0, 101.0); 6]);
        let candles = create_test_candles(&ranges);

        let mut tracker = GapTracker::new(24);
        let mut last_age = 0;
        for end in 3..=candles.len() {
            tracker.advance(&candles[..end]);
            let age = tracker.live()[0].age_bars;
            assert!(age >= last_age);
            last_age = age;
        }
        assert_eq!(last_age, 6);
    }

    #[test]
    fn test_aligned_is_newest_first() {
        let candles = create_test_candles(&[
            (98.0, 96.0),
            (101.0, 97.0),
            (102.0, 100.0), // gap A at 2: [98, 100]
            (104.0, 101.0),
            (106.0, 103.0), // gap B at 4: [102, 103]
        ]);
        let tracker = GapTracker::replay(&candles, 24);
        let aligned: Vec<_> = tracker.aligned(Direction::Long).collect();

        assert_eq!(aligned.len(), 2);
        assert_eq!(aligned[0].formed_at_index, 4);
        assert_eq!(aligned[1].formed_at_index, 2);
    }
}
