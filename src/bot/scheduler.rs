use crate::models::Timeframe;
use chrono::{DateTime, Duration, Utc};

/// Next cycle time: the next timeframe boundary strictly after `now`, plus
/// `buffer` so the bar that just closed is available from the feed.
pub fn next_cycle_at(now: DateTime<Utc>, timeframe: Timeframe, buffer: Duration) -> DateTime<Utc> {
    let period = timeframe.as_secs();
    let ts = now.timestamp();
    let boundary = ts - ts.rem_euclid(period);

    // Still inside the buffer of the boundary that just passed
    let current = DateTime::<Utc>::from_timestamp(boundary, 0).unwrap_or(now) + buffer;
    if current > now {
        return current;
    }

    DateTime::<Utc>::from_timestamp(boundary + period, 0).unwrap_or(now) + buffer
}

/// Wall-clock wait until `at`, zero if already past
pub fn until(now: DateTime<Utc>, at: DateTime<Utc>) -> std::time::Duration {
    (at - now).to_std().unwrap_or(std::time::Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_next_boundary_plus_buffer() {
        let next = next_cycle_at(at(10, 2, 30), Timeframe::M5, Duration::seconds(5));
        assert_eq!(next, at(10, 5, 5));

        let next = next_cycle_at(at(10, 7, 0), Timeframe::M15, Duration::seconds(5));
        assert_eq!(next, at(10, 15, 5));
    }

    #[test]
    fn test_inside_buffer_targets_current_boundary() {
        let next = next_cycle_at(at(10, 5, 2), Timeframe::M5, Duration::seconds(5));
        assert_eq!(next, at(10, 5, 5));
    }

    #[test]
    fn test_exactly_at_buffer_moves_on() {
        let next = next_cycle_at(at(10, 5, 5), Timeframe::M5, Duration::seconds(5));
        assert_eq!(next, at(10, 10, 5));
    }

    #[test]
    fn test_until_never_negative() {
        assert_eq!(until(at(10, 5, 0), at(10, 4, 0)), std::time::Duration::ZERO);
        assert_eq!(until(at(10, 4, 0), at(10, 5, 0)).as_secs(), 60);
    }
}
