use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trading session labels, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Session {
    Overlap,
    NyPeak,
    LondonPeak,
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Session::Overlap => "overlap",
            Session::NyPeak => "ny_peak",
            Session::LondonPeak => "london_peak",
        };
        f.write_str(s)
    }
}

/// UTC time-of-day window `[start, end)` with its reward/risk ratio.
/// A window whose end is before its start wraps midnight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub rr: f64,
}

impl SessionWindow {
    /// Parse "HH:MM" bounds
    pub fn parse(start: &str, end: &str, rr: f64) -> Result<Self, String> {
        let parse_time = |s: &str| {
            NaiveTime::parse_from_str(s.trim(), "%H:%M")
                .map_err(|e| format!("invalid session time '{}': {}", s, e))
        };

        let window = Self {
            start: parse_time(start)?,
            end: parse_time(end)?,
            rr,
        };

        if window.start == window.end {
            return Err(format!("empty session window {}-{}", start, end));
        }

        Ok(window)
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start < self.end {
            self.start <= time && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

/// The three configured sessions
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTable {
    pub overlap: SessionWindow,
    pub ny_peak: SessionWindow,
    pub london_peak: SessionWindow,
}

impl SessionTable {
    /// Session and RR for `now`, honouring overlap > NY peak > London peak.
    /// None outside every window.
    pub fn resolve(&self, now: DateTime<Utc>) -> Option<(Session, f64)> {
        // Minute resolution, same as the configured bounds
        let time = NaiveTime::from_hms_opt(now.hour(), now.minute(), 0)?;

        [
            (Session::Overlap, &self.overlap),
            (Session::NyPeak, &self.ny_peak),
            (Session::LondonPeak, &self.london_peak),
        ]
        .into_iter()
        .find(|(_, window)| window.contains(time))
        .map(|(session, window)| (session, window.rr))
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        let at = |h: u32| NaiveTime::from_hms_opt(h, 0, 0).unwrap_or(NaiveTime::MIN);
        Self {
            overlap: SessionWindow { start: at(13), end: at(16), rr: 4.0 },
            ny_peak: SessionWindow { start: at(17), end: at(20), rr: 3.0 },
            london_peak: SessionWindow { start: at(7), end: at(10), rr: 2.0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    #[test]
    fn test_resolve_each_session() {
        let table = SessionTable::default();

        assert_eq!(table.resolve(at(14, 0)), Some((Session::Overlap, 4.0)));
        assert_eq!(table.resolve(at(18, 30)), Some((Session::NyPeak, 3.0)));
        assert_eq!(table.resolve(at(7, 0)), Some((Session::LondonPeak, 2.0)));
        assert_eq!(table.resolve(at(3, 0)), None);
    }

    #[test]
    fn test_end_is_exclusive() {
        let table = SessionTable::default();
        assert_eq!(table.resolve(at(9, 59)), Some((Session::LondonPeak, 2.0)));
        assert_eq!(table.resolve(at(10, 0)), None);
    }

    #[test]
    fn test_overlap_wins_over_ny() {
        let table = SessionTable {
            overlap: SessionWindow::parse("13:00", "16:00", 4.0).unwrap(),
            ny_peak: SessionWindow::parse("13:30", "20:00", 3.0).unwrap(),
            london_peak: SessionWindow::parse("07:00", "14:00", 2.0).unwrap(),
        };

        assert_eq!(table.resolve(at(13, 45)), Some((Session::Overlap, 4.0)));
        assert_eq!(table.resolve(at(16, 30)), Some((Session::NyPeak, 3.0)));
    }

    #[test]
    fn test_window_wrapping_midnight() {
        let window = SessionWindow::parse("22:00", "02:00", 2.0).unwrap();
        assert!(window.contains(NaiveTime::from_hms_opt(23, 0, 0).unwrap()));
        assert!(window.contains(NaiveTime::from_hms_opt(1, 59, 0).unwrap()));
        assert!(!window.contains(NaiveTime::from_hms_opt(2, 0, 0).unwrap()));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(SessionWindow::parse("25:00", "26:00", 2.0).is_err());
        assert!(SessionWindow::parse("09:00", "09:00", 2.0).is_err());
    }
}
