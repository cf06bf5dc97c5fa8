use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Candle interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub fn as_secs(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::H1 => 3_600,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.as_secs())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            other => Err(format!("unsupported timeframe: {}", other)),
        }
    }
}

/// Market the candle feed was sourced from. Only futures data is tradable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketClass {
    Futures,
    Spot,
}

/// Closed OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timeframe: Timeframe,
}

impl Candle {
    pub fn close_time(&self) -> DateTime<Utc> {
        self.open_time + self.timeframe.duration()
    }

    /// Signed body (close - open)
    pub fn body(&self) -> f64 {
        self.close - self.open
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Order side that opens a position in this direction
    pub fn entry_side(&self) -> Side {
        match self {
            Direction::Long => Side::Buy,
            Direction::Short => Side::Sell,
        }
    }

    /// Order side that reduces a position in this direction
    pub fn exit_side(&self) -> Side {
        match self {
            Direction::Long => Side::Sell,
            Direction::Short => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

/// Higher-timeframe market structure label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl Bias {
    /// Trade direction this bias permits, if any
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Bias::Bullish => Some(Direction::Long),
            Bias::Bearish => Some(Direction::Short),
            Bias::Neutral => None,
        }
    }
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Bias::Bullish => "bullish",
            Bias::Bearish => "bearish",
            Bias::Neutral => "neutral",
        };
        f.write_str(s)
    }
}

/// Strategy profile: selects the LTF/HTF pair and per-profile thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Profile {
    #[serde(rename = "ltf_5m")]
    Ltf5m,
    #[serde(rename = "ltf_15m")]
    Ltf15m,
}

impl Profile {
    pub fn ltf(&self) -> Timeframe {
        match self {
            Profile::Ltf5m => Timeframe::M5,
            Profile::Ltf15m => Timeframe::M15,
        }
    }

    pub fn htf(&self) -> Timeframe {
        match self {
            Profile::Ltf5m => Timeframe::M15,
            Profile::Ltf15m => Timeframe::H1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Ltf5m => "ltf_5m",
            Profile::Ltf15m => "ltf_15m",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ltf_5m" | "ltf5m" => Ok(Profile::Ltf5m),
            "ltf_15m" | "ltf15m" => Ok(Profile::Ltf15m),
            other => Err(format!("unknown profile: {}", other)),
        }
    }
}

/// Venue capability that drives quantity rounding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueKind {
    /// Whole contracts only (floor, minimum 1)
    IntegerContract,
    /// Fractional quantities allowed
    DecimalQuantity,
}

impl fmt::Display for VenueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VenueKind::IntegerContract => "integer_contract",
            VenueKind::DecimalQuantity => "decimal_quantity",
        };
        f.write_str(s)
    }
}

/// Trade candidate emitted by the resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub profile: Profile,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
    pub rr: f64,
    pub reason: String,
}

/// Sized order plan derived from a signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingPlan {
    pub balance: f64,
    pub leverage: f64,
    pub risk_pct: f64,
    pub risk_budget: f64,
    pub quantity: f64,
    pub notional: f64,
    pub margin: f64,
    pub estimated_cost: f64,
}

/// The single in-flight position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub venue: VenueKind,
    pub symbol: String,
    pub direction: Direction,
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
    pub quantity: f64,
    pub order_id: String,
    pub opened_at: DateTime<Utc>,
    pub profile: Profile,
}

impl Position {
    /// Gross P&L if closed at `exit_price`
    pub fn pnl_at(&self, exit_price: f64) -> f64 {
        match self.direction {
            Direction::Long => (exit_price - self.entry) * self.quantity,
            Direction::Short => (self.entry - exit_price) * self.quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candle_close_time() {
        let candle = Candle {
            open_time: DateTime::parse_from_rfc3339("2024-01-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 10.0,
            timeframe: Timeframe::M15,
        };

        assert_eq!(candle.close_time().to_rfc3339(), "2024-01-01T10:15:00+00:00");
        assert_eq!(candle.body(), 0.5);
    }

    #[test]
    fn test_profile_timeframes() {
        assert_eq!(Profile::Ltf5m.ltf(), Timeframe::M5);
        assert_eq!(Profile::Ltf5m.htf(), Timeframe::M15);
        assert_eq!(Profile::Ltf15m.ltf(), Timeframe::M15);
        assert_eq!(Profile::Ltf15m.htf(), Timeframe::H1);
        assert_eq!("ltf_15m".parse::<Profile>().unwrap(), Profile::Ltf15m);
        assert!("ltf_1h".parse::<Profile>().is_err());
    }

    #[test]
    fn test_position_pnl_both_directions() {
        let mut position = Position {
            venue: VenueKind::IntegerContract,
            symbol: "ADAUSDT".to_string(),
            direction: Direction::Long,
            entry: 100.0,
            stop: 98.0,
            target: 104.0,
            quantity: 10.0,
            order_id: "1".to_string(),
            opened_at: Utc::now(),
            profile: Profile::Ltf5m,
        };

        assert_eq!(position.pnl_at(104.0), 40.0);

        position.direction = Direction::Short;
        assert_eq!(position.pnl_at(104.0), -40.0);
    }

    #[test]
    fn test_direction_sides() {
        assert_eq!(Direction::Long.entry_side(), Side::Buy);
        assert_eq!(Direction::Long.exit_side(), Side::Sell);
        assert_eq!(Direction::Short.entry_side(), Side::Sell);
        assert_eq!(Bias::Neutral.direction(), None);
    }
}
