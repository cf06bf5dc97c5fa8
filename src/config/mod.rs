//! Bot configuration.
//!
//! Layering (lowest to highest precedence): built-in defaults, optional
//! `swingbot.toml`, `SWINGBOT_*` environment variables (after `.env`).

use crate::error::ConfigError;
use crate::execution::RetryPolicy;
use crate::models::{Profile, VenueKind};
use crate::strategy::session::{SessionTable, SessionWindow};
use crate::strategy::StrategyParams;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Demo,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    // Core
    pub environment: Environment,
    pub venue: VenueKind,
    pub symbol: String,
    pub profile: Profile,
    pub leverage: f64,
    pub balance: f64,
    pub risk_per_trade_percent: f64,

    // Session windows (UTC, HH:MM, end exclusive)
    pub london_start_utc: String,
    pub london_end_utc: String,
    pub overlap_start_utc: String,
    pub overlap_end_utc: String,
    pub ny_start_utc: String,
    pub ny_end_utc: String,
    pub rr_london: f64,
    pub rr_overlap: f64,
    pub rr_ny: f64,

    // Strategy
    pub entry_percent: f64,
    pub pivot_left_bars: usize,
    pub pivot_right_bars: usize,
    pub atr_period: usize,
    pub displacement_mult_5m: f64,
    pub displacement_mult_15m: f64,
    pub max_gap_age_5m: u32,
    pub max_gap_age_15m: u32,
    pub displacement_lookback: usize,

    // Venue costs (round trip, percent of notional)
    pub integer_venue_cost_percent: f64,
    pub decimal_venue_cost_percent: f64,

    // Data & runtime
    pub candle_limit: usize,
    pub candle_close_buffer_seconds: u64,
    pub stale_tolerance_bars: i64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_jitter_percent: f64,
    pub confirm_max_cycles: u32,
    pub degraded_after_errors: u32,

    // Collaborators
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub log_level: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Demo,
            venue: VenueKind::IntegerContract,
            symbol: "ADAUSDT".to_string(),
            profile: Profile::Ltf5m,
            leverage: 3.0,
            balance: 1000.0,
            risk_per_trade_percent: 2.0,
            london_start_utc: "07:00".to_string(),
            london_end_utc: "10:00".to_string(),
            overlap_start_utc: "13:00".to_string(),
            overlap_end_utc: "16:00".to_string(),
            ny_start_utc: "17:00".to_string(),
            ny_end_utc: "20:00".to_string(),
            rr_london: 2.0,
            rr_overlap: 4.0,
            rr_ny: 3.0,
            entry_percent: 50.0,
            pivot_left_bars: 5,
            pivot_right_bars: 5,
            atr_period: 14,
            displacement_mult_5m: 1.8,
            displacement_mult_15m: 1.5,
            max_gap_age_5m: 24,
            max_gap_age_15m: 20,
            displacement_lookback: 50,
            integer_venue_cost_percent: 0.04,
            decimal_venue_cost_percent: 1.20,
            candle_limit: 300,
            candle_close_buffer_seconds: 5,
            stale_tolerance_bars: 2,
            max_attempts: 4,
            retry_base_delay_ms: 1_000,
            retry_jitter_percent: 20.0,
            confirm_max_cycles: 3,
            degraded_after_errors: 3,
            telegram_bot_token: None,
            telegram_chat_id: None,
            database_url: None,
            redis_url: None,
            log_level: "info".to_string(),
        }
    }
}

impl BotConfig {
    /// Load `.env`, the optional config file and `SWINGBOT_*` variables, then validate.
    pub fn load(file: Option<&str>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(file.unwrap_or("swingbot")).required(false))
            .add_source(config::Environment::with_prefix("SWINGBOT").try_parsing(true))
            .build()?;

        let cfg: BotConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Fail fast on values the pipeline cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.symbol.trim().is_empty() {
            return invalid("symbol must not be empty".to_string());
        }
        if !(self.leverage > 0.0) {
            return invalid(format!("leverage must be > 0, got {}", self.leverage));
        }
        if !(self.balance > 0.0) {
            return invalid(format!("balance must be > 0, got {}", self.balance));
        }
        if !(self.risk_per_trade_percent > 0.0) {
            return invalid(format!(
                "risk_per_trade_percent must be > 0, got {}",
                self.risk_per_trade_percent
            ));
        }
        if !(self.entry_percent > 0.0 && self.entry_percent <= 100.0) {
            return invalid(format!(
                "entry_percent must be in (0, 100], got {}",
                self.entry_percent
            ));
        }
        if self.pivot_left_bars == 0 || self.pivot_right_bars == 0 {
            return invalid("pivot bars must be >= 1".to_string());
        }
        if self.atr_period == 0 {
            return invalid("atr_period must be >= 1".to_string());
        }
        if self.max_attempts == 0 {
            return invalid("max_attempts must be >= 1".to_string());
        }
        if self.degraded_after_errors == 0 {
            return invalid("degraded_after_errors must be >= 1".to_string());
        }
        if self.confirm_max_cycles == 0 {
            return invalid("confirm_max_cycles must be >= 1".to_string());
        }
        for rr in [self.rr_london, self.rr_overlap, self.rr_ny] {
            if !(rr > 0.0) {
                return invalid(format!("session RR must be > 0, got {}", rr));
            }
        }
        if self.environment == Environment::Live
            && (self.telegram_bot_token.is_none() || self.telegram_chat_id.is_none())
        {
            return invalid("live environment requires telegram_bot_token and telegram_chat_id".to_string());
        }

        self.session_table()?;
        Ok(())
    }

    pub fn displacement_mult(&self, profile: Profile) -> f64 {
        match profile {
            Profile::Ltf5m => self.displacement_mult_5m,
            Profile::Ltf15m => self.displacement_mult_15m,
        }
    }

    pub fn max_gap_age(&self, profile: Profile) -> u32 {
        match profile {
            Profile::Ltf5m => self.max_gap_age_5m,
            Profile::Ltf15m => self.max_gap_age_15m,
        }
    }

    /// Round-trip cost percent for the venue kind
    pub fn cost_percent(&self, venue: VenueKind) -> f64 {
        match venue {
            VenueKind::IntegerContract => self.integer_venue_cost_percent,
            VenueKind::DecimalQuantity => self.decimal_venue_cost_percent,
        }
    }

    pub fn session_table(&self) -> Result<SessionTable, ConfigError> {
        let window = |start: &str, end: &str, rr: f64| {
            SessionWindow::parse(start, end, rr).map_err(ConfigError::Invalid)
        };

        Ok(SessionTable {
            overlap: window(&self.overlap_start_utc, &self.overlap_end_utc, self.rr_overlap)?,
            ny_peak: window(&self.ny_start_utc, &self.ny_end_utc, self.rr_ny)?,
            london_peak: window(&self.london_start_utc, &self.london_end_utc, self.rr_london)?,
        })
    }

    /// Strategy thresholds for the given profile
    pub fn strategy_params(&self, profile: Profile) -> Result<StrategyParams, ConfigError> {
        Ok(StrategyParams {
            profile,
            symbol: self.symbol.clone(),
            pivot_left_bars: self.pivot_left_bars,
            pivot_right_bars: self.pivot_right_bars,
            atr_period: self.atr_period,
            displacement_mult: self.displacement_mult(profile),
            displacement_lookback: self.displacement_lookback,
            max_gap_age: self.max_gap_age(profile),
            entry_percent: self.entry_percent,
            sessions: self.session_table()?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            jitter_percent: self.retry_jitter_percent,
        }
    }

    /// Seconds between cycles for the active profile (one LTF bar)
    pub fn cycle_seconds(&self) -> i64 {
        self.profile.ltf().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = BotConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.cycle_seconds(), 300);
    }

    #[test]
    fn test_profile_derived_params() {
        let cfg = BotConfig::default();

        let params = cfg.strategy_params(Profile::Ltf5m).unwrap();
        assert_eq!(params.displacement_mult, 1.8);
        assert_eq!(params.max_gap_age, 24);

        let params = cfg.strategy_params(Profile::Ltf15m).unwrap();
        assert_eq!(params.displacement_mult, 1.5);
        assert_eq!(params.max_gap_age, 20);
    }

    #[test]
    fn test_rejects_non_positive_leverage() {
        let cfg = BotConfig {
            leverage: 0.0,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("leverage"));
    }

    #[test]
    fn test_rejects_zero_degraded_threshold() {
        let cfg = BotConfig {
            degraded_after_errors: 0,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("degraded_after_errors"));
    }

    #[test]
    fn test_rejects_bad_session_time() {
        let cfg = BotConfig {
            overlap_start_utc: "25:00".to_string(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_live_requires_telegram() {
        let cfg = BotConfig {
            environment: Environment::Live,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_cost_percent_by_venue() {
        let cfg = BotConfig::default();
        assert_eq!(cfg.cost_percent(VenueKind::IntegerContract), 0.04);
        assert_eq!(cfg.cost_percent(VenueKind::DecimalQuantity), 1.20);
    }
}
