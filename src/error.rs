//! Error taxonomy shared by the pipeline and the position controller.
//!
//! "No signal" is deliberately absent: the resolver reports it as a normal
//! evaluation outcome, not a failure.

use thiserror::Error;

/// Candle feed problems. The cycle is skipped, never traded through.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    #[error("candle feed unavailable: {0}")]
    Unavailable(String),

    #[error("candle feed stale: last bar closed {age_secs}s ago")]
    Stale { age_secs: i64 },

    #[error("candle feed is not futures-origin ({0})")]
    WrongMarketClass(String),

    #[error("candles out of order at index {0}")]
    Unordered(usize),

    #[error("malformed candle at index {index}: {reason}")]
    Malformed { index: usize, reason: String },

    #[error("insufficient candles: need {needed}, got {got}")]
    Insufficient { needed: usize, got: usize },
}

/// Rejected sizing request
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SizingError {
    #[error("stop distance must be > 0, got {0}")]
    NonPositiveRiskDistance(f64),

    #[error("invalid sizing input: {0}")]
    InvalidInput(String),
}

/// Execution gateway failures. The controller reacts differently per kind.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    /// Network / timeout / 5xx. Retried under the backoff policy.
    #[error("transport error: {0}")]
    Transport(String),

    /// Venue refused the request. Never retried.
    #[error("order rejected: {0}")]
    Rejected(String),

    /// Missing symbol or contract metadata. Fatal for the venue.
    #[error("mapping error: {0}")]
    Mapping(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transport(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Transport(_) => "transport",
            GatewayError::Rejected(_) => "rejection",
            GatewayError::Mapping(_) => "mapping",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config load failed: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notifier rejected message: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_retryable() {
        assert!(GatewayError::Transport("timeout".into()).is_retryable());
        assert!(!GatewayError::Rejected("margin".into()).is_retryable());
        assert!(!GatewayError::Mapping("no contract".into()).is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let err = DataError::Insufficient { needed: 15, got: 3 };
        assert_eq!(err.to_string(), "insufficient candles: need 15, got 3");

        let err = SizingError::NonPositiveRiskDistance(0.0);
        assert!(err.to_string().contains("must be > 0"));
    }
}
