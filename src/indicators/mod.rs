// Technical indicators module
// ATR (SMA of true range) for displacement thresholds

pub mod atr;
pub mod moving_average;

pub use atr::{calculate_atr, calculate_atr_series, true_range};
pub use moving_average::{calculate_sma, sma_series};
