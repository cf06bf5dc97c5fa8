// Offline replay of the strategy over historical or synthetic candles
pub mod metrics;
pub mod runner;
pub mod synthetic;

pub use metrics::{BacktestMetrics, TradeRecord};
pub use runner::{simulate_exit, BacktestRunner};
pub use synthetic::{MarketScenario, SyntheticDataGenerator};
