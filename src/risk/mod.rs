// Risk management module
pub mod sizing;

pub use sizing::{size_position, RiskSettings};
