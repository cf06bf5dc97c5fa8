use crate::error::SizingError;
use crate::models::{SizingPlan, VenueKind};
use serde::{Deserialize, Serialize};

/// Account-level inputs to position sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSettings {
    pub balance: f64,
    pub leverage: f64,
    pub risk_pct: f64,
    /// Round-trip cost, percent of notional
    pub cost_percent: f64,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            balance: 1000.0,
            leverage: 3.0,
            risk_pct: 2.0, // 2% of leveraged balance per trade
            cost_percent: 0.04,
        }
    }
}

/// Size a trade from entry and stop.
///
/// risk_budget = balance x leverage x risk_pct / 100
/// quantity    = risk_budget / |entry - stop|, floored (min 1) on integer-contract venues
pub fn size_position(
    settings: &RiskSettings,
    venue: VenueKind,
    entry: f64,
    stop: f64,
) -> Result<SizingPlan, SizingError> {
    let sl_distance = (entry - stop).abs();
    if !(sl_distance > 0.0) {
        return Err(SizingError::NonPositiveRiskDistance(sl_distance));
    }
    if !(entry > 0.0) {
        return Err(SizingError::InvalidInput(format!("entry must be > 0, got {}", entry)));
    }
    if !(settings.leverage > 0.0) || !(settings.balance > 0.0) || !(settings.risk_pct > 0.0) {
        return Err(SizingError::InvalidInput(format!(
            "balance, leverage and risk_pct must be > 0 (got {}, {}, {})",
            settings.balance, settings.leverage, settings.risk_pct
        )));
    }

    let risk_budget = settings.balance * settings.leverage * settings.risk_pct / 100.0;

    let quantity = match venue {
        VenueKind::IntegerContract => (risk_budget / sl_distance).floor().max(1.0),
        VenueKind::DecimalQuantity => risk_budget / sl_distance,
    };

    let notional = entry * quantity;
    let margin = notional / settings.leverage;
    let estimated_cost = notional * settings.cost_percent / 100.0;

    tracing::debug!(
        %venue,
        quantity,
        notional,
        margin,
        risk_budget,
        estimated_cost,
        "Position sized"
    );

    Ok(SizingPlan {
        balance: settings.balance,
        leverage: settings.leverage,
        risk_pct: settings.risk_pct,
        risk_budget,
        quantity,
        notional,
        margin,
        estimated_cost,
    })
}
