// Trading strategy module
pub mod displacement;
pub mod gaps;
pub mod resolver;
pub mod session;
pub mod structure;

use crate::error::DataError;
use crate::models::{Bias, Candle, Profile, Signal};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use self::displacement::find_latest_displacement;
use self::gaps::GapTracker;
use self::resolver::{resolve, ResolverInput};
use self::session::SessionTable;
use self::structure::classify_bias;

/// Why a cycle produced no trade. The expected steady state, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoSignalReason {
    NeutralBias,
    InsufficientData,
    NoDisplacement,
    NoGap,
    NotRetraced,
    OutsideSession,
    ZeroRisk,
    InvalidTarget,
}

impl fmt::Display for NoSignalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NoSignalReason::NeutralBias => "neutral bias",
            NoSignalReason::InsufficientData => "insufficient data",
            NoSignalReason::NoDisplacement => "no aligned displacement",
            NoSignalReason::NoGap => "no live aligned gap",
            NoSignalReason::NotRetraced => "price has not retraced into gap",
            NoSignalReason::OutsideSession => "outside session windows",
            NoSignalReason::ZeroRisk => "zero risk distance",
            NoSignalReason::InvalidTarget => "target on wrong side of entry",
        };
        f.write_str(s)
    }
}

/// Outcome of one strategy evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Signal(Signal),
    NoSignal(NoSignalReason),
}

impl Evaluation {
    pub fn signal(&self) -> Option<&Signal> {
        match self {
            Evaluation::Signal(signal) => Some(signal),
            Evaluation::NoSignal(_) => None,
        }
    }
}

/// Thresholds for one profile
#[derive(Debug, Clone)]
pub struct StrategyParams {
    pub profile: Profile,
    pub symbol: String,
    pub pivot_left_bars: usize,
    pub pivot_right_bars: usize,
    pub atr_period: usize,
    pub displacement_mult: f64,
    pub displacement_lookback: usize,
    pub max_gap_age: u32,
    pub entry_percent: f64,
    pub sessions: SessionTable,
}

impl StrategyParams {
    /// Built-in thresholds for `profile`
    pub fn for_profile(profile: Profile, symbol: &str) -> Self {
        let (displacement_mult, max_gap_age) = match profile {
            Profile::Ltf5m => (1.8, 24),
            Profile::Ltf15m => (1.5, 20),
        };
        Self {
            profile,
            symbol: symbol.to_string(),
            pivot_left_bars: 5,
            pivot_right_bars: 5,
            atr_period: 14,
            displacement_mult,
            displacement_lookback: 50,
            max_gap_age,
            entry_percent: 50.0,
            sessions: SessionTable::default(),
        }
    }
}

/// Base trait for trading strategies
pub trait Strategy: Send + Sync {
    /// Evaluate closed HTF and LTF candles at wall-clock `now`
    fn evaluate(&self, htf: &[Candle], ltf: &[Candle], now: DateTime<Utc>) -> Evaluation;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum LTF candles required for this strategy
    fn min_candles_required(&self) -> usize;
}

/// HTF swing bias + LTF displacement and fair value gap retracement.
///
/// Stateless between cycles: bias and gaps are rebuilt from the candles each
/// call, so every evaluation is a pure function of its inputs.
#[derive(Debug, Clone)]
pub struct StructureStrategy {
    params: StrategyParams,
}

impl StructureStrategy {
    pub fn new(params: StrategyParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// HTF bias for the current structure
    pub fn bias(&self, htf: &[Candle]) -> Bias {
        classify_bias(htf, self.params.pivot_left_bars, self.params.pivot_right_bars)
    }

    fn evaluate_inner(
        &self,
        htf: &[Candle],
        ltf: &[Candle],
        now: DateTime<Utc>,
    ) -> Result<Evaluation, DataError> {
        let p = &self.params;

        let bias = self.bias(htf);
        let Some(direction) = bias.direction() else {
            return Ok(Evaluation::NoSignal(NoSignalReason::NeutralBias));
        };

        let Some(last) = ltf.last() else {
            return Err(DataError::Insufficient { needed: self.min_candles_required(), got: 0 });
        };

        let displacement = find_latest_displacement(
            ltf,
            direction,
            p.atr_period,
            p.displacement_mult,
            p.displacement_lookback,
        )?;
        let tracker = GapTracker::replay(ltf, p.max_gap_age);

        tracing::debug!(
            %bias,
            displacement = ?displacement.as_ref().map(|d| d.index),
            live_gaps = tracker.live().len(),
            price = last.close,
            "LTF analysis"
        );

        let input = ResolverInput {
            profile: p.profile,
            symbol: &p.symbol,
            bias,
            displacement: displacement.as_ref(),
            gaps: tracker.live(),
            price: last.close,
            now,
        };

        Ok(resolve(&input, p.entry_percent, &p.sessions))
    }
}

impl Strategy for StructureStrategy {
    fn evaluate(&self, htf: &[Candle], ltf: &[Candle], now: DateTime<Utc>) -> Evaluation {
        match self.evaluate_inner(htf, ltf, now) {
            Ok(evaluation) => evaluation,
            Err(e) => {
                tracing::debug!("No signal: {}", e);
                Evaluation::NoSignal(NoSignalReason::InsufficientData)
            }
        }
    }

    fn name(&self) -> &str {
        "StructureStrategy"
    }

    fn min_candles_required(&self) -> usize {
        self.params.atr_period + 1
    }
}
