use crate::models::{Candle, Timeframe};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady uptrend with noise
    Uptrend,
    /// Steady downtrend with noise
    Downtrend,
    /// Mean-reverting chop around the base price
    Sideways,
    /// Large random swings
    Volatile,
    /// Impulse legs up with shallow pullbacks (higher highs, higher lows)
    SwingUp,
    /// Mirror of `SwingUp`
    SwingDown,
}

impl MarketScenario {
    pub fn all() -> [MarketScenario; 6] {
        [
            MarketScenario::Uptrend,
            MarketScenario::Downtrend,
            MarketScenario::Sideways,
            MarketScenario::Volatile,
            MarketScenario::SwingUp,
            MarketScenario::SwingDown,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            MarketScenario::Uptrend => "📈 Uptrend",
            MarketScenario::Downtrend => "📉 Downtrend",
            MarketScenario::Sideways => "↔️  Sideways",
            MarketScenario::Volatile => "⚡ Volatile",
            MarketScenario::SwingUp => "🪜 Swing up (impulse + pullback)",
            MarketScenario::SwingDown => "🪂 Swing down (impulse + pullback)",
        }
    }
}

/// Seeded OHLCV generator for offline backtests
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
}

impl SyntheticDataGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 0.60,
            base_volume: 1_000_000.0,
        }
    }

    /// Generate `num_candles` contiguous bars starting at `start`.
    ///
    /// Each bar opens at the previous close, so gaps only appear where the
    /// scenario moves price faster than the intrabar noise.
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        num_candles: usize,
        timeframe: Timeframe,
        start: DateTime<Utc>,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_candles);
        let mut price = self.base_price;

        for i in 0..num_candles {
            let open_time = start + Duration::seconds(i as i64 * timeframe.as_secs());
            let step = self.step(scenario, i, price);
            let close = (price + step).max(self.base_price * 0.05);

            candles.push(self.create_candle(price, close, open_time, timeframe));
            price = close;
        }

        candles
    }

    /// Price change for bar `i`
    fn step(&mut self, scenario: MarketScenario, i: usize, price: f64) -> f64 {
        match scenario {
            MarketScenario::Uptrend => price * (0.0008 + self.rng.gen_range(-0.001..0.001)),
            MarketScenario::Downtrend => price * (-0.0008 + self.rng.gen_range(-0.001..0.001)),
            MarketScenario::Sideways => {
                (self.base_price - price) * 0.1 + price * self.rng.gen_range(-0.004..0.004)
            }
            MarketScenario::Volatile => price * self.rng.gen_range(-0.02..0.02),
            MarketScenario::SwingUp | MarketScenario::SwingDown => {
                // 5 impulse bars then 9 pullback bars
                let sign = if scenario == MarketScenario::SwingUp { 1.0 } else { -1.0 };
                let leg = if i % 14 < 5 { 0.012 } else { -0.003 };
                price * sign * (leg + self.rng.gen_range(-0.0005..0.0005))
            }
        }
    }

    fn create_candle(
        &mut self,
        open: f64,
        close: f64,
        open_time: DateTime<Utc>,
        timeframe: Timeframe,
    ) -> Candle {
        let wick = 0.001; // up to 0.1% beyond the body
        let high = open.max(close) * (1.0 + self.rng.gen_range(0.0..wick));
        let low = open.min(close) * (1.0 - self.rng.gen_range(0.0..wick));
        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

        Candle {
            open_time,
            open,
            high,
            low,
            close,
            volume,
            timeframe,
        }
    }
}
