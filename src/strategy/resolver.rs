use super::displacement::Displacement;
use super::gaps::Gap;
use super::session::SessionTable;
use super::{Evaluation, NoSignalReason};
use crate::models::{Bias, Direction, Profile, Signal};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Everything the resolver looks at for one cycle
#[derive(Debug, Clone)]
pub struct ResolverInput<'a> {
    pub profile: Profile,
    pub symbol: &'a str,
    pub bias: Bias,
    pub displacement: Option<&'a Displacement>,
    /// Live gaps in formation order
    pub gaps: &'a [Gap],
    pub price: f64,
    pub now: DateTime<Utc>,
}

/// Turn one cycle's analysis into a signal or a no-signal reason.
///
/// Gaps are tried newest first; the first aligned gap with a qualifying
/// displacement and enough retracement wins. Entry is the gap's
/// `entry_percent` level, not the price that crossed it.
pub fn resolve(
    input: &ResolverInput<'_>,
    entry_percent: f64,
    sessions: &SessionTable,
) -> Evaluation {
    let Some(direction) = input.bias.direction() else {
        return Evaluation::NoSignal(NoSignalReason::NeutralBias);
    };

    let Some((session, rr)) = sessions.resolve(input.now) else {
        return Evaluation::NoSignal(NoSignalReason::OutsideSession);
    };

    let Some(displacement) = input.displacement.filter(|d| d.direction == direction) else {
        return Evaluation::NoSignal(NoSignalReason::NoDisplacement);
    };

    let threshold = entry_percent / 100.0;
    let mut reason = NoSignalReason::NoGap;

    for gap in input.gaps.iter().rev().filter(|g| g.direction == direction) {
        // Displacement may sit on the gap's middle (impulse) candle, one
        // index before `formed_at_index`; anything earlier predates the gap
        if displacement.index + 1 < gap.formed_at_index {
            if reason == NoSignalReason::NoGap {
                reason = NoSignalReason::NoDisplacement;
            }
            continue;
        }

        if gap.retracement(input.price) < threshold {
            reason = NoSignalReason::NotRetraced;
            continue;
        }

        // Price reaching the level is the trigger; the level is the entry
        let entry = gap.entry_level(threshold);
        let stop = gap.stop_edge();
        let risk = (entry - stop).abs();
        if risk <= 0.0 {
            return Evaluation::NoSignal(NoSignalReason::ZeroRisk);
        }

        let target = match direction {
            Direction::Long => entry + rr * risk,
            Direction::Short => entry - rr * risk,
        };
        let target_ok = match direction {
            Direction::Long => target > entry && stop < entry,
            Direction::Short => target < entry && stop > entry,
        };
        if !target_ok {
            return Evaluation::NoSignal(NoSignalReason::InvalidTarget);
        }

        let signal = Signal {
            id: Uuid::new_v4(),
            profile: input.profile,
            symbol: input.symbol.to_string(),
            timestamp: input.now,
            direction,
            entry,
            stop,
            target,
            rr,
            reason: format!(
                "bias={} session={} gap=[{:.6}, {:.6}] age={} disp_idx={}",
                input.bias, session, gap.lower, gap.upper, gap.age_bars, displacement.index
            ),
        };

        tracing::info!(
            "🎯 Signal: {} {} entry={:.6} sl={:.6} tp={:.6} RR={}",
            direction,
            signal.symbol,
            entry,
            stop,
            target,
            rr
        );
        return Evaluation::Signal(signal);
    }

    Evaluation::NoSignal(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bullish_gap(formed_at_index: usize, lower: f64, upper: f64, age_bars: u32) -> Gap {
        Gap {
            direction: Direction::Long,
            upper,
            lower,
            formed_at_index,
            age_bars,
        }
    }

    fn impulse(index: usize, direction: Direction) -> Displacement {
        Displacement {
            index,
            direction,
            body: 2.0,
            atr: 1.0,
        }
    }

    fn input<'a>(
        bias: Bias,
        displacement: Option<&'a Displacement>,
        gaps: &'a [Gap],
        price: f64,
        hour: u32,
    ) -> ResolverInput<'a> {
        ResolverInput {
            profile: Profile::Ltf5m,
            symbol: "ADAUSDT",
            bias,
            displacement,
            gaps,
            price,
            now: Utc.with_ymd_and_hms(2024, 3, 4, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_long_signal_in_overlap() {
        let gaps = vec![bullish_gap(20, 98.0, 100.0, 10)];
        let disp = impulse(19, Direction::Long);

        let eval = resolve(
            &input(Bias::Bullish, Some(&disp), &gaps, 99.0, 14),
            50.0,
            &SessionTable::default(),
        );

        let Evaluation::Signal(signal) = eval else {
            panic!("expected signal, got {:?}", eval);
        };
        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.entry, 99.0);
        assert_eq!(signal.stop, 98.0);
        assert_eq!(signal.target, 103.0);
        assert_eq!(signal.rr, 4.0);
    }

    #[test]
    fn test_deep_retrace_enters_at_gap_level() {
        let gaps = vec![bullish_gap(20, 98.0, 100.0, 4)];
        let disp = impulse(19, Direction::Long);

        let eval = resolve(
            &input(Bias::Bullish, Some(&disp), &gaps, 98.01, 14),
            50.0,
            &SessionTable::default(),
        );

        let Evaluation::Signal(signal) = eval else {
            panic!("expected signal, got {:?}", eval);
        };
        assert_eq!(signal.entry, 99.0);
        assert_eq!(signal.stop, 98.0);
        assert_eq!(signal.target, 103.0);

        let plan = crate::risk::size_position(
            &crate::risk::RiskSettings::default(),
            crate::models::VenueKind::IntegerContract,
            signal.entry,
            signal.stop,
        )
        .unwrap();
        assert_eq!(plan.quantity, 60.0);
    }

    #[test]
    fn test_short_entry_level_ignores_overshoot() {
        let gaps = vec![Gap {
            direction: Direction::Short,
            upper: 102.0,
            lower: 100.0,
            formed_at_index: 20,
            age_bars: 1,
        }];
        let disp = impulse(19, Direction::Short);
        let eval = resolve(
            &input(Bias::Bearish, Some(&disp), &gaps, 101.9, 18),
            50.0,
            &SessionTable::default(),
        );

        let Evaluation::Signal(signal) = eval else {
            panic!("expected signal");
        };
        assert_eq!(signal.entry, 101.0);
        assert_eq!(signal.target, 98.0);
    }

    #[test]
    fn test_neutral_bias_never_signals() {
        let gaps = vec![bullish_gap(20, 98.0, 100.0, 0)];
        let disp = impulse(19, Direction::Long);
        let eval = resolve(
            &input(Bias::Neutral, Some(&disp), &gaps, 99.0, 14),
            50.0,
            &SessionTable::default(),
        );
        assert_eq!(eval, Evaluation::NoSignal(NoSignalReason::NeutralBias));
    }

    #[test]
    fn test_outside_sessions_is_no_signal() {
        let gaps = vec![bullish_gap(20, 98.0, 100.0, 0)];
        let disp = impulse(19, Direction::Long);
        let eval = resolve(
            &input(Bias::Bullish, Some(&disp), &gaps, 99.0, 3),
            50.0,
            &SessionTable::default(),
        );
        assert_eq!(eval, Evaluation::NoSignal(NoSignalReason::OutsideSession));
    }

    #[test]
    fn test_shallow_retrace_is_rejected() {
        let gaps = vec![bullish_gap(20, 98.0, 100.0, 0)];
        let disp = impulse(19, Direction::Long);
        // (100 - 99.5) / 2 = 0.25 < 0.5
        let eval = resolve(
            &input(Bias::Bullish, Some(&disp), &gaps, 99.5, 14),
            50.0,
            &SessionTable::default(),
        );
        assert_eq!(eval, Evaluation::NoSignal(NoSignalReason::NotRetraced));
    }

    #[test]
    fn test_displacement_before_gap_is_rejected() {
        let gaps = vec![bullish_gap(30, 98.0, 100.0, 0)];
        let disp = impulse(10, Direction::Long);
        let eval = resolve(
            &input(Bias::Bullish, Some(&disp), &gaps, 99.0, 14),
            50.0,
            &SessionTable::default(),
        );
        assert_eq!(eval, Evaluation::NoSignal(NoSignalReason::NoDisplacement));
    }

    #[test]
    fn test_misaligned_displacement_is_rejected() {
        let gaps = vec![bullish_gap(20, 98.0, 100.0, 0)];
        let disp = impulse(19, Direction::Short);
        let eval = resolve(
            &input(Bias::Bullish, Some(&disp), &gaps, 99.0, 14),
            50.0,
            &SessionTable::default(),
        );
        assert_eq!(eval, Evaluation::NoSignal(NoSignalReason::NoDisplacement));
    }

    #[test]
    fn test_zero_risk_is_rejected() {
        let gaps = vec![bullish_gap(20, 98.0, 100.0, 0)];
        let disp = impulse(19, Direction::Long);
        // A 100% level puts the entry on the stop edge
        let eval = resolve(
            &input(Bias::Bullish, Some(&disp), &gaps, 98.0, 14),
            100.0,
            &SessionTable::default(),
        );
        assert_eq!(eval, Evaluation::NoSignal(NoSignalReason::ZeroRisk));
    }

    #[test]
    fn test_most_recent_gap_wins() {
        let gaps = vec![
            bullish_gap(20, 97.0, 101.0, 8),
            bullish_gap(25, 98.0, 100.0, 3),
        ];
        let disp = impulse(24, Direction::Long);
        let eval = resolve(
            &input(Bias::Bullish, Some(&disp), &gaps, 99.0, 14),
            50.0,
            &SessionTable::default(),
        );

        let Evaluation::Signal(signal) = eval else {
            panic!("expected signal");
        };
        assert_eq!(signal.stop, 98.0);
    }

    #[test]
    fn test_short_signal_mirror() {
        let gaps = vec![Gap {
            direction: Direction::Short,
            upper: 102.0,
            lower: 100.0,
            formed_at_index: 20,
            age_bars: 2,
        }];
        let disp = impulse(19, Direction::Short);
        let eval = resolve(
            &input(Bias::Bearish, Some(&disp), &gaps, 101.0, 18),
            50.0,
            &SessionTable::default(),
        );

        let Evaluation::Signal(signal) = eval else {
            panic!("expected signal");
        };
        assert_eq!(signal.stop, 102.0);
        assert_eq!(signal.target, 98.0); // 101 - 3 x 1
        assert_eq!(signal.rr, 3.0);
    }
}
