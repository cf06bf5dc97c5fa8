use crate::models::{Candle, Timeframe};

/// Build higher-timeframe bars from lower-timeframe bars.
///
/// Bars are bucketed by the HTF boundary their open time falls in. Only
/// complete buckets are emitted, so a partially formed HTF bar never leaks
/// into bias classification.
pub fn aggregate(ltf: &[Candle], htf: Timeframe) -> Vec<Candle> {
    let Some(first) = ltf.first() else {
        return Vec::new();
    };
    let ltf_secs = first.timeframe.as_secs();
    let htf_secs = htf.as_secs();
    if htf_secs <= ltf_secs || htf_secs % ltf_secs != 0 {
        return Vec::new();
    }
    let per_bucket = (htf_secs / ltf_secs) as usize;

    let bucket_of = |c: &Candle| c.open_time.timestamp().div_euclid(htf_secs);

    let mut out = Vec::new();
    let mut start = 0;
    while start < ltf.len() {
        let bucket = bucket_of(&ltf[start]);
        let end = ltf[start..]
            .iter()
            .position(|c| bucket_of(c) != bucket)
            .map_or(ltf.len(), |offset| start + offset);

        let group = &ltf[start..end];
        if group.len() == per_bucket {
            let open_time = group[0].open_time
                - chrono::Duration::seconds(group[0].open_time.timestamp().rem_euclid(htf_secs));
            out.push(Candle {
                open_time,
                open: group[0].open,
                high: group.iter().map(|c| c.high).fold(f64::MIN, f64::max),
                low: group.iter().map(|c| c.low).fold(f64::MAX, f64::min),
                close: group[group.len() - 1].close,
                volume: group.iter().map(|c| c.volume).sum(),
                timeframe: htf,
            });
        }
        start = end;
    }

    out
}
