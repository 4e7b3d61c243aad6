// warden-core/src/domain/anomaly/seasonal.rs

use super::zscore::{MetricState, ZScoreCheck};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which bucket a seasonal prediction was measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketLevel {
    WeekdayHour,
    Hour,
    Global,
}

/// Hour-of-day / day-of-week baselines, each a Welford state.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct SeasonalBaseline {
    pub global: MetricState,
    /// Key: "00".."23".
    pub by_hour: BTreeMap<String, MetricState>,
    /// Key: "mon-14", "sat-03", ...
    pub by_slot: BTreeMap<String, MetricState>,
    pub min_bucket: u64,
}

fn hour_key(at: &DateTime<Utc>) -> String {
    format!("{:02}", at.hour())
}

fn slot_key(at: &DateTime<Utc>) -> String {
    format!("{}-{:02}", at.weekday().to_string().to_lowercase(), at.hour())
}

impl SeasonalBaseline {
    pub fn fit(metric: &str, points: &[(DateTime<Utc>, f64)], threshold: f64, min_bucket: u64) -> Self {
        let mut hours: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut slots: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (at, value) in points {
            hours.entry(hour_key(at)).or_default().push(*value);
            slots.entry(slot_key(at)).or_default().push(*value);
        }

        Self {
            global: ZScoreCheck::fit(metric, points.iter().map(|(_, v)| *v), threshold),
            by_hour: hours
                .into_iter()
                .map(|(k, values)| (k, ZScoreCheck::fit(metric, values, threshold)))
                .collect(),
            by_slot: slots
                .into_iter()
                .map(|(k, values)| (k, ZScoreCheck::fit(metric, values, threshold)))
                .collect(),
            min_bucket,
        }
    }

    /// Most specific bucket with enough points: (weekday, hour), then hour, then global.
    pub fn baseline_for(&self, at: &DateTime<Utc>) -> (&MetricState, BucketLevel) {
        if let Some(state) = self.by_slot.get(&slot_key(at))
            && state.count >= self.min_bucket
        {
            return (state, BucketLevel::WeekdayHour);
        }
        if let Some(state) = self.by_hour.get(&hour_key(at))
            && state.count >= self.min_bucket
        {
            return (state, BucketLevel::Hour);
        }
        (&self.global, BucketLevel::Global)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_bucket_fallback_order() {
        // Monday 2026-03-02, one point per hour for two weeks; nightly loads at 02:00 are big.
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        let points: Vec<_> = (0..24 * 14)
            .map(|h| {
                let at = start + Duration::hours(h);
                let value = if at.hour() == 2 { 1_000.0 } else { 10.0 };
                (at, value)
            })
            .collect();

        let baseline = SeasonalBaseline::fit("row_count", &points, 3.0, 2);

        let monday_two = start + Duration::weeks(2) + Duration::hours(2);
        let (state, level) = baseline.baseline_for(&monday_two);
        assert_eq!(level, BucketLevel::WeekdayHour);
        assert_eq!(state.mean, 1_000.0);

        let strict = SeasonalBaseline { min_bucket: 3, ..baseline.clone() };
        let (state, level) = strict.baseline_for(&monday_two);
        assert_eq!(level, BucketLevel::Hour);
        assert_eq!(state.count, 14);

        let global_only = SeasonalBaseline { min_bucket: 100, ..baseline };
        assert_eq!(global_only.baseline_for(&monday_two).1, BucketLevel::Global);
    }
}
