// warden-core/src/domain/anomaly/zscore.rs

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Running mean/variance (Welford), persisted inside trained models.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct MetricState {
    pub mean: f64,
    pub variance: f64,
    pub count: u64,
}

impl MetricState {
    pub fn stddev(&self) -> f64 {
        self.variance.sqrt()
    }
}

#[derive(Debug, Error)]
pub enum ZScoreError {
    #[error(
        "Z-Score anomaly detected on '{metric}': Score {z_score:.2} exceeds threshold {threshold:.2}. State: Mean {mean:.4}, StdDev {stddev:.4}, Current {current:.4}"
    )]
    AnomalyDetected {
        metric: String,
        z_score: f64,
        threshold: f64,
        current: f64,
        mean: f64,
        stddev: f64,
    },
    #[error("Not enough history for Z-Score check on '{0}' (need at least 2 points)")]
    NotEnoughHistory(String),
}

const FLAT_EPSILON: f64 = 1e-9;

pub struct ZScoreCheck;

impl ZScoreCheck {
    /// Checks a new value against the distribution and returns |z|.
    /// Does NOT modify state.
    pub fn validate(
        metric_name: &str,
        current_value: f64,
        state: &MetricState,
        threshold: f64,
    ) -> Result<f64, ZScoreError> {
        if state.count < 2 {
            return Err(ZScoreError::NotEnoughHistory(metric_name.to_string()));
        }

        let stddev = state.stddev();
        let deviation = (current_value - state.mean).abs();
        let z_score = if stddev > FLAT_EPSILON {
            deviation / stddev
        } else if deviation > FLAT_EPSILON {
            // Flat history: any move is infinitely many sigmas away.
            f64::INFINITY
        } else {
            0.0
        };

        if z_score > threshold {
            return Err(ZScoreError::AnomalyDetected {
                metric: metric_name.to_string(),
                z_score,
                threshold,
                current: current_value,
                mean: state.mean,
                stddev,
            });
        }
        Ok(z_score)
    }

    /// Welford's online update.
    pub fn update_state(current_value: f64, state: Option<MetricState>) -> MetricState {
        let mut s = state.unwrap_or_default();
        s.count += 1;
        if s.count == 1 {
            s.mean = current_value;
            s.variance = 0.0;
        } else {
            let old_mean = s.mean;
            s.mean += (current_value - old_mean) / (s.count as f64);
            // M2_new = M2_old + (x - old_mean) * (x - new_mean)
            let prev_m2 = s.variance * (s.count - 1) as f64;
            let new_m2 = prev_m2 + (current_value - old_mean) * (current_value - s.mean);
            s.variance = new_m2 / s.count as f64;
        }
        s
    }

    /// Validates, then folds the value into the state only if it is clean.
    /// Anomalous values never pollute the baseline.
    pub fn validate_and_update(
        metric_name: &str,
        current_value: f64,
        previous_state: Option<MetricState>,
        threshold: f64,
    ) -> (Result<f64, ZScoreError>, MetricState) {
        let res = match &previous_state {
            None => Err(ZScoreError::NotEnoughHistory(metric_name.to_string())),
            Some(s) => Self::validate(metric_name, current_value, s, threshold),
        };

        let new_state = match &res {
            Ok(_) | Err(ZScoreError::NotEnoughHistory(_)) => {
                Self::update_state(current_value, previous_state)
            }
            Err(ZScoreError::AnomalyDetected { .. }) => previous_state.unwrap_or_default(),
        };

        (res, new_state)
    }

    /// Baseline over a series, skipping values that were already anomalous when they arrived.
    pub fn fit<I: IntoIterator<Item = f64>>(metric_name: &str, values: I, threshold: f64) -> MetricState {
        let mut state: Option<MetricState> = None;
        for value in values {
            let (_, next) = Self::validate_and_update(metric_name, value, state, threshold);
            state = Some(next);
        }
        state.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zscore_no_history() {
        let (res, new_state) = ZScoreCheck::validate_and_update("rows_failed", 0.5, None, 3.0);
        assert!(matches!(res, Err(ZScoreError::NotEnoughHistory(_))));
        assert_eq!(new_state.count, 1);
        assert_eq!(new_state.mean, 0.5);
    }

    #[test]
    fn test_zscore_anomaly_is_not_ingested() {
        let state = MetricState {
            mean: 0.5,
            variance: 0.01,
            count: 10,
        };
        let (res, after) = ZScoreCheck::validate_and_update("null_rate", 0.9, Some(state.clone()), 3.0);
        assert!(matches!(
            res,
            Err(ZScoreError::AnomalyDetected { z_score, .. }) if (z_score - 4.0).abs() < 1e-6
        ));
        assert_eq!(after, state);
    }

    #[test]
    fn test_flat_history_flags_any_move() {
        let state = ZScoreCheck::fit("rows_failed", [0.0; 8], 3.0);
        assert_eq!(state.count, 8);
        assert!(ZScoreCheck::validate("rows_failed", 0.0, &state, 3.0).is_ok());
        assert!(ZScoreCheck::validate("rows_failed", 40.0, &state, 3.0).is_err());
    }

    #[test]
    fn test_fit_skips_past_spikes() {
        let values = [100.0, 102.0, 98.0, 101.0, 99.0, 5_000.0, 100.0, 101.0];
        let state = ZScoreCheck::fit("row_count", values, 3.0);
        assert_eq!(state.count, 7);
        assert!(state.mean < 101.0);
    }
}
