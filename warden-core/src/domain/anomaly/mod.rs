// warden-core/src/domain/anomaly/mod.rs

pub mod isolation;
pub mod seasonal;
pub mod zscore;

pub use isolation::IsolationSample;
pub use seasonal::{BucketLevel, SeasonalBaseline};
pub use zscore::{MetricState, ZScoreCheck, ZScoreError};

use crate::domain::error::DomainError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Scores above this are clipped; a flat history turns any move into an infinite z.
pub const SCORE_CAP: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Moving average / z-score over the training window.
    #[default]
    #[serde(alias = "moving_average", alias = "zscore")]
    ZScore,
    Seasonal,
    Isolation,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ZScore => "z_score",
            Self::Seasonal => "seasonal",
            Self::Isolation => "isolation",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "z_score" | "zscore" | "moving_average" => Ok(Self::ZScore),
            "seasonal" => Ok(Self::Seasonal),
            "isolation" => Ok(Self::Isolation),
            _ => Err(format!("Unknown anomaly model kind: {}", s)),
        }
    }
}

// --- SETTINGS ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AnomalySettings {
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,
    #[serde(default = "default_isolation_threshold")]
    pub isolation_threshold: f64,
    #[serde(default = "default_min_history")]
    pub min_history: usize,
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    #[serde(default = "default_forward_min_score")]
    pub forward_min_score: f64,
    #[serde(default = "default_forward_min_confidence")]
    pub forward_min_confidence: f64,
    #[serde(default = "default_seasonal_min_bucket")]
    pub seasonal_min_bucket: u64,
}

fn default_z_threshold() -> f64 {
    3.0
}
fn default_isolation_threshold() -> f64 {
    0.75
}
fn default_min_history() -> usize {
    7
}
fn default_window_days() -> u32 {
    30
}
fn default_forward_min_score() -> f64 {
    1.0
}
fn default_forward_min_confidence() -> f64 {
    0.5
}
fn default_seasonal_min_bucket() -> u64 {
    3
}

impl Default for AnomalySettings {
    fn default() -> Self {
        Self {
            z_threshold: default_z_threshold(),
            isolation_threshold: default_isolation_threshold(),
            min_history: default_min_history(),
            window_days: default_window_days(),
            forward_min_score: default_forward_min_score(),
            forward_min_confidence: default_forward_min_confidence(),
            seasonal_min_bucket: default_seasonal_min_bucket(),
        }
    }
}

// --- MODEL ---

/// One point of a rule's observed-value series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub at: DateTime<Utc>,
    pub value: f64,
}

impl Observation {
    pub fn new(at: DateTime<Utc>, value: f64) -> Self {
        Self { at, value }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelParams {
    ZScore { baseline: MetricState, threshold: f64 },
    Seasonal { baseline: SeasonalBaseline, threshold: f64 },
    Isolation { sample: IsolationSample, threshold: f64 },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AnomalyModel {
    pub id: Uuid,
    pub rule_id: String,
    /// "source.schema.table" the rule observes.
    pub scope: String,
    pub kind: ModelKind,
    pub window_days: u32,
    pub trained_at: DateTime<Utc>,
    /// Points inside the window used for training.
    pub points: usize,
    pub params: ModelParams,
}

impl AnomalyModel {
    /// Fits a model on the points of `history` inside the window ending at `now`.
    pub fn train(
        rule_id: &str,
        scope: &str,
        kind: ModelKind,
        window_days: u32,
        history: &[Observation],
        settings: &AnomalySettings,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let since = now - Duration::days(i64::from(window_days));
        let mut window: Vec<Observation> = history
            .iter()
            .filter(|o| o.at >= since && o.at <= now && o.value.is_finite())
            .copied()
            .collect();
        window.sort_by_key(|o| o.at);

        if window.len() < settings.min_history.max(2) {
            return Err(DomainError::InsufficientHistory {
                rule_id: rule_id.to_string(),
                points: window.len(),
                required: settings.min_history.max(2),
            });
        }

        let params = match kind {
            ModelKind::ZScore => ModelParams::ZScore {
                baseline: ZScoreCheck::fit(rule_id, window.iter().map(|o| o.value), settings.z_threshold),
                threshold: settings.z_threshold,
            },
            ModelKind::Seasonal => {
                let points: Vec<_> = window.iter().map(|o| (o.at, o.value)).collect();
                ModelParams::Seasonal {
                    baseline: SeasonalBaseline::fit(
                        rule_id,
                        &points,
                        settings.z_threshold,
                        settings.seasonal_min_bucket,
                    ),
                    threshold: settings.z_threshold,
                }
            }
            ModelKind::Isolation => {
                let values: Vec<f64> = window.iter().map(|o| o.value).collect();
                ModelParams::Isolation {
                    sample: IsolationSample::fit(&values),
                    threshold: settings.isolation_threshold,
                }
            }
        };

        Ok(Self {
            id: Uuid::new_v4(),
            rule_id: rule_id.to_string(),
            scope: scope.to_string(),
            kind,
            window_days,
            trained_at: now,
            points: window.len(),
            params,
        })
    }

    /// Scores one observation. Does not change the model.
    pub fn predict(&self, observation: &Observation, result_id: Option<Uuid>) -> Prediction {
        let (predicted_value, raw_score, support) = match &self.params {
            ModelParams::ZScore { baseline, threshold } => {
                z_component(&self.rule_id, observation.value, baseline, *threshold)
            }
            ModelParams::Seasonal { baseline, threshold } => {
                let (state, _) = baseline.baseline_for(&observation.at);
                z_component(&self.rule_id, observation.value, state, *threshold)
            }
            ModelParams::Isolation { sample, threshold } => {
                let s = sample.score(observation.value);
                let normalised = if *threshold > 0.0 { s / threshold } else { 0.0 };
                (sample.median(), normalised, sample.values.len() as u64)
            }
        };

        let score = raw_score.clamp(0.0, SCORE_CAP);
        Prediction {
            id: Uuid::new_v4(),
            model_id: self.id,
            rule_id: self.rule_id.clone(),
            result_id,
            predicted_at: observation.at,
            predicted_value,
            observed_value: observation.value,
            score,
            confidence: confidence(support),
            is_anomaly: score > 1.0,
        }
    }
}

/// (expected value, |z| / threshold, points behind the baseline)
fn z_component(metric: &str, value: f64, state: &MetricState, threshold: f64) -> (f64, f64, u64) {
    let threshold = if threshold > 0.0 { threshold } else { default_z_threshold() };
    let z = match ZScoreCheck::validate(metric, value, state, threshold) {
        Ok(z) => z,
        Err(ZScoreError::AnomalyDetected { z_score, .. }) => z_score,
        Err(ZScoreError::NotEnoughHistory(_)) => 0.0,
    };
    (state.mean, z / threshold, state.count)
}

/// 1 - 1/sqrt(n), clamped to [0, 1].
pub fn confidence(points: u64) -> f64 {
    if points == 0 {
        return 0.0;
    }
    (1.0 - 1.0 / (points as f64).sqrt()).clamp(0.0, 1.0)
}

// --- PREDICTION ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Prediction {
    pub id: Uuid,
    pub model_id: Uuid,
    pub rule_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<Uuid>,
    pub predicted_at: DateTime<Utc>,
    pub predicted_value: f64,
    pub observed_value: f64,
    /// 1.0 = at the model's own threshold.
    pub score: f64,
    pub confidence: f64,
    pub is_anomaly: bool,
}

impl Prediction {
    /// Strong enough to become an anomaly-sourced issue.
    pub fn should_forward(&self, settings: &AnomalySettings) -> bool {
        self.is_anomaly
            && self.score >= settings.forward_min_score
            && self.confidence >= settings.forward_min_confidence
    }

    pub fn describe(&self) -> String {
        format!(
            "Anomalous value {:.4} (expected ~{:.4}, score {:.2}, confidence {:.2})",
            self.observed_value, self.predicted_value, self.score, self.confidence
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn daily(values: &[f64]) -> (Vec<Observation>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 6, 0, 0).unwrap();
        let obs = values
            .iter()
            .enumerate()
            .map(|(i, v)| Observation::new(start + Duration::days(i as i64), *v))
            .collect();
        (obs, start + Duration::days(values.len() as i64))
    }

    #[test]
    fn test_insufficient_history() {
        let (history, now) = daily(&[1.0, 2.0, 3.0]);
        let err = AnomalyModel::train("r1", "wh.public.orders", ModelKind::ZScore, 30, &history, &AnomalySettings::default(), now)
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientHistory { points: 3, required: 7, .. }));
    }

    #[test]
    fn test_window_excludes_old_points() {
        let (history, now) = daily(&[10.0; 40]);
        let model = AnomalyModel::train("r1", "s", ModelKind::ZScore, 14, &history, &AnomalySettings::default(), now).unwrap();
        assert_eq!(model.points, 14);
    }

    #[test]
    fn test_zscore_prediction_normalised_to_threshold() -> anyhow::Result<()> {
        let (history, now) = daily(&[98.0, 102.0, 98.0, 102.0, 98.0, 102.0, 98.0, 102.0]);
        let model = AnomalyModel::train("r1", "s", ModelKind::ZScore, 30, &history, &AnomalySettings::default(), now)?;

        // mean 100, stddev 2: 106 is exactly 3 sigmas away.
        let at_threshold = model.predict(&Observation::new(now, 106.0), None);
        assert!((at_threshold.score - 1.0).abs() < 1e-9);
        assert!(!at_threshold.is_anomaly);

        let spike = model.predict(&Observation::new(now, 140.0), None);
        assert!(spike.is_anomaly);
        assert_eq!(spike.predicted_value, 100.0);
        assert!((spike.confidence - (1.0 - 1.0 / 8f64.sqrt())).abs() < 1e-9);
        assert!(spike.should_forward(&AnomalySettings::default()));
        Ok(())
    }

    #[test]
    fn test_flat_history_is_capped() -> anyhow::Result<()> {
        let (history, now) = daily(&[0.0; 10]);
        let model = AnomalyModel::train("r1", "s", ModelKind::ZScore, 30, &history, &AnomalySettings::default(), now)?;
        let p = model.predict(&Observation::new(now, 3.0), None);
        assert_eq!(p.score, SCORE_CAP);
        assert!(p.is_anomaly);
        Ok(())
    }

    #[test]
    fn test_isolation_model_flags_outlier() -> anyhow::Result<()> {
        let values: Vec<f64> = (0..30).map(|i| 100.0 + f64::from(i)).collect();
        let (history, now) = daily(&values);
        let model = AnomalyModel::train("r1", "s", ModelKind::Isolation, 60, &history, &AnomalySettings::default(), now)?;
        assert!(!model.predict(&Observation::new(now, 114.5), None).is_anomaly);
        assert!(model.predict(&Observation::new(now, 900.0), None).is_anomaly);
        Ok(())
    }

    #[test]
    fn test_low_confidence_is_not_forwarded() {
        let p = Prediction {
            id: Uuid::new_v4(),
            model_id: Uuid::new_v4(),
            rule_id: "r1".into(),
            result_id: None,
            predicted_at: Utc::now(),
            predicted_value: 1.0,
            observed_value: 50.0,
            score: 4.0,
            confidence: 0.2,
            is_anomaly: true,
        };
        assert!(!p.should_forward(&AnomalySettings::default()));
    }

    #[test]
    fn test_model_kind_yaml_aliases() -> anyhow::Result<()> {
        let kind: ModelKind = serde_yaml::from_str("moving_average")?;
        assert_eq!(kind, ModelKind::ZScore);
        assert_eq!(serde_yaml::to_string(&ModelKind::Seasonal)?.trim(), "seasonal");
        Ok(())
    }
}
