// warden-core/src/application/anomaly.rs

// Batch training over result history, and scoring of new results.
// Training is decoupled from execution: a stale model only means stale baselines.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};

use crate::application::lifecycle::IssueLifecycleManager;
use crate::domain::anomaly::{AnomalyModel, AnomalySettings, ModelKind, Observation, Prediction};
use crate::domain::issue::Issue;
use crate::domain::ports::{AnomalyStore, ResultHistory};
use crate::domain::quality::{Rule, RuleCatalog, RuleExecutionResult, RuleKind};
use crate::error::WardenError;

pub struct AnomalyService {
    history: Arc<dyn ResultHistory>,
    store: Arc<dyn AnomalyStore>,
    settings: AnomalySettings,
}

impl AnomalyService {
    pub fn new(history: Arc<dyn ResultHistory>, store: Arc<dyn AnomalyStore>, settings: AnomalySettings) -> Self {
        Self {
            history,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &AnomalySettings {
        &self.settings
    }

    /// `train(scope, windowDays)`: fits a model on the rule's non-error results and makes it current.
    #[instrument(skip(self, rule), fields(rule = %rule.id))]
    pub fn train(
        &self,
        rule: &Rule,
        kind: Option<ModelKind>,
        window_days: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<AnomalyModel, WardenError> {
        let window_days = window_days.unwrap_or(self.settings.window_days);
        let kind = kind.unwrap_or(match &rule.kind {
            RuleKind::StatisticalAnomaly { model, .. } => *model,
            _ => ModelKind::default(),
        });

        let since = now - Duration::days(i64::from(window_days));
        let observations: Vec<Observation> = self
            .history
            .history(&rule.id, Some(since))?
            .iter()
            .filter_map(|r| r.observed_value().map(|v| Observation::new(r.executed_at, v)))
            .collect();

        let model = AnomalyModel::train(
            &rule.id,
            &rule.scope.label(),
            kind,
            window_days,
            &observations,
            &self.settings,
            now,
        )?;
        self.store.save_model(&model)?;
        info!(model = %model.id, kind = %model.kind, points = model.points, "🧠 Model trained");
        Ok(model)
    }

    /// Retrains every statistical rule. Rules without enough history are reported, not fatal.
    pub fn train_all(
        &self,
        rules: &RuleCatalog,
        now: DateTime<Utc>,
    ) -> Vec<(String, Result<AnomalyModel, WardenError>)> {
        rules
            .enabled()
            .into_iter()
            .filter(|r| matches!(r.kind, RuleKind::StatisticalAnomaly { .. }))
            .map(|r| (r.id.clone(), self.train(r, None, None, now)))
            .collect()
    }

    /// Prediction for a fresh result.
    ///
    /// Statistical rules were already scored by the engine; other rules are scored here
    /// when a model has been trained for them.
    pub fn observe(&self, rule: &Rule, result: &RuleExecutionResult) -> Result<Option<Prediction>, WardenError> {
        let Some(value) = result.observed_value() else {
            return Ok(None);
        };
        if matches!(rule.kind, RuleKind::StatisticalAnomaly { .. }) {
            let recorded = self
                .store
                .predictions(Some(&rule.id), 0.0, 1)?
                .into_iter()
                .find(|p| p.result_id == Some(result.id));
            return Ok(recorded);
        }

        let Some(model) = self.store.current_model(&rule.id)? else {
            return Ok(None);
        };
        let prediction = model.predict(&Observation::new(result.executed_at, value), Some(result.id));
        self.store.append_prediction(&prediction)?;
        debug!(rule = %rule.id, score = prediction.score, "Result scored");
        Ok(Some(prediction))
    }

    /// Hands a strong prediction to the lifecycle manager as an anomaly-sourced issue.
    pub fn forward(
        &self,
        rule: &Rule,
        prediction: &Prediction,
        lifecycle: &IssueLifecycleManager,
    ) -> Result<Option<Issue>, WardenError> {
        if !prediction.should_forward(&self.settings) {
            return Ok(None);
        }
        warn!(rule = %rule.id, score = prediction.score, "📈 {}", prediction.describe());
        lifecycle.record_anomaly(rule, prediction).map(Some)
    }

    /// Recent predictions at or above `min_score`, newest first.
    pub fn recent(&self, rule_id: Option<&str>, min_score: f64, limit: usize) -> Result<Vec<Prediction>, WardenError> {
        self.store.predictions(rule_id, min_score, limit)
    }

    pub fn models(&self) -> Result<Vec<AnomalyModel>, WardenError> {
        self.store.models()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::error::DomainError;
    use crate::domain::issue::IssueSource;
    use crate::infrastructure::store::StateStore;
    use chrono::TimeZone;

    fn rule() -> Rule {
        serde_yaml::from_str(
            "id: orders_volume\ndimension: completeness\nscope: { source: wh, table: orders }\ncheck: { type: threshold, metric: row_count, operator: '>=', threshold: 1 }\n",
        )
        .unwrap()
    }

    fn seed(store: &StateStore, rule: &Rule, values: &[f64], start: DateTime<Utc>) -> anyhow::Result<()> {
        for (i, v) in values.iter().enumerate() {
            let mut r = RuleExecutionResult::new(&rule.id, "wh", start + Duration::days(i as i64));
            r.metric_value = Some(*v);
            store.append(&r)?;
        }
        Ok(())
    }

    fn service(store: &Arc<StateStore>) -> AnomalyService {
        AnomalyService::new(store.clone(), store.clone(), AnomalySettings::default())
    }

    #[test]
    fn test_train_needs_history() -> anyhow::Result<()> {
        let store = Arc::new(StateStore::in_memory());
        let r = rule();
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 6, 0, 0).unwrap();
        seed(&store, &r, &[100.0, 101.0], start)?;
        let err = service(&store).train(&r, None, None, start + Duration::days(3)).unwrap_err();
        assert!(matches!(err, WardenError::Domain(DomainError::InsufficientHistory { points: 2, .. })));
        Ok(())
    }

    #[test]
    fn test_spike_is_forwarded_as_anomaly_issue() -> anyhow::Result<()> {
        let store = Arc::new(StateStore::in_memory());
        let r = rule();
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 6, 0, 0).unwrap();
        let values = [98.0, 102.0, 100.0, 99.0, 101.0, 100.0, 103.0, 97.0, 100.0, 100.0];
        seed(&store, &r, &values, start)?;
        let now = start + Duration::days(10);
        let svc = service(&store);
        let model = svc.train(&r, None, None, now)?;
        assert_eq!(model.points, 10);
        assert_eq!(model.scope, "wh.orders");

        let mut normal = RuleExecutionResult::new(&r.id, "wh", now);
        normal.metric_value = Some(100.5);
        let p = svc.observe(&r, &normal)?.unwrap();
        assert!(!p.is_anomaly);

        let mut spike = RuleExecutionResult::new(&r.id, "wh", now);
        spike.metric_value = Some(400.0);
        let p = svc.observe(&r, &spike)?.unwrap();
        assert!(p.is_anomaly);

        let lifecycle = IssueLifecycleManager::new(store.clone());
        let issue = svc.forward(&r, &p, &lifecycle)?.unwrap();
        assert_eq!(issue.source, IssueSource::Anomaly);
        assert!(svc.forward(&r, &svc.observe(&r, &normal)?.unwrap(), &lifecycle)?.is_none());

        let recent = svc.recent(Some(&r.id), 1.0, 10)?;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].observed_value, 400.0);
        Ok(())
    }
}
