// warden-core/src/infrastructure/store/state.rs

// In-memory snapshot of everything this crate persists. Opened on a path, each mutation
// rewrites the snapshot as pretty JSON through an atomic rename.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::anomaly::{AnomalyModel, Prediction};
use crate::domain::issue::{Issue, IssueFilter, IssueSource};
use crate::domain::ports::{AnomalyStore, CatalogMetadata, IssueRepository, ResultHistory};
use crate::domain::project::CatalogColumn;
use crate::domain::protection::{ColumnMasking, ColumnRef};
use crate::domain::quality::RuleExecutionResult;
use crate::error::WardenError;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::write_json_atomic;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    results: Vec<RuleExecutionResult>,
    #[serde(default)]
    issues: Vec<Issue>,
    #[serde(default)]
    models: Vec<AnomalyModel>,
    #[serde(default)]
    predictions: Vec<Prediction>,
}

pub struct StateStore {
    path: Option<PathBuf>,
    state: Mutex<Snapshot>,
    /// Catalog masking metadata, keyed by `source:schema.table.column`. Read-only.
    catalog: HashMap<String, ColumnMasking>,
}

impl StateStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(Snapshot::default()),
            catalog: HashMap::new(),
        }
    }

    /// Loads the snapshot at `path` if it exists; later writes go back to it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, InfrastructureError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let snapshot: Snapshot = serde_json::from_str(&content)?;
            info!(
                path = ?path,
                results = snapshot.results.len(),
                issues = snapshot.issues.len(),
                "State loaded"
            );
            snapshot
        } else {
            debug!(path = ?path, "No state yet, starting empty");
            Snapshot::default()
        };
        Ok(Self {
            path: Some(path),
            state: Mutex::new(snapshot),
            catalog: HashMap::new(),
        })
    }

    pub fn with_catalog(mut self, columns: &[CatalogColumn]) -> Self {
        self.catalog = columns
            .iter()
            .map(|c| (c.column_ref().to_string(), c.masking()))
            .collect();
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Snapshot>, WardenError> {
        self.state.lock().map_err(|_| {
            WardenError::Infrastructure(InfrastructureError::Io(std::io::Error::other(
                "State Mutex Poisoned",
            )))
        })
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<(), WardenError> {
        if let Some(path) = &self.path {
            write_json_atomic(path, snapshot)?;
        }
        Ok(())
    }

    /// Applies `change` and writes the snapshot while still holding the lock.
    fn mutate<T>(&self, change: impl FnOnce(&mut Snapshot) -> T) -> Result<T, WardenError> {
        let mut guard = self.lock()?;
        let out = change(&mut guard);
        self.persist(&guard)?;
        Ok(out)
    }
}

// --- RESULTS ---

impl ResultHistory for StateStore {
    fn append(&self, result: &RuleExecutionResult) -> Result<(), WardenError> {
        self.mutate(|s| s.results.push(result.clone()))
    }

    fn history(
        &self,
        rule_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RuleExecutionResult>, WardenError> {
        let guard = self.lock()?;
        let mut out: Vec<_> = guard
            .results
            .iter()
            .filter(|r| r.rule_id == rule_id && since.is_none_or(|t| r.executed_at >= t))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.executed_at);
        Ok(out)
    }

    fn latest(&self, rule_id: &str) -> Result<Option<RuleExecutionResult>, WardenError> {
        let guard = self.lock()?;
        Ok(guard
            .results
            .iter()
            .filter(|r| r.rule_id == rule_id)
            .max_by_key(|r| r.executed_at)
            .cloned())
    }
}

// --- ISSUES ---

impl IssueRepository for StateStore {
    fn save(&self, issue: &Issue) -> Result<(), WardenError> {
        self.mutate(|s| match s.issues.iter_mut().find(|i| i.id == issue.id) {
            Some(existing) => *existing = issue.clone(),
            None => s.issues.push(issue.clone()),
        })
    }

    fn get(&self, id: Uuid) -> Result<Option<Issue>, WardenError> {
        let guard = self.lock()?;
        Ok(guard.issues.iter().find(|i| i.id == id).cloned())
    }

    fn find_active(&self, rule_id: &str, source: IssueSource) -> Result<Option<Issue>, WardenError> {
        let guard = self.lock()?;
        Ok(guard
            .issues
            .iter()
            .find(|i| i.rule_id == rule_id && i.source == source && i.is_active())
            .cloned())
    }

    fn list(&self, filter: &IssueFilter) -> Result<Vec<Issue>, WardenError> {
        let guard = self.lock()?;
        let mut out: Vec<Issue> = guard.issues.iter().filter(|i| filter.matches(i)).cloned().collect();
        out.sort_by(|a, b| {
            b.criticality
                .score
                .cmp(&a.criticality.score)
                .then(b.last_seen_at.cmp(&a.last_seen_at))
        });
        Ok(out)
    }
}

// --- ANOMALY MODELS ---

impl AnomalyStore for StateStore {
    fn save_model(&self, model: &AnomalyModel) -> Result<(), WardenError> {
        self.mutate(|s| s.models.push(model.clone()))
    }

    fn current_model(&self, rule_id: &str) -> Result<Option<AnomalyModel>, WardenError> {
        let guard = self.lock()?;
        Ok(guard
            .models
            .iter()
            .filter(|m| m.rule_id == rule_id)
            .max_by_key(|m| m.trained_at)
            .cloned())
    }

    fn models(&self) -> Result<Vec<AnomalyModel>, WardenError> {
        Ok(self.lock()?.models.clone())
    }

    fn append_prediction(&self, prediction: &Prediction) -> Result<(), WardenError> {
        self.mutate(|s| s.predictions.push(prediction.clone()))
    }

    fn predictions(
        &self,
        rule_id: Option<&str>,
        min_score: f64,
        limit: usize,
    ) -> Result<Vec<Prediction>, WardenError> {
        let guard = self.lock()?;
        let mut out: Vec<Prediction> = guard
            .predictions
            .iter()
            .filter(|p| rule_id.is_none_or(|r| p.rule_id == r) && p.score >= min_score)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.predicted_at.cmp(&a.predicted_at));
        out.truncate(limit);
        Ok(out)
    }
}

// --- CATALOG ---

impl CatalogMetadata for StateStore {
    fn column_masking(&self, column: &ColumnRef) -> Result<Option<ColumnMasking>, WardenError> {
        Ok(self.catalog.get(&column.to_string()).cloned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::quality::{Outcome, Severity};
    use crate::domain::scoring::CriticalityScorer;
    use chrono::Duration;
    use tempfile::tempdir;

    fn result(rule_id: &str, at: DateTime<Utc>) -> RuleExecutionResult {
        let mut r = RuleExecutionResult::new(rule_id, "wh", at);
        r.outcome = Outcome::Passed;
        r
    }

    fn issue(rule_id: &str, rows: u64) -> Issue {
        Issue::open(
            rule_id,
            IssueSource::RuleFailure,
            "wh.orders",
            Severity::Medium,
            CriticalityScorer::score(Severity::Medium, rows, None, false),
            "failing".into(),
            None,
            Utc::now(),
        )
    }

    #[test]
    fn test_snapshot_survives_reopen() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(".warden/state.json");
        let now = Utc::now();
        {
            let store = StateStore::open(&path)?;
            store.append(&result("r1", now - Duration::hours(2)))?;
            store.append(&result("r1", now))?;
            store.save(&issue("r1", 5))?;
        }
        let store = StateStore::open(&path)?;
        assert_eq!(store.history("r1", None)?.len(), 2);
        assert_eq!(store.history("r1", Some(now - Duration::hours(1)))?.len(), 1);
        assert_eq!(store.latest("r1")?.map(|r| r.executed_at), Some(now));
        assert!(store.find_active("r1", IssueSource::RuleFailure)?.is_some());
        assert!(store.find_active("r1", IssueSource::RuleHealth)?.is_none());
        Ok(())
    }

    #[test]
    fn test_save_replaces_and_list_orders_by_score() -> anyhow::Result<()> {
        let store = StateStore::in_memory();
        let mut low = issue("a", 1);
        let high = issue("b", 50_000);
        store.save(&low)?;
        store.save(&high)?;
        low.resolve(Utc::now())?;
        store.save(&low)?;

        let all = store.list(&IssueFilter::default())?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].rule_id, "b");
        assert!(store.find_active("a", IssueSource::RuleFailure)?.is_none());
        Ok(())
    }

    #[test]
    fn test_catalog_lookup() -> anyhow::Result<()> {
        let columns: Vec<CatalogColumn> = serde_yaml::from_str(
            "- { source: wh, schema: crm, table: customers, column: email, mask_in_ui: true }",
        )?;
        let store = StateStore::in_memory().with_catalog(&columns);
        let hit = store.column_masking(&columns[0].column_ref())?;
        assert!(hit.is_some_and(|m| m.mask_in_ui));
        let miss = ColumnRef {
            column: "phone".into(),
            ..columns[0].column_ref()
        };
        assert!(store.column_masking(&miss)?.is_none());
        Ok(())
    }
}
