// warden-core/src/domain/ports/mod.rs

// Storage contracts. One adapter (infrastructure::store::StateStore) implements all four.

use crate::domain::anomaly::{AnomalyModel, Prediction};
use crate::domain::issue::{Issue, IssueFilter, IssueSource};
use crate::domain::protection::{ColumnMasking, ColumnRef};
use crate::domain::quality::RuleExecutionResult;
use crate::error::WardenError;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Append-only execution history.
pub trait ResultHistory: Send + Sync {
    fn append(&self, result: &RuleExecutionResult) -> Result<(), WardenError>;

    /// Results of one rule, oldest first, optionally only those at or after `since`.
    fn history(
        &self,
        rule_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RuleExecutionResult>, WardenError>;

    fn latest(&self, rule_id: &str) -> Result<Option<RuleExecutionResult>, WardenError>;
}

/// Issues are only ever inserted or status-transitioned, never deleted.
pub trait IssueRepository: Send + Sync {
    /// Insert or replace by id.
    fn save(&self, issue: &Issue) -> Result<(), WardenError>;

    fn get(&self, id: Uuid) -> Result<Option<Issue>, WardenError>;

    /// The open/acknowledged issue of a rule for one source, if any.
    fn find_active(&self, rule_id: &str, source: IssueSource) -> Result<Option<Issue>, WardenError>;

    /// Matching issues, highest criticality first, then most recently seen.
    fn list(&self, filter: &IssueFilter) -> Result<Vec<Issue>, WardenError>;
}

pub trait AnomalyStore: Send + Sync {
    /// Models are kept per rule; the last trained one is current.
    fn save_model(&self, model: &AnomalyModel) -> Result<(), WardenError>;

    fn current_model(&self, rule_id: &str) -> Result<Option<AnomalyModel>, WardenError>;

    fn models(&self) -> Result<Vec<AnomalyModel>, WardenError>;

    fn append_prediction(&self, prediction: &Prediction) -> Result<(), WardenError>;

    /// Newest first, score >= `min_score`.
    fn predictions(
        &self,
        rule_id: Option<&str>,
        min_score: f64,
        limit: usize,
    ) -> Result<Vec<Prediction>, WardenError>;
}

/// Declared masking configuration, as recorded in the catalog.
pub trait CatalogMetadata: Send + Sync {
    fn column_masking(&self, column: &ColumnRef) -> Result<Option<ColumnMasking>, WardenError>;
}
