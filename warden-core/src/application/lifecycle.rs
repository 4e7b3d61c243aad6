// warden-core/src/application/lifecycle.rs

// Issue state machine: open -> acknowledged -> resolved, plus the automatic
// resolved -> open when a protection fix cannot be observed in live data.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::verification::FixValidator;
use crate::domain::anomaly::Prediction;
use crate::domain::error::DomainError;
use crate::domain::issue::{Issue, IssueFilter, IssueSource, IssueStatus};
use crate::domain::paging::Page;
use crate::domain::ports::IssueRepository;
use crate::domain::protection::ColumnRef;
use crate::domain::protection::verdict::truncate_evidence;
use crate::domain::quality::{Outcome, Rule, RuleCatalog, RuleExecutionResult, RuleKind};
use crate::domain::scoring::{CriticalityScore, CriticalityScorer};
use crate::error::WardenError;

/// Longest machine explanation prepended to a reopened issue.
const EXPLANATION_MAX_CHARS: usize = 240;

#[derive(Debug, Default, Clone, Serialize)]
pub struct RevalidationReport {
    pub checked: usize,
    pub confirmed: Vec<Uuid>,
    pub reopened: Vec<Uuid>,
    /// Issues whose rule is gone or no longer carries protection requirements.
    pub skipped: Vec<Uuid>,
}

pub struct IssueLifecycleManager {
    issues: Arc<dyn IssueRepository>,
}

impl IssueLifecycleManager {
    pub fn new(issues: Arc<dyn IssueRepository>) -> Self {
        Self { issues }
    }

    // --- RESULTS -> ISSUES ---

    /// Turns one execution result into issue changes. Returns the issue the result landed on.
    #[instrument(skip_all, fields(rule = %rule.id, outcome = %result.outcome))]
    pub fn record_result(&self, rule: &Rule, result: &RuleExecutionResult) -> Result<Option<Issue>, WardenError> {
        let now = result.executed_at;

        // Any run that got an answer clears the rule-health signal.
        if result.outcome != Outcome::Error {
            self.auto_resolve(rule, IssueSource::RuleHealth, now)?;
        }

        match result.outcome {
            Outcome::Error => {
                let criticality = CriticalityScorer::score(rule.severity, 0, None, false);
                let description = format!("Rule '{}' could not run: {}", rule.display_name(), result.summary());
                self.upsert(rule, IssueSource::RuleHealth, criticality, description, Some(result.id), now)
                    .map(Some)
            }
            // Statistical rules report through anomaly-sourced issues.
            Outcome::Failed if matches!(rule.kind, RuleKind::StatisticalAnomaly { .. }) => Ok(None),
            Outcome::Failed => {
                let source = if rule.is_protection_rule() {
                    IssueSource::Protection
                } else {
                    IssueSource::RuleFailure
                };
                let criticality = CriticalityScorer::score(
                    rule.severity,
                    result.rows_failed,
                    rule.revenue_impact,
                    rule.is_empty_table_check(),
                );
                let description = format!("Rule '{}' failed: {}", rule.display_name(), result.summary());
                self.upsert(rule, source, criticality, description, Some(result.id), now)
                    .map(Some)
            }
            // Protection issues only close on an explicit claim, later verified by sampling.
            Outcome::Passed if !rule.is_protection_rule() => {
                self.auto_resolve(rule, IssueSource::RuleFailure, now)
            }
            Outcome::Passed => Ok(None),
        }
    }

    /// A prediction strong enough to be reported, as an anomaly-sourced issue.
    #[instrument(skip_all, fields(rule = %rule.id, score = prediction.score))]
    pub fn record_anomaly(&self, rule: &Rule, prediction: &Prediction) -> Result<Issue, WardenError> {
        let criticality = CriticalityScorer::score(rule.severity, 0, rule.revenue_impact, false);
        let description = format!("Rule '{}': {}", rule.display_name(), prediction.describe());
        self.upsert(
            rule,
            IssueSource::Anomaly,
            criticality,
            description,
            prediction.result_id,
            prediction.predicted_at,
        )
    }

    fn upsert(
        &self,
        rule: &Rule,
        source: IssueSource,
        criticality: CriticalityScore,
        description: String,
        result_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Issue, WardenError> {
        let issue = match self.issues.find_active(&rule.id, source)? {
            Some(mut existing) => {
                existing.touch(now, result_id, criticality);
                existing
            }
            None => {
                let issue = Issue::open(
                    &rule.id,
                    source,
                    &rule.scope.label(),
                    rule.severity,
                    criticality,
                    description,
                    result_id,
                    now,
                );
                info!(
                    issue = %issue.id,
                    source = %source,
                    score = criticality.score,
                    bucket = %criticality.bucket,
                    "🆕 Issue opened"
                );
                issue
            }
        };
        self.issues.save(&issue)?;
        Ok(issue)
    }

    fn auto_resolve(&self, rule: &Rule, source: IssueSource, now: DateTime<Utc>) -> Result<Option<Issue>, WardenError> {
        let Some(mut issue) = self.issues.find_active(&rule.id, source)? else {
            return Ok(None);
        };
        issue.resolve(now)?;
        self.issues.save(&issue)?;
        info!(issue = %issue.id, source = %source, "✅ Issue resolved by a passing run");
        Ok(Some(issue))
    }

    // --- EXTERNAL TRANSITIONS ---

    pub fn get(&self, id: Uuid) -> Result<Issue, WardenError> {
        self.issues
            .get(id)?
            .ok_or_else(|| DomainError::IssueNotFound(id.to_string()).into())
    }

    pub fn acknowledge(&self, id: Uuid) -> Result<Issue, WardenError> {
        let mut issue = self.get(id)?;
        issue.acknowledge()?;
        self.issues.save(&issue)?;
        Ok(issue)
    }

    /// Accepted as a claim. Protection issues are re-checked on the next re-validation pass.
    pub fn resolve(&self, id: Uuid) -> Result<Issue, WardenError> {
        let mut issue = self.get(id)?;
        issue.resolve(Utc::now())?;
        self.issues.save(&issue)?;
        Ok(issue)
    }

    pub fn list(&self, filter: &IssueFilter, offset: usize, limit: usize) -> Result<Page<Issue>, WardenError> {
        Ok(Page::slice(self.issues.list(filter)?, offset, limit))
    }

    // --- RE-VALIDATION ---

    /// Re-checks every resolved protection issue against live data.
    #[instrument(skip_all)]
    pub async fn revalidate(
        &self,
        rules: &RuleCatalog,
        validator: &FixValidator,
    ) -> Result<RevalidationReport, WardenError> {
        let filter = IssueFilter {
            status: Some(IssueStatus::Resolved),
            source: Some(IssueSource::Protection),
            ..Default::default()
        };
        let mut report = RevalidationReport::default();

        for mut issue in self.issues.list(&filter)? {
            let target = rules
                .get(&issue.rule_id)
                .and_then(|rule| Some((rule.protection?, ColumnRef::from_rule(rule)?)));
            let Some((requirements, column)) = target.filter(|(p, _)| p.any()) else {
                warn!(issue = %issue.id, rule = %issue.rule_id, "Protection rule not found, skipping");
                report.skipped.push(issue.id);
                continue;
            };

            report.checked += 1;
            let verdict = validator
                .verify(&column, requirements.requires_encryption, requirements.requires_masking)
                .await;
            let now = Utc::now();
            if verdict.is_verified {
                issue.confirm(now);
                report.confirmed.push(issue.id);
            } else {
                let explanation = truncate_evidence(&verdict.explanation(), EXPLANATION_MAX_CHARS);
                issue.reopen(&explanation, now)?;
                warn!(issue = %issue.id, "🔁 Resolved issue reopened: {}", verdict.reason);
                report.reopened.push(issue.id);
            }
            self.issues.save(&issue)?;
        }
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::dialect::EngineFamily;
    use crate::domain::protection::ProtectionSettings;
    use crate::domain::quality::{DataSourceDescriptor, ExecutionErrorKind};
    use crate::domain::scoring::CriticalityBucket;
    use crate::infrastructure::adapters::{DuckDBConnector, StaticResolver};
    use crate::infrastructure::store::StateStore;
    use crate::ports::connector::Connector;

    fn rule(yaml: &str) -> Rule {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn null_rule() -> Rule {
        rule(
            "id: email_nulls\ndimension: completeness\nseverity: high\nscope: { source: wh, table: customers, column: email }\ncheck: { type: threshold, metric: null_count, operator: '<=', threshold: 0 }\n",
        )
    }

    fn ssn_rule() -> Rule {
        rule(
            "id: ssn_protected\ndimension: validity\nseverity: critical\nscope: { source: wh, table: customers, column: ssn }\ncheck: { type: raw_query, query: 'SELECT 1 WHERE 1 = 0' }\nprotection: { requires_encryption: true }\n",
        )
    }

    fn failed(rule: &Rule, rows: u64) -> RuleExecutionResult {
        let mut r = RuleExecutionResult::new(&rule.id, "wh", Utc::now());
        r.outcome = Outcome::Failed;
        r.rows_failed = rows;
        r
    }

    fn manager() -> (IssueLifecycleManager, Arc<StateStore>) {
        let store = Arc::new(StateStore::in_memory());
        (IssueLifecycleManager::new(store.clone()), store)
    }

    #[test]
    fn test_failure_opens_then_touches_then_pass_resolves() -> anyhow::Result<()> {
        let (m, _) = manager();
        let r = null_rule();
        let first = m.record_result(&r, &failed(&r, 12))?.unwrap();
        assert_eq!(first.status, IssueStatus::Open);
        assert_eq!(first.source, IssueSource::RuleFailure);
        // high 30 + rows>10 15
        assert_eq!(first.criticality.score, 45);
        assert_eq!(first.scope, "wh.customers.email");

        let second = m.record_result(&r, &failed(&r, 12))?.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.occurrences, 2);

        let passing = RuleExecutionResult::new(&r.id, "wh", Utc::now());
        let resolved = m.record_result(&r, &passing)?.unwrap();
        assert_eq!(resolved.status, IssueStatus::Resolved);
        assert!(resolved.is_consistent());
        Ok(())
    }

    #[test]
    fn test_error_is_rule_health_not_failure() -> anyhow::Result<()> {
        let (m, _) = manager();
        let r = null_rule();
        let mut broken = RuleExecutionResult::new(&r.id, "wh", Utc::now());
        broken.record_error(ExecutionErrorKind::Timeout, "execution exceeded 30s");
        let issue = m.record_result(&r, &broken)?.unwrap();
        assert_eq!(issue.source, IssueSource::RuleHealth);

        let failures = m.list(
            &IssueFilter {
                source: Some(IssueSource::RuleFailure),
                ..Default::default()
            },
            0,
            10,
        )?;
        assert_eq!(failures.total, 0);

        // A later run that answers clears the health issue even when it fails.
        m.record_result(&r, &failed(&r, 1))?;
        assert_eq!(m.get(issue.id)?.status, IssueStatus::Resolved);
        Ok(())
    }

    #[test]
    fn test_empty_table_check_is_informational() -> anyhow::Result<()> {
        let (m, _) = manager();
        let r = rule(
            "id: has_rows\ndimension: completeness\nseverity: high\nrevenue_impact: 250000\nscope: { source: wh, table: new_table }\ncheck: { type: threshold, metric: row_count, operator: '>=', threshold: 1 }\n",
        );
        let issue = m.record_result(&r, &failed(&r, 50_000))?.unwrap();
        assert!(issue.criticality.score <= 25);
        assert_eq!(issue.criticality.bucket, CriticalityBucket::Informational);
        Ok(())
    }

    #[test]
    fn test_manual_transitions() -> anyhow::Result<()> {
        let (m, _) = manager();
        let r = null_rule();
        let issue = m.record_result(&r, &failed(&r, 3))?.unwrap();
        assert_eq!(m.acknowledge(issue.id)?.status, IssueStatus::Acknowledged);
        assert!(m.acknowledge(issue.id).is_err());
        let resolved = m.resolve(issue.id)?;
        assert!(resolved.resolved_at.is_some());
        assert!(m.resolve(issue.id).is_err());
        assert!(m.get(Uuid::new_v4()).is_err());
        Ok(())
    }

    async fn validator(values: &[&str]) -> anyhow::Result<FixValidator> {
        let db = DuckDBConnector::new(":memory:")?;
        db.execute("CREATE TABLE customers (ssn VARCHAR)").await?;
        for v in values {
            db.execute(&format!("INSERT INTO customers VALUES ('{}')", v)).await?;
        }
        Ok(FixValidator::new(
            Arc::new(StaticResolver::new().with("wh", Arc::new(db))),
            vec![DataSourceDescriptor::new("wh", EngineFamily::Duckdb)],
            Arc::new(StateStore::in_memory()),
            ProtectionSettings::default(),
        ))
    }

    async fn resolved_protection_issue(m: &IssueLifecycleManager) -> anyhow::Result<(Issue, RuleCatalog)> {
        let r = ssn_rule();
        let issue = m.record_result(&r, &failed(&r, 4))?.unwrap();
        assert_eq!(issue.source, IssueSource::Protection);
        // Passing runs do not close protection issues on their own.
        m.record_result(&r, &RuleExecutionResult::new(&r.id, "wh", Utc::now()))?;
        assert_eq!(m.get(issue.id)?.status, IssueStatus::Open);
        let issue = m.resolve(issue.id)?;
        Ok((issue, RuleCatalog::new(vec![r])?))
    }

    #[tokio::test]
    async fn test_revalidation_keeps_verified_fix_resolved() -> anyhow::Result<()> {
        let (m, _) = manager();
        let (issue, rules) = resolved_protection_issue(&m).await?;
        let v = validator(&[
            "enc:v1:Q2hhY2hhMjBQb2x5MTMwNS1rZXktMDE=",
            "enc:v1:Zm9vYmFyYmF6cXV4LWFsbC1yYW5kb20x",
            "enc:v1:T3BlblNTTC1BRVMyNTYtR0NNLTJiYXNl",
        ])
        .await?;
        let report = m.revalidate(&rules, &v).await?;
        assert_eq!(report.confirmed, vec![issue.id]);
        let after = m.get(issue.id)?;
        assert_eq!(after.status, IssueStatus::Resolved);
        assert_eq!(after.description, issue.description);
        Ok(())
    }

    #[tokio::test]
    async fn test_revalidation_reopens_plaintext_with_explanation() -> anyhow::Result<()> {
        let (m, _) = manager();
        let (issue, rules) = resolved_protection_issue(&m).await?;
        let v = validator(&["123-45-6789", "987-65-4321"]).await?;
        let report = m.revalidate(&rules, &v).await?;
        assert_eq!(report.reopened, vec![issue.id]);

        let after = m.get(issue.id)?;
        assert_eq!(after.status, IssueStatus::Open);
        assert!(after.resolved_at.is_none());
        assert!(after.description.starts_with("[reopened: validation failed at "));
        assert!(after.description.contains("encryption not verified"));
        assert!(after.description.ends_with(&issue.description));
        Ok(())
    }
}
