// warden-core/src/application/pipeline.rs

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::application::anomaly::AnomalyService;
use crate::application::lifecycle::IssueLifecycleManager;
use crate::application::scheduler::Scheduler;
use crate::domain::error::DomainError;
use crate::domain::ports::ResultHistory;
use crate::domain::quality::{Outcome, Rule, RuleCatalog, RuleExecutionResult};
use crate::error::WardenError;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub success: bool,
    pub rules_executed: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    /// Issues created or updated by this run (failures, rule health, anomalies).
    pub issues: Vec<Uuid>,
    pub anomalies: usize,
    pub duration_ms: u64,
}

/// Everything a quality run touches, borrowed from the caller's wiring.
pub struct QualityPipeline<'a> {
    pub rules: &'a RuleCatalog,
    pub scheduler: &'a Scheduler,
    pub history: &'a dyn ResultHistory,
    pub lifecycle: &'a IssueLifecycleManager,
    pub anomaly: Option<&'a AnomalyService>,
}

/// Executes the enabled rules (or one of them), then records history, issues and anomalies.
#[instrument(skip(pipeline))]
pub async fn run_quality_checks(
    pipeline: &QualityPipeline<'_>,
    select: Option<&str>,
) -> Result<RunSummary, WardenError> {
    println!("🚀 Starting Quality Run...");
    let start_time = Instant::now();

    // 1. SELECTION
    let selected: Vec<Rule> = match select {
        Some(id) => {
            let rule = pipeline.rules.require(id)?;
            if !rule.enabled {
                return Err(DomainError::RuleDisabled(id.to_string()).into());
            }
            vec![rule.clone()]
        }
        None => pipeline.rules.enabled().into_iter().cloned().collect(),
    };
    if selected.is_empty() {
        println!("📝 No enabled rules, nothing to do.");
        return Ok(RunSummary {
            success: true,
            ..Default::default()
        });
    }
    println!("📝 Execution Plan: {} rules", selected.len());

    // 2. EXECUTION (worker pool, per-source limits inside the engine)
    println!("🟢 Executing rules...");
    let mut results = pipeline.scheduler.run(selected).await;
    results.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));

    // 3. RECORDING
    let mut summary = RunSummary {
        rules_executed: results.len(),
        ..Default::default()
    };
    for result in &results {
        let rule = pipeline
            .rules
            .get(&result.rule_id)
            .ok_or_else(|| DomainError::RuleNotFound(result.rule_id.clone()))?;
        report(rule, result);
        match result.outcome {
            Outcome::Passed => summary.passed += 1,
            Outcome::Failed => summary.failed += 1,
            Outcome::Error => summary.errors += 1,
        }

        pipeline.history.append(result)?;
        if let Some(issue) = pipeline.lifecycle.record_result(rule, result)?
            && issue.is_active()
        {
            summary.issues.push(issue.id);
        }

        if let Some(anomaly) = pipeline.anomaly {
            // A broken model must not hide the run's own findings.
            match anomaly.observe(rule, result) {
                Ok(Some(prediction)) => {
                    if let Some(issue) = anomaly.forward(rule, &prediction, pipeline.lifecycle)? {
                        summary.anomalies += 1;
                        summary.issues.push(issue.id);
                    }
                }
                Ok(None) => {}
                Err(e) => error!(rule = %rule.id, "Anomaly scoring failed: {}", e),
            }
        }
    }

    summary.success = summary.failed == 0 && summary.errors == 0;
    summary.duration_ms = start_time.elapsed().as_millis() as u64;
    println!(
        "✨ Done in {:.2}s. {} passed, {} failed, {} errors.",
        start_time.elapsed().as_secs_f64(),
        summary.passed,
        summary.failed,
        summary.errors
    );
    Ok(summary)
}

fn report(rule: &Rule, result: &RuleExecutionResult) {
    let detail = result.summary();
    match result.outcome {
        Outcome::Passed => println!("    ✅ {} ({}ms)", rule.id, result.duration_ms),
        Outcome::Failed => println!("    ❌ {}: {}", rule.id, detail),
        Outcome::Error => eprintln!("    ⚠️  {}: {}", rule.id, detail),
    }
    for note in &result.translation_notes {
        println!("       ↳ {}", note);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::engine::{ExecutionContext, RuleEngine};
    use crate::domain::anomaly::AnomalySettings;
    use crate::domain::dialect::{DialectTranslator, EngineFamily};
    use crate::domain::issue::{IssueFilter, IssueSource, IssueStatus};
    use crate::domain::project::EngineSettings;
    use crate::domain::quality::DataSourceDescriptor;
    use crate::infrastructure::adapters::{DuckDBConnector, StaticResolver};
    use crate::infrastructure::compiler::JinjaRenderer;
    use crate::infrastructure::store::StateStore;
    use crate::ports::connector::Connector;
    use std::sync::Arc;

    const RULES: &str = r#"
- id: email_not_null
  dimension: completeness
  severity: high
  scope: { source: wh, table: customers, column: email }
  check: { type: threshold, metric: null_count, operator: "<=", threshold: 0 }
- id: has_rows
  dimension: completeness
  scope: { source: wh, table: customers }
  check: { type: threshold, metric: row_count, operator: ">=", threshold: 1 }
- id: broken
  dimension: validity
  scope: { source: wh, table: missing_table }
  check: { type: raw_query, query: "SELECT * FROM missing_table" }
- id: disabled
  dimension: validity
  enabled: false
  scope: { source: wh, table: customers }
  check: { type: raw_query, query: "SELECT * FROM customers" }
"#;

    #[tokio::test]
    async fn test_run_records_history_and_issues() -> anyhow::Result<()> {
        let db = Arc::new(DuckDBConnector::new(":memory:")?);
        db.execute("CREATE TABLE customers (id INTEGER, email VARCHAR)").await?;
        db.execute("INSERT INTO customers VALUES (1, 'a@x.io'), (2, NULL)").await?;

        let rules = RuleCatalog::new(serde_yaml::from_str(RULES)?)?;
        let store = Arc::new(StateStore::in_memory());
        let engine = RuleEngine::new(ExecutionContext {
            resolver: Arc::new(StaticResolver::new().with("wh", db.clone())),
            translator: DialectTranslator::new(),
            templates: Arc::new(JinjaRenderer::new()),
            models: Some(store.clone() as Arc<dyn crate::domain::ports::AnomalyStore>),
            sources: vec![DataSourceDescriptor::new("wh", EngineFamily::Duckdb)],
            settings: EngineSettings::default(),
        });
        let scheduler = Scheduler::new(Arc::new(engine));
        let lifecycle = IssueLifecycleManager::new(store.clone());
        let anomaly = AnomalyService::new(store.clone(), store.clone(), AnomalySettings::default());
        let pipeline = QualityPipeline {
            rules: &rules,
            scheduler: &scheduler,
            history: store.as_ref(),
            lifecycle: &lifecycle,
            anomaly: Some(&anomaly),
        };

        let summary = run_quality_checks(&pipeline, None).await?;
        assert!(!summary.success);
        assert_eq!(summary.rules_executed, 3);
        assert_eq!((summary.passed, summary.failed, summary.errors), (1, 1, 1));
        assert_eq!(summary.issues.len(), 2);
        assert_eq!(store.history("email_not_null", None)?.len(), 1);

        let health = lifecycle.list(
            &IssueFilter {
                source: Some(IssueSource::RuleHealth),
                ..Default::default()
            },
            0,
            10,
        )?;
        assert_eq!(health.items[0].rule_id, "broken");

        // Fix the data: the next run resolves the failure on its own.
        db.execute("UPDATE customers SET email = 'b@x.io' WHERE email IS NULL").await?;
        let summary = run_quality_checks(&pipeline, Some("email_not_null")).await?;
        assert!(summary.success);
        let open = lifecycle.list(
            &IssueFilter {
                status: Some(IssueStatus::Open),
                source: Some(IssueSource::RuleFailure),
                ..Default::default()
            },
            0,
            10,
        )?;
        assert_eq!(open.total, 0);

        assert!(run_quality_checks(&pipeline, Some("nope")).await.is_err());

        // Selecting a disabled rule is refused rather than executed.
        let before = store.history("disabled", None)?.len();
        let err = run_quality_checks(&pipeline, Some("disabled")).await.unwrap_err();
        assert!(matches!(
            err,
            WardenError::Domain(DomainError::RuleDisabled(ref id)) if id == "disabled"
        ));
        assert_eq!(store.history("disabled", None)?.len(), before);
        Ok(())
    }
}
