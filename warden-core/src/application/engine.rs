// warden-core/src/application/engine.rs

// One rule against one data source: translate -> execute -> classify.
// Never returns Err: every attempt becomes a RuleExecutionResult, and problems running the
// check are recorded as outcome `error`, never as `failed`. No automatic retries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, instrument, warn};

use crate::application::cancellation::{CancellationToken, SourceCancellation};
use crate::application::ports::TemplateEngine;
use crate::domain::anomaly::Observation;
use crate::domain::dialect::{Dialect, DialectTranslator};
use crate::domain::ports::AnomalyStore;
use crate::domain::project::EngineSettings;
use crate::domain::quality::classify::{self, Classification};
use crate::domain::quality::{
    DataSourceDescriptor, ExecutionError, ExecutionErrorKind, Rule, RuleExecutionResult, RuleKind,
};
use crate::error::WardenError;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::connector::{ConnectorResolver, QueryOutput};

/// Everything an execution needs, injected explicitly.
pub struct ExecutionContext {
    pub resolver: Arc<dyn ConnectorResolver>,
    pub translator: DialectTranslator,
    pub templates: Arc<dyn TemplateEngine>,
    /// Current models for statistical rules. Without it they always pass.
    pub models: Option<Arc<dyn AnomalyStore>>,
    pub sources: Vec<DataSourceDescriptor>,
    pub settings: EngineSettings,
}

// --- PER-SOURCE LIMITS ---

/// Caps concurrent executions per data source.
pub struct SourceLimiter {
    default_limit: usize,
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl SourceLimiter {
    pub fn new(default_limit: usize) -> Self {
        Self {
            default_limit: default_limit.max(1),
            semaphores: Mutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(&self, source: &DataSourceDescriptor) -> Option<OwnedSemaphorePermit> {
        let semaphore = {
            let mut map = self.semaphores.lock().ok()?;
            let limit = source.max_in_flight.unwrap_or(self.default_limit).max(1);
            Arc::clone(
                map.entry(source.id.clone())
                    .or_insert_with(|| Arc::new(Semaphore::new(limit))),
            )
        };
        semaphore.acquire_owned().await.ok()
    }
}

// --- ENGINE ---

pub struct RuleEngine {
    ctx: ExecutionContext,
    sources: HashMap<String, DataSourceDescriptor>,
    limiter: SourceLimiter,
    cancellation: SourceCancellation,
}

/// Which step an execution reached, for cancellation messages.
#[derive(Debug, Clone, Copy)]
enum Step {
    Translate,
    Execute,
    Classify,
}

impl RuleEngine {
    pub fn new(ctx: ExecutionContext) -> Self {
        let sources = ctx
            .sources
            .iter()
            .map(|s| (s.id.clone(), s.clone()))
            .collect();
        let limiter = SourceLimiter::new(ctx.settings.max_in_flight_per_source);
        let cancellation = SourceCancellation::new();
        for source in ctx.sources.iter().filter(|s| !s.enabled) {
            cancellation.disable(&source.id);
        }
        Self {
            ctx,
            sources,
            limiter,
            cancellation,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.ctx.settings
    }

    pub fn source(&self, id: &str) -> Option<&DataSourceDescriptor> {
        self.sources.get(id)
    }

    pub fn sources(&self) -> impl Iterator<Item = &DataSourceDescriptor> {
        self.sources.values()
    }

    /// Cancels in-flight executions against `source_id` and refuses new ones.
    pub fn disable_source(&self, source_id: &str) {
        self.cancellation.disable(source_id);
    }

    pub fn enable_source(&self, source_id: &str) {
        self.cancellation.enable(source_id);
    }

    /// Runs `rule` against the data source named in its scope.
    pub async fn execute_rule(&self, rule: &Rule, job: &CancellationToken) -> RuleExecutionResult {
        match self.sources.get(&rule.scope.source) {
            Some(source) => self.execute_with(rule, source, job).await,
            None => {
                let mut result = RuleExecutionResult::new(&rule.id, &rule.scope.source, Utc::now());
                result.record_error(
                    ExecutionErrorKind::Connectivity,
                    format!("data source '{}' is not configured", rule.scope.source),
                );
                warn!(rule = %rule.id, source = %rule.scope.source, "Unknown data source");
                result
            }
        }
    }

    /// `execute(rule, dataSourceDescriptor) -> RuleExecutionResult`
    pub async fn execute(&self, rule: &Rule, source: &DataSourceDescriptor) -> RuleExecutionResult {
        self.execute_with(rule, source, &CancellationToken::new()).await
    }

    #[instrument(skip(self, rule, source, job), fields(rule = %rule.id, source = %source.id, kind = rule.kind.name()))]
    pub async fn execute_with(
        &self,
        rule: &Rule,
        source: &DataSourceDescriptor,
        job: &CancellationToken,
    ) -> RuleExecutionResult {
        let mut result = RuleExecutionResult::new(&rule.id, &source.id, Utc::now());

        // Waiting for a slot does not count against the timeout.
        let _permit = self.limiter.acquire(source).await;
        let token = self.cancellation.token(&source.id);
        let started = Instant::now();
        let timeout = Duration::from_secs(self.ctx.settings.timeout_secs.max(1));

        let run = self.run(rule, source, &token, job, &mut result);
        let verdict = match tokio::time::timeout(timeout, run).await {
            Ok(v) => v,
            Err(_) => Err(ExecutionError::new(
                ExecutionErrorKind::Timeout,
                format!("execution exceeded {}s", timeout.as_secs()),
            )),
        };
        result.executed_at = Utc::now();
        result.duration_ms = started.elapsed().as_millis() as u64;

        match verdict {
            Ok(classification) => {
                result.record_classification(classification);
                info!(
                    outcome = %result.outcome,
                    rows_failed = result.rows_failed,
                    duration_ms = result.duration_ms,
                    "Rule executed"
                );
            }
            Err(e) => {
                error!(kind = %e.kind, duration_ms = result.duration_ms, "Rule could not run: {}", e.message);
                result.record_error(e.kind, e.message);
            }
        }
        result
    }

    async fn run(
        &self,
        rule: &Rule,
        source: &DataSourceDescriptor,
        token: &CancellationToken,
        job: &CancellationToken,
        result: &mut RuleExecutionResult,
    ) -> Result<Classification, ExecutionError> {
        checkpoint(Step::Translate, token, job)?;

        // 1. PLAN + RENDER + TRANSLATE
        let mut prepared: Vec<(String, &DataSourceDescriptor)> = Vec::new();
        let planned = classify::plan(rule, source.dialect());
        if planned.is_empty() {
            return Err(ExecutionError::new(
                ExecutionErrorKind::Unsupported,
                format!("'{}' check has nothing to run for this scope", rule.kind.name()),
            ));
        }
        for query in planned {
            let target = match &query.source {
                Some(id) => self.sources.get(id).ok_or_else(|| {
                    ExecutionError::new(
                        ExecutionErrorKind::Connectivity,
                        format!("data source '{}' is not configured", id),
                    )
                })?,
                None => source,
            };
            let sql = if query.authored {
                self.prepare(rule, &query.sql, target.dialect(), result)?
            } else {
                query.sql
            };
            prepared.push((sql, target));
        }

        checkpoint(Step::Execute, token, job)?;

        // 2. EXECUTE
        let mut outputs: Vec<QueryOutput> = Vec::with_capacity(prepared.len());
        for (sql, target) in prepared {
            debug!(target = %target.id, "⚡ Executing: {}", sql);
            result.executed_sql.push(sql.clone());
            let connector = self.ctx.resolver.resolve(target).map_err(execution_error)?;
            let output = connector.query(&sql).await.map_err(execution_error)?;
            outputs.push(output);
        }

        checkpoint(Step::Classify, token, job)?;

        // 3. CLASSIFY
        self.classify(rule, &outputs, result)
            .map_err(|m| ExecutionError::new(ExecutionErrorKind::Query, m))
    }

    /// Template rendering then dialect translation of user-authored SQL.
    fn prepare(
        &self,
        rule: &Rule,
        sql: &str,
        target: Dialect,
        result: &mut RuleExecutionResult,
    ) -> Result<String, ExecutionError> {
        let rendered = if sql.contains("${") {
            let scope = &rule.scope;
            let context = json!({
                "source": scope.source,
                "schema": scope.schema,
                "table": scope.table,
                "column": scope.column,
                "qualified_table": rule.dialect.qualified_table(scope.schema.as_deref(), &scope.table),
            });
            self.ctx
                .templates
                .render(sql, &context)
                .map_err(|e| ExecutionError::new(ExecutionErrorKind::Template, e.to_string()))?
        } else {
            sql.to_string()
        };

        let translation = self.ctx.translator.translate_with_report(&rendered, rule.dialect, target);
        if translation.was_rewritten() {
            debug!(
                from = %rule.dialect,
                to = %target,
                idioms = ?translation.applied,
                "Query translated"
            );
        }
        result.translation_notes.extend(translation.notes);
        Ok(translation.sql)
    }

    fn classify(
        &self,
        rule: &Rule,
        outputs: &[QueryOutput],
        result: &RuleExecutionResult,
    ) -> Result<Classification, String> {
        let first = outputs.first().ok_or("no query output to classify")?;
        match &rule.kind {
            RuleKind::Threshold {
                metric,
                operator,
                threshold,
                ..
            } => classify::classify_threshold(*metric, *operator, *threshold, first),
            RuleKind::RawQuery { .. } => classify::classify_raw(first),
            RuleKind::Pattern { regex, .. } => classify::classify_pattern(regex, first),
            RuleKind::Freshness { max_age_hours, .. } => {
                classify::classify_freshness(*max_age_hours, first, Utc::now())
            }
            RuleKind::Comparison {
                operator, tolerance, ..
            } => {
                let second = outputs.get(1).ok_or("comparison needs two query outputs")?;
                classify::classify_comparison(*operator, *tolerance, first, second)
            }
            RuleKind::StatisticalAnomaly { metric, .. } => {
                let observed = classify::metric_value(*metric, first)?;
                let prediction = match &self.ctx.models {
                    Some(store) => store
                        .current_model(&rule.id)
                        .map_err(|e| e.to_string())?
                        .map(|model| {
                            model.predict(&Observation::new(result.executed_at, observed), Some(result.id))
                        }),
                    None => None,
                };
                if let (Some(store), Some(p)) = (&self.ctx.models, &prediction) {
                    store.append_prediction(p).map_err(|e| e.to_string())?;
                }
                Ok(classify::classify_statistical(observed, prediction.as_ref()))
            }
        }
    }
}

fn checkpoint(step: Step, token: &CancellationToken, job: &CancellationToken) -> Result<(), ExecutionError> {
    if token.is_cancelled() || job.is_cancelled() {
        return Err(ExecutionError::new(
            ExecutionErrorKind::Cancelled,
            format!("cancelled before {:?} step", step).to_lowercase(),
        ));
    }
    Ok(())
}

/// Connector/resolver failure -> error taxonomy.
fn execution_error(e: WardenError) -> ExecutionError {
    let kind = match &e {
        e if e.is_connectivity() => ExecutionErrorKind::Connectivity,
        WardenError::Infrastructure(InfrastructureError::TemplateError(_)) => ExecutionErrorKind::Template,
        _ => ExecutionErrorKind::Query,
    };
    ExecutionError::new(kind, e.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::dialect::EngineFamily;
    use crate::domain::quality::{ExecutionErrorKind, Outcome};
    use crate::infrastructure::adapters::{DuckDBConnector, StaticResolver};
    use crate::infrastructure::compiler::JinjaRenderer;
    use crate::ports::connector::{ColumnSchema, Connector};
    use async_trait::async_trait;

    /// Records every statement and answers with a canned output.
    struct MockConnector {
        seen: Arc<Mutex<Vec<String>>>,
        answer: Result<QueryOutput, String>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn query(&self, sql: &str) -> Result<QueryOutput, WardenError> {
            self.seen.lock().unwrap().push(sql.to_string());
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            self.answer
                .clone()
                .map_err(|m| InfrastructureError::Connection(m).into())
        }
        async fn execute(&self, _sql: &str) -> Result<u64, WardenError> {
            Ok(0)
        }
        async fn fetch_columns(&self, _s: Option<&str>, _t: &str) -> Result<Vec<ColumnSchema>, WardenError> {
            Ok(vec![])
        }
        fn engine_name(&self) -> &str {
            "mock"
        }
    }

    fn engine_with(connector: Arc<dyn Connector>, engine: EngineFamily, timeout_secs: u64) -> RuleEngine {
        RuleEngine::new(ExecutionContext {
            resolver: Arc::new(StaticResolver::new().with("wh", connector)),
            translator: DialectTranslator::new(),
            templates: Arc::new(JinjaRenderer::new()),
            models: None,
            sources: vec![DataSourceDescriptor::new("wh", engine)],
            settings: EngineSettings {
                timeout_secs,
                ..Default::default()
            },
        })
    }

    fn rule(yaml: &str) -> Rule {
        serde_yaml::from_str(yaml).unwrap()
    }

    async fn seeded_duckdb() -> anyhow::Result<Arc<DuckDBConnector>> {
        let db = DuckDBConnector::new(":memory:")?;
        db.execute("CREATE TABLE customers (id INTEGER, email VARCHAR, status VARCHAR)").await?;
        // 25 rows, 3 without email (12%).
        db.execute(
            "INSERT INTO customers SELECT i, CASE WHEN i % 8 = 0 THEN NULL ELSE 'user' || CAST(i AS VARCHAR) || '@shop.io' END, \
             CASE WHEN i % 5 = 0 THEN 'inactive' ELSE 'active' END FROM range(1, 26) t(i)",
        )
        .await?;
        db.execute("CREATE TABLE empty_orders (id INTEGER)").await?;
        Ok(Arc::new(db))
    }

    #[tokio::test]
    async fn test_null_rate_over_threshold_fails_with_null_count() -> anyhow::Result<()> {
        let engine = engine_with(seeded_duckdb().await?, EngineFamily::Duckdb, 5);
        let r = rule(
            r#"
id: email_null_rate
dimension: completeness
severity: high
scope: { source: wh, table: customers, column: email }
check: { type: threshold, metric: null_rate, operator: "<=", threshold: 0.05 }
"#,
        );
        let result = engine.execute_rule(&r, &CancellationToken::new()).await;
        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.rows_failed, 3);
        assert_eq!(result.rows_examined, Some(25));
        assert!((result.metric_value.unwrap() - 0.12).abs() < 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn test_filter_clause_from_postgres_runs_on_duckdb_and_mssql_shape() -> anyhow::Result<()> {
        let db = seeded_duckdb().await?;
        let engine = engine_with(db, EngineFamily::Duckdb, 5);
        let r = rule(
            r#"
id: inactive_with_email
dimension: consistency
dialect: postgres
scope: { source: wh, table: customers }
check:
  type: raw_query
  query: "SELECT COUNT(*) FILTER (WHERE status = 'inactive' AND email IS NOT NULL) AS failing_rows FROM ${qualified_table}"
"#,
        );
        let result = engine.execute_rule(&r, &CancellationToken::new()).await;
        assert_eq!(result.outcome, Outcome::Failed);
        // ids 5, 10, 15, 20, 25 are inactive; none is a multiple of 8.
        assert_eq!(result.rows_failed, 5);
        assert_eq!(
            result.executed_sql,
            vec!["SELECT COUNT(*) FILTER (WHERE status = 'inactive' AND email IS NOT NULL) AS failing_rows FROM \"customers\""]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_translated_rules_count_like_native_ones() -> anyhow::Result<()> {
        let engine = engine_with(seeded_duckdb().await?, EngineFamily::Duckdb, 5);
        let cases = [
            (
                // ids 5, 10, 15, 20, 25
                5,
                r#"
id: inactive_tsql
dimension: consistency
dialect: mssql
scope: { source: wh, table: customers }
check:
  type: raw_query
  query: "SELECT SUM(CASE WHEN [status] = 'inactive' AND [email] IS NOT NULL THEN 1 ELSE 0 END) AS failing_rows FROM [customers]"
"#,
                r#"
id: inactive_native
dimension: consistency
dialect: duckdb
scope: { source: wh, table: customers }
check:
  type: raw_query
  query: "SELECT COUNT(*) FILTER (WHERE status = 'inactive' AND email IS NOT NULL) AS failing_rows FROM customers"
"#,
            ),
            (
                // user10 .. user19 without user16
                9,
                r#"
id: teen_ids_postgres
dimension: validity
dialect: postgres
scope: { source: wh, table: customers }
check:
  type: raw_query
  query: "SELECT COUNT(*) AS failing_rows FROM customers WHERE email ~ '^user1[0-9]@'"
"#,
                r#"
id: teen_ids_native
dimension: validity
dialect: duckdb
scope: { source: wh, table: customers }
check:
  type: raw_query
  query: "SELECT COUNT(*) AS failing_rows FROM customers WHERE regexp_matches(email, '^user1[0-9]@')"
"#,
            ),
        ];

        for (expected, translated, native) in cases {
            let translated = rule(translated);
            let native = rule(native);
            let a = engine.execute_rule(&translated, &CancellationToken::new()).await;
            let b = engine.execute_rule(&native, &CancellationToken::new()).await;

            assert_eq!(a.outcome, Outcome::Failed, "{}: {:?}", translated.id, a.error);
            assert_eq!(b.outcome, Outcome::Failed, "{}: {:?}", native.id, b.error);
            assert_eq!(a.rows_failed, b.rows_failed, "{} vs {}", translated.id, native.id);
            assert_eq!(a.rows_failed, expected);
            let sql = &a.executed_sql[0];
            assert!(!sql.contains("[customers]") && !sql.contains(" ~ "), "untranslated: {sql}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_translation_applied_for_mssql_source() {
        let seen = Arc::new(Mutex::new(vec![]));
        let mock = Arc::new(MockConnector {
            seen: Arc::clone(&seen),
            answer: Ok(QueryOutput::new(vec!["failing_rows".into()], vec![vec![json!(0)]])),
            delay: None,
        });
        let engine = engine_with(mock, EngineFamily::Tds, 5);
        let r = rule(
            r#"
id: x
dimension: validity
dialect: postgres
scope: { source: wh, table: orders }
check: { type: raw_query, query: "SELECT COUNT(*) FILTER (WHERE \"amount\" < 0) AS failing_rows FROM \"orders\"" }
"#,
        );
        let result = engine.execute(&r, engine.source("wh").unwrap()).await;
        assert_eq!(result.outcome, Outcome::Passed);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["SELECT SUM(CASE WHEN [amount] < 0 THEN 1 ELSE 0 END) AS failing_rows FROM [orders]"]
        );
    }

    #[tokio::test]
    async fn test_syntax_error_is_error_not_failure() -> anyhow::Result<()> {
        let engine = engine_with(seeded_duckdb().await?, EngineFamily::Duckdb, 5);
        let r = rule(
            r#"
id: broken
dimension: validity
scope: { source: wh, table: customers }
check: { type: raw_query, query: "SELEC oops FROM customers" }
"#,
        );
        let result = engine.execute_rule(&r, &CancellationToken::new()).await;
        assert_eq!(result.outcome, Outcome::Error);
        assert_eq!(result.error.as_ref().map(|e| e.kind), Some(ExecutionErrorKind::Query));
        assert_eq!(result.rows_failed, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_timeout_and_connectivity_are_errors() {
        let slow = Arc::new(MockConnector {
            seen: Arc::new(Mutex::new(vec![])),
            answer: Ok(QueryOutput::default()),
            delay: Some(Duration::from_secs(5)),
        });
        let engine = engine_with(slow, EngineFamily::Duckdb, 1);
        let r = rule(
            "id: t\ndimension: completeness\nscope: { source: wh, table: orders }\ncheck: { type: threshold, metric: row_count, operator: '>=', threshold: 1 }\n",
        );
        let result = engine.execute_rule(&r, &CancellationToken::new()).await;
        assert_eq!(result.error.as_ref().map(|e| e.kind), Some(ExecutionErrorKind::Timeout));

        let down = Arc::new(MockConnector {
            seen: Arc::new(Mutex::new(vec![])),
            answer: Err("connection refused".into()),
            delay: None,
        });
        let engine = engine_with(down, EngineFamily::Duckdb, 5);
        let result = engine.execute_rule(&r, &CancellationToken::new()).await;
        assert_eq!(result.error.as_ref().map(|e| e.kind), Some(ExecutionErrorKind::Connectivity));
    }

    #[tokio::test]
    async fn test_unknown_placeholder_is_template_error() -> anyhow::Result<()> {
        let engine = engine_with(seeded_duckdb().await?, EngineFamily::Duckdb, 5);
        let r = rule(
            "id: t\ndimension: validity\nscope: { source: wh, table: customers }\ncheck: { type: raw_query, query: 'SELECT * FROM ${tabel}' }\n",
        );
        let result = engine.execute_rule(&r, &CancellationToken::new()).await;
        assert_eq!(result.error.as_ref().map(|e| e.kind), Some(ExecutionErrorKind::Template));
        assert!(result.executed_sql.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_disabled_source_cancels() -> anyhow::Result<()> {
        let engine = engine_with(seeded_duckdb().await?, EngineFamily::Duckdb, 5);
        engine.disable_source("wh");
        let r = rule(
            "id: t\ndimension: completeness\nscope: { source: wh, table: customers }\ncheck: { type: threshold, metric: row_count, operator: '>=', threshold: 1 }\n",
        );
        let result = engine.execute_rule(&r, &CancellationToken::new()).await;
        assert_eq!(result.error.as_ref().map(|e| e.kind), Some(ExecutionErrorKind::Cancelled));
        assert!(result.executed_sql.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_table_check_freshness_and_pattern() -> anyhow::Result<()> {
        let engine = engine_with(seeded_duckdb().await?, EngineFamily::Duckdb, 5);
        let not_empty = rule(
            "id: ne\ndimension: completeness\nseverity: high\nscope: { source: wh, table: empty_orders }\ncheck: { type: threshold, metric: row_count, operator: '>=', threshold: 1 }\n",
        );
        assert!(not_empty.is_empty_table_check());
        let result = engine.execute_rule(&not_empty, &CancellationToken::new()).await;
        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.metric_value, Some(0.0));

        let pattern = rule(
            "id: p\ndimension: validity\nscope: { source: wh, table: customers, column: email }\ncheck: { type: pattern, regex: '^[a-z0-9]+@shop\\.io$' }\n",
        );
        let result = engine.execute_rule(&pattern, &CancellationToken::new()).await;
        assert_eq!(result.outcome, Outcome::Passed);
        assert_eq!(result.rows_examined, Some(22));
        Ok(())
    }
}
