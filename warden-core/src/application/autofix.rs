// warden-core/src/application/autofix.rs

// Preview is read-only. Execute mutates, and only with `confirmed = true`.
// Nothing in the validation or reopening flow calls into this service.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::issue::Issue;
use crate::domain::ports::IssueRepository;
use crate::domain::protection::ColumnRef;
use crate::domain::quality::classify::as_f64;
use crate::domain::quality::{DataSourceDescriptor, RuleCatalog};
use crate::domain::remediation::{AFFECTED_ROWS_COLUMN, FixOutcome, FixPlan, FixPreview, FixType};
use crate::error::WardenError;
use crate::ports::connector::{Connector, ConnectorResolver};

pub struct AutoFixService {
    resolver: Arc<dyn ConnectorResolver>,
    sources: HashMap<String, DataSourceDescriptor>,
    issues: Arc<dyn IssueRepository>,
    rules: Arc<RuleCatalog>,
}

impl AutoFixService {
    pub fn new(
        resolver: Arc<dyn ConnectorResolver>,
        sources: Vec<DataSourceDescriptor>,
        issues: Arc<dyn IssueRepository>,
        rules: Arc<RuleCatalog>,
    ) -> Self {
        Self {
            resolver,
            sources: sources.into_iter().map(|s| (s.id.clone(), s)).collect(),
            issues,
            rules,
        }
    }

    /// Dry run: affected-row count, SQL preview, warnings and alternatives. Mutates nothing.
    #[instrument(skip(self), fields(fix = fix.name()))]
    pub async fn preview(&self, issue_id: Uuid, fix: &FixType) -> Result<FixPreview, WardenError> {
        let (issue, plan, connector) = self.prepare(issue_id, fix).await?;
        let output = connector.query(&plan.count_sql).await?;
        let affected_rows = output
            .first_value(AFFECTED_ROWS_COLUMN)
            .and_then(as_f64)
            .unwrap_or_default() as u64;

        Ok(FixPreview {
            issue_id: issue.id,
            fix_type: fix.clone(),
            affected_rows,
            sql_preview: plan.mutation_sql,
            warnings: plan.warnings,
            strategy_options: plan.options,
        })
    }

    /// Applies the fix. Without confirmation nothing is looked up and nothing runs.
    #[instrument(skip(self), fields(fix = fix.name()))]
    pub async fn execute(&self, issue_id: Uuid, fix: &FixType, confirmed: bool) -> Result<FixOutcome, WardenError> {
        if !confirmed {
            return Err(DomainError::ConfirmationRequired {
                fix_type: fix.to_string(),
                issue_id: issue_id.to_string(),
            }
            .into());
        }

        let (issue, plan, connector) = self.prepare(issue_id, fix).await?;
        warn!(issue = %issue.id, "🛠️  Applying auto-fix: {}", plan.mutation_sql);
        let rows_affected = connector.execute(&plan.mutation_sql).await?;
        info!(issue = %issue.id, rows_affected, "Auto-fix applied");

        Ok(FixOutcome {
            issue_id: issue.id,
            fix_type: fix.clone(),
            rows_affected,
            executed_sql: plan.mutation_sql,
        })
    }

    /// The issue's rule names the column to fix; its source names the dialect.
    async fn prepare(&self, issue_id: Uuid, fix: &FixType) -> Result<(Issue, FixPlan, Arc<dyn Connector>), WardenError> {
        let issue = self
            .issues
            .get(issue_id)?
            .ok_or_else(|| DomainError::IssueNotFound(issue_id.to_string()))?;
        let rule = self.rules.require(&issue.rule_id)?;
        let column = ColumnRef::from_rule(rule).ok_or_else(|| DomainError::UnsupportedFix {
            fix_type: fix.name().to_string(),
            reason: format!("rule '{}' does not target a column", rule.id),
        })?;
        let source = self
            .sources
            .get(&column.source)
            .ok_or_else(|| DomainError::SourceNotFound(column.source.clone()))?;

        let plan = fix.plan(&column, source.dialect())?;
        let connector = self.resolver.resolve(source)?;
        ensure_column(connector.as_ref(), &column, fix).await?;
        Ok((issue, plan, connector))
    }
}

/// A fix against a dropped or renamed column fails up front instead of as a SQL error.
async fn ensure_column(connector: &dyn Connector, column: &ColumnRef, fix: &FixType) -> Result<(), WardenError> {
    let columns = connector.fetch_columns(column.schema.as_deref(), &column.table).await?;
    if columns.iter().any(|c| c.name.eq_ignore_ascii_case(&column.column)) {
        return Ok(());
    }
    Err(DomainError::UnsupportedFix {
        fix_type: fix.name().to_string(),
        reason: format!("column '{}' not found in {}", column.column, column.table),
    }
    .into())
}
