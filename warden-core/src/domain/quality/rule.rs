// warden-core/src/domain/quality/rule.rs

use crate::domain::anomaly::ModelKind;
use crate::domain::dialect::Dialect;
use crate::domain::error::DomainError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationError};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Completeness,
    Accuracy,
    Consistency,
    Validity,
    Freshness,
    Uniqueness,
}

/// Comparison used by threshold and cross-table rules: `observed <op> expected` must hold to pass.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Lte,
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Gte,
    #[default]
    #[serde(alias = "=", alias = "==")]
    Eq,
    #[serde(alias = "!=", alias = "<>")]
    Neq,
}

impl CompareOp {
    pub fn holds(&self, observed: f64, expected: f64, tolerance: f64) -> bool {
        match self {
            Self::Lt => observed < expected,
            Self::Lte => observed <= expected + tolerance,
            Self::Gt => observed > expected,
            Self::Gte => observed + tolerance >= expected,
            Self::Eq => (observed - expected).abs() <= tolerance,
            Self::Neq => (observed - expected).abs() > tolerance,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "=",
            Self::Neq => "!=",
        }
    }
}

/// Built-in metrics computed without user SQL.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    NullRate,
    NullCount,
    #[default]
    RowCount,
    DuplicateRate,
    DuplicateCount,
    /// User query returning a single number.
    Custom,
}

impl Metric {
    pub fn needs_column(&self) -> bool {
        matches!(self, Self::NullRate | Self::NullCount | Self::DuplicateRate | Self::DuplicateCount)
    }
}

fn default_sample_limit() -> u64 {
    1000
}

/// The six check kinds. Each one is planned and classified by pure functions in `classify`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    Threshold {
        metric: Metric,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
        operator: CompareOp,
        threshold: f64,
    },
    RawQuery {
        query: String,
    },
    Pattern {
        regex: String,
        #[serde(default = "default_sample_limit")]
        sample_limit: u64,
    },
    Freshness {
        timestamp_column: String,
        max_age_hours: f64,
    },
    Comparison {
        left_query: String,
        right_query: String,
        /// Runs the right side on another data source when set.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        right_source: Option<String>,
        #[serde(default)]
        operator: CompareOp,
        #[serde(default)]
        tolerance: f64,
    },
    StatisticalAnomaly {
        #[serde(default)]
        metric: Metric,
        #[serde(default)]
        model: ModelKind,
    },
}

impl RuleKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Threshold { .. } => "threshold",
            Self::RawQuery { .. } => "raw_query",
            Self::Pattern { .. } => "pattern",
            Self::Freshness { .. } => "freshness",
            Self::Comparison { .. } => "comparison",
            Self::StatisticalAnomaly { .. } => "statistical_anomaly",
        }
    }

    /// User-authored SQL carried by the rule.
    pub fn queries(&self) -> Vec<&str> {
        match self {
            Self::Threshold { query: Some(q), .. } => vec![q.as_str()],
            Self::RawQuery { query } => vec![query.as_str()],
            Self::Comparison { left_query, right_query, .. } => {
                vec![left_query.as_str(), right_query.as_str()]
            }
            _ => vec![],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Validate)]
pub struct RuleScope {
    /// Data-source id.
    #[validate(length(min = 1, message = "Scope source cannot be empty"))]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[validate(length(min = 1, message = "Scope table cannot be empty"))]
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl RuleScope {
    /// `source.schema.table[.column]`, for issues and models.
    pub fn label(&self) -> String {
        [
            Some(self.source.as_str()),
            self.schema.as_deref(),
            Some(self.table.as_str()),
            self.column.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(".")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtectionRequirements {
    #[serde(default)]
    pub requires_encryption: bool,
    #[serde(default)]
    pub requires_masking: bool,
}

impl ProtectionRequirements {
    pub fn any(&self) -> bool {
        self.requires_encryption || self.requires_masking
    }
}

fn default_enabled() -> bool {
    true
}

/// A check definition. Read-only for this crate: execution never mutates it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Validate)]
pub struct Rule {
    #[validate(length(min = 1, message = "Rule id cannot be empty"))]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub dimension: Dimension,
    #[serde(default)]
    pub severity: Severity,
    /// Dialect the query text was authored in.
    #[serde(default)]
    pub dialect: Dialect,
    #[validate(nested)]
    pub scope: RuleScope,
    #[validate(custom(function = "validate_kind"))]
    #[serde(rename = "check")]
    pub kind: RuleKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Estimated dollars at risk when the rule fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue_impact: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection: Option<ProtectionRequirements>,
}

impl Rule {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }

    /// A query with `${...}` placeholders must be rendered before it can run.
    pub fn is_template(&self) -> bool {
        self.kind.queries().iter().any(|q| q.contains("${"))
    }

    pub fn is_protection_rule(&self) -> bool {
        self.protection.is_some_and(|p| p.any())
    }

    /// Structural "the table should contain at least one row" check.
    pub fn is_empty_table_check(&self) -> bool {
        match &self.kind {
            RuleKind::Threshold {
                metric: Metric::RowCount,
                operator,
                threshold,
                ..
            } => match operator {
                CompareOp::Gte => *threshold <= 1.0 && *threshold > 0.0,
                CompareOp::Gt => *threshold == 0.0,
                CompareOp::Neq => *threshold == 0.0,
                _ => false,
            },
            _ => false,
        }
    }

    /// Field validation plus the checks spanning several fields.
    pub fn check(&self) -> Result<(), DomainError> {
        self.validate().map_err(|e| DomainError::InvalidRule {
            rule_id: self.id.clone(),
            reason: e.to_string(),
        })?;

        let invalid = |reason: &str| DomainError::InvalidRule {
            rule_id: self.id.clone(),
            reason: reason.to_string(),
        };
        let has_column = self.scope.column.as_deref().is_some_and(|c| !c.is_empty());
        match &self.kind {
            RuleKind::Pattern { .. } if !has_column => Err(invalid("pattern rules need scope.column")),
            RuleKind::Threshold { metric, .. } | RuleKind::StatisticalAnomaly { metric, .. }
                if metric.needs_column() && !has_column =>
            {
                Err(invalid("this metric needs scope.column"))
            }
            RuleKind::StatisticalAnomaly { metric: Metric::Custom, .. } => {
                Err(invalid("statistical anomaly rules only observe built-in metrics"))
            }
            _ if self.protection.is_some_and(|p| p.requires_encryption) && !has_column => {
                Err(invalid("encryption requirements need scope.column"))
            }
            _ => Ok(()),
        }
    }
}

fn validate_kind(kind: &RuleKind) -> Result<(), ValidationError> {
    let fail = |code: &'static str, message: &'static str| {
        let mut e = ValidationError::new(code);
        e.message = Some(message.into());
        Err(e)
    };
    match kind {
        RuleKind::Threshold { metric, query, threshold, .. } => {
            if !threshold.is_finite() {
                return fail("threshold", "Threshold must be a finite number");
            }
            match (metric, query.as_deref()) {
                (Metric::Custom, None) | (Metric::Custom, Some("")) => {
                    fail("query", "Custom metrics need a query")
                }
                _ => Ok(()),
            }
        }
        RuleKind::RawQuery { query } if query.trim().is_empty() => fail("query", "Query cannot be empty"),
        RuleKind::Pattern { regex, sample_limit } => {
            if Regex::new(regex).is_err() {
                return fail("regex", "Pattern is not a valid regular expression");
            }
            if *sample_limit == 0 {
                return fail("sample_limit", "Sample limit must be positive");
            }
            Ok(())
        }
        RuleKind::Freshness { max_age_hours, timestamp_column } => {
            if timestamp_column.is_empty() {
                return fail("timestamp_column", "Timestamp column cannot be empty");
            }
            if !(max_age_hours.is_finite() && *max_age_hours > 0.0) {
                return fail("max_age_hours", "Max age must be a positive number of hours");
            }
            Ok(())
        }
        RuleKind::Comparison { left_query, right_query, tolerance, .. } => {
            if left_query.trim().is_empty() || right_query.trim().is_empty() {
                return fail("query", "Both comparison queries are required");
            }
            if !(tolerance.is_finite() && *tolerance >= 0.0) {
                return fail("tolerance", "Tolerance must be a non-negative number");
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn rule_yaml(check: &str) -> String {
        format!(
            r#"
id: customers_email
dimension: completeness
severity: high
scope: {{ source: warehouse, table: customers, column: email }}
check:
{check}
"#
        )
    }

    #[test]
    fn test_parse_threshold_rule() -> Result<()> {
        let rule: Rule = serde_yaml::from_str(&rule_yaml(
            "  type: threshold\n  metric: null_rate\n  operator: \"<=\"\n  threshold: 0.05",
        ))?;
        assert!(rule.enabled);
        assert_eq!(rule.dialect, Dialect::Postgres);
        assert_eq!(
            rule.kind,
            RuleKind::Threshold {
                metric: Metric::NullRate,
                query: None,
                operator: CompareOp::Lte,
                threshold: 0.05
            }
        );
        rule.check()?;
        Ok(())
    }

    #[test]
    fn test_invalid_regex_is_rejected() -> Result<()> {
        let rule: Rule = serde_yaml::from_str(&rule_yaml("  type: pattern\n  regex: \"([a-z\""))?;
        let err = rule.check().unwrap_err();
        assert!(matches!(err, DomainError::InvalidRule { .. }));
        Ok(())
    }

    #[test]
    fn test_template_detection() -> Result<()> {
        let rule: Rule = serde_yaml::from_str(&rule_yaml(
            "  type: raw_query\n  query: \"SELECT * FROM ${qualified_table} WHERE email IS NULL\"",
        ))?;
        assert!(rule.is_template());
        Ok(())
    }

    #[test]
    fn test_empty_table_check_detection() -> Result<()> {
        let rule: Rule = serde_yaml::from_str(&rule_yaml(
            "  type: threshold\n  metric: row_count\n  operator: \">=\"\n  threshold: 1",
        ))?;
        assert!(rule.is_empty_table_check());

        let not_structural: Rule = serde_yaml::from_str(&rule_yaml(
            "  type: threshold\n  metric: row_count\n  operator: \">=\"\n  threshold: 500",
        ))?;
        assert!(!not_structural.is_empty_table_check());
        Ok(())
    }

    #[test]
    fn test_compare_op_tolerance() {
        assert!(CompareOp::Eq.holds(100.0, 102.0, 2.0));
        assert!(!CompareOp::Eq.holds(100.0, 103.0, 2.0));
        assert!(CompareOp::Lte.holds(0.05, 0.05, 0.0));
        assert!(!CompareOp::Lte.holds(0.12, 0.05, 0.0));
    }
}
