// warden-core/src/domain/quality/result.rs

use crate::domain::dialect::TranslationNote;
use crate::domain::quality::classify::Classification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed,
    /// The check could not run. Rule health concern, never a data-quality finding.
    Error,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    Connectivity,
    Timeout,
    /// Syntax errors (often a translation gap), missing objects, unusable result shapes.
    Query,
    Template,
    Cancelled,
    Unsupported,
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connectivity => "connectivity",
            Self::Timeout => "timeout",
            Self::Query => "query",
            Self::Template => "template",
            Self::Cancelled => "cancelled",
            Self::Unsupported => "unsupported",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    /// Raw database/driver message, kept whole for operators.
    pub message: String,
}

impl ExecutionError {
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// One execution attempt. Immutable once recorded; the history per rule is append-only.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RuleExecutionResult {
    pub id: Uuid,
    pub rule_id: String,
    pub source_id: String,
    pub executed_at: DateTime<Utc>,
    pub outcome: Outcome,
    #[serde(default)]
    pub rows_examined: Option<u64>,
    #[serde(default)]
    pub rows_failed: u64,
    #[serde(default)]
    pub metric_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub executed_sql: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub translation_notes: Vec<TranslationNote>,
}

const SUMMARY_MAX_CHARS: usize = 200;

impl RuleExecutionResult {
    /// A fresh attempt; outcome stays `passed` until recorded otherwise.
    pub fn new(rule_id: &str, source_id: &str, executed_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule_id: rule_id.to_string(),
            source_id: source_id.to_string(),
            executed_at,
            outcome: Outcome::Passed,
            rows_examined: None,
            rows_failed: 0,
            metric_value: None,
            message: None,
            error: None,
            duration_ms: 0,
            executed_sql: vec![],
            translation_notes: vec![],
        }
    }

    pub fn record_error(&mut self, kind: ExecutionErrorKind, message: impl Into<String>) {
        self.outcome = Outcome::Error;
        self.rows_failed = 0;
        self.error = Some(ExecutionError::new(kind, message));
    }

    pub fn record_classification(&mut self, c: Classification) {
        self.outcome = if c.passed { Outcome::Passed } else { Outcome::Failed };
        self.rows_examined = c.rows_examined;
        self.rows_failed = c.rows_failed;
        self.metric_value = c.metric_value;
        self.message = Some(c.message);
    }

    pub fn is_error(&self) -> bool {
        self.outcome == Outcome::Error
    }

    /// Value the anomaly models observe: the metric when the check has one, else the failing-row count.
    pub fn observed_value(&self) -> Option<f64> {
        match self.outcome {
            Outcome::Error => None,
            _ => Some(self.metric_value.unwrap_or(self.rows_failed as f64)),
        }
    }

    /// One-line summary for issue descriptions; full detail stays on the result.
    pub fn summary(&self) -> String {
        let text = match (&self.error, &self.message) {
            (Some(e), _) => {
                let first_line = e.message.lines().next().unwrap_or_default();
                format!("{} error: {}", e.kind, first_line)
            }
            (None, Some(m)) => m.clone(),
            (None, None) => format!("{} ({} failing rows)", self.outcome, self.rows_failed),
        };
        if text.chars().count() > SUMMARY_MAX_CHARS {
            let cut: String = text.chars().take(SUMMARY_MAX_CHARS).collect();
            format!("{}…", cut)
        } else {
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outcome: Outcome) -> RuleExecutionResult {
        let mut r = RuleExecutionResult::new("r1", "warehouse", Utc::now());
        r.outcome = outcome;
        r.rows_examined = Some(100);
        r.rows_failed = 12;
        r
    }

    #[test]
    fn test_observed_value_excludes_errors() {
        assert_eq!(result(Outcome::Failed).observed_value(), Some(12.0));
        assert_eq!(result(Outcome::Error).observed_value(), None);
    }

    #[test]
    fn test_record_error_clears_failing_rows() {
        let mut r = result(Outcome::Failed);
        r.record_error(ExecutionErrorKind::Timeout, "timed out after 30s");
        assert!(r.is_error());
        assert_eq!(r.rows_failed, 0);
        assert_eq!(r.summary(), "timeout error: timed out after 30s");
    }

    #[test]
    fn test_summary_keeps_first_line_only() {
        let mut r = result(Outcome::Error);
        r.error = Some(ExecutionError::new(
            ExecutionErrorKind::Query,
            "Parser Error: syntax error at or near \"FILTER\"\nLINE 1: SELECT ...\n        ^",
        ));
        assert_eq!(
            r.summary(),
            "query error: Parser Error: syntax error at or near \"FILTER\""
        );
    }
}
