// warden-core/src/domain/quality/classify.rs

// Pure half of rule execution: which queries a rule needs, and how their rows become an outcome.
// No I/O here; the engine feeds query outputs in.

use crate::domain::anomaly::Prediction;
use crate::domain::dialect::Dialect;
use crate::domain::quality::rule::{CompareOp, Metric, Rule, RuleKind, RuleScope};
use crate::ports::connector::QueryOutput;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;

/// Column conventions understood in user queries.
pub const FAILING_ROWS_COLUMNS: &[&str] = &["failing_rows", "failed_count"];
pub const PASSED_COLUMN: &str = "passed";
pub const TOTAL_ROWS_COLUMN: &str = "total_rows";

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedQuery {
    pub sql: String,
    /// Authored by the rule writer: needs template rendering and dialect translation.
    pub authored: bool,
    /// Runs on another data source than the rule scope.
    pub source: Option<String>,
}

impl PlannedQuery {
    fn generated(sql: String) -> Self {
        Self {
            sql,
            authored: false,
            source: None,
        }
    }

    fn authored(sql: &str, source: Option<String>) -> Self {
        Self {
            sql: sql.to_string(),
            authored: true,
            source,
        }
    }
}

/// Passed/failed verdict with its measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub passed: bool,
    pub rows_examined: Option<u64>,
    pub rows_failed: u64,
    pub metric_value: Option<f64>,
    pub message: String,
}

/// Queries needed by a rule. Generated SQL is written directly in `target`.
pub fn plan(rule: &Rule, target: Dialect) -> Vec<PlannedQuery> {
    let scope = &rule.scope;
    match &rule.kind {
        RuleKind::Threshold { metric: Metric::Custom, query, .. } => {
            vec![PlannedQuery::authored(query.as_deref().unwrap_or_default(), None)]
        }
        RuleKind::Threshold { metric, .. } | RuleKind::StatisticalAnomaly { metric, .. } => {
            metric_sql(*metric, scope, target)
                .map(PlannedQuery::generated)
                .into_iter()
                .collect()
        }
        RuleKind::RawQuery { query } => vec![PlannedQuery::authored(query, None)],
        RuleKind::Pattern { sample_limit, .. } => {
            let column = target.quote_ident(scope.column.as_deref().unwrap_or_default());
            let from = format!("{} WHERE {} IS NOT NULL", table_ref(scope, target), column);
            vec![PlannedQuery::generated(target.select_limited(&column, &from, *sample_limit))]
        }
        RuleKind::Freshness { timestamp_column, .. } => vec![PlannedQuery::generated(format!(
            "SELECT MAX({}) AS latest FROM {}",
            target.quote_ident(timestamp_column),
            table_ref(scope, target)
        ))],
        RuleKind::Comparison {
            left_query,
            right_query,
            right_source,
            ..
        } => vec![
            PlannedQuery::authored(left_query, None),
            PlannedQuery::authored(right_query, right_source.clone()),
        ],
    }
}

fn table_ref(scope: &RuleScope, dialect: Dialect) -> String {
    dialect.qualified_table(scope.schema.as_deref(), &scope.table)
}

/// Built-in metric query. Always yields `total_rows` and, when relevant, `failing_rows`.
pub fn metric_sql(metric: Metric, scope: &RuleScope, dialect: Dialect) -> Option<String> {
    let table = table_ref(scope, dialect);
    let column = scope.column.as_deref().map(|c| dialect.quote_ident(c));
    match (metric, column) {
        (Metric::RowCount, _) => Some(format!("SELECT COUNT(*) AS total_rows FROM {}", table)),
        (Metric::NullCount | Metric::NullRate, Some(c)) => Some(format!(
            "SELECT COUNT(*) AS total_rows, SUM(CASE WHEN {} IS NULL THEN 1 ELSE 0 END) AS failing_rows FROM {}",
            c, table
        )),
        (Metric::DuplicateCount | Metric::DuplicateRate, Some(c)) => Some(format!(
            "SELECT COUNT(*) AS total_rows, COUNT({c}) - COUNT(DISTINCT {c}) AS failing_rows FROM {}",
            table
        )),
        _ => None,
    }
}

// --- VALUE HELPERS ---

pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "t" | "1" | "yes" => Some(true),
            "false" | "f" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// SUM over an empty table is NULL; counts treat it as zero.
fn count_column(output: &QueryOutput, column: &str) -> Result<Option<u64>, String> {
    match output.first_value(column) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(0)),
        Some(v) => as_f64(v)
            .map(|f| Some(f.max(0.0).round() as u64))
            .ok_or_else(|| format!("column '{}' is not numeric: {}", column, v)),
    }
}

fn failing_rows(output: &QueryOutput) -> Result<Option<u64>, String> {
    for column in FAILING_ROWS_COLUMNS {
        if let Some(v) = count_column(output, column)? {
            return Ok(Some(v));
        }
    }
    Ok(None)
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 { 0.0 } else { part as f64 / total as f64 }
}

// --- CLASSIFIERS ---

pub fn classify_threshold(
    metric: Metric,
    operator: CompareOp,
    threshold: f64,
    output: &QueryOutput,
) -> Result<Classification, String> {
    let total = count_column(output, TOTAL_ROWS_COLUMN)?;
    let failing = failing_rows(output)?;

    let observed = match metric {
        Metric::RowCount => total.map(|t| t as f64),
        Metric::NullCount | Metric::DuplicateCount => failing.map(|f| f as f64),
        Metric::NullRate | Metric::DuplicateRate => {
            failing.map(|f| ratio(f, total.unwrap_or_default()))
        }
        Metric::Custom => match output.scalar() {
            Some(Value::Null) => Some(0.0),
            Some(v) => as_f64(v),
            None => None,
        },
    }
    .ok_or_else(|| format!("query returned no usable value for metric {:?}", metric))?;

    let passed = operator.holds(observed, threshold, 0.0);
    let rows_failed = match metric {
        Metric::RowCount => 0,
        _ if passed => 0,
        _ => failing.unwrap_or_default(),
    };

    Ok(Classification {
        passed,
        rows_examined: total,
        rows_failed,
        metric_value: Some(observed),
        message: format!(
            "{:?} = {} (expected {} {})",
            metric,
            format_number(observed),
            operator.symbol(),
            format_number(threshold)
        ),
    })
}

/// Non-empty result = failing rows, unless the query follows the `failing_rows` or `passed` convention.
pub fn classify_raw(output: &QueryOutput) -> Result<Classification, String> {
    if let Some(failing) = failing_rows(output)? {
        return Ok(Classification {
            passed: failing == 0,
            rows_examined: count_column(output, TOTAL_ROWS_COLUMN)?,
            rows_failed: failing,
            metric_value: None,
            message: format!("{} failing rows", failing),
        });
    }

    if let Some(idx) = output.column_index(PASSED_COLUMN) {
        // NULL or unreadable counts as failed.
        let failed = output
            .column_values(idx)
            .filter(|v| as_bool(v) != Some(true))
            .count() as u64;
        return Ok(Classification {
            passed: failed == 0,
            rows_examined: Some(output.row_count() as u64),
            rows_failed: failed,
            metric_value: None,
            message: format!("{} of {} checks failed", failed, output.row_count()),
        });
    }

    let rows = output.row_count() as u64;
    Ok(Classification {
        passed: rows == 0,
        rows_examined: None,
        rows_failed: rows,
        metric_value: None,
        message: format!("{} violating rows returned", rows),
    })
}

pub fn classify_pattern(regex: &str, output: &QueryOutput) -> Result<Classification, String> {
    let re = Regex::new(regex).map_err(|e| format!("invalid pattern: {}", e))?;
    let mut examined = 0u64;
    let mut mismatches = Vec::new();
    for value in output.column_values(0) {
        let Some(text) = as_text(value) else { continue };
        examined += 1;
        if !re.is_match(&text) {
            mismatches.push(text);
        }
    }
    let failed = mismatches.len() as u64;
    Ok(Classification {
        passed: failed == 0,
        rows_examined: Some(examined),
        rows_failed: failed,
        metric_value: Some(ratio(failed, examined)),
        message: format!("{} of {} sampled values do not match /{}/", failed, examined, regex),
    })
}

pub fn classify_freshness(
    max_age_hours: f64,
    output: &QueryOutput,
    now: DateTime<Utc>,
) -> Result<Classification, String> {
    let latest = match output.scalar() {
        None | Some(Value::Null) => {
            return Ok(Classification {
                passed: false,
                rows_examined: Some(0),
                rows_failed: 0,
                metric_value: None,
                message: "no timestamp found, table is empty".to_string(),
            });
        }
        Some(v) => parse_timestamp(v).ok_or_else(|| format!("cannot read a timestamp from {}", v))?,
    };

    let age_hours = (now - latest).num_seconds() as f64 / 3600.0;
    Ok(Classification {
        passed: age_hours <= max_age_hours,
        rows_examined: None,
        rows_failed: 0,
        metric_value: Some(age_hours),
        message: format!(
            "latest row is {}h old (max {}h)",
            format_number(age_hours),
            format_number(max_age_hours)
        ),
    })
}

pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(naive.and_utc());
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|n| n.and_utc())
        }
        // Epoch seconds
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

pub fn classify_comparison(
    operator: CompareOp,
    tolerance: f64,
    left: &QueryOutput,
    right: &QueryOutput,
) -> Result<Classification, String> {
    let read = |output: &QueryOutput, side: &str| match output.scalar() {
        Some(Value::Null) => Ok(0.0),
        Some(v) => as_f64(v).ok_or_else(|| format!("{} query returned a non-numeric value: {}", side, v)),
        None => Err(format!("{} query returned no rows", side)),
    };
    let l = read(left, "left")?;
    let r = read(right, "right")?;
    let passed = operator.holds(l, r, tolerance);
    let delta = l - r;
    Ok(Classification {
        passed,
        rows_examined: None,
        rows_failed: if passed { 0 } else { delta.abs().round() as u64 },
        metric_value: Some(delta),
        message: format!(
            "left {} {} right {} (tolerance {})",
            format_number(l),
            operator.symbol(),
            format_number(r),
            format_number(tolerance)
        ),
    })
}

/// Statistical rules pass unless the model calls the observation anomalous.
pub fn classify_statistical(observed: f64, prediction: Option<&Prediction>) -> Classification {
    match prediction {
        None => Classification {
            passed: true,
            rows_examined: None,
            rows_failed: 0,
            metric_value: Some(observed),
            message: "no baseline trained yet".to_string(),
        },
        Some(p) => Classification {
            passed: !p.is_anomaly,
            rows_examined: None,
            rows_failed: 0,
            metric_value: Some(observed),
            message: format!(
                "observed {} vs expected {} (score {:.2}, confidence {:.2})",
                format_number(observed),
                format_number(p.predicted_value),
                p.score,
                p.confidence
            ),
        },
    }
}

/// Observed value of a built-in metric query, for statistical rules.
pub fn metric_value(metric: Metric, output: &QueryOutput) -> Result<f64, String> {
    classify_threshold(metric, CompareOp::Gte, f64::MIN, output).and_then(|c| {
        c.metric_value
            .ok_or_else(|| "metric query returned no value".to_string())
    })
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{:.4}", v)
    }
}
