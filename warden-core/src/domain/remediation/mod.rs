// warden-core/src/domain/remediation/mod.rs

// Auto-fix SQL. Building a plan never touches the database; the application layer runs the
// count query for previews and the mutation only after explicit confirmation.

use crate::domain::dialect::Dialect;
use crate::domain::error::DomainError;
use crate::domain::governance::MaskingStrategy;
use crate::domain::protection::ColumnRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const AFFECTED_ROWS_COLUMN: &str = "affected_rows";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FixType {
    DeleteNullRows,
    FillNulls { value: String },
    TrimWhitespace,
    MaskColumn { strategy: MaskingStrategy },
}

impl FixType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeleteNullRows => "delete_null_rows",
            Self::FillNulls { .. } => "fill_nulls",
            Self::TrimWhitespace => "trim_whitespace",
            Self::MaskColumn { .. } => "mask_column",
        }
    }

    /// Read-only count plus the mutation, both in the target dialect.
    pub fn plan(&self, target: &ColumnRef, dialect: Dialect) -> Result<FixPlan, DomainError> {
        let table = dialect.qualified_table(target.schema.as_deref(), &target.table);
        let column = dialect.quote_ident(&target.column);
        let count = |predicate: &str| {
            format!(
                "SELECT COUNT(*) AS {} FROM {} WHERE {}",
                AFFECTED_ROWS_COLUMN, table, predicate
            )
        };

        let plan = match self {
            Self::DeleteNullRows => {
                let predicate = format!("{} IS NULL", column);
                FixPlan {
                    count_sql: count(&predicate),
                    mutation_sql: format!("DELETE FROM {} WHERE {}", table, predicate),
                    warnings: vec![
                        format!("Deletes entire rows of {}, not only the empty {} values", table, column),
                        "Deleted rows cannot be recovered without a backup".to_string(),
                    ],
                    options: vec!["fill_nulls".to_string()],
                }
            }
            Self::FillNulls { value } => {
                let predicate = format!("{} IS NULL", column);
                let mut warnings = vec![];
                if value.trim().is_empty() {
                    warnings.push("Filling with an empty value hides the gap instead of fixing it".to_string());
                }
                FixPlan {
                    count_sql: count(&predicate),
                    mutation_sql: format!(
                        "UPDATE {} SET {} = {} WHERE {}",
                        table,
                        column,
                        literal(value),
                        predicate
                    ),
                    warnings,
                    options: vec!["delete_null_rows".to_string()],
                }
            }
            Self::TrimWhitespace => {
                let trimmed = match dialect {
                    Dialect::MsSql => format!("LTRIM(RTRIM({}))", column),
                    _ => format!("TRIM({})", column),
                };
                let predicate = format!("{} <> {}", column, trimmed);
                FixPlan {
                    count_sql: count(&predicate),
                    mutation_sql: format!("UPDATE {} SET {} = {} WHERE {}", table, column, trimmed, predicate),
                    warnings: vec![],
                    options: vec![],
                }
            }
            Self::MaskColumn { strategy } => {
                let expression =
                    strategy
                        .expression(&column, dialect)
                        .ok_or_else(|| DomainError::UnsupportedFix {
                            fix_type: self.name().to_string(),
                            reason: format!("{} has no built-in for the '{}' strategy", dialect, strategy),
                        })?;
                let predicate = format!("{} IS NOT NULL", column);
                let mut warnings = vec![format!(
                    "Masking rewrites stored values of {}; the originals are lost",
                    column
                )];
                if *strategy == MaskingStrategy::Nullify {
                    warnings.push(format!("Fails if {} is declared NOT NULL", column));
                }
                if *strategy == MaskingStrategy::Hash {
                    warnings.push("Hashes of low-cardinality values can be reversed by lookup".to_string());
                }
                FixPlan {
                    count_sql: count(&predicate),
                    mutation_sql: format!("UPDATE {} SET {} = {} WHERE {}", table, column, expression, predicate),
                    warnings,
                    options: MaskingStrategy::ALL
                        .iter()
                        .filter(|s| *s != strategy && s.expression(&column, dialect).is_some())
                        .map(|s| format!("mask_column:{}", s))
                        .collect(),
                }
            }
        };
        Ok(plan)
    }
}

impl fmt::Display for FixType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FillNulls { value } => write!(f, "fill_nulls({})", value),
            Self::MaskColumn { strategy } => write!(f, "mask_column({})", strategy),
            other => write!(f, "{}", other.name()),
        }
    }
}

impl std::str::FromStr for FixType {
    type Err = String;

    /// `delete_null_rows`, `trim_whitespace`, `fill_nulls:<value>`, `mask_column:<strategy>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, arg) = match s.split_once(':') {
            Some((n, a)) => (n, Some(a)),
            None => (s, None),
        };
        match (name.to_lowercase().as_str(), arg) {
            ("delete_null_rows", None) => Ok(Self::DeleteNullRows),
            ("trim_whitespace", None) => Ok(Self::TrimWhitespace),
            ("fill_nulls", Some(value)) => Ok(Self::FillNulls {
                value: value.to_string(),
            }),
            ("mask_column", Some(strategy)) => Ok(Self::MaskColumn {
                strategy: strategy.parse()?,
            }),
            ("fill_nulls", None) => Err("fill_nulls needs a value: fill_nulls:<value>".to_string()),
            ("mask_column", None) => {
                Err("mask_column needs a strategy: mask_column:<hash|redact|nullify|partial|mask_email>".to_string())
            }
            _ => Err(format!("Unknown fix type: {}", s)),
        }
    }
}

/// Numbers stay numbers, everything else becomes a string literal.
fn literal(value: &str) -> String {
    if value.parse::<f64>().is_ok_and(f64::is_finite) {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixPlan {
    pub count_sql: String,
    pub mutation_sql: String,
    pub warnings: Vec<String>,
    /// Other fix types worth considering.
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FixPreview {
    pub issue_id: Uuid,
    pub fix_type: FixType,
    pub affected_rows: u64,
    pub sql_preview: String,
    pub warnings: Vec<String>,
    pub strategy_options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FixOutcome {
    pub issue_id: Uuid,
    pub fix_type: FixType,
    pub rows_affected: u64,
    pub executed_sql: String,
}
