// warden-core/src/domain/governance/masking.rs

use crate::domain::dialect::Dialect;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskingStrategy {
    Hash,
    Redact,
    Nullify,
    Partial,
    MaskEmail,
}

impl MaskingStrategy {
    pub const ALL: [MaskingStrategy; 5] = [
        Self::Hash,
        Self::Redact,
        Self::Nullify,
        Self::Partial,
        Self::MaskEmail,
    ];

    /// SQL expression producing the masked value of `column` (already quoted).
    /// `None` when the engine has no way to express the strategy.
    pub fn expression(&self, column: &str, dialect: Dialect) -> Option<String> {
        let text = dialect.text_type();
        match self {
            // 🔒 HASH
            Self::Hash => dialect.sha256_expression(column),
            // 🔒 REDACT
            Self::Redact => Some("'REDACTED'".to_string()),
            // 🔒 NULLIFY
            Self::Nullify => Some("NULL".to_string()),
            // 🔒 PARTIAL : deux premiers caractères + ***
            Self::Partial => Some(match dialect {
                Dialect::Sqlite => format!("substr(CAST({} AS TEXT), 1, 2) || '***'", column),
                _ => format!("CONCAT(LEFT(CAST({} AS {}), 2), '***')", column, text),
            }),
            // 🔒 EMAIL : j****@domain
            Self::MaskEmail => Some(match dialect {
                Dialect::Postgres | Dialect::DuckDb => format!(
                    "regexp_replace({}, '(^.).*(@.*$)', '\\1****\\2')",
                    column
                ),
                Dialect::Snowflake => format!(
                    "REGEXP_REPLACE({}, '(^.).*(@.*$)', '\\\\1****\\\\2')",
                    column
                ),
                Dialect::MySql => format!("REGEXP_REPLACE({}, '^(.).*(@.*)$', '$1****$2')", column),
                Dialect::MsSql => format!(
                    "CONCAT(LEFT({c}, 1), '****', SUBSTRING({c}, CHARINDEX('@', {c}), LEN({c})))",
                    c = column
                ),
                Dialect::Sqlite => format!(
                    "substr({c}, 1, 1) || '****' || substr({c}, instr({c}, '@'))",
                    c = column
                ),
            }),
        }
    }

    /// Strategies that keep nothing of the original value.
    pub fn is_irreversible(&self) -> bool {
        matches!(self, Self::Hash | Self::Redact | Self::Nullify)
    }
}

impl FromStr for MaskingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "redact" => Ok(Self::Redact),
            "nullify" => Ok(Self::Nullify),
            "partial" => Ok(Self::Partial),
            "mask_email" | "email" => Ok(Self::MaskEmail),
            _ => Err(format!("Unknown masking strategy: {}", s)),
        }
    }
}

impl std::fmt::Display for MaskingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Hash => "hash",
            Self::Redact => "redact",
            Self::Nullify => "nullify",
            Self::Partial => "partial",
            Self::MaskEmail => "mask_email",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_expression_follows_dialect() {
        assert_eq!(
            MaskingStrategy::Hash.expression("\"email\"", Dialect::DuckDb).as_deref(),
            Some("sha256(CAST(\"email\" AS VARCHAR))")
        );
        assert!(MaskingStrategy::Hash.expression("email", Dialect::Sqlite).is_none());
    }

    #[test]
    fn test_mask_email_expressions() {
        assert_eq!(
            MaskingStrategy::MaskEmail.expression("email", Dialect::Postgres).as_deref(),
            Some("regexp_replace(email, '(^.).*(@.*$)', '\\1****\\2')")
        );
        assert!(
            MaskingStrategy::MaskEmail
                .expression("[email]", Dialect::MsSql)
                .unwrap_or_default()
                .starts_with("CONCAT(LEFT([email], 1), '****'")
        );
    }

    #[test]
    fn test_partial_and_round_trip_names() {
        assert_eq!(
            MaskingStrategy::Partial.expression("`ssn`", Dialect::MySql).as_deref(),
            Some("CONCAT(LEFT(CAST(`ssn` AS CHAR), 2), '***')")
        );
        for s in MaskingStrategy::ALL {
            assert_eq!(s.to_string().parse::<MaskingStrategy>(), Ok(s));
        }
    }
}
