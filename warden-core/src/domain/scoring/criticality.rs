// warden-core/src/domain/scoring/criticality.rs

// Additive 0..100 score. The bucket thresholds are a contract with every consumer
// (dashboards group on them), do not tune them here.

use crate::domain::quality::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MAX_SCORE: u8 = 100;
/// Ceiling for structural "table should not be empty" findings.
pub const EMPTY_TABLE_CAP: u8 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalityBucket {
    Informational,
    Low,
    Medium,
    Critical,
}

impl CriticalityBucket {
    /// >= 60 critical, 40..=59 medium, 26..=39 low, <= 25 informational.
    pub fn from_score(score: u8) -> Self {
        match score {
            60.. => Self::Critical,
            40..=59 => Self::Medium,
            26..=39 => Self::Low,
            _ => Self::Informational,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Informational => "informational",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for CriticalityBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CriticalityBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "informational" | "info" => Ok(Self::Informational),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Unknown criticality bucket: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalityScore {
    pub score: u8,
    pub bucket: CriticalityBucket,
}

impl CriticalityScore {
    fn new(score: u8) -> Self {
        Self {
            score,
            bucket: CriticalityBucket::from_score(score),
        }
    }
}

pub struct CriticalityScorer;

impl CriticalityScorer {
    pub fn score(
        severity: Severity,
        rows_failed: u64,
        revenue_impact: Option<f64>,
        empty_table_check: bool,
    ) -> CriticalityScore {
        let total = Self::severity_base(severity) as u32
            + Self::row_bonus(rows_failed) as u32
            + Self::revenue_bonus(revenue_impact.unwrap_or(0.0)) as u32;

        let mut score = total.min(MAX_SCORE as u32) as u8;
        if empty_table_check {
            score = score.min(EMPTY_TABLE_CAP);
        }
        CriticalityScore::new(score)
    }

    fn severity_base(severity: Severity) -> u8 {
        match severity {
            Severity::Critical => 40,
            Severity::High => 30,
            Severity::Medium => 20,
            Severity::Low => 10,
        }
    }

    fn row_bonus(rows_failed: u64) -> u8 {
        match rows_failed {
            10_001.. => 30,
            1_001..=10_000 => 25,
            101..=1_000 => 20,
            11..=100 => 15,
            1..=10 => 10,
            0 => 0,
        }
    }

    fn revenue_bonus(dollars: f64) -> u8 {
        // NaN and negatives carry no bonus.
        if dollars > 100_000.0 {
            30
        } else if dollars > 50_000.0 {
            25
        } else if dollars > 10_000.0 {
            20
        } else if dollars > 1_000.0 {
            15
        } else if dollars > 0.0 {
            10
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_additive_formula() {
        // 30 (high) + 15 (12 rows) + 0
        let s = CriticalityScorer::score(Severity::High, 12, None, false);
        assert_eq!(s.score, 45);
        assert_eq!(s.bucket, CriticalityBucket::Medium);
    }

    #[test]
    fn test_capped_at_100() {
        let s = CriticalityScorer::score(Severity::Critical, 50_000, Some(1_000_000.0), false);
        assert_eq!(s.score, 100);
        assert_eq!(s.bucket, CriticalityBucket::Critical);
    }

    #[test]
    fn test_boundaries_are_strict() {
        assert_eq!(CriticalityScorer::row_bonus(10_000), 25);
        assert_eq!(CriticalityScorer::row_bonus(10_001), 30);
        assert_eq!(CriticalityScorer::row_bonus(10), 10);
        assert_eq!(CriticalityScorer::revenue_bonus(100_000.0), 25);
        assert_eq!(CriticalityScorer::revenue_bonus(0.0), 0);
        assert_eq!(CriticalityScorer::revenue_bonus(f64::NAN), 0);
    }

    #[test]
    fn test_empty_table_override_is_informational() {
        for severity in [Severity::Low, Severity::Medium, Severity::High, Severity::Critical] {
            let s = CriticalityScorer::score(severity, 1_000_000, Some(1e9), true);
            assert!(s.score <= 25);
            assert_eq!(s.bucket, CriticalityBucket::Informational);
        }
    }

    #[test]
    fn test_bucket_thresholds() {
        assert_eq!(CriticalityBucket::from_score(60), CriticalityBucket::Critical);
        assert_eq!(CriticalityBucket::from_score(59), CriticalityBucket::Medium);
        assert_eq!(CriticalityBucket::from_score(40), CriticalityBucket::Medium);
        assert_eq!(CriticalityBucket::from_score(39), CriticalityBucket::Low);
        assert_eq!(CriticalityBucket::from_score(26), CriticalityBucket::Low);
        assert_eq!(CriticalityBucket::from_score(25), CriticalityBucket::Informational);
        assert_eq!(CriticalityBucket::from_score(0), CriticalityBucket::Informational);
    }
}
