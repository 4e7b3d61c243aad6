// warden-core/src/domain/issue/mod.rs

// open -> acknowledged -> resolved, plus the automatic resolved -> open reopening.
// Invariant on every transition: resolved_at.is_some() <=> status == Resolved.

use crate::domain::error::DomainError;
use crate::domain::quality::Severity;
use crate::domain::scoring::{CriticalityBucket, CriticalityScore};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const REOPEN_MARKER: &str = "[reopened: validation failed at ";
const ANNOTATION_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "acknowledged" | "ack" => Ok(Self::Acknowledged),
            "resolved" => Ok(Self::Resolved),
            _ => Err(format!("Unknown issue status: {}", s)),
        }
    }
}

/// What produced the issue. Quality findings and rule-health problems are never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSource {
    /// The rule ran and found violating rows.
    RuleFailure,
    /// The rule could not run (connectivity, timeout, syntax).
    RuleHealth,
    /// A statistical model flagged the result series.
    Anomaly,
    /// A protection-class rule failed; resolution is re-verified against live data.
    Protection,
}

impl IssueSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RuleFailure => "rule_failure",
            Self::RuleHealth => "rule_health",
            Self::Anomaly => "anomaly",
            Self::Protection => "protection",
        }
    }
}

impl fmt::Display for IssueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IssueSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "rule_failure" | "failure" => Ok(Self::RuleFailure),
            "rule_health" | "health" => Ok(Self::RuleHealth),
            "anomaly" => Ok(Self::Anomaly),
            "protection" => Ok(Self::Protection),
            _ => Err(format!("Unknown issue source: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub id: Uuid,
    pub rule_id: String,
    pub source: IssueSource,
    /// "source.schema.table[.column]" the finding is about.
    pub scope: String,
    pub status: IssueStatus,
    pub severity: Severity,
    pub criticality: CriticalityScore,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub occurrences: u64,
    #[serde(default)]
    pub reopen_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result_id: Option<Uuid>,
}

impl Issue {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        rule_id: &str,
        source: IssueSource,
        scope: &str,
        severity: Severity,
        criticality: CriticalityScore,
        description: String,
        result_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule_id: rule_id.to_string(),
            source,
            scope: scope.to_string(),
            status: IssueStatus::Open,
            severity,
            criticality,
            description,
            resolved_at: None,
            first_seen_at: now,
            last_seen_at: now,
            occurrences: 1,
            reopen_count: 0,
            last_result_id: result_id,
        }
    }

    /// Open or acknowledged.
    pub fn is_active(&self) -> bool {
        self.status != IssueStatus::Resolved
    }

    pub fn is_consistent(&self) -> bool {
        self.resolved_at.is_some() == (self.status == IssueStatus::Resolved)
    }

    fn refuse(&self, action: &str) -> DomainError {
        DomainError::InvalidTransition {
            issue_id: self.id.to_string(),
            status: self.status.to_string(),
            action: action.to_string(),
        }
    }

    // --- TRANSITIONS ---

    pub fn acknowledge(&mut self) -> Result<(), DomainError> {
        match self.status {
            IssueStatus::Open => {
                self.status = IssueStatus::Acknowledged;
                Ok(())
            }
            _ => Err(self.refuse("acknowledge")),
        }
    }

    /// A claim of resolution. Protection issues stay subject to re-validation.
    pub fn resolve(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        match self.status {
            IssueStatus::Open | IssueStatus::Acknowledged => {
                self.status = IssueStatus::Resolved;
                self.resolved_at = Some(now);
                Ok(())
            }
            IssueStatus::Resolved => Err(self.refuse("resolve")),
        }
    }

    /// Forces a resolved issue back open and prepends a machine explanation.
    pub fn reopen(&mut self, explanation: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != IssueStatus::Resolved {
            return Err(self.refuse("reopen"));
        }
        let original = strip_annotation(&self.description);
        self.description = format!(
            "{}{}] {}{}{}",
            REOPEN_MARKER,
            now.to_rfc3339_opts(SecondsFormat::Secs, true),
            explanation,
            ANNOTATION_SEPARATOR,
            original
        );
        self.status = IssueStatus::Open;
        self.resolved_at = None;
        self.reopen_count += 1;
        self.last_seen_at = now;
        Ok(())
    }

    /// Another failing observation for an active issue.
    pub fn touch(&mut self, now: DateTime<Utc>, result_id: Option<Uuid>, criticality: CriticalityScore) {
        self.occurrences += 1;
        self.last_seen_at = now;
        if result_id.is_some() {
            self.last_result_id = result_id;
        }
        self.criticality = criticality;
    }

    /// Re-validation confirmed the resolution: nothing changes but the last-seen time.
    pub fn confirm(&mut self, now: DateTime<Utc>) {
        self.last_seen_at = now;
    }

    /// First line of the description without the reopening annotation.
    pub fn headline(&self) -> &str {
        strip_annotation(&self.description).lines().next().unwrap_or_default()
    }

    pub fn was_reopened(&self) -> bool {
        self.description.starts_with(REOPEN_MARKER)
    }
}

fn strip_annotation(description: &str) -> &str {
    if description.starts_with(REOPEN_MARKER)
        && let Some(pos) = description.find(ANNOTATION_SEPARATOR)
    {
        return &description[pos + ANNOTATION_SEPARATOR.len()..];
    }
    description
}

// --- FILTERING ---

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueFilter {
    pub status: Option<IssueStatus>,
    pub severity: Option<Severity>,
    pub bucket: Option<CriticalityBucket>,
    pub source: Option<IssueSource>,
    pub rule_id: Option<String>,
}

impl IssueFilter {
    pub fn matches(&self, issue: &Issue) -> bool {
        self.status.is_none_or(|s| issue.status == s)
            && self.severity.is_none_or(|s| issue.severity == s)
            && self.bucket.is_none_or(|b| issue.criticality.bucket == b)
            && self.source.is_none_or(|s| issue.source == s)
            && self.rule_id.as_deref().is_none_or(|r| issue.rule_id == r)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::scoring::CriticalityScorer;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap()
    }

    fn issue(source: IssueSource) -> Issue {
        Issue::open(
            "pii_email_encrypted",
            source,
            "warehouse.crm.customers.email",
            Severity::High,
            CriticalityScorer::score(Severity::High, 12, None, false),
            "Column email is stored in clear text".into(),
            None,
            t0(),
        )
    }

    #[test]
    fn test_full_lifecycle_keeps_invariant() -> anyhow::Result<()> {
        let mut i = issue(IssueSource::Protection);
        assert!(i.is_consistent());

        i.acknowledge()?;
        assert_eq!(i.status, IssueStatus::Acknowledged);
        assert!(i.is_consistent());

        i.resolve(t0() + Duration::hours(1))?;
        assert_eq!(i.resolved_at, Some(t0() + Duration::hours(1)));
        assert!(i.is_consistent());

        i.reopen("encryption not verified: 0/10 samples look encrypted", t0() + Duration::days(1))?;
        assert_eq!(i.status, IssueStatus::Open);
        assert!(i.resolved_at.is_none());
        assert!(i.is_consistent());
        assert!(i.description.starts_with("[reopened: validation failed at 2026-10-02T08:00:00Z]"));
        assert_eq!(i.headline(), "Column email is stored in clear text");
        Ok(())
    }

    #[test]
    fn test_second_reopen_replaces_annotation() -> anyhow::Result<()> {
        let mut i = issue(IssueSource::Protection);
        i.resolve(t0())?;
        i.reopen("first", t0())?;
        i.resolve(t0())?;
        i.reopen("second", t0())?;
        assert_eq!(i.reopen_count, 2);
        assert_eq!(i.description.matches("[reopened:").count(), 1);
        assert!(i.description.contains("second"));
        Ok(())
    }

    #[test]
    fn test_invalid_transitions_are_refused() {
        let mut i = issue(IssueSource::RuleFailure);
        assert!(i.reopen("x", t0()).is_err());
        i.resolve(t0()).unwrap();
        assert!(matches!(i.acknowledge(), Err(DomainError::InvalidTransition { .. })));
        assert!(i.resolve(t0()).is_err());
        assert!(i.is_consistent());
    }

    #[test]
    fn test_touch_counts_occurrences() {
        let mut i = issue(IssueSource::RuleFailure);
        let later = t0() + Duration::minutes(30);
        let score = CriticalityScorer::score(Severity::High, 5_000, None, false);
        i.touch(later, Some(Uuid::new_v4()), score);
        assert_eq!(i.occurrences, 2);
        assert_eq!(i.last_seen_at, later);
        assert_eq!(i.first_seen_at, t0());
        assert_eq!(i.status, IssueStatus::Open);
        assert_eq!(i.criticality.score, 55);
    }

    #[test]
    fn test_filter_combines_criteria() {
        let i = issue(IssueSource::Protection);
        let mut f = IssueFilter {
            status: Some(IssueStatus::Open),
            source: Some(IssueSource::Protection),
            ..Default::default()
        };
        assert!(f.matches(&i));
        f.bucket = Some(CriticalityBucket::Critical);
        assert!(!f.matches(&i));
        f.bucket = Some(i.criticality.bucket);
        f.rule_id = Some("other".into());
        assert!(!f.matches(&i));
    }
}
