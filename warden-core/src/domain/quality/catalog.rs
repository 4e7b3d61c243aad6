// warden-core/src/domain/quality/catalog.rs

use crate::domain::error::DomainError;
use crate::domain::paging::Page;
use crate::domain::quality::Rule;
use std::collections::HashSet;

/// Every rule known to the project, in load order. Ids are unique.
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    rules: Vec<Rule>,
}

impl RuleCatalog {
    pub fn new(rules: Vec<Rule>) -> Result<Self, DomainError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(DomainError::InvalidRule {
                    rule_id: rule.id.clone(),
                    reason: "duplicate rule id".to_string(),
                });
            }
        }
        Ok(Self { rules })
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn require(&self, id: &str) -> Result<&Rule, DomainError> {
        self.get(id).ok_or_else(|| DomainError::RuleNotFound(id.to_string()))
    }

    pub fn all(&self) -> &[Rule] {
        &self.rules
    }

    /// What execution sees: disabled rules never run.
    pub fn enabled(&self) -> Vec<&Rule> {
        self.rules.iter().filter(|r| r.enabled).collect()
    }

    pub fn page(&self, offset: usize, limit: usize, enabled_only: bool) -> Page<Rule> {
        let rules: Vec<Rule> = self
            .rules
            .iter()
            .filter(|r| !enabled_only || r.enabled)
            .cloned()
            .collect();
        Page::slice(rules, offset, limit)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
